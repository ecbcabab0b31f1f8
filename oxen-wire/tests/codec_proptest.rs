//! Property-based round-trip coverage for the codec (§8: "Codec round-trip:
//! decode(encode(v)) = v ... encode(decode(b)) = b").

use oxen_wire::{decode_with_limit, encode, Value};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Value::Int),
        any::<i64>().prop_map(Value::Timestamp),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Bytes),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::List),
            prop::collection::vec(
                (prop::collection::vec(any::<u8>(), 0..8), inner),
                0..8,
            )
            .prop_map(|pairs| {
                let map: BTreeMap<Vec<u8>, Value> = pairs.into_iter().collect();
                Value::Dict(map)
            }),
        ]
    })
}

proptest! {
    #[test]
    fn value_roundtrips_through_encode_decode(v in arb_value()) {
        let bytes = encode(&v);
        let decoded = decode_with_limit(&bytes, usize::MAX)
            .expect("encoder output must always decode");
        prop_assert_eq!(decoded, v);
    }

    #[test]
    fn decode_is_a_fixpoint_on_reencode(v in arb_value()) {
        let bytes = encode(&v);
        let decoded = decode_with_limit(&bytes, usize::MAX).unwrap();
        let reencoded = encode(&decoded);
        prop_assert_eq!(reencoded, bytes);
    }
}

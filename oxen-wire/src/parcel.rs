//! Typed projection of [`crate::Value`] onto the parcel envelope and body
//! schema (§3, §4.2).

use crate::codec::{self, Value};
use crate::error::SchemaError;
use std::collections::BTreeMap;
use std::fmt;

macro_rules! wire_newtype {
    ($name:ident, $inner:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $inner);

        impl $name {
            pub fn wrapping_add(self, rhs: $inner) -> Self {
                $name(self.0.wrapping_add(rhs))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

wire_newtype!(MessageId, i64);
wire_newtype!(SequenceNumber, i64);
wire_newtype!(KeepaliveId, u64);

/// An opaque, administrator-assigned server identifier (§3). Identity is by
/// value, never by reference — two [`Sid`]s with equal bytes are the same
/// server.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sid(pub Vec<u8>);

impl Sid {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Sid(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl From<&str> for Sid {
    fn from(s: &str) -> Self {
        Sid(s.as_bytes().to_vec())
    }
}

/// The full on-wire unit (§3): optional keepalive ids plus at most one body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parcel {
    pub ka: Option<KeepaliveId>,
    pub kk: Option<KeepaliveId>,
    pub body: Option<Body>,
}

impl Parcel {
    pub fn empty() -> Self {
        Parcel {
            ka: None,
            kk: None,
            body: None,
        }
    }

    pub fn with_body(body: Body) -> Self {
        Parcel {
            ka: None,
            kk: None,
            body: Some(body),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        codec::encode(&self.to_value())
    }

    /// Decodes strictly (§4.2 default): any top-level key outside
    /// `{ka, kk, md, ma, lc}` is rejected.
    pub fn decode(bytes: &[u8]) -> Result<Parcel, SchemaError> {
        let value = codec::decode(bytes)?;
        Parcel::from_value(&value, false)
    }

    /// Decodes leniently (§4.2 compatibility mode): unknown top-level keys
    /// are ignored rather than rejected, for forward compatibility with a
    /// newer peer's envelope extensions.
    pub fn decode_lenient(bytes: &[u8]) -> Result<Parcel, SchemaError> {
        let value = codec::decode(bytes)?;
        Parcel::from_value(&value, true)
    }

    fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        if let Some(ka) = self.ka {
            map.insert(b"ka".to_vec(), Value::Int(ka.0 as i64));
        }
        if let Some(kk) = self.kk {
            map.insert(b"kk".to_vec(), Value::Int(kk.0 as i64));
        }
        match &self.body {
            Some(Body::Message(m)) => {
                map.insert(b"md".to_vec(), m.to_value());
            }
            Some(Body::Ack(a)) => {
                map.insert(b"ma".to_vec(), a.to_value());
            }
            Some(Body::LastContact(lc)) => {
                map.insert(b"lc".to_vec(), lc.to_value());
            }
            None => {}
        }
        Value::Dict(map)
    }

    fn from_value(value: &Value, lenient: bool) -> Result<Parcel, SchemaError> {
        let map = value.as_dict().ok_or(SchemaError::NotADict)?;
        let ka = optional_field(map, b"ka")?
            .map(|v| v.as_int().ok_or(SchemaError::WrongKind { field: "ka" }))
            .transpose()?
            .map(|n| KeepaliveId(n as u64));
        let kk = optional_field(map, b"kk")?
            .map(|v| v.as_int().ok_or(SchemaError::WrongKind { field: "kk" }))
            .transpose()?
            .map(|n| KeepaliveId(n as u64));

        let body_keys: Vec<&[u8]> = [b"md".as_slice(), b"ma".as_slice(), b"lc".as_slice()]
            .into_iter()
            .filter(|k| map.contains_key(*k))
            .collect();
        if body_keys.len() > 1 {
            return Err(SchemaError::MultipleBodies);
        }
        let body = match body_keys.first() {
            Some(&b"md") => Some(Body::Message(Message::from_value(&map[b"md".as_slice()])?)),
            Some(&b"ma") => Some(Body::Ack(Ack::from_value(&map[b"ma".as_slice()])?)),
            Some(&b"lc") => Some(Body::LastContact(LastContact::from_value(
                &map[b"lc".as_slice()],
            )?)),
            _ => None,
        };

        if !lenient {
            for key in map.keys() {
                if !matches!(key.as_slice(), b"ka" | b"kk" | b"md" | b"ma" | b"lc") {
                    return Err(SchemaError::UnknownBody(
                        String::from_utf8_lossy(key).into_owned(),
                    ));
                }
            }
        }

        Ok(Parcel { ka, kk, body })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Message(Message),
    Ack(Ack),
    LastContact(LastContact),
}

/// An `md` body (§3): a message in flight from `fr` to `to`, optionally
/// tracked for acknowledgement (`id` present) and carrying an arbitrary
/// payload value — usually a [`MessageData`] sub-body, but fire-and-forget
/// datagrams carry raw bytes instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub to: Sid,
    pub fr: Sid,
    pub id: Option<MessageId>,
    pub data: Value,
}

impl Message {
    fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert(b"to".to_vec(), Value::Bytes(self.to.0.clone()));
        map.insert(b"fr".to_vec(), Value::Bytes(self.fr.0.clone()));
        if let Some(id) = self.id {
            map.insert(b"id".to_vec(), Value::Int(id.0));
        }
        map.insert(b"d".to_vec(), self.data.clone());
        Value::Dict(map)
    }

    fn from_value(value: &Value) -> Result<Message, SchemaError> {
        let map = value.as_dict().ok_or(SchemaError::NotADict)?;
        let to = required_sid(map, b"to")?;
        let fr = required_sid(map, b"fr")?;
        let id = optional_field(map, b"id")?
            .map(|v| v.as_int().ok_or(SchemaError::WrongKind { field: "id" }))
            .transpose()?
            .map(MessageId);
        let data = required_field(map, b"d")?.clone();
        Ok(Message { to, fr, id, data })
    }
}

/// An `ma` body (§3): acknowledges message `id` originally sent by `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub to: Sid,
    pub fr: Sid,
    pub id: MessageId,
}

impl Ack {
    fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert(b"to".to_vec(), Value::Bytes(self.to.0.clone()));
        map.insert(b"fr".to_vec(), Value::Bytes(self.fr.0.clone()));
        map.insert(b"id".to_vec(), Value::Int(self.id.0));
        Value::Dict(map)
    }

    fn from_value(value: &Value) -> Result<Ack, SchemaError> {
        let map = value.as_dict().ok_or(SchemaError::NotADict)?;
        let to = required_sid(map, b"to")?;
        let fr = required_sid(map, b"fr")?;
        let id = required_field(map, b"id")?
            .as_int()
            .ok_or(SchemaError::WrongKind { field: "id" })?;
        Ok(Ack {
            to,
            fr,
            id: MessageId(id),
        })
    }
}

/// A single last-contact matrix cell, as gossiped in an `lc` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactCell {
    pub observer: Sid,
    pub observed: Sid,
    pub timestamp: i64,
}

/// An `lc` body (§3, §4.4): a fragment of the gossiping peer's view of the
/// last-contact matrix. Cells the sender has no information for are simply
/// absent — never represented with a sentinel timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastContact {
    pub cells: Vec<ContactCell>,
}

impl LastContact {
    fn to_value(&self) -> Value {
        let items = self
            .cells
            .iter()
            .map(|cell| {
                let mut map = BTreeMap::new();
                map.insert(b"ob".to_vec(), Value::Bytes(cell.observer.0.clone()));
                map.insert(b"os".to_vec(), Value::Bytes(cell.observed.0.clone()));
                map.insert(b"ts".to_vec(), Value::Timestamp(cell.timestamp));
                Value::Dict(map)
            })
            .collect();
        Value::List(items)
    }

    fn from_value(value: &Value) -> Result<LastContact, SchemaError> {
        let items = value.as_list().ok_or(SchemaError::WrongKind { field: "lc" })?;
        let mut cells = Vec::with_capacity(items.len());
        for item in items {
            let map = item.as_dict().ok_or(SchemaError::NotADict)?;
            let observer = required_sid(map, b"ob")?;
            let observed = required_sid(map, b"os")?;
            let timestamp = required_field(map, b"ts")?
                .as_timestamp()
                .ok_or(SchemaError::WrongKind { field: "ts" })?;
            cells.push(ContactCell {
                observer,
                observed,
                timestamp,
            });
        }
        Ok(LastContact { cells })
    }
}

/// The sub-bodies of a trackable `md`'s `d` field (§3, §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageData {
    Synchronize {
        broadcast_start: SequenceNumber,
        oneone_start: SequenceNumber,
    },
    Finalize {
        broadcast_end: SequenceNumber,
        oneone_end: SequenceNumber,
    },
    Broadcast {
        seq: SequenceNumber,
        data: Vec<u8>,
    },
    OneToOne {
        seq: SequenceNumber,
        data: Vec<u8>,
    },
}

impl MessageData {
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        match self {
            MessageData::Synchronize {
                broadcast_start,
                oneone_start,
            } => {
                map.insert(b"m".to_vec(), Value::bytes(b"s".to_vec()));
                map.insert(b"b".to_vec(), Value::Int(broadcast_start.0));
                map.insert(b"1".to_vec(), Value::Int(oneone_start.0));
            }
            MessageData::Finalize {
                broadcast_end,
                oneone_end,
            } => {
                map.insert(b"m".to_vec(), Value::bytes(b"f".to_vec()));
                map.insert(b"b".to_vec(), Value::Int(broadcast_end.0));
                map.insert(b"1".to_vec(), Value::Int(oneone_end.0));
            }
            MessageData::Broadcast { seq, data } => {
                map.insert(b"m".to_vec(), Value::bytes(b"b".to_vec()));
                map.insert(b"s".to_vec(), Value::Int(seq.0));
                map.insert(b"d".to_vec(), Value::Bytes(data.clone()));
            }
            MessageData::OneToOne { seq, data } => {
                map.insert(b"m".to_vec(), Value::bytes(b"1".to_vec()));
                map.insert(b"s".to_vec(), Value::Int(seq.0));
                map.insert(b"d".to_vec(), Value::Bytes(data.clone()));
            }
        }
        Value::Dict(map)
    }

    pub fn from_value(value: &Value) -> Result<MessageData, SchemaError> {
        let map = value.as_dict().ok_or(SchemaError::NotADict)?;
        let kind = required_field(map, b"m")?
            .as_bytes()
            .ok_or(SchemaError::WrongKind { field: "m" })?;
        match kind {
            b"s" => Ok(MessageData::Synchronize {
                broadcast_start: SequenceNumber(req_int(map, b"b")?),
                oneone_start: SequenceNumber(req_int(map, b"1")?),
            }),
            b"f" => Ok(MessageData::Finalize {
                broadcast_end: SequenceNumber(req_int(map, b"b")?),
                oneone_end: SequenceNumber(req_int(map, b"1")?),
            }),
            b"b" => Ok(MessageData::Broadcast {
                seq: SequenceNumber(req_int(map, b"s")?),
                data: req_bytes(map, b"d")?,
            }),
            b"1" => Ok(MessageData::OneToOne {
                seq: SequenceNumber(req_int(map, b"s")?),
                data: req_bytes(map, b"d")?,
            }),
            other => Err(SchemaError::UnknownMessageDataKind(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

fn required_field<'a>(
    map: &'a BTreeMap<Vec<u8>, Value>,
    key: &'static [u8],
) -> Result<&'a Value, SchemaError> {
    map.get(key).ok_or_else(|| {
        SchemaError::MissingField(std::str::from_utf8(key).unwrap_or("?"))
    })
}

fn optional_field<'a>(
    map: &'a BTreeMap<Vec<u8>, Value>,
    key: &'static [u8],
) -> Result<Option<&'a Value>, SchemaError> {
    Ok(map.get(key))
}

fn required_sid(map: &BTreeMap<Vec<u8>, Value>, key: &'static [u8]) -> Result<Sid, SchemaError> {
    let field_name = std::str::from_utf8(key).unwrap_or("?");
    let bytes = required_field(map, key)?
        .as_bytes()
        .ok_or(SchemaError::WrongKind { field: field_name })?;
    Ok(Sid(bytes.to_vec()))
}

fn req_int(map: &BTreeMap<Vec<u8>, Value>, key: &'static [u8]) -> Result<i64, SchemaError> {
    let field_name = std::str::from_utf8(key).unwrap_or("?");
    required_field(map, key)?
        .as_int()
        .ok_or(SchemaError::WrongKind { field: field_name })
}

fn req_bytes(map: &BTreeMap<Vec<u8>, Value>, key: &'static [u8]) -> Result<Vec<u8>, SchemaError> {
    let field_name = std::str::from_utf8(key).unwrap_or("?");
    Ok(required_field(map, key)?
        .as_bytes()
        .ok_or(SchemaError::WrongKind { field: field_name })?
        .to_vec())
}

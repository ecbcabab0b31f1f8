//! The self-describing octet encoding used to frame every Oxen parcel (§4.1).
//!
//! Five sigils, no whitespace, canonical on the wire:
//!
//! - integer: `i<decimal>e`
//! - timestamp: `t<decimal>e` (same grammar as integer, distinct sigil so a
//!   decoder can tell a contact-matrix cell from an ordinary count without
//!   consulting the surrounding dict key)
//! - octet string: `<len>:<bytes>`
//! - list: `l<value>*e`
//! - dict: `d(<key><value>)*e`, keys are octet strings in strictly
//!   ascending byte-lexicographic order
//!
//! `decode(encode(v)) == v` and `encode(decode(b)) == b` for any `b` that
//! decodes successfully; non-canonical input (leading zeros, unsorted keys,
//! embedded whitespace) is rejected rather than normalized.

use crate::error::DecodeError;
use std::collections::BTreeMap;

const SIGIL_INT: u8 = b'i';
const SIGIL_TIMESTAMP: u8 = b't';
const SIGIL_LIST: u8 = b'l';
const SIGIL_DICT: u8 = b'd';
const SIGIL_END: u8 = b'e';

/// A decoded wire value. Dict keys are raw octet strings; ordering is
/// canonical (ascending byte-lex) by construction — [`Value::Dict`] is a
/// `BTreeMap` so there is no way to build a non-canonically-ordered value
/// in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Timestamp(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Value::Timestamp(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn bytes(s: impl Into<Vec<u8>>) -> Value {
        Value::Bytes(s.into())
    }
}

/// The default maximum accepted encoded size, matching §6's default UDP
/// payload budget of 1200 octets. Callers parsing out-of-band data (e.g.
/// tests) can use [`decode_with_limit`] to raise or drop the cap.
pub const DEFAULT_MAX_ENCODED_SIZE: usize = 1200;

pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Int(n) => {
            out.push(SIGIL_INT);
            out.extend_from_slice(n.to_string().as_bytes());
            out.push(SIGIL_END);
        }
        Value::Timestamp(n) => {
            out.push(SIGIL_TIMESTAMP);
            out.extend_from_slice(n.to_string().as_bytes());
            out.push(SIGIL_END);
        }
        Value::Bytes(b) => {
            out.extend_from_slice(b.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(b);
        }
        Value::List(items) => {
            out.push(SIGIL_LIST);
            for item in items {
                encode_into(item, out);
            }
            out.push(SIGIL_END);
        }
        Value::Dict(map) => {
            out.push(SIGIL_DICT);
            // BTreeMap already iterates in ascending byte-lex key order.
            for (k, v) in map {
                encode_into(&Value::Bytes(k.clone()), out);
                encode_into(v, out);
            }
            out.push(SIGIL_END);
        }
    }
}

pub fn decode(input: &[u8]) -> Result<Value, DecodeError> {
    decode_with_limit(input, DEFAULT_MAX_ENCODED_SIZE)
}

pub fn decode_with_limit(input: &[u8], limit: usize) -> Result<Value, DecodeError> {
    if input.len() > limit {
        return Err(DecodeError::TooLarge {
            size: input.len(),
            limit,
        });
    }
    let mut cur = Cursor { buf: input, pos: 0 };
    let value = cur.parse_value()?;
    if cur.pos != cur.buf.len() {
        return Err(DecodeError::TrailingBytes {
            remaining: cur.buf.len() - cur.pos,
        });
    }
    Ok(value)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Result<u8, DecodeError> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof { offset: self.pos })
    }

    fn parse_value(&mut self) -> Result<Value, DecodeError> {
        let sigil = self.peek()?;
        if is_whitespace(sigil) {
            return Err(DecodeError::UnexpectedWhitespace { offset: self.pos });
        }
        match sigil {
            SIGIL_INT => self.parse_int().map(Value::Int),
            SIGIL_TIMESTAMP => self.parse_timestamp_body().map(Value::Timestamp),
            SIGIL_LIST => self.parse_list(),
            SIGIL_DICT => self.parse_dict(),
            b'0'..=b'9' => self.parse_bytes().map(Value::Bytes),
            other => Err(DecodeError::InvalidSigil {
                sigil: other,
                offset: self.pos,
            }),
        }
    }

    fn parse_int(&mut self) -> Result<i64, DecodeError> {
        self.pos += 1; // consume 'i'
        self.parse_signed_decimal_until_e()
    }

    fn parse_timestamp_body(&mut self) -> Result<i64, DecodeError> {
        self.pos += 1; // consume 't'
        self.parse_signed_decimal_until_e()
    }

    fn parse_signed_decimal_until_e(&mut self) -> Result<i64, DecodeError> {
        let start = self.pos;
        let end = self.find_end_sigil(start)?;
        let digits = &self.buf[start..end];
        let value = parse_canonical_signed(digits, start)?;
        self.pos = end + 1; // consume digits and 'e'
        Ok(value)
    }

    fn find_end_sigil(&self, from: usize) -> Result<usize, DecodeError> {
        let mut i = from;
        loop {
            let b = *self
                .buf
                .get(i)
                .ok_or(DecodeError::UnexpectedEof { offset: i })?;
            if b == SIGIL_END {
                return Ok(i);
            }
            if is_whitespace(b) {
                return Err(DecodeError::UnexpectedWhitespace { offset: i });
            }
            i += 1;
        }
    }

    fn parse_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let start = self.pos;
        let mut i = start;
        loop {
            let b = *self
                .buf
                .get(i)
                .ok_or(DecodeError::UnexpectedEof { offset: i })?;
            if b == b':' {
                break;
            }
            if !b.is_ascii_digit() {
                if is_whitespace(b) {
                    return Err(DecodeError::UnexpectedWhitespace { offset: i });
                }
                return Err(DecodeError::InvalidSigil {
                    sigil: b,
                    offset: i,
                });
            }
            i += 1;
        }
        let len_digits = &self.buf[start..i];
        if len_digits.len() > 1 && len_digits[0] == b'0' {
            return Err(DecodeError::NonCanonicalInteger { offset: start });
        }
        let len_str = std::str::from_utf8(len_digits).map_err(|_| DecodeError::InvalidSigil {
            sigil: len_digits.first().copied().unwrap_or(0),
            offset: start,
        })?;
        let len: usize = len_str
            .parse()
            .map_err(|_| DecodeError::IntegerOverflow { offset: start })?;
        let data_start = i + 1;
        let data_end = data_start
            .checked_add(len)
            .ok_or(DecodeError::IntegerOverflow { offset: data_start })?;
        if data_end > self.buf.len() {
            return Err(DecodeError::UnexpectedEof { offset: self.buf.len() });
        }
        let bytes = self.buf[data_start..data_end].to_vec();
        self.pos = data_end;
        Ok(bytes)
    }

    fn parse_list(&mut self) -> Result<Value, DecodeError> {
        self.pos += 1; // consume 'l'
        let mut items = Vec::new();
        loop {
            if self.peek()? == SIGIL_END {
                self.pos += 1;
                return Ok(Value::List(items));
            }
            items.push(self.parse_value()?);
        }
    }

    fn parse_dict(&mut self) -> Result<Value, DecodeError> {
        self.pos += 1; // consume 'd'
        let mut map = BTreeMap::new();
        let mut last_key: Option<Vec<u8>> = None;
        loop {
            if self.peek()? == SIGIL_END {
                self.pos += 1;
                return Ok(Value::Dict(map));
            }
            let key_offset = self.pos;
            let key = self.parse_bytes()?;
            if let Some(prev) = &last_key {
                match key.as_slice().cmp(prev.as_slice()) {
                    std::cmp::Ordering::Equal => {
                        return Err(DecodeError::DuplicateDictKey { offset: key_offset })
                    }
                    std::cmp::Ordering::Less => {
                        return Err(DecodeError::UnsortedDictKeys { offset: key_offset })
                    }
                    std::cmp::Ordering::Greater => {}
                }
            }
            let value = self.parse_value()?;
            last_key = Some(key.clone());
            map.insert(key, value);
        }
    }
}

fn parse_canonical_signed(digits: &[u8], offset: usize) -> Result<i64, DecodeError> {
    if digits.is_empty() {
        return Err(DecodeError::UnexpectedEof { offset });
    }
    let (negative, magnitude) = if digits[0] == b'-' {
        (true, &digits[1..])
    } else {
        (false, digits)
    };
    if magnitude.is_empty() || !magnitude.iter().all(u8::is_ascii_digit) {
        return Err(DecodeError::InvalidSigil {
            sigil: digits[0],
            offset,
        });
    }
    if magnitude.len() > 1 && magnitude[0] == b'0' {
        return Err(DecodeError::NonCanonicalInteger { offset });
    }
    if negative && magnitude == b"0" {
        return Err(DecodeError::NonCanonicalInteger { offset });
    }
    let s = std::str::from_utf8(digits).expect("ascii digits are valid utf8");
    s.parse::<i64>()
        .map_err(|_| DecodeError::IntegerOverflow { offset })
}

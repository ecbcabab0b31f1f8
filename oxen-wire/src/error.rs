use thiserror::Error;

/// Errors from decoding raw octets into a [`crate::Value`] or a typed parcel.
///
/// Every variant here corresponds to a malformed-input condition; none of
/// these are ever raised on locally-constructed values, only on bytes
/// received from the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("invalid sigil {sigil:?} at offset {offset}")]
    InvalidSigil { sigil: u8, offset: usize },

    #[error("non-canonical integer at offset {offset}: leading zero or negative zero")]
    NonCanonicalInteger { offset: usize },

    #[error("integer overflow while parsing at offset {offset}")]
    IntegerOverflow { offset: usize },

    #[error("dictionary keys out of order at offset {offset}")]
    UnsortedDictKeys { offset: usize },

    #[error("duplicate dictionary key at offset {offset}")]
    DuplicateDictKey { offset: usize },

    #[error("whitespace is not permitted in the wire encoding (offset {offset})")]
    UnexpectedWhitespace { offset: usize },

    #[error("trailing bytes after a complete value ({remaining} byte(s) left)")]
    TrailingBytes { remaining: usize },

    #[error("value exceeds the configured maximum size ({size} > {limit})")]
    TooLarge { size: usize, limit: usize },
}

/// Errors raised while projecting a decoded [`crate::Value`] onto the typed
/// parcel schema (§4.2): a structurally valid value that does not match the
/// shape this protocol expects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("value is not a dictionary where one was required")]
    NotADict,

    #[error("missing required field {0:?}")]
    MissingField(&'static str),

    #[error("field {field:?} has the wrong kind")]
    WrongKind { field: &'static str },

    #[error("parcel carries more than one body key")]
    MultipleBodies,

    #[error("unknown body key {0:?}")]
    UnknownBody(String),

    #[error("unknown message-data kind {0:?}")]
    UnknownMessageDataKind(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

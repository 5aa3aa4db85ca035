//! Bencode: the minimal serialization format used by `.torrent` files and
//! tracker replies.
//!
//! A [`BencodeValue`] is a tagged union over the four bencode types. Keys of
//! a dictionary are raw byte strings (not necessarily UTF-8), so dictionaries
//! are kept in a [`BTreeMap`] ordered by byte value — this gives the
//! ascending lexicographic key order the encoder needs for free, instead of
//! sorting a `HashMap`'s keys by hand on every encode.
use std::collections::BTreeMap;
use thiserror::Error;

pub mod decoder;
pub mod encoder;
pub mod json;

pub use decoder::decode;
pub use encoder::encode;

/// A decoded bencode value.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum BencodeValue {
    ByteString(Vec<u8>),
    Integer(i64),
    List(Vec<BencodeValue>),
    Dict(BTreeMap<Vec<u8>, BencodeValue>),
}

impl BencodeValue {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::ByteString(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            BencodeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, BencodeValue>> {
        match self {
            BencodeValue::Dict(d) => Some(d),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    #[error("malformed bencode at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("invalid integer at offset {0}")]
    InvalidInteger(usize),

    #[error("invalid string length at offset {0}")]
    InvalidStringLength(usize),

    #[error("dictionary keys must be byte strings (offset {0})")]
    DictKeyNotString(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BencodeResult<T> = std::result::Result<T, BencodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn bstr(s: &str) -> BencodeValue {
        BencodeValue::ByteString(s.as_bytes().to_vec())
    }

    #[test]
    fn decodes_string() {
        let (v, n) = decode(b"5:hello", 0).unwrap();
        assert_eq!(v, bstr("hello"));
        assert_eq!(n, 7);
    }

    #[test]
    fn decodes_negative_integer() {
        let (v, _) = decode(b"i-52e", 0).unwrap();
        assert_eq!(v, BencodeValue::Integer(-52));
    }

    #[test]
    fn decodes_nested_list_and_dict() {
        let (v, _) = decode(b"d3:foo3:bar5:helloi52ee", 0).unwrap();
        let mut expected = BTreeMap::new();
        expected.insert(b"foo".to_vec(), bstr("bar"));
        expected.insert(b"hello".to_vec(), BencodeValue::Integer(52));
        assert_eq!(v, BencodeValue::Dict(expected));

        let (v, _) = decode(b"ll4:spam4:eggsel3:fooi52eee", 0).unwrap();
        assert_eq!(
            v,
            BencodeValue::List(vec![
                BencodeValue::List(vec![bstr("spam"), bstr("eggs")]),
                BencodeValue::List(vec![bstr("foo"), BencodeValue::Integer(52)]),
            ])
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(decode(b"4:hello", 0).is_err());
        assert!(decode(b"5hello", 0).is_err());
        assert!(decode(b"ihelloe", 0).is_err());
    }

    #[test]
    fn rejects_leading_zero_and_negative_zero() {
        assert!(decode(b"i00e", 0).is_err());
        assert!(decode(b"i-0e", 0).is_err());
        assert!(decode(b"i0e", 0).is_ok());
    }

    #[test]
    fn encodes_dict_with_sorted_keys_regardless_of_insertion_order() {
        let mut dict = BTreeMap::new();
        dict.insert(b"hello".to_vec(), BencodeValue::Integer(52));
        dict.insert(b"foo".to_vec(), bstr("bar"));
        let encoded = encoder::encode_to_vec(&BencodeValue::Dict(dict)).unwrap();
        assert_eq!(encoded, b"d3:foo3:bar5:helloi52ee");
    }

    #[test]
    fn round_trips_decode_then_encode() {
        let corpus: &[&[u8]] = &[
            b"5:hello",
            b"i52e",
            b"i-52e",
            b"i0e",
            b"l5:helloi52ee",
            b"d3:foo3:bar5:helloi52ee",
            b"d3:bar5:hello3:food3:baz3:qux5:helloi52eee",
        ];
        for input in corpus {
            let (value, consumed) = decode(input, 0).unwrap();
            assert_eq!(consumed, input.len());
            let reencoded = encoder::encode_to_vec(&value).unwrap();
            assert_eq!(&reencoded, input);

            let (value2, _) = decode(&reencoded, 0).unwrap();
            assert_eq!(value, value2);
        }
    }

    #[test]
    fn rejects_declared_length_past_end_of_buffer() {
        assert!(decode(b"10:short", 0).is_err());
    }
}

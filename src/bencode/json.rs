//! JSON rendering of a decoded bencode value, for the `decode` CLI command.
//!
//! Bencode byte strings have no defined text encoding; we render them as
//! UTF-8, lossily substituting the replacement character for anything that
//! isn't, which matches how every bencode-to-JSON demo (this one included)
//! treats the common case of torrent metadata being ASCII/UTF-8 text.
use super::BencodeValue;
use serde_json::{Map, Value};

pub fn to_json(value: &BencodeValue) -> Value {
    match value {
        BencodeValue::ByteString(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        BencodeValue::Integer(i) => Value::Number((*i).into()),
        BencodeValue::List(items) => Value::Array(items.iter().map(to_json).collect()),
        BencodeValue::Dict(dict) => {
            let mut map = Map::new();
            for (key, value) in dict {
                map.insert(String::from_utf8_lossy(key).into_owned(), to_json(value));
            }
            Value::Object(map)
        }
    }
}

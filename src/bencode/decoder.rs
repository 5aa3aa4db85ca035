//! Bencode decoding.
//!
//! Decoding works directly over a byte slice and returns the offset of the
//! first unconsumed byte alongside the value, so callers that need the
//! exact source bytes of a sub-value (the metainfo loader's infohash, most
//! notably) can re-slice the input instead of re-encoding.
use super::{BencodeError, BencodeResult, BencodeValue};
use std::collections::BTreeMap;
use tracing::instrument;

/// Decodes one bencode value starting at `start`.
///
/// Returns the value and the offset of the next unconsumed byte.
#[instrument(skip(input), level = "trace")]
pub fn decode(input: &[u8], start: usize) -> BencodeResult<(BencodeValue, usize)> {
    let &tag = input.get(start).ok_or(BencodeError::UnexpectedEof(start))?;
    match tag {
        b'i' => decode_integer(input, start).map(|(i, n)| (BencodeValue::Integer(i), n)),
        b'l' => decode_list(input, start).map(|(l, n)| (BencodeValue::List(l), n)),
        b'd' => decode_dict(input, start).map(|(d, n)| (BencodeValue::Dict(d), n)),
        b'0'..=b'9' => {
            decode_string(input, start).map(|(s, n)| (BencodeValue::ByteString(s), n))
        }
        _ => Err(BencodeError::Malformed {
            offset: start,
            reason: format!("unexpected byte 0x{tag:02x}"),
        }),
    }
}

/// Decodes a byte string: `<decimal length>:<bytes>`.
#[instrument(skip(input), level = "trace")]
fn decode_string(input: &[u8], start: usize) -> BencodeResult<(Vec<u8>, usize)> {
    let colon = find(input, start, b':').ok_or(BencodeError::UnexpectedEof(input.len()))?;
    let len_str = std::str::from_utf8(&input[start..colon])
        .map_err(|_| BencodeError::InvalidStringLength(start))?;
    if len_str.is_empty() || (len_str.len() > 1 && len_str.starts_with('0')) {
        return Err(BencodeError::InvalidStringLength(start));
    }
    let len: usize = len_str
        .parse()
        .map_err(|_| BencodeError::InvalidStringLength(start))?;

    let data_start = colon + 1;
    let data_end = data_start
        .checked_add(len)
        .ok_or(BencodeError::InvalidStringLength(start))?;
    if data_end > input.len() {
        return Err(BencodeError::Malformed {
            offset: start,
            reason: "declared string length overruns input".to_string(),
        });
    }
    Ok((input[data_start..data_end].to_vec(), data_end))
}

/// Decodes an integer: `i<decimal>e`. Rejects leading zeros and `-0`.
#[instrument(skip(input), level = "trace")]
fn decode_integer(input: &[u8], start: usize) -> BencodeResult<(i64, usize)> {
    debug_assert_eq!(input[start], b'i');
    let digits_start = start + 1;
    let e = find(input, digits_start, b'e').ok_or(BencodeError::UnexpectedEof(input.len()))?;
    let num_str = std::str::from_utf8(&input[digits_start..e])
        .map_err(|_| BencodeError::InvalidInteger(start))?;

    if num_str.is_empty() {
        return Err(BencodeError::InvalidInteger(start));
    }
    if num_str == "-0" {
        return Err(BencodeError::InvalidInteger(start));
    }
    let digits = num_str.strip_prefix('-').unwrap_or(num_str);
    if digits.is_empty() || (digits.len() > 1 && digits.starts_with('0')) {
        return Err(BencodeError::InvalidInteger(start));
    }

    let value = num_str
        .parse::<i64>()
        .map_err(|_| BencodeError::InvalidInteger(start))?;
    Ok((value, e + 1))
}

/// Decodes a list: `l<items>e`.
#[instrument(skip(input), level = "trace")]
fn decode_list(input: &[u8], start: usize) -> BencodeResult<(Vec<BencodeValue>, usize)> {
    debug_assert_eq!(input[start], b'l');
    let mut items = Vec::new();
    let mut pos = start + 1;
    loop {
        let &b = input.get(pos).ok_or(BencodeError::UnexpectedEof(input.len()))?;
        if b == b'e' {
            return Ok((items, pos + 1));
        }
        let (value, next) = decode(input, pos)?;
        items.push(value);
        pos = next;
    }
}

/// Decodes a dictionary: `d<key><value>...e`. Keys must be byte strings.
#[instrument(skip(input), level = "trace")]
fn decode_dict(input: &[u8], start: usize) -> BencodeResult<(BTreeMap<Vec<u8>, BencodeValue>, usize)> {
    debug_assert_eq!(input[start], b'd');
    let mut dict = BTreeMap::new();
    let mut pos = start + 1;
    loop {
        let &b = input.get(pos).ok_or(BencodeError::UnexpectedEof(input.len()))?;
        if b == b'e' {
            return Ok((dict, pos + 1));
        }
        if !b.is_ascii_digit() {
            return Err(BencodeError::DictKeyNotString(pos));
        }
        let (key, after_key) = decode_string(input, pos)?;
        let (value, after_value) = decode(input, after_key)?;
        dict.insert(key, value);
        pos = after_value;
    }
}

fn find(input: &[u8], start: usize, needle: u8) -> Option<usize> {
    input[start..].iter().position(|&b| b == needle).map(|i| start + i)
}

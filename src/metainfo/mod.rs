//! The parsed `.torrent` metainfo: announce URL, piece layout, and the
//! infohash that identifies the torrent to trackers and peers.
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha1::{Digest, Sha1};
use tracing::instrument;

use crate::bencode::{self, BencodeValue};
use crate::error::{Error, Result};

/// One entry of a multi-file torrent's `info.files` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub length: i64,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metainfo {
    pub announce: String,
    pub announce_list: Vec<Vec<String>>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
    pub creation_date: Option<SystemTime>,
    pub name: String,
    pub piece_length: i64,
    pub piece_hashes: Vec<[u8; 20]>,
    pub files: Vec<FileEntry>,
    pub length: Option<i64>,
    pub info_hash: [u8; 20],
}

impl Metainfo {
    /// Reads and parses a `.torrent` file from disk.
    #[instrument(level = "debug")]
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    /// Parses a `.torrent` file's raw bytes.
    #[instrument(skip(bytes), level = "debug")]
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (top, spans) = decode_top_level_dict_with_spans(bytes)?;

        let announce = get_string(&top, b"announce")
            .ok_or_else(|| malformed("missing or non-string 'announce'"))?;

        let announce_list = match top.get(b"announce-list".as_slice()) {
            Some(value) => parse_announce_list(value)?,
            None => Vec::new(),
        };

        let comment = get_string(&top, b"comment");
        let created_by = get_string(&top, b"created by");
        let creation_date = top
            .get(b"creation date".as_slice())
            .and_then(BencodeValue::as_integer)
            .and_then(|secs| u64::try_from(secs).ok())
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs));

        let (info_start, info_end) = *spans
            .get(b"info".as_slice())
            .ok_or_else(|| malformed("missing 'info' dictionary"))?;
        let info_bytes = &bytes[info_start..info_end];
        let info_hash: [u8; 20] = Sha1::digest(info_bytes).into();

        let info_value = top
            .get(b"info".as_slice())
            .ok_or_else(|| malformed("missing 'info' dictionary"))?;
        let info = info_value
            .as_dict()
            .ok_or_else(|| malformed("'info' is not a dictionary"))?;

        let name = get_string(info, b"name").ok_or_else(|| malformed("missing 'info.name'"))?;
        let piece_length = info
            .get(b"piece length".as_slice())
            .and_then(BencodeValue::as_integer)
            .ok_or_else(|| malformed("missing or non-integer 'info.piece length'"))?;
        if piece_length <= 0 {
            return Err(malformed("'info.piece length' must be positive"));
        }
        let pieces_bytes = info
            .get(b"pieces".as_slice())
            .and_then(BencodeValue::as_bytes)
            .ok_or_else(|| malformed("missing or non-string 'info.pieces'"))?;
        if pieces_bytes.len() % 20 != 0 {
            return Err(malformed("'info.pieces' length is not a multiple of 20"));
        }
        let piece_hashes: Vec<[u8; 20]> = pieces_bytes
            .chunks_exact(20)
            .map(|chunk| chunk.try_into().expect("chunk is exactly 20 bytes"))
            .collect();

        let length = info.get(b"length".as_slice()).and_then(BencodeValue::as_integer);
        let files = match info.get(b"files".as_slice()) {
            Some(value) => parse_files(value)?,
            None => Vec::new(),
        };

        if length.is_none() && files.is_empty() {
            return Err(malformed(
                "'info' has neither a single-file 'length' nor a multi-file 'files' list",
            ));
        }

        let total_length = length.unwrap_or_else(|| files.iter().map(|f| f.length).sum());
        let n = piece_hashes.len() as i64;
        if n == 0 {
            return Err(malformed("'info.pieces' is empty"));
        }
        let expected_pieces = (total_length + piece_length - 1) / piece_length;
        if n != expected_pieces {
            return Err(malformed(format!(
                "piece count {n} does not match total_length/piece_length ({expected_pieces})"
            )));
        }

        Ok(Metainfo {
            announce,
            announce_list,
            comment,
            created_by,
            creation_date,
            name,
            piece_length,
            piece_hashes,
            files,
            length,
            info_hash,
        })
    }

    pub fn total_length(&self) -> i64 {
        self.length.unwrap_or_else(|| self.files.iter().map(|f| f.length).sum())
    }

    pub fn num_pieces(&self) -> usize {
        self.piece_hashes.len()
    }

    pub fn last_piece_length(&self) -> i64 {
        let n = self.num_pieces() as i64;
        self.total_length() - (n - 1) * self.piece_length
    }

    /// Size in bytes of the piece at `index` (the last piece may be shorter
    /// than `piece_length`).
    pub fn piece_length_for(&self, index: usize) -> i64 {
        if index + 1 == self.num_pieces() {
            self.last_piece_length()
        } else {
            self.piece_length
        }
    }

    pub fn piece_hash(&self, index: usize) -> [u8; 20] {
        self.piece_hashes[index]
    }

    pub fn is_multi_file(&self) -> bool {
        !self.files.is_empty()
    }
}

fn malformed(reason: impl Into<String>) -> Error {
    Error::MalformedMetainfo(reason.into())
}

fn get_string(dict: &BTreeMap<Vec<u8>, BencodeValue>, key: &[u8]) -> Option<String> {
    dict.get(key)
        .and_then(BencodeValue::as_bytes)
        .map(|b| String::from_utf8_lossy(b).into_owned())
}

fn parse_announce_list(value: &BencodeValue) -> Result<Vec<Vec<String>>> {
    let tiers = value.as_list().ok_or_else(|| malformed("'announce-list' is not a list"))?;
    let mut result = Vec::with_capacity(tiers.len());
    for tier in tiers {
        let trackers = tier.as_list().ok_or_else(|| malformed("announce-list tier is not a list"))?;
        let mut tier_vec = Vec::with_capacity(trackers.len());
        for tracker in trackers {
            let bytes = tracker
                .as_bytes()
                .ok_or_else(|| malformed("announce-list entry is not a string"))?;
            tier_vec.push(String::from_utf8_lossy(bytes).into_owned());
        }
        result.push(tier_vec);
    }
    Ok(result)
}

fn parse_files(value: &BencodeValue) -> Result<Vec<FileEntry>> {
    let list = value.as_list().ok_or_else(|| malformed("'info.files' is not a list"))?;
    let mut files = Vec::with_capacity(list.len());
    for entry in list {
        let dict = entry.as_dict().ok_or_else(|| malformed("file entry is not a dictionary"))?;
        let length = dict
            .get(b"length".as_slice())
            .and_then(BencodeValue::as_integer)
            .ok_or_else(|| malformed("file entry missing 'length'"))?;
        let path_list = dict
            .get(b"path".as_slice())
            .and_then(BencodeValue::as_list)
            .ok_or_else(|| malformed("file entry missing 'path'"))?;
        let mut path = Vec::with_capacity(path_list.len());
        for component in path_list {
            let bytes = component
                .as_bytes()
                .ok_or_else(|| malformed("file path component is not a string"))?;
            path.push(String::from_utf8_lossy(bytes).into_owned());
        }
        files.push(FileEntry { length, path });
    }
    Ok(files)
}

/// Decodes a top-level bencode dictionary while also recording the exact
/// `[start, end)` byte span each value occupied in `bytes`.
///
/// This duplicates the dictionary-walking loop of [`bencode::decoder`]
/// rather than reusing it, because the generic decoder discards offsets
/// once a value is built. The metainfo loader needs the *raw* span of the
/// `info` sub-dictionary (not a re-encoding of it) to compute an infohash
/// that is robust to any encoder quirks in whatever produced the torrent.
fn decode_top_level_dict_with_spans(
    bytes: &[u8],
) -> Result<(BTreeMap<Vec<u8>, BencodeValue>, BTreeMap<Vec<u8>, (usize, usize)>)> {
    if bytes.first() != Some(&b'd') {
        return Err(malformed("torrent file root is not a dictionary"));
    }
    let mut dict = BTreeMap::new();
    let mut spans = BTreeMap::new();
    let mut pos = 1usize;
    loop {
        let &b = bytes.get(pos).ok_or_else(|| malformed("unexpected end of input"))?;
        if b == b'e' {
            pos += 1;
            break;
        }
        let (key_value, after_key) = bencode::decode(bytes, pos)?;
        let key = key_value
            .as_bytes()
            .ok_or_else(|| malformed("dictionary key is not a string"))?
            .to_vec();
        let (value, after_value) = bencode::decode(bytes, after_key)?;
        spans.insert(key.clone(), (after_key, after_value));
        dict.insert(key, value);
        pos = after_value;
    }
    Ok((dict, spans))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Metainfo {
        let bytes = std::fs::read("tests/fixtures/sample.torrent").unwrap();
        Metainfo::parse(&bytes).unwrap()
    }

    #[test]
    fn parses_fixture_fields() {
        let m = fixture();
        assert_eq!(m.announce, "http://bittorrent-test-tracker.example.invalid/announce");
        assert_eq!(m.total_length(), 92063);
        assert_eq!(m.piece_length, 32768);
        assert_eq!(m.num_pieces(), 3);
    }

    #[test]
    fn infohash_matches_pinned_fixture_value() {
        let m = fixture();
        assert_eq!(hex::encode(m.info_hash), "d15ac03514cb0722a9b82328b3a6f578e56b9f1a");
    }

    #[test]
    fn piece_hashes_match_pinned_fixture_values() {
        let m = fixture();
        assert_eq!(hex::encode(m.piece_hash(0)), "d5f7c83217c407ab0734880c0ca8cbaef68b1d7c");
        assert_eq!(hex::encode(m.piece_hash(1)), "91ecc20a7a6433432117a5491b8e6d48cb5073fd");
        assert_eq!(hex::encode(m.piece_hash(2)), "993a14c5d8563055bf56d30793a1fbd4a5350562");
    }

    #[test]
    fn piece_length_arithmetic() {
        let m = fixture();
        let n = m.num_pieces();
        let sum: i64 = (0..n).map(|i| m.piece_length_for(i)).sum();
        assert_eq!(sum, m.total_length());
        let last = m.piece_length_for(n - 1);
        assert!(last > 0 && last <= m.piece_length);
        assert_eq!(last, 26527);
    }

    #[test]
    fn rejects_mistyped_info_dict() {
        let err = Metainfo::parse(b"d8:announce1:a4:infoi5ee").unwrap_err();
        assert!(matches!(err, Error::MalformedMetainfo(_)));
    }
}

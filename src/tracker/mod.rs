//! Tracker client: builds the BEP-3 announce request and parses the
//! bencoded, compact-peers reply.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use rand::Rng;
use tracing::instrument;

use crate::bencode::{self, BencodeValue};
use crate::error::{Error, Result};
use crate::metainfo::Metainfo;

/// This client's 20-byte peer ID, generated once per run.
#[derive(Debug, Clone, Copy)]
pub struct PeerId(pub [u8; 20]);

impl PeerId {
    /// `-RC0001-` client identifier prefix followed by 12 random bytes,
    /// per the Azureus-style peer ID convention.
    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        let prefix = b"-RC0001-";
        id[..prefix.len()].copy_from_slice(prefix);
        rand::rng().fill(&mut id[prefix.len()..]);
        PeerId(id)
    }
}

#[derive(Debug)]
pub struct AnnounceResponse {
    pub interval: i64,
    pub peers: Vec<SocketAddr>,
}

pub struct Client {
    http: reqwest::Client,
    peer_id: PeerId,
    port: u16,
}

impl Client {
    pub fn new(peer_id: PeerId, port: u16) -> Self {
        Self { http: reqwest::Client::new(), peer_id, port }
    }

    /// Sends a compact-mode announce request to `metainfo.announce` and
    /// parses the reply.
    #[instrument(skip(self, metainfo), level = "debug")]
    pub async fn announce(&self, metainfo: &Metainfo) -> Result<AnnounceResponse> {
        let url = build_announce_url(
            &metainfo.announce,
            &metainfo.info_hash,
            &self.peer_id.0,
            self.port,
            0,
            0,
            metainfo.total_length(),
        )?;
        tracing::debug!(%url, "sending announce request");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Tracker(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Tracker(format!("tracker returned HTTP {}", response.status())));
        }
        let body = response.bytes().await.map_err(|e| Error::Tracker(e.to_string()))?;
        parse_announce_response(&body)
    }
}

/// Builds the announce URL. `info_hash` and `peer_id` are percent-encoded
/// byte-by-byte ourselves and spliced directly into the query string: a
/// generic query-string builder (e.g. `url::Url::query_pairs_mut`) would
/// re-encode our `%XX` escapes and send the tracker a corrupted info_hash.
fn build_announce_url(
    announce: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    uploaded: i64,
    downloaded: i64,
    left: i64,
) -> Result<reqwest::Url> {
    let separator = if announce.contains('?') { '&' } else { '?' };
    let query = format!(
        "{separator}info_hash={}&peer_id={}&port={port}&uploaded={uploaded}&downloaded={downloaded}&left={left}&compact=1",
        percent_encode_bytes(info_hash),
        percent_encode_bytes(peer_id),
    );
    let full = format!("{announce}{query}");
    reqwest::Url::parse(&full).map_err(|e| Error::Tracker(format!("invalid announce URL: {e}")))
}

/// RFC 3986 percent-encoding of raw bytes, treating each byte as opaque
/// (not as UTF-8) — required because `info_hash`/`peer_id` are arbitrary
/// 20-byte strings, not text.
fn percent_encode_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn parse_announce_response(body: &[u8]) -> Result<AnnounceResponse> {
    let (value, _) = bencode::decode(body, 0)
        .map_err(|e| Error::MalformedTrackerReply(format!("not valid bencode: {e}")))?;
    let dict = value
        .as_dict()
        .ok_or_else(|| Error::MalformedTrackerReply("reply is not a dictionary".to_string()))?;

    if let Some(reason) = dict.get(b"failure reason".as_slice()).and_then(BencodeValue::as_bytes) {
        return Err(Error::Tracker(String::from_utf8_lossy(reason).into_owned()));
    }

    let interval = dict
        .get(b"interval".as_slice())
        .and_then(BencodeValue::as_integer)
        .ok_or_else(|| Error::MalformedTrackerReply("missing 'interval'".to_string()))?;

    let peers_bytes = dict
        .get(b"peers".as_slice())
        .and_then(BencodeValue::as_bytes)
        .ok_or_else(|| Error::MalformedTrackerReply("missing or non-compact 'peers'".to_string()))?;
    if peers_bytes.len() % 6 != 0 {
        return Err(Error::MalformedTrackerReply(
            "'peers' length is not a multiple of 6".to_string(),
        ));
    }

    let peers = peers_bytes
        .chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddr::new(IpAddr::V4(ip), port)
        })
        .collect();

    Ok(AnnounceResponse { interval, peers })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bencode_dict(pairs: &[(&[u8], BencodeValue)]) -> Vec<u8> {
        let mut dict = std::collections::BTreeMap::new();
        for (k, v) in pairs {
            dict.insert(k.to_vec(), v.clone());
        }
        bencode::encoder::encode_to_vec(&BencodeValue::Dict(dict)).unwrap()
    }

    #[test]
    fn parses_compact_peers_and_interval() {
        let mut peers_bytes = Vec::new();
        for (ip, port) in [
            (Ipv4Addr::new(165, 232, 111, 122), 51494u16),
            (Ipv4Addr::new(161, 35, 47, 237), 51480u16),
            (Ipv4Addr::new(139, 59, 169, 165), 51465u16),
        ] {
            peers_bytes.extend_from_slice(&ip.octets());
            peers_bytes.extend_from_slice(&port.to_be_bytes());
        }

        let body = bencode_dict(&[
            (b"interval", BencodeValue::Integer(1800)),
            (b"peers", BencodeValue::ByteString(peers_bytes)),
        ]);

        let response = parse_announce_response(&body).unwrap();
        assert_eq!(response.interval, 1800);
        assert_eq!(
            response.peers,
            vec![
                SocketAddr::new(IpAddr::V4(Ipv4Addr::new(165, 232, 111, 122)), 51494),
                SocketAddr::new(IpAddr::V4(Ipv4Addr::new(161, 35, 47, 237)), 51480),
                SocketAddr::new(IpAddr::V4(Ipv4Addr::new(139, 59, 169, 165)), 51465),
            ]
        );
    }

    #[test]
    fn rejects_peers_length_not_multiple_of_six() {
        let body = bencode_dict(&[
            (b"interval", BencodeValue::Integer(1800)),
            (b"peers", BencodeValue::ByteString(vec![1, 2, 3])),
        ]);
        assert!(parse_announce_response(&body).is_err());
    }

    #[test]
    fn percent_encodes_raw_bytes_byte_by_byte() {
        let encoded = percent_encode_bytes(&[0x12, 0x34, b'a', b'-']);
        assert_eq!(encoded, "%12%34a-");
    }

    #[test]
    fn build_announce_url_does_not_double_encode() {
        let info_hash = [0xAAu8; 20];
        let peer_id = [0x01u8; 20];
        let url = build_announce_url(
            "http://tracker.example/announce",
            &info_hash,
            &peer_id,
            6881,
            0,
            0,
            100,
        )
        .unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("info_hash=%AA%AA%AA"));
        assert!(!query.contains("%25"));
    }
}

//! End-to-end coverage of the download engine against simulated peers: one
//! peer that serves a corrupted piece, one that serves the real payload.
//! Exercises retry-on-bad-peer and whole-payload SHA-1 correctness, which
//! no unit test touches (those stop at the wire codec and the assembler).
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rstc::download;
use rstc::metainfo::Metainfo;
use rstc::peer::{Handshake, Message, MessageId};
use rstc::tracker::PeerId;

fn bitfield_payload(num_pieces: usize) -> Vec<u8> {
    vec![0xFFu8; num_pieces.div_ceil(8)]
}

async fn accept_handshake(stream: &mut TcpStream, info_hash: [u8; 20], peer_id: [u8; 20]) {
    let mut buf = [0u8; 68];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf[28..48], &info_hash[..], "client sent an unexpected info_hash");
    stream.write_all(&Handshake::new(info_hash, peer_id).serialize()).await.unwrap();
}

fn parse_request(payload: &[u8]) -> (u32, u32, u32) {
    (
        u32::from_be_bytes(payload[0..4].try_into().unwrap()),
        u32::from_be_bytes(payload[4..8].try_into().unwrap()),
        u32::from_be_bytes(payload[8..12].try_into().unwrap()),
    )
}

/// Honest peer: answers every block request with the real bytes. Delays
/// its bitfield by `startup_delay` so the corrupt peer below reliably
/// dequeues, fails, and re-enqueues piece 0 before this one starts pulling
/// from the shared queue.
async fn run_good_peer(
    listener: TcpListener,
    info_hash: [u8; 20],
    pieces: Vec<Vec<u8>>,
    startup_delay: Duration,
) {
    let (mut stream, _) = listener.accept().await.unwrap();
    accept_handshake(&mut stream, info_hash, [b'G'; 20]).await;
    tokio::time::sleep(startup_delay).await;

    Message::new(MessageId::Bitfield, bitfield_payload(pieces.len()))
        .write(&mut stream)
        .await
        .unwrap();
    Message::new(MessageId::Unchoke, Vec::new()).write(&mut stream).await.unwrap();

    loop {
        let message = match Message::read(&mut stream).await {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(_) => break,
        };
        if message.id != MessageId::Request {
            continue;
        }
        let (index, begin, length) = parse_request(&message.payload);
        let block = &pieces[index as usize][begin as usize..(begin + length) as usize];
        let mut payload = Vec::with_capacity(8 + block.len());
        payload.extend_from_slice(&index.to_be_bytes());
        payload.extend_from_slice(&begin.to_be_bytes());
        payload.extend_from_slice(block);
        if Message::new(MessageId::Piece, payload).write(&mut stream).await.is_err() {
            break;
        }
    }
}

/// Misbehaving peer: claims every piece, but serves the wrong bytes (right
/// length, so the client accepts the block and only the SHA-1 check at
/// the end of the piece fails).
async fn run_corrupt_peer(listener: TcpListener, info_hash: [u8; 20], num_pieces: usize) {
    let (mut stream, _) = listener.accept().await.unwrap();
    accept_handshake(&mut stream, info_hash, [b'C'; 20]).await;

    Message::new(MessageId::Bitfield, bitfield_payload(num_pieces)).write(&mut stream).await.unwrap();
    Message::new(MessageId::Unchoke, Vec::new()).write(&mut stream).await.unwrap();

    loop {
        let message = match Message::read(&mut stream).await {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(_) => break,
        };
        if message.id != MessageId::Request {
            continue;
        }
        let (index, begin, length) = parse_request(&message.payload);
        let mut payload = Vec::with_capacity(8 + length as usize);
        payload.extend_from_slice(&index.to_be_bytes());
        payload.extend_from_slice(&begin.to_be_bytes());
        payload.extend(std::iter::repeat(0xAAu8).take(length as usize));
        if Message::new(MessageId::Piece, payload).write(&mut stream).await.is_err() {
            break;
        }
    }
}

#[tokio::test]
async fn retry_on_bad_peer_and_payload_correctness() {
    let metainfo = Metainfo::load(Path::new("tests/fixtures/sample.torrent")).unwrap();
    let expected = std::fs::read("tests/fixtures/sample_payload.bin").unwrap();
    assert_eq!(expected.len(), metainfo.total_length() as usize);

    let pieces: Vec<Vec<u8>> = (0..metainfo.num_pieces())
        .map(|i| {
            let start = i * metainfo.piece_length as usize;
            let end = start + metainfo.piece_length_for(i) as usize;
            expected[start..end].to_vec()
        })
        .collect();

    let good_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let good_addr: SocketAddr = good_listener.local_addr().unwrap();
    let corrupt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let corrupt_addr: SocketAddr = corrupt_listener.local_addr().unwrap();

    let info_hash = metainfo.info_hash;
    let num_pieces = metainfo.num_pieces();
    tokio::spawn(run_good_peer(good_listener, info_hash, pieces, Duration::from_millis(300)));
    tokio::spawn(run_corrupt_peer(corrupt_listener, info_hash, num_pieces));

    let peer_id = PeerId::generate();
    let payload = download::download(&metainfo, &[corrupt_addr, good_addr], info_hash, peer_id.0)
        .await
        .expect("download should succeed once the good peer re-delivers the corrupt piece");

    assert_eq!(payload, expected);
}

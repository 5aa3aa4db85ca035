//! The assembler and supervisor: fans a download out across one Tokio task
//! per peer, each pulling work from the shared [`PieceQueue`], and joins
//! the results into one contiguous payload.
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tracing::instrument;

use crate::error::{Error, Result};
use crate::metainfo::Metainfo;
use crate::queue::PieceQueue;

use super::session::PeerSession;

pub const BLOCK_SIZE: usize = 16 * 1024;

/// A single downloaded, hash-verified piece, handed back to the assembler.
#[derive(Debug)]
pub struct PieceProgress {
    pub index: usize,
    pub data: Vec<u8>,
}

struct Assembler {
    payload: Mutex<Vec<u8>>,
    left: Mutex<u64>,
}

impl Assembler {
    fn new(total_length: u64) -> Self {
        Assembler { payload: Mutex::new(vec![0u8; total_length as usize]), left: Mutex::new(total_length) }
    }

    fn commit(&self, offset: usize, progress: &PieceProgress) {
        {
            let mut payload = self.payload.lock().unwrap();
            payload[offset..offset + progress.data.len()].copy_from_slice(&progress.data);
        }
        let mut left = self.left.lock().unwrap();
        *left -= progress.data.len() as u64;
    }

    fn left(&self) -> u64 {
        *self.left.lock().unwrap()
    }

    fn into_payload(self) -> Vec<u8> {
        self.payload.into_inner().unwrap()
    }
}

/// Downloads and verifies the single piece at `index`, trying peers in
/// order until one succeeds. Used by the `download_piece` CLI command.
#[instrument(skip(metainfo, peers, info_hash, peer_id), level = "info")]
pub async fn download_piece(
    metainfo: &Metainfo,
    peers: &[SocketAddr],
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    index: usize,
) -> Result<Vec<u8>> {
    let size = metainfo.piece_length_for(index);
    let hash = metainfo.piece_hash(index);

    let mut last_err = None;
    for &addr in peers {
        let mut session = match PeerSession::connect(addr, info_hash, peer_id).await {
            Ok(session) => session,
            Err(e) => {
                last_err = Some(e);
                continue;
            }
        };
        if !session.has_piece(index) {
            continue;
        }
        match session.download_piece(index, size, hash).await {
            Ok(data) => return Ok(data),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Protocol("no peer offered this piece".to_string())))
}

/// Downloads the whole torrent: spawns one task per peer, each pulling
/// piece indices off the shared queue until it is empty or the task's
/// connection dies, in which case its in-flight index is re-enqueued.
#[instrument(skip(metainfo, peers, info_hash, peer_id), level = "info")]
pub async fn download(
    metainfo: &Metainfo,
    peers: &[SocketAddr],
    info_hash: [u8; 20],
    peer_id: [u8; 20],
) -> Result<Vec<u8>> {
    let queue = Arc::new(PieceQueue::new(metainfo.num_pieces()));
    let assembler = Arc::new(Assembler::new(metainfo.total_length() as u64));

    let mut tasks = Vec::new();
    for &addr in peers {
        let queue = Arc::clone(&queue);
        let assembler = Arc::clone(&assembler);
        let metainfo = metainfo.clone();

        tasks.push(tokio::spawn(async move {
            run_peer_worker(addr, info_hash, peer_id, queue, assembler, metainfo).await
        }));
    }

    for task in tasks {
        let _ = task.await;
    }

    let left = assembler.left();
    if left > 0 {
        return Err(Error::IncompleteDownload { left });
    }
    Ok(Arc::try_unwrap(assembler).unwrap_or_else(|_| unreachable!("all tasks joined")).into_payload())
}

#[instrument(skip_all, fields(peer = %addr), level = "debug")]
async fn run_peer_worker(
    addr: SocketAddr,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    queue: Arc<PieceQueue>,
    assembler: Arc<Assembler>,
    metainfo: Metainfo,
) {
    let mut session = match PeerSession::connect(addr, info_hash, peer_id).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, "peer connection failed");
            return;
        }
    };

    while let Some(index) = queue.dequeue() {
        if !session.has_piece(index) {
            queue.enqueue(index);
            continue;
        }

        let size = metainfo.piece_length_for(index);
        match session.download_piece(index, size, metainfo.piece_hash(index)).await {
            Ok(data) => {
                let offset = index * metainfo.piece_length as usize;
                assembler.commit(offset, &PieceProgress { index, data });
            }
            Err(e) => {
                tracing::warn!(piece = index, error = %e, "piece download failed, re-enqueueing");
                queue.enqueue(index);
                return;
            }
        }
    }
}

mod cli;

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rstc::bencode::{self, json};
use rstc::download::{self, output};
use rstc::metainfo::Metainfo;
use rstc::peer::handshake;
use rstc::tracker::{self, PeerId};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Decode { value } => cmd_decode(&value),
        Command::Info { torrent } => cmd_info(&torrent),
        Command::Peers { torrent } => cmd_peers(&torrent, cli.port).await,
        Command::Handshake { torrent, peer } => cmd_handshake(&torrent, &peer).await,
        Command::DownloadPiece { output: out, torrent, piece_index } => {
            cmd_download_piece(&torrent, piece_index, &out, cli.port).await
        }
        Command::Download { output: out, torrent } => cmd_download(&torrent, &out, cli.port).await,
    }
}

fn cmd_decode(value: &str) -> Result<()> {
    let (decoded, _) = bencode::decode(value.as_bytes(), 0).context("decoding bencode value")?;
    println!("{}", json::to_json(&decoded));
    Ok(())
}

fn cmd_info(torrent: &Path) -> Result<()> {
    let metainfo = Metainfo::load(torrent).context("loading torrent file")?;
    println!("Tracker URL: {}", metainfo.announce);
    println!("Length: {}", metainfo.total_length());
    println!("Info Hash: {}", hex::encode(metainfo.info_hash));
    println!("Piece Length: {}", metainfo.piece_length);
    println!("Piece Hashes:");
    for hash in &metainfo.piece_hashes {
        println!("{}", hex::encode(hash));
    }
    Ok(())
}

async fn announce_and_list_peers(metainfo: &Metainfo, port: u16) -> Result<(PeerId, Vec<SocketAddr>)> {
    let peer_id = PeerId::generate();
    let client = tracker::Client::new(peer_id, port);
    let response = client.announce(metainfo).await.context("announcing to tracker")?;
    Ok((peer_id, response.peers))
}

async fn cmd_peers(torrent: &Path, port: u16) -> Result<()> {
    let metainfo = Metainfo::load(torrent).context("loading torrent file")?;
    let (_, peers) = announce_and_list_peers(&metainfo, port).await?;
    for peer in peers {
        println!("{peer}");
    }
    Ok(())
}

async fn cmd_handshake(torrent: &Path, peer: &str) -> Result<()> {
    let metainfo = Metainfo::load(torrent).context("loading torrent file")?;
    let addr: SocketAddr = peer.parse().context("parsing peer address")?;
    let peer_id = PeerId::generate();
    let (_, theirs) = handshake::connect(addr, metainfo.info_hash, peer_id.0)
        .await
        .context("handshaking with peer")?;
    println!("Peer ID: {}", hex::encode(theirs.peer_id));
    Ok(())
}

async fn cmd_download_piece(torrent: &Path, index: usize, out: &Path, port: u16) -> Result<()> {
    let metainfo = Metainfo::load(torrent).context("loading torrent file")?;
    let (peer_id, peers) = announce_and_list_peers(&metainfo, port).await?;
    let data = download::engine::download_piece(&metainfo, &peers, metainfo.info_hash, peer_id.0, index)
        .await
        .context("downloading piece")?;
    output::write_output(out, &data).context("writing piece to disk")?;
    println!("Piece {index} downloaded to {}.", out.display());
    Ok(())
}

async fn cmd_download(torrent: &Path, out: &Path, port: u16) -> Result<()> {
    let metainfo = Metainfo::load(torrent).context("loading torrent file")?;
    let (peer_id, peers) = announce_and_list_peers(&metainfo, port).await?;
    let data = download::download(&metainfo, &peers, metainfo.info_hash, peer_id.0)
        .await
        .context("downloading torrent")?;
    output::write_output(out, &data).context("writing torrent to disk")?;
    println!("Downloaded {} to {}.", metainfo.name, out.display());
    Ok(())
}

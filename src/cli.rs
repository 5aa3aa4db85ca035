//! Command-line surface: six subcommands, one per operation this client
//! can perform against a `.torrent` file.
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "rstc", about = "A command-line BitTorrent leech client")]
pub struct Cli {
    /// Port advertised to the tracker. This client never accepts incoming
    /// connections, but BEP-3 requires announcing one.
    #[arg(long, default_value_t = 6881, global = true)]
    pub port: u16,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a bencoded value and print it as JSON.
    Decode { value: String },
    /// Print a .torrent file's metainfo.
    Info { torrent: PathBuf },
    /// Announce to the tracker and print the returned peer list.
    Peers { torrent: PathBuf },
    /// Handshake with one peer and print its peer id.
    Handshake {
        torrent: PathBuf,
        /// Peer address as `ip:port`.
        peer: String,
    },
    /// Download and hash-verify a single piece.
    DownloadPiece {
        #[arg(short, long)]
        output: PathBuf,
        torrent: PathBuf,
        piece_index: usize,
    },
    /// Download the whole torrent.
    Download {
        #[arg(short, long)]
        output: PathBuf,
        torrent: PathBuf,
    },
}

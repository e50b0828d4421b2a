use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// flashpage tooling: name keys, metadata block sealing/verification, self-test
#[derive(Parser, Debug)]
#[command(name = "flashpage", version, about = "flashpage CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Derive the directory index key of a name
    Hash {
        /// Name (UTF-8 literal, or hex bytes with --hex)
        #[arg(long)]
        name: String,
        /// Interpret --name as hex bytes
        #[arg(long, default_value_t = false)]
        hex: bool,
        /// Maximum inline name length of the inode layout
        #[arg(long, default_value_t = flashpage::consts::DEFAULT_INLINE_NAME_MAX)]
        inline_max: usize,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Stamp signature + checksum into a metadata block file
    Seal {
        #[arg(long)]
        file: PathBuf,
        /// Block kind: segment | partial-log | footer | btree | blk-bmap | 0xNNNN
        #[arg(long, default_value = "segment")]
        kind: String,
        /// Declared size covered by the checksum (default: whole file)
        #[arg(long)]
        size: Option<usize>,
        /// Write the sealed block here instead of in place
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Verify magic, revision and checksum of a metadata block file
    Verify {
        #[arg(long)]
        file: PathBuf,
        /// Offset of the metadata check for blocks with a non-standard header
        #[arg(long)]
        offset: Option<usize>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run a page vector / integrity round on the configured host allocator
    Selftest {
        #[arg(long, default_value_t = 4)]
        capacity: u8,
        #[arg(long, default_value = "selftest")]
        subsystem: String,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the effective configuration (env + defaults)
    Config {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

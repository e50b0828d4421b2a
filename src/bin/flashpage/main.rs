use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod util;
mod cmd_hash;
mod cmd_seal;
mod cmd_verify;
mod cmd_selftest;
mod cmd_config;

fn init_logger() {
    // Level from RUST_LOG, default info.
    // Example: RUST_LOG=debug flashpage selftest
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Hash { name, hex, inline_max, json } =>
            cmd_hash::exec(name, hex, inline_max, json),

        cli::Cmd::Seal { file, kind, size, out, json } =>
            cmd_seal::exec(file, kind, size, out, json),

        cli::Cmd::Verify { file, offset, json } =>
            cmd_verify::exec(file, offset, json),

        cli::Cmd::Selftest { capacity, subsystem, json } =>
            cmd_selftest::exec(capacity, subsystem, json),

        cli::Cmd::Config { json } =>
            cmd_config::exec(json),
    }
}

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use flashpage::consts::{
    BLK_BMAP_KEY, BTREE_NODE_KEY, LOG_FOOTER_KEY, PARTIAL_LOG_HDR_KEY, SEGMENT_HDR_KEY,
};

pub fn parse_kind(s: &str) -> Result<u16> {
    let key = match s.trim().to_ascii_lowercase().as_str() {
        "segment" | "seg" => SEGMENT_HDR_KEY,
        "partial-log" | "plog" => PARTIAL_LOG_HDR_KEY,
        "footer" | "log-footer" => LOG_FOOTER_KEY,
        "btree" | "btree-node" => BTREE_NODE_KEY,
        "blk-bmap" | "bmap" => BLK_BMAP_KEY,
        other => {
            let hx = other
                .strip_prefix("0x")
                .ok_or_else(|| anyhow!("unknown block kind '{}'", s))?;
            u16::from_str_radix(hx, 16).with_context(|| format!("parse block kind '{}'", s))?
        }
    };
    Ok(key)
}

pub fn kind_name(key: u16) -> &'static str {
    match key {
        SEGMENT_HDR_KEY => "segment",
        PARTIAL_LOG_HDR_KEY => "partial-log",
        LOG_FOOTER_KEY => "footer",
        BTREE_NODE_KEY => "btree",
        BLK_BMAP_KEY => "blk-bmap",
        _ => "unknown",
    }
}

pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("read {}", path.display()))
}

pub fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return Err(anyhow!("hex string must have even length"));
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for i in (0..bytes.len()).step_by(2) {
        let h = (bytes[i] as char)
            .to_digit(16)
            .ok_or_else(|| anyhow!("invalid hex at pos {}", i))?;
        let l = (bytes[i + 1] as char)
            .to_digit(16)
            .ok_or_else(|| anyhow!("invalid hex at pos {}", i + 1))?;
        out.push(((h << 4) | l) as u8);
    }
    Ok(out)
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

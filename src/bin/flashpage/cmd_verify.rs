use anyhow::{anyhow, Result};
use serde_json::json;
use std::path::PathBuf;

use flashpage::integrity::{csum_pair, inspect_block, BlockStatus};

use crate::util::{kind_name, print_json, read_file};

pub fn exec(file: PathBuf, offset: Option<usize>, json: bool) -> Result<()> {
    let buf = read_file(&file)?;

    // Non-standard header: checksum only, no signature at offset 0.
    if let Some(off) = offset {
        let (stored, computed) = csum_pair(&buf, off)?;
        let ok = stored == computed;
        if json {
            print_json(&json!({
                "file": file.display().to_string(),
                "check_offset": off,
                "stored": stored,
                "computed": computed,
                "valid": ok,
            }))?;
        } else {
            println!("check at {}: stored={:#010x} computed={:#010x}", off, stored, computed);
        }
        return if ok {
            Ok(())
        } else {
            Err(anyhow!("{}: checksum mismatch", file.display()))
        };
    }

    let status = inspect_block(&buf);
    if json {
        print_json(&status)?;
    } else {
        match &status {
            BlockStatus::Valid { signature, check } => {
                println!("OK: {} block, revision {}", kind_name(signature.key), signature.version);
                println!("    declared={} csum={:#010x}", check.bytes, check.csum);
            }
            BlockStatus::Malformed { reason } => println!("MALFORMED: {}", reason),
            BlockStatus::BadMagic { found } => println!("BAD MAGIC: {:#010x}", found),
            BlockStatus::UnsupportedVersion { found, supported } => {
                println!("UNSUPPORTED: revision {} (supported {})", found, supported)
            }
            BlockStatus::ChecksumMismatch { stored, computed } => {
                println!("CORRUPT: stored={:#010x} computed={:#010x}", stored, computed)
            }
        }
    }

    if status.is_valid() {
        Ok(())
    } else {
        Err(anyhow!("{}: block is not valid", file.display()))
    }
}

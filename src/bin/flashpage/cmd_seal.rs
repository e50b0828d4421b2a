use anyhow::Result;
use log::info;
use serde_json::json;
use std::path::PathBuf;

use flashpage::integrity::seal_block;

use crate::util::{kind_name, parse_kind, print_json, read_file, write_file};

pub fn exec(
    file: PathBuf,
    kind: String,
    size: Option<usize>,
    out: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let key = parse_kind(&kind)?;
    let mut buf = read_file(&file)?;
    let declared = size.unwrap_or(buf.len());

    let csum = seal_block(&mut buf, key, declared)?;

    let target = out.unwrap_or_else(|| file.clone());
    write_file(&target, &buf)?;
    info!("sealed {} ({} bytes covered)", target.display(), declared);

    if json {
        return print_json(&json!({
            "file": target.display().to_string(),
            "kind": kind_name(key),
            "key": key,
            "declared_size": declared,
            "csum": csum,
        }));
    }

    println!("file     = {}", target.display());
    println!("kind     = {} ({:#06x})", kind_name(key), key);
    println!("declared = {} bytes", declared);
    println!("csum     = {:#010x}", csum);
    Ok(())
}

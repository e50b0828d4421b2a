use anyhow::Result;
use serde_json::json;

use flashpage::hash::generate_key;

use crate::util::{decode_hex, print_json};

pub fn exec(name: String, hex: bool, inline_max: usize, json: bool) -> Result<()> {
    let bytes = if hex {
        decode_hex(&name)?
    } else {
        name.into_bytes()
    };
    let key = generate_key(&bytes, inline_max)?;
    let inline = bytes.len() <= inline_max;

    if json {
        return print_json(&json!({
            "len": bytes.len(),
            "inline_max": inline_max,
            "inline": inline,
            "key": key.as_u64(),
            "key_hex": key.to_string(),
            "lo": key.lo(),
            "hi": key.hi(),
        }));
    }

    println!("key      = {}", key);
    println!("lo32     = {:#010x}", key.lo());
    println!("hi32     = {:#010x}", key.hi());
    println!(
        "len      = {} ({})",
        bytes.len(),
        if inline { "inline" } else { "long" }
    );
    Ok(())
}

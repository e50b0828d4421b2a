use anyhow::Result;
use serde_json::json;

use flashpage::config::FlashConfig;

use crate::util::print_json;

pub fn exec(json: bool) -> Result<()> {
    let cfg = FlashConfig::from_env();
    let valid = cfg.validate();

    if json {
        return print_json(&json!({
            "page_size": cfg.page_size,
            "page_limit": cfg.page_limit,
            "pool_pages": cfg.pool_pages,
            "wait_warn_ms": cfg.wait_warn_ms,
            "violation_policy": cfg.violation_policy,
            "leak_accounting": cfg!(feature = "leak-accounting"),
            "valid": valid.is_ok(),
            "error": valid.as_ref().err().map(|e| e.to_string()),
        }));
    }

    println!("{}", cfg);
    println!(
        "leak accounting: {}",
        if cfg!(feature = "leak-accounting") { "on" } else { "off" }
    );
    valid?;
    Ok(())
}

use anyhow::{anyhow, Result};
use log::info;
use serde_json::json;
use std::time::Instant;

use flashpage::accounting::{AccountingContext, DefaultAccounting};
use flashpage::config::FlashConfig;
use flashpage::consts::PARTIAL_LOG_HDR_KEY;
use flashpage::error::PageError;
use flashpage::integrity::{is_valid, seal_block};
use flashpage::page::PageLifecycle;
use flashpage::pagevec::PageVector;

use crate::util::print_json;

pub fn exec(capacity: u8, subsystem: String, json: bool) -> Result<()> {
    let cfg = FlashConfig::from_env();
    cfg.validate()?;
    let ctx = AccountingContext::init();
    let base = ctx.global_counters().snapshot();

    let lc: PageLifecycle<DefaultAccounting> = PageLifecycle::from_config(&cfg, ctx, &subsystem)?;
    let start = Instant::now();

    // Fill one vector up to the brim.
    let mut vec = PageVector::create(capacity)?;
    let mut filled = 0usize;
    loop {
        match vec.allocate(&lc) {
            Ok(_) => filled += 1,
            Err(PageError::Exhausted { .. }) => break,
            Err(e) => return Err(e.into()),
        }
    }
    info!("selftest: vector filled with {} pages", filled);

    // Seal every page as a partial log header and verify it under the lock.
    let mut verified = 0usize;
    for page in &vec {
        lc.settle(lc.lock(page))?;
        page.with_bytes_mut(|b| {
            let n = b.len().min(u16::MAX as usize);
            seal_block(b, PARTIAL_LOG_HDR_KEY, n)
        })??;
        if page.with_bytes(is_valid)? {
            verified += 1;
        }
        lc.settle(lc.unlock(page))?;
    }

    let during = ctx.global_counters().snapshot().since(&base);
    lc.settle(vec.release(&lc))?;
    lc.settle(vec.destroy())?;
    let after = ctx.global_counters().snapshot().since(&base);
    let clean = after.is_balanced();
    let elapsed = start.elapsed();

    if json {
        print_json(&json!({
            "subsystem": subsystem,
            "page_size": cfg.page_size,
            "capacity": capacity,
            "filled": filled,
            "verified": verified,
            "allocated_during": during.allocated_pages,
            "after": after,
            "clean": clean,
            "elapsed_ms": elapsed.as_secs_f64() * 1000.0,
        }))?;
    } else {
        println!("subsystem        = {}", subsystem);
        println!("page_size        = {}", cfg.page_size);
        println!("filled           = {} / {}", filled, capacity);
        println!("verified         = {}", verified);
        println!("allocated during = {}", during.allocated_pages);
        println!(
            "after release    = allocated={} locked={} memory={} cache={} violations={}",
            after.allocated_pages,
            after.locked_pages,
            after.memory_leaks,
            after.cache_leaks,
            after.violations
        );
        println!("elapsed          = {:.3} ms", elapsed.as_secs_f64() * 1000.0);
    }

    if !clean || verified != filled {
        ctx.check_leaks();
        return Err(anyhow!(
            "selftest failed: clean={} verified={}/{}",
            clean,
            verified,
            filled
        ));
    }
    Ok(())
}

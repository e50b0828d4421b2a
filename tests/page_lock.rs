use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flashpage::accounting::{AccountingContext, Counter, LeakAccounting};
use flashpage::page::{
    AllocFlags, HeapPageAllocator, LifecycleViolation, Page, PageLifecycle, ViolationPolicy,
};
use flashpage::wait::Completion;

fn lifecycle(ctx: &AccountingContext, name: &str) -> PageLifecycle<LeakAccounting> {
    PageLifecycle::bind(ctx, name, Arc::new(HeapPageAllocator::new(512)))
        .with_policy(ViolationPolicy::Escalate)
}

#[test]
fn lock_serializes_writers() -> Result<()> {
    let ctx = Arc::new(AccountingContext::new());
    let lc = Arc::new(lifecycle(&ctx, "writers"));
    let page = Arc::new(lc.allocate(AllocFlags::ZEROED)?);
    let mut handles = Vec::new();

    for _ in 0..8 {
        let lc = lc.clone();
        let page = page.clone();
        handles.push(thread::spawn(move || -> Result<()> {
            for _ in 0..500 {
                lc.settle(lc.lock(&page))?;
                // read-modify-write of a u64 counter stored in the page
                let mut cur = [0u8; 8];
                page.read_at(0, &mut cur)?;
                let next = u64::from_le_bytes(cur) + 1;
                page.write_at(0, &next.to_le_bytes())?;
                lc.settle(lc.unlock(&page))?;
            }
            Ok(())
        }));
    }
    for h in handles {
        h.join().map_err(|_| anyhow::anyhow!("writer panicked"))??;
    }

    let mut cur = [0u8; 8];
    page.read_at(0, &mut cur)?;
    assert_eq!(u64::from_le_bytes(cur), 8 * 500);
    assert_eq!(ctx.global_counters().get(Counter::LockedPages), 0);

    let page = Arc::try_unwrap(page).map_err(|_| anyhow::anyhow!("page still shared"))?;
    lc.settle(lc.free(page))?;
    assert!(ctx.snapshot().is_clean());
    Ok(())
}

#[test]
fn lock_blocks_until_unlock() -> Result<()> {
    let ctx = Arc::new(AccountingContext::new());
    let lc = Arc::new(lifecycle(&ctx, "blocking").with_wait_warn(Duration::from_millis(1)));
    let page: Arc<Page> = Arc::new(lc.allocate(AllocFlags::NONE)?);
    lc.settle(lc.lock(&page))?;

    let acquired = Arc::new(AtomicU64::new(0));
    let started = Arc::new(Completion::new());
    let h = {
        let (lc, page, acquired, started) =
            (lc.clone(), page.clone(), acquired.clone(), started.clone());
        thread::spawn(move || -> Result<()> {
            started.complete();
            lc.settle(lc.lock(&page))?;
            acquired.store(1, Ordering::SeqCst);
            lc.settle(lc.unlock(&page))?;
            Ok(())
        })
    };

    started.wait_timeout(Duration::from_secs(5))?;
    thread::sleep(Duration::from_millis(30));
    assert_eq!(acquired.load(Ordering::SeqCst), 0);
    assert_eq!(ctx.global_counters().get(Counter::LockedPages), 1);

    lc.settle(lc.unlock(&page))?;
    h.join().map_err(|_| anyhow::anyhow!("locker panicked"))??;
    assert_eq!(acquired.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.global_counters().get(Counter::LockedPages), 0);

    let page = Arc::try_unwrap(page).map_err(|_| anyhow::anyhow!("page still shared"))?;
    lc.settle(lc.free(page))?;
    Ok(())
}

#[test]
fn account_locked_tracks_foreign_lock() -> Result<()> {
    let ctx = AccountingContext::new();
    let owner = lifecycle(&ctx, "owner");
    let observer = lifecycle(&ctx, "observer");
    let p = owner.allocate(AllocFlags::NONE)?;

    assert!(owner.try_lock(&p));
    observer.settle(observer.account_locked(&p))?;
    assert_eq!(ctx.subsystem_snapshot("observer").unwrap_or_default().locked_pages, 1);
    assert_eq!(ctx.global_counters().get(Counter::LockedPages), 2);

    observer.settle(observer.unlock(&p))?;
    // the bit is gone; the owner's own unlock now reports a mismatch
    assert!(!owner.unlock(&p).is_clean());
    owner.settle(owner.free(p))?;
    Ok(())
}

#[test]
fn freeing_locked_page_balances_lock_gauge() -> Result<()> {
    let ctx = AccountingContext::new();
    let lc = lifecycle(&ctx, "free-locked").with_policy(ViolationPolicy::LogAndContinue);
    let p = lc.allocate(AllocFlags::NONE)?;
    lc.settle(lc.lock(&p))?;
    let report = lc.free(p);
    assert_eq!(report.len(), 1);
    lc.settle(report)?;
    assert!(ctx.snapshot().global.is_balanced());
    Ok(())
}

#[test]
fn waiter_on_freed_frame_gets_use_after_free() -> Result<()> {
    let ctx = Arc::new(AccountingContext::new());
    let lc = Arc::new(
        lifecycle(&ctx, "freed-under-waiter").with_policy(ViolationPolicy::LogAndContinue),
    );
    let p = lc.allocate(AllocFlags::NONE)?;
    let waiter = lc.retain(&p);
    lc.settle(lc.lock(&p))?;

    let started = Arc::new(Completion::new());
    let h = {
        let (lc, started) = (lc.clone(), started.clone());
        thread::spawn(move || {
            started.complete();
            let report = lc.lock(&waiter);
            (report, waiter)
        })
    };

    started.wait_timeout(Duration::from_secs(5))?;
    thread::sleep(Duration::from_millis(30));
    let report = lc.free(p);
    assert!(report.contains(|v| matches!(v, LifecycleViolation::FreedWhileLocked { .. })));
    lc.settle(report)?;

    let (report, waiter) = h.join().map_err(|_| anyhow::anyhow!("waiter panicked"))?;
    assert!(matches!(
        report.violations(),
        [LifecycleViolation::UseAfterFree { .. }]
    ));
    assert!(!waiter.is_locked());
    assert_eq!(ctx.global_counters().get(Counter::LockedPages), 0);
    assert_eq!(ctx.global_counters().get(Counter::AllocatedPages), 0);

    lc.settle(lc.release(waiter))?;
    Ok(())
}

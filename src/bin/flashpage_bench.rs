use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flashpage::accounting::{AccountingContext, LeakAccounting, NoAccounting, PageAccounting};
use flashpage::hash::generate_key;
use flashpage::integrity::{compute_checksum, is_valid, seal_block};
use flashpage::consts::SEGMENT_HDR_KEY;
use flashpage::page::{AllocFlags, HeapPageAllocator, PageLifecycle};
use flashpage::pagevec::PageVector;

/// Simple deterministic PRNG (SplitMix64). Good enough for benches.
#[derive(Clone)]
struct Rng64 {
    state: u64,
}
impl Rng64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }
    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

/// flashpage micro-benchmark CLI
///
/// Example:
///   flashpage_bench --n 200000 --page-size 4096 --json
#[derive(Parser, Debug)]
#[command(name = "flashpage_bench", version, about = "flashpage micro-bench CLI")]
struct Opt {
    /// Operations per phase
    #[arg(long, default_value_t = 100_000)]
    n: usize,

    #[arg(long, default_value_t = 4096)]
    page_size: usize,

    /// Recycled frames kept by the heap allocator
    #[arg(long, default_value_t = 64)]
    pool_pages: usize,

    /// Page vector capacity for the fill/release phase
    #[arg(long, default_value_t = 16)]
    capacity: u8,

    #[arg(long, default_value_t = 0xA1B2_C3D4_E5F6_7788)]
    seed: u64,

    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Debug, Clone)]
struct PhaseStats {
    name: String,
    ops: u64,
    elapsed: Duration,
    p50_us: f64,
    p99_us: f64,
    tput_ops: f64,
}

fn init_logger() {
    // Level from RUST_LOG, default warn: lifecycle violations stay visible.
    Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        eprintln!("bench error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let opt = Opt::parse();
    let ctx = AccountingContext::new();
    let mut phases = Vec::new();

    phases.push(phase_alloc_free::<LeakAccounting>(&opt, &ctx, "alloc_free_leak")?);
    phases.push(phase_alloc_free::<NoAccounting>(&opt, &ctx, "alloc_free_none")?);
    phases.push(phase_pagevec(&opt, &ctx)?);
    phases.push(phase_csum(&opt)?);
    phases.push(phase_hash(&opt)?);

    if !ctx.check_leaks() {
        eprintln!("[bench] leak counters are not balanced after the run");
    }

    if opt.json {
        print_report_json(&phases);
    } else {
        print_report_human(&phases);
    }
    Ok(())
}

fn lifecycle<A: PageAccounting>(opt: &Opt, ctx: &AccountingContext, name: &str) -> PageLifecycle<A> {
    let alloc = HeapPageAllocator::new(opt.page_size).with_pool(opt.pool_pages);
    PageLifecycle::bind(ctx, name, Arc::new(alloc))
}

// ---------- phases ----------

fn phase_alloc_free<A: PageAccounting>(
    opt: &Opt,
    ctx: &AccountingContext,
    name: &str,
) -> Result<PhaseStats> {
    let lc: PageLifecycle<A> = lifecycle(opt, ctx, name);
    let mut lat = Vec::with_capacity(opt.n);
    let start = Instant::now();
    for _ in 0..opt.n {
        let t0 = Instant::now();
        let p = lc.allocate(AllocFlags::NONE)?;
        lc.settle(lc.free(p))?;
        lat.push(t0.elapsed());
    }
    Ok(stats(name, opt.n as u64, start.elapsed(), &mut lat))
}

fn phase_pagevec(opt: &Opt, ctx: &AccountingContext) -> Result<PhaseStats> {
    let lc: PageLifecycle<LeakAccounting> = lifecycle(opt, ctx, "pagevec");
    let rounds = (opt.n / opt.capacity.max(1) as usize).max(1);
    let mut vec = PageVector::create(opt.capacity.max(1))?;
    let mut lat = Vec::with_capacity(rounds);
    let start = Instant::now();
    for _ in 0..rounds {
        let t0 = Instant::now();
        while !vec.is_full() {
            vec.allocate(&lc)?;
        }
        lc.settle(vec.release(&lc))?;
        lat.push(t0.elapsed());
    }
    lc.settle(vec.destroy())?;
    Ok(stats("pagevec", rounds as u64, start.elapsed(), &mut lat))
}

fn phase_csum(opt: &Opt) -> Result<PhaseStats> {
    let size = opt.page_size.min(u16::MAX as usize);
    let mut buf = vec![0x5Au8; size];
    seal_block(&mut buf, SEGMENT_HDR_KEY, size)?;
    let mut lat = Vec::with_capacity(opt.n);
    let start = Instant::now();
    for i in 0..opt.n {
        let t0 = Instant::now();
        if i % 2 == 0 {
            compute_checksum(&mut buf)?;
        } else if !is_valid(&buf) {
            anyhow::bail!("checksum mismatch at round {}", i);
        }
        lat.push(t0.elapsed());
    }
    Ok(stats("csum", opt.n as u64, start.elapsed(), &mut lat))
}

fn phase_hash(opt: &Opt) -> Result<PhaseStats> {
    let mut rng = Rng64::new(opt.seed);
    let names: Vec<Vec<u8>> = (0..opt.n)
        .map(|i| format!("file-{:x}-{}", rng.next_u64() & 0xFFFF, i).into_bytes())
        .collect();
    let mut lat = Vec::with_capacity(opt.n);
    let mut acc = 0u64;
    let start = Instant::now();
    for name in &names {
        let t0 = Instant::now();
        acc ^= generate_key(name, 12)?.as_u64();
        lat.push(t0.elapsed());
    }
    let elapsed = start.elapsed();
    std::hint::black_box(acc);
    Ok(stats("name_hash", opt.n as u64, elapsed, &mut lat))
}

// ---------- report ----------

fn stats(name: &str, ops: u64, elapsed: Duration, lat: &mut [Duration]) -> PhaseStats {
    lat.sort_unstable();
    let to_us = |d: Duration| d.as_secs_f64() * 1_000_000.0;
    let p = |q: f64| -> f64 {
        if lat.is_empty() {
            return 0.0;
        }
        let idx = ((lat.len() as f64 - 1.0) * q).round() as usize;
        to_us(lat[idx])
    };
    let tput = if elapsed.as_secs_f64() > 0.0 {
        ops as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    PhaseStats {
        name: name.to_string(),
        ops,
        elapsed,
        p50_us: p(0.50),
        p99_us: p(0.99),
        tput_ops: tput,
    }
}

fn print_report_human(phases: &[PhaseStats]) {
    println!("flashpage bench report:");
    for p in phases {
        println!(
            "  {:>16}: ops={} elapsed={:.3}s tput={:.0} ops/s p50={:.2}us p99={:.2}us",
            p.name,
            p.ops,
            p.elapsed.as_secs_f64(),
            p.tput_ops,
            p.p50_us,
            p.p99_us
        );
    }
}

fn print_report_json(phases: &[PhaseStats]) {
    let arr: Vec<serde_json::Value> = phases
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name,
                "ops": p.ops,
                "elapsed_sec": p.elapsed.as_secs_f64(),
                "tput_ops": p.tput_ops,
                "p50_us": p.p50_us,
                "p99_us": p.p99_us,
            })
        })
        .collect();
    println!("{}", serde_json::json!({ "phases": arr }));
}

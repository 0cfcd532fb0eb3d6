/*
 * main.rs
 *
 * linepool: look at a pool layout before committing a buffer to it, or
 * build one and walk it end to end.
 *
 * `size` is pure arithmetic. `probe` grabs a chunk, fills every block,
 * checks that nothing overlaps and nothing got lost, empties the pool and
 * reports the counters. No timing; this is a sanity check, not a bench.
 *
 * --json output is one object per run. Field names are stable.
 */

use std::ptr::NonNull;

use linepool::args::{Command, Options, USAGE, parse_args};
use linepool::error::{DescriptorFault, exit_codes};
use linepool::{ChunkLayout, CountingPool, OwnedChunk, Pool, PoolDescriptor, PoolError, Statistics};

fn main() {
    std::process::exit(i32::from(run_main()));
}

fn run_main() -> u8 {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let argv: Vec<&str> = argv.iter().map(String::as_str).collect();

    match parse_args(&argv) {
        Ok(Command::Help) => {
            println!("{}", USAGE);
            exit_codes::SUCCESS
        }
        Ok(Command::Version) => {
            println!("linepool {}", env!("CARGO_PKG_VERSION"));
            exit_codes::SUCCESS
        }
        Ok(Command::Size(opts)) => size(&opts),
        Ok(Command::Probe(opts)) => probe(&opts),
        Err(e) => {
            eprintln!("linepool: {}", e);
            eprintln!("{}", USAGE);
            exit_codes::USAGE
        }
    }
}

/*
 * Run the geometry checks without a chunk. An empty slice always trips
 * ChunkTooSmall last, so any other fault is a real geometry problem.
 */
fn check_geometry(opts: &Options) -> Result<ChunkLayout, PoolError> {
    let mut empty = [0u8; 0];
    let desc = PoolDescriptor::new(
        opts.block_size,
        opts.blocks_in_chunk,
        opts.cache_line_size,
        &mut empty,
    );
    match desc.validate() {
        Ok(layout) => Ok(layout),
        Err(DescriptorFault::ChunkTooSmall { .. }) => Ok(desc.layout()),
        Err(fault) => Err(fault.into()),
    }
}

fn fail(err: &PoolError, json: bool) -> u8 {
    if json {
        println!(
            r#"{{"status":"error","error":"{}","exit_code":{}}}"#,
            err,
            exit_codes::USAGE
        );
    } else {
        eprintln!("linepool: {}", err);
    }
    exit_codes::USAGE
}

fn size(opts: &Options) -> u8 {
    let layout = match check_geometry(opts) {
        Ok(layout) => layout,
        Err(e) => return fail(&e, opts.json),
    };

    if opts.json {
        println!("{}", layout_json(&layout));
    } else {
        println!("layout:         {}", layout);
        println!("required bytes: {}", layout.required_bytes());
    }
    exit_codes::SUCCESS
}

fn layout_json(layout: &ChunkLayout) -> String {
    format!(
        r#"{{"block_size":{},"blocks_in_chunk":{},"cache_line_size":{},"header_bytes":{},"stride":{},"required_bytes":{}}}"#,
        layout.block_size(),
        layout.blocks_in_chunk(),
        layout.cache_line_size(),
        layout.header_bytes(),
        layout.stride(),
        layout.required_bytes()
    )
}

/* what the probe found wrong, if anything */
#[derive(Debug, Default)]
struct Findings {
    duplicate_blocks: usize,
    corrupted_markers: usize,
    exhaustion_missing: bool,
    lost_blocks: u32,
}

impl Findings {
    fn ok(&self) -> bool {
        self.duplicate_blocks == 0
            && self.corrupted_markers == 0
            && !self.exhaustion_missing
            && self.lost_blocks == 0
    }
}

#[allow(clippy::cast_possible_truncation)]
fn probe(opts: &Options) -> u8 {
    let layout = match check_geometry(opts) {
        Ok(layout) => layout,
        Err(e) => return fail(&e, opts.json),
    };

    let Some(mut chunk) = OwnedChunk::for_layout(&layout) else {
        eprintln!(
            "linepool: cannot allocate a {} byte chunk",
            layout.required_bytes()
        );
        return exit_codes::USAGE;
    };

    let desc = PoolDescriptor::new(
        opts.block_size,
        opts.blocks_in_chunk,
        opts.cache_line_size,
        chunk.as_mut_slice(),
    );
    let pool: CountingPool<'_> = match Pool::create(desc) {
        Ok(pool) => pool,
        Err(e) => return fail(&e, opts.json),
    };

    let mut findings = Findings::default();
    let mut held: Vec<NonNull<u8>> = Vec::with_capacity(pool.capacity() as usize);

    while let Ok(block) = pool.allocate() {
        let marker = held.len() as u8;
        // SAFETY: block is ours and at least one byte long.
        unsafe { block.as_ptr().write(marker) };
        if opts.verbose && !opts.json {
            println!("block {:>8}  {:p}", held.len(), block);
        }
        held.push(block);
    }

    if held.len() != pool.capacity() as usize {
        findings.exhaustion_missing = true;
    }
    if pool.allocate() != Err(PoolError::PoolExhausted) {
        findings.exhaustion_missing = true;
    }

    for (i, block) in held.iter().enumerate() {
        // SAFETY: still held, nobody else writes it.
        if unsafe { block.as_ptr().read() } != i as u8 {
            findings.corrupted_markers += 1;
        }
    }

    let mut addrs: Vec<usize> = held.iter().map(|b| b.as_ptr() as usize).collect();
    addrs.sort_unstable();
    addrs.dedup();
    findings.duplicate_blocks = held.len() - addrs.len();

    for block in held.drain(..) {
        // SAFETY: every block came from this pool and is freed exactly once.
        if let Err(e) = unsafe { pool.free(block) } {
            eprintln!("linepool: {}", e);
            findings.lost_blocks += 1;
        }
    }
    findings.lost_blocks += pool.capacity() - pool.free_blocks().min(pool.capacity());

    let stats = pool.statistics();
    pool.release();

    report(&layout, &stats, &findings, opts.json)
}

fn report(layout: &ChunkLayout, stats: &Statistics, findings: &Findings, json: bool) -> u8 {
    let code = if findings.ok() {
        exit_codes::SUCCESS
    } else {
        exit_codes::PROBE_FAILED
    };

    if json {
        println!(
            r#"{{"status":"{}","layout":{},"total_allocated_count":{},"alloc_worst_retry_count":{},"free_worst_retry_count":{},"duplicate_blocks":{},"corrupted_markers":{},"exhaustion_missing":{},"lost_blocks":{},"exit_code":{}}}"#,
            if findings.ok() { "ok" } else { "failed" },
            layout_json(layout),
            stats.total_allocated_count,
            stats.alloc_worst_retry_count,
            stats.free_worst_retry_count,
            findings.duplicate_blocks,
            findings.corrupted_markers,
            findings.exhaustion_missing,
            findings.lost_blocks,
            code
        );
        return code;
    }

    println!("layout: {}", layout);
    println!("stats:  {}", stats);
    if findings.ok() {
        println!("probe ok: {} blocks allocated, verified and returned", layout.blocks_in_chunk());
    } else {
        eprintln!("linepool: probe failed: {:?}", findings);
    }
    code
}

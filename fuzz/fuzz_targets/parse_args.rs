/*
 * fuzz_targets/parse_args.rs
 *
 * fuzz target for CLI argument parsing. validates that parse_args never
 * panics on arbitrary argument combinations.
 *
 * edge cases: "--cache-line=" (empty value), "-c" (missing value), huge
 * numbers, "-", operands before the command, unicode
 */

#![no_main]

extern crate alloc;
use alloc::vec::Vec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    /* split input on null bytes to simulate multiple arguments */
    let args: Vec<&str> = data
        .split(|&b| b == 0)
        .filter_map(|chunk| core::str::from_utf8(chunk).ok())
        .filter(|s| !s.is_empty())
        .collect();

    /* parse_args must not panic; errors must format */
    if let Err(e) = linepool::args::parse_args(&args) {
        let _ = alloc::format!("{e}");
    }
});

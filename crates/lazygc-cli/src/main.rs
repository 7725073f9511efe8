//! lazygc demonstration driver.
//!
//! Illustrative glue around the `lazygc` library: it is strictly an
//! external consumer of the public API and contains no memory-management
//! logic of its own.
//!
//! Usage: lazygc [options] [demo]
//!        lazygc [options] stress <iterations>
//!
//! Options:
//!   -s <seed>    Seed the sweep-countdown generator (deterministic runs)
//!   -q           Quiet: suppress per-step output, print only stats lines
//!   -v           Version information
//!   -h, --help   Display this help message

use std::env;
use std::io::{self, Write};
use std::process;

use lazygc::Heap;

// ── CLI option parsing ──────────────────────────────────────────────────────

/// Parsed CLI options.
struct CliOptions {
    /// Mode of operation.
    mode: CliMode,
    /// Countdown seed from -s, if any.
    seed: Option<u64>,
    /// Whether -q was given.
    quiet: bool,
}

/// What the driver is doing.
#[derive(Debug, PartialEq, Eq)]
enum CliMode {
    /// Walk one region through its whole lifecycle: lazygc [demo]
    Demo,
    /// Alloc/free churn showing the automatic sweep: lazygc stress <n>
    Stress(usize),
    /// Show version: lazygc -v
    Version,
    /// Show help: lazygc -h / --help
    Help,
}

fn parse_args(args: &[String]) -> Result<CliOptions, String> {
    let mut mode: Option<CliMode> = None;
    let mut seed = None;
    let mut quiet = false;
    let mut i = 1; // skip argv[0]

    while i < args.len() {
        match args[i].as_str() {
            "-s" => {
                i += 1;
                if i >= args.len() {
                    return Err("Option -s requires an argument".to_string());
                }
                let value: u64 = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid seed: {}", args[i]))?;
                seed = Some(value);
                i += 1;
            }
            "-q" => {
                quiet = true;
                i += 1;
            }
            "-v" | "--version" => {
                mode = Some(CliMode::Version);
                i += 1;
            }
            "-h" | "--help" | "-?" => {
                mode = Some(CliMode::Help);
                i += 1;
            }
            "demo" => {
                mode = Some(CliMode::Demo);
                i += 1;
            }
            "stress" => {
                i += 1;
                if i >= args.len() {
                    return Err("Mode 'stress' requires an iteration count".to_string());
                }
                let n: usize = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid iteration count: {}", args[i]))?;
                mode = Some(CliMode::Stress(n));
                i += 1;
            }
            arg => {
                return Err(format!("Unknown argument: {}", arg));
            }
        }
    }

    Ok(CliOptions {
        mode: mode.unwrap_or(CliMode::Demo),
        seed,
        quiet,
    })
}

// ── Version & help ──────────────────────────────────────────────────────────

const LAZYGC_VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    println!("lazygc {} (cli)", LAZYGC_VERSION);
    println!("Lazy reference-counted heap demonstration driver");
}

fn print_help() {
    println!(
        "Usage: lazygc [options] [demo]
       lazygc [options] stress <iterations>

Modes:
  demo         Walk one region through alloc/write/read/share/free/collect
               (default when no mode is given)
  stress <n>   Run <n> alloc+free cycles and show the automatic sweep
               keeping the reclaimable backlog bounded

Options:
  -s <seed>    Seed the sweep-countdown generator for deterministic runs
  -q           Quiet: print only heap stats lines
  -v           Version number
  -h, --help   This help"
    );
}

// ── Modes ───────────────────────────────────────────────────────────────────

fn make_heap(opts: &CliOptions) -> Heap {
    match opts.seed {
        Some(seed) => Heap::with_seed(seed),
        None => Heap::new(),
    }
}

/// The canonical walk-through: one 16-byte region, written, read back,
/// shared, released in stages, swept.
fn run_demo(opts: &CliOptions) -> i32 {
    let mut heap = make_heap(opts);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let quiet = opts.quiet;

    macro_rules! say {
        ($($arg:tt)*) => {
            if !quiet {
                println!($($arg)*);
            }
        };
    }

    let Some(mut r) = heap.alloc(16) else {
        eprintln!("lazygc: allocation failed");
        return 1;
    };
    let wrote = heap.write(r, 0, b"hello\0");
    say!("wrote {} bytes", wrote);

    let mut buf = [0u8; 16];
    let read = heap.read(r, 0, &mut buf);
    say!(
        "read {} bytes: '{}'",
        read,
        String::from_utf8_lossy(&buf[..buf.iter().position(|&b| b == 0).unwrap_or(buf.len())])
    );

    // Share the region, then release the original handle.
    let Some(mut dup) = heap.clone_ref(r) else {
        eprintln!("lazygc: clone failed");
        return 1;
    };
    heap.free(&mut r);
    say!("freed the original handle; the duplicate keeps the region alive");
    let _ = heap.dump_stats(&mut out);

    heap.free(&mut dup);
    say!("freed the duplicate; region is reclaimable until the next sweep");
    let _ = heap.dump_stats(&mut out);

    heap.collect();
    say!("collected");
    let _ = heap.dump_stats(&mut out);
    let _ = out.flush();
    0
}

/// Alloc/free churn. Never calls collect() explicitly: the point is to
/// watch the countdown-triggered sweeps keep the backlog bounded.
fn run_stress(opts: &CliOptions, iterations: usize) -> i32 {
    let mut heap = make_heap(opts);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let report_every = (iterations / 10).max(1);
    for i in 0..iterations {
        let Some(mut r) = heap.alloc(64) else {
            eprintln!("lazygc: allocation failed at iteration {}", i);
            return 1;
        };
        heap.write(r, 0, &(i as u64).to_le_bytes());
        heap.free(&mut r);

        if (i + 1) % report_every == 0 {
            let _ = heap.dump_stats(&mut out);
        }
    }

    if !opts.quiet {
        println!(
            "{} iterations: {} automatic sweeps, {} regions reclaimed, {} bytes reclaimed",
            iterations, heap.sweep_runs, heap.regions_reclaimed, heap.bytes_reclaimed
        );
    }
    let _ = out.flush();
    0
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    let args: Vec<String> = env::args().collect();

    let opts = match parse_args(&args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("lazygc: {}", e);
            eprintln!("Try 'lazygc --help' for usage information.");
            process::exit(1);
        }
    };

    let exit_code = match opts.mode {
        CliMode::Version => {
            print_version();
            0
        }
        CliMode::Help => {
            print_help();
            0
        }
        CliMode::Demo => run_demo(&opts),
        CliMode::Stress(n) => run_stress(&opts, n),
    };

    process::exit(exit_code);
}

// ── Tests ───────────────────────────────────────────────────────────────────

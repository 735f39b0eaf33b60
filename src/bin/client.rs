use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use geoingest::protocol;
use geoingest::types::Record;

#[derive(Parser)]
#[command(about = "Load generator for the geoingest telemetry server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    addr: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Send one valid and one malformed line and check the replies (default)
    Smoke,
    /// Fire many requests, one connection per request
    Bench {
        /// Total number of requests
        #[arg(short = 'n', long, default_value_t = 5000)]
        requests: usize,
        /// Maximum requests in flight at once
        #[arg(short, long, default_value_t = 100)]
        concurrency: usize,
    },
    /// Sustained load over long-lived connections with latency percentiles
    Sustain {
        /// Number of concurrent connections
        #[arg(short, long, default_value_t = 8)]
        connections: usize,
        /// Warmup duration in seconds (discarded from report)
        #[arg(short = 'W', long, default_value_t = 3)]
        warmup: u64,
        /// Measurement duration in seconds
        #[arg(short, long, default_value_t = 10)]
        duration: u64,
        /// Send a malformed line every N requests (0 disables)
        #[arg(short, long, default_value_t = 0)]
        bad_every: usize,
    },
}

/// Deterministic record for request `i`; values stay inside valid
/// latitude, longitude, speed and heading ranges.
fn build_record(i: usize) -> Record {
    let lat = (i * 7919 % 18_000) as f64 / 100.0 - 90.0;
    let lon = (i * 104_729 % 36_000) as f64 / 100.0 - 180.0;
    let speed = (i * 31 % 1_200) as f64 / 10.0;
    let heading = (i * 17 % 3_600) as f64 / 10.0;
    Record::new(
        format!("DEVICE{}", i % 1000),
        format!("{lat:.4}"),
        format!("{lon:.4}"),
        format!("{speed:.1}"),
        format!("{heading:.1}"),
    )
}

fn request_line(i: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    protocol::encode_record(&mut buf, &build_record(i));
    buf
}

fn read_reply(reader: &mut BufReader<TcpStream>) -> Result<String> {
    let mut reply = String::new();
    let n = reader.read_line(&mut reply).context("failed to read reply")?;
    if n == 0 {
        bail!("connection closed before reply");
    }
    Ok(reply)
}

fn round_trip(stream: &mut TcpStream, reader: &mut BufReader<TcpStream>, line: &[u8]) -> Result<String> {
    stream.write_all(line).context("failed to send line")?;
    read_reply(reader)
}

fn connect(addr: &str) -> Result<(TcpStream, BufReader<TcpStream>)> {
    let stream = TcpStream::connect(addr).with_context(|| format!("failed to connect to {addr}"))?;
    stream.set_nodelay(true).context("failed to set TCP_NODELAY")?;
    let reader = BufReader::new(stream.try_clone().context("failed to clone stream")?);
    Ok((stream, reader))
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command.unwrap_or(Command::Smoke) {
        Command::Smoke => smoke_test(&args.addr),
        Command::Bench {
            requests,
            concurrency,
        } => bench_test(&args.addr, requests, concurrency),
        Command::Sustain {
            connections,
            warmup,
            duration,
            bad_every,
        } => sustain_test(&args.addr, connections, warmup, duration, bad_every),
    }
}

fn smoke_test(addr: &str) -> Result<()> {
    eprintln!("smoke test: connecting to {addr}");
    let (mut stream, mut reader) = connect(addr)?;

    let reply = round_trip(&mut stream, &mut reader, b"DEVICE1, 10.0000, 20.0000, 50.0, 90.0\n")?;
    if reply != "OK\n" {
        bail!("valid record: expected OK, got {reply:?}");
    }
    eprintln!("  valid record: OK");

    let reply = round_trip(&mut stream, &mut reader, b"DEVICE1, 10.0000\n")?;
    if !reply.starts_with("ERROR: ") {
        bail!("malformed record: expected ERROR, got {reply:?}");
    }
    eprintln!("  malformed record: {}", reply.trim_end());

    eprintln!("smoke test: PASSED");
    Ok(())
}

fn bench_test(addr: &str, total: usize, concurrency: usize) -> Result<()> {
    let concurrency = concurrency.clamp(1, total.max(1));
    eprintln!("bench: {total} requests, concurrency {concurrency}, one connection each → {addr}");

    let next = Arc::new(AtomicUsize::new(0));
    let successes = Arc::new(AtomicU64::new(0));
    let errors = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..concurrency)
        .map(|_| {
            let addr = addr.to_string();
            let next = Arc::clone(&next);
            let successes = Arc::clone(&successes);
            let errors = Arc::clone(&errors);
            std::thread::spawn(move || {
                loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    if i >= total {
                        break;
                    }
                    let outcome = connect(&addr)
                        .and_then(|(mut stream, mut reader)| round_trip(&mut stream, &mut reader, &request_line(i)));
                    match outcome {
                        Ok(reply) if reply == "OK\n" => {
                            successes.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(reply) => {
                            errors.fetch_add(1, Ordering::Relaxed);
                            eprintln!("unexpected reply: {}", reply.trim_end());
                        }
                        Err(err) => {
                            errors.fetch_add(1, Ordering::Relaxed);
                            eprintln!("request {i} failed: {err:#}");
                        }
                    }
                }
            })
        })
        .collect();

    for h in handles {
        if h.join().is_err() {
            eprintln!("bench worker panicked");
        }
    }

    let elapsed = start.elapsed();
    let ok = successes.load(Ordering::Relaxed);
    let failed = errors.load(Ordering::Relaxed);
    eprintln!(
        "bench: {} ok, {} errors in {:.2}s = {:.0} QPS",
        ok,
        failed,
        elapsed.as_secs_f64(),
        (ok + failed) as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}

/// How the server answered one sustained-load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyKind {
    Stored,
    Rejected,
    StoreFailed,
}

impl ReplyKind {
    fn classify(reply: &str) -> Self {
        if reply == "OK\n" {
            Self::Stored
        } else if reply.starts_with("ERROR: invalid data") {
            Self::Rejected
        } else {
            Self::StoreFailed
        }
    }
}

struct Sample {
    latency_ns: u64,
    kind: ReplyKind,
}

/// Replies seen over one reporting window. Latency is only kept for stored
/// records; errors are counted per kind.
#[derive(Default)]
struct Tally {
    stored_ns: Vec<u64>,
    rejected: u64,
    store_failed: u64,
}

impl Tally {
    fn record(&mut self, sample: Sample) {
        match sample.kind {
            ReplyKind::Stored => self.stored_ns.push(sample.latency_ns),
            ReplyKind::Rejected => self.rejected += 1,
            ReplyKind::StoreFailed => self.store_failed += 1,
        }
    }

    fn absorb(&mut self, other: Tally) {
        self.stored_ns.extend(other.stored_ns);
        self.rejected += other.rejected;
        self.store_failed += other.store_failed;
    }

    fn total(&self) -> u64 {
        self.stored_ns.len() as u64 + self.rejected + self.store_failed
    }

    fn error_pct(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            n => (self.rejected + self.store_failed) as f64 * 100.0 / n as f64,
        }
    }

    /// Stored-record latency percentile in microseconds. Sorts in place.
    fn stored_us(&mut self, p: f64) -> Option<f64> {
        if self.stored_ns.is_empty() {
            return None;
        }
        self.stored_ns.sort_unstable();
        let i = ((p / 100.0) * self.stored_ns.len() as f64) as usize;
        Some(self.stored_ns[i.min(self.stored_ns.len() - 1)] as f64 / 1_000.0)
    }
}

fn fmt_us(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |us| format!("{us:.1}µs"))
}

/// Fill `tally` until `deadline`. Returns false once every sender is gone.
fn collect_until(rx: &mpsc::Receiver<Sample>, tally: &mut Tally, deadline: Instant) -> bool {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        match rx.recv_timeout(deadline - now) {
            Ok(sample) => tally.record(sample),
            Err(RecvTimeoutError::Timeout) => return true,
            Err(RecvTimeoutError::Disconnected) => return false,
        }
    }
}

fn sustain_line(i: usize, bad_every: usize) -> Vec<u8> {
    if bad_every > 0 && i % bad_every == bad_every - 1 {
        format!("DEVICE{}, 0.0000\n", i % 1000).into_bytes()
    } else {
        request_line(i)
    }
}

fn sustain_test(
    addr: &str,
    num_connections: usize,
    warmup_secs: u64,
    duration_secs: u64,
    bad_every: usize,
) -> Result<()> {
    eprintln!(
        "sustain: {num_connections} connections, warmup={warmup_secs}s, duration={duration_secs}s → {addr}"
    );

    let (tx, rx) = mpsc::channel::<Sample>();
    for c in 0..num_connections {
        let addr = addr.to_string();
        let tx = tx.clone();
        std::thread::spawn(move || {
            let (mut stream, mut reader) = match connect(&addr) {
                Ok(pair) => pair,
                Err(err) => {
                    eprintln!("connection {c}: {err:#}");
                    return;
                }
            };
            let mut i = c;
            loop {
                let sent_at = Instant::now();
                let kind = match round_trip(&mut stream, &mut reader, &sustain_line(i, bad_every)) {
                    Ok(reply) => ReplyKind::classify(&reply),
                    Err(err) => {
                        eprintln!("connection {c}: {err:#}");
                        return;
                    }
                };
                let sample = Sample {
                    latency_ns: sent_at.elapsed().as_nanos() as u64,
                    kind,
                };
                if tx.send(sample).is_err() {
                    break;
                }
                i += num_connections;
            }
        });
    }
    drop(tx);

    if warmup_secs > 0 {
        eprintln!("warming up ({warmup_secs}s)");
        let mut discarded = Tally::default();
        if !collect_until(&rx, &mut discarded, Instant::now() + Duration::from_secs(warmup_secs)) {
            bail!("all connections died during warmup, is the server running?");
        }
    }

    eprintln!(
        "{:>8}  {:>10}  {:>10}  {:>8}  {:>8}  {:>6}",
        "qps", "ok p50", "ok p99", "rejected", "failed", "err%"
    );

    let measure_start = Instant::now();
    let measure_end = measure_start + Duration::from_secs(duration_secs);
    let mut overall = Tally::default();
    let mut alive = true;
    while alive && Instant::now() < measure_end {
        let window_start = Instant::now();
        let mut window = Tally::default();
        alive = collect_until(&rx, &mut window, (window_start + Duration::from_secs(1)).min(measure_end));
        if !alive {
            eprintln!("error: all connections died, is the server running?");
        }
        if window.total() > 0 {
            eprintln!(
                "{:>8.0}  {:>10}  {:>10}  {:>8}  {:>8}  {:>5.1}%",
                window.total() as f64 / window_start.elapsed().as_secs_f64(),
                fmt_us(window.stored_us(50.0)),
                fmt_us(window.stored_us(99.0)),
                window.rejected,
                window.store_failed,
                window.error_pct(),
            );
        }
        overall.absorb(window);
    }

    if overall.total() == 0 {
        bail!("no replies collected");
    }
    let elapsed = measure_start.elapsed();
    eprintln!();
    eprintln!("── summary ({:.1}s, {} requests) ──", elapsed.as_secs_f64(), overall.total());
    eprintln!("  qps          {:.0}", overall.total() as f64 / elapsed.as_secs_f64());
    eprintln!("  stored       {}", overall.stored_ns.len());
    eprintln!("  rejected     {}", overall.rejected);
    eprintln!("  store failed {}", overall.store_failed);
    eprintln!("  error rate   {:.2}%", overall.error_pct());
    eprintln!("  ok p50       {}", fmt_us(overall.stored_us(50.0)));
    eprintln!("  ok p95       {}", fmt_us(overall.stored_us(95.0)));
    eprintln!("  ok p99       {}", fmt_us(overall.stored_us(99.0)));
    eprintln!("  ok max       {}", fmt_us(overall.stored_us(100.0)));
    Ok(())
}

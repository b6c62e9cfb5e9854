#![forbid(unsafe_code)]

//! Seeded multi-threaded stress run against one shared event.
//!
//! Each worker draws weighted connect / disconnect / trigger operations from
//! its own xorshift stream. Handles a worker still holds when it finishes are
//! dropped, which leaves their subscriptions connected, so the final live
//! count must equal connects minus disconnects.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use signet_core::{Event, EventConfig, Handle};
use tracing::{debug, info};

use crate::config::{HarnessError, StressConfig};

/// Outcome of one [`run_stress`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressReport {
    /// Identifier for log correlation; stable in deterministic mode.
    pub run_id: String,
    pub seed: u64,
    pub threads: usize,
    pub connects: u64,
    pub disconnects: u64,
    pub triggers: u64,
    /// Connects minus disconnects.
    pub expected_live: usize,
    /// `Event::len()` after all workers joined.
    pub observed_live: usize,
    /// Total callback invocations across all triggers.
    pub invocations: u64,
    /// Records the event allocated over the run.
    pub allocated: usize,
    pub elapsed_ms: u64,
}

impl StressReport {
    /// True when the observed live count matches the operation balance.
    pub fn is_consistent(&self) -> bool {
        self.expected_live == self.observed_live
    }

    /// Render as a single-line JSON object.
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "run_id": self.run_id,
            "seed": self.seed,
            "threads": self.threads,
            "connects": self.connects,
            "disconnects": self.disconnects,
            "triggers": self.triggers,
            "expected_live": self.expected_live,
            "observed_live": self.observed_live,
            "invocations": self.invocations,
            "allocated": self.allocated,
            "elapsed_ms": self.elapsed_ms,
            "consistent": self.is_consistent(),
        })
        .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Connect,
    Disconnect,
    Trigger,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    connects: u64,
    disconnects: u64,
    triggers: u64,
}

impl Tally {
    fn merge(self, other: Tally) -> Tally {
        Tally {
            connects: self.connects + other.connects,
            disconnects: self.disconnects + other.disconnects,
            triggers: self.triggers + other.triggers,
        }
    }
}

/// xorshift64* generator.
#[derive(Debug, Clone)]
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }
}

fn worker_seed(base: u64, worker: usize) -> u64 {
    base ^ (worker as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn pick(rng: &mut XorShift, config: &StressConfig) -> Op {
    let roll = rng.below(config.total_weight());
    let connect = u64::from(config.connect_weight);
    let disconnect = connect + u64::from(config.disconnect_weight);
    if roll < connect {
        Op::Connect
    } else if roll < disconnect {
        Op::Disconnect
    } else {
        Op::Trigger
    }
}

fn run_id(config: &StressConfig) -> String {
    if config.deterministic {
        format!("stress_seed{}", config.seed)
    } else {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        format!("stress_{}_{secs}", std::process::id())
    }
}

fn worker(
    event: &Event<u64>,
    config: &StressConfig,
    index: usize,
    invocations: &Arc<AtomicU64>,
) -> Tally {
    let mut rng = XorShift::new(worker_seed(config.seed, index));
    let mut held: Vec<Handle> = Vec::new();
    let mut tally = Tally::default();

    for _ in 0..config.ops_per_thread {
        match pick(&mut rng, config) {
            Op::Connect => {
                let invocations = Arc::clone(invocations);
                held.push(event.connect(move |_| {
                    invocations.fetch_add(1, Ordering::Relaxed);
                }));
                tally.connects += 1;
            }
            Op::Disconnect if !held.is_empty() => {
                let slot = rng.below(held.len() as u64) as usize;
                held.swap_remove(slot).disconnect();
                tally.disconnects += 1;
            }
            Op::Disconnect | Op::Trigger => {
                event.trigger(&(index as u64));
                tally.triggers += 1;
            }
        }
    }

    tally
}

/// Run `config.threads` workers against one shared `Event<u64>`.
pub fn run_stress(config: &StressConfig) -> Result<StressReport, HarnessError> {
    config.validate()?;

    let run_id = run_id(config);
    info!(
        run_id = %run_id,
        seed = config.seed,
        threads = config.threads,
        ops_per_thread = config.ops_per_thread,
        "stress run start"
    );

    let event = Event::<u64>::with_config(EventConfig::default().with_label("stress"));
    let invocations = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let tally = thread::scope(|scope| {
        let workers: Vec<_> = (0..config.threads)
            .map(|index| {
                let event = &event;
                let invocations = &invocations;
                scope.spawn(move || worker(event, config, index, invocations))
            })
            .collect();
        workers
            .into_iter()
            .map(|w| match w.join() {
                Ok(tally) => tally,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .fold(Tally::default(), Tally::merge)
    });

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let stats = event.stats();
    debug!(
        live = stats.live,
        inactive = stats.inactive,
        free = stats.free,
        allocated = stats.allocated,
        "stress run registry stats"
    );

    let report = StressReport {
        run_id,
        seed: config.seed,
        threads: config.threads,
        connects: tally.connects,
        disconnects: tally.disconnects,
        triggers: tally.triggers,
        expected_live: (tally.connects - tally.disconnects) as usize,
        observed_live: event.len(),
        invocations: invocations.load(Ordering::Relaxed),
        allocated: stats.allocated,
        elapsed_ms,
    };

    info!(
        run_id = %report.run_id,
        expected_live = report.expected_live,
        observed_live = report.observed_live,
        invocations = report.invocations,
        elapsed_ms,
        "stress run finish"
    );

    Ok(report)
}

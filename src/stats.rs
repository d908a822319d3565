//! Request statistics.
//!
//! [`Stats`] is the live aggregate the [`Metrics`](crate::middleware::Metrics)
//! layer writes into; [`StatsSnapshot`] is the detached copy served at
//! `GET /metrics`. One `Stats` is created per [`App`](crate::App) and shared by
//! `Arc`; nothing here is global.
//!
//! Every [`record`](Stats::record) bumps the total, exactly one status count
//! and exactly one latency bucket under a single write lock, so the sum of
//! status counts and the sum of buckets always equal `total_requests`.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Distinct paths tracked before new ones are ignored.
pub const MAX_TRACKED_PATHS: usize = 1000;

/// Upper bounds of the latency buckets; the last bucket is unbounded.
const BUCKET_BOUNDS: [Duration; 4] = [
    Duration::from_millis(10),
    Duration::from_millis(100),
    Duration::from_millis(500),
    Duration::from_secs(1),
];

const BUCKET_LABELS: [&str; 5] = ["<10ms", "<100ms", "<500ms", "<1s", ">1s"];

fn bucket_index(duration: Duration) -> usize {
    BUCKET_BOUNDS
        .iter()
        .position(|bound| duration < *bound)
        .unwrap_or(BUCKET_BOUNDS.len())
}

#[derive(Default)]
struct Counters {
    total_requests: u64,
    total_errors: u64,
    last_request: Option<DateTime<Utc>>,
    status_counts: HashMap<u16, u64>,
    path_counts: HashMap<String, u64>,
    buckets: [u64; 5],
    total_duration: Duration,
}

/// Live, thread-safe request statistics.
pub struct Stats {
    started: Instant,
    start_time: DateTime<Utc>,
    counters: RwLock<Counters>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            start_time: Utc::now(),
            counters: RwLock::new(Counters::default()),
        }
    }

    /// Accounts for one finished request.
    ///
    /// Statuses of 400 and above count as errors. Once
    /// [`MAX_TRACKED_PATHS`] distinct paths are known, unseen paths are not
    /// added; known paths keep counting.
    pub fn record(&self, status: u16, duration: Duration, path: &str) {
        let now = Utc::now();
        let mut guard = self.counters.write();
        let c = &mut *guard;

        c.total_requests += 1;
        if status >= 400 {
            c.total_errors += 1;
        }
        *c.status_counts.entry(status).or_default() += 1;
        c.last_request = Some(now);

        if let Some(count) = c.path_counts.get_mut(path) {
            *count += 1;
        } else if c.path_counts.len() < MAX_TRACKED_PATHS {
            c.path_counts.insert(path.to_owned(), 1);
        }

        c.total_duration += duration;
        c.buckets[bucket_index(duration)] += 1;
    }

    /// Copies the aggregate under one read lock and derives uptime, mean
    /// latency and process telemetry.
    pub fn snapshot(&self) -> StatsSnapshot {
        let (mut snap, total_duration) = {
            let c = self.counters.read();
            let snap = StatsSnapshot {
                total_requests: c.total_requests,
                total_errors: c.total_errors,
                start_time: self.start_time,
                uptime: Duration::ZERO,
                last_request: c.last_request,
                status_counts: c.status_counts.iter().map(|(k, v)| (*k, *v)).collect(),
                latency: LatencySnapshot {
                    avg_duration: Duration::ZERO,
                    buckets: LatencyBuckets(c.buckets),
                },
                system: SystemSnapshot::default(),
                path_stats: c.path_counts.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            };
            (snap, c.total_duration)
        };

        snap.uptime = self.started.elapsed();
        snap.latency.avg_duration = mean(total_duration, snap.total_requests);
        snap.system = SystemSnapshot::capture();
        snap
    }
}

impl Default for Stats {
    fn default() -> Self { Self::new() }
}

fn mean(total: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    let nanos = total.as_nanos() / u128::from(count);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Point-in-time copy of [`Stats`], detached from the live aggregate.
#[derive(Clone, Debug, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub start_time: DateTime<Utc>,
    #[serde(serialize_with = "human_duration")]
    pub uptime: Duration,
    pub last_request: Option<DateTime<Utc>>,
    pub status_counts: BTreeMap<u16, u64>,
    pub latency: LatencySnapshot,
    pub system: SystemSnapshot,
    pub path_stats: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LatencySnapshot {
    #[serde(serialize_with = "human_duration")]
    pub avg_duration: Duration,
    pub buckets: LatencyBuckets,
}

/// Bucket counts in ascending order, serialized as `{"<10ms": n, ...}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LatencyBuckets(pub [u64; 5]);

impl LatencyBuckets {
    pub fn get(&self, label: &str) -> Option<u64> {
        let idx = BUCKET_LABELS.iter().position(|l| *l == label)?;
        Some(self.0[idx])
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }
}

impl Serialize for LatencyBuckets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(BUCKET_LABELS.len()))?;
        for (label, count) in BUCKET_LABELS.iter().zip(self.0) {
            map.serialize_entry(label, &count)?;
        }
        map.end()
    }
}

/// Live process telemetry, read at snapshot time.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SystemSnapshot {
    /// Tasks alive on the current tokio runtime.
    pub goroutines: usize,
    /// Runtime worker threads.
    pub workers: usize,
    /// Resident memory of the process.
    pub heap_alloc: String,
    /// Virtual memory of the process.
    pub stack_in_use: String,
}

impl SystemSnapshot {
    fn capture() -> Self {
        let (goroutines, workers) = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let metrics = handle.metrics();
                (metrics.num_alive_tasks(), metrics.num_workers())
            }
            Err(_) => (0, 0),
        };
        let (resident, virt) = process_memory().unwrap_or_default();

        Self {
            goroutines,
            workers,
            heap_alloc: byte_count_decimal(resident),
            stack_in_use: byte_count_decimal(virt),
        }
    }
}

fn process_memory() -> Option<(u64, u64)> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = sysinfo::System::new();
    if !system.refresh_process(pid) {
        return None;
    }
    let process = system.process(pid)?;
    Some((process.memory(), process.virtual_memory()))
}

/// `999` → `"999 B"`, `1234` → `"1.2 kB"`, `5_300_000` → `"5.3 MB"`.
pub(crate) fn byte_count_decimal(bytes: u64) -> String {
    const UNIT: u64 = 1000;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < 5 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ["k", "M", "G", "T", "P", "E"][exp];
    format!("{:.1} {prefix}B", bytes as f64 / div as f64)
}

/// Serializes a duration the way `Debug` prints it: `1.5s`, `12.3ms`, `0ns`.
fn human_duration<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    // Whole microseconds keep the string short.
    let d = Duration::from_micros(u64::try_from(d.as_micros()).unwrap_or(u64::MAX));
    serializer.collect_str(&format_args!("{d:?}"))
}

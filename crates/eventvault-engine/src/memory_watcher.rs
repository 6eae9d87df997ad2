//! Memory-pressure eviction
//!
//! Samples process memory on a fixed interval and, above the ceiling, drops a
//! fraction of the cached streams in global LRU order. Dropped entries are
//! freed once their last reader or writer releases them.

use std::sync::Arc;
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::stream_cache::StreamCache;

/// Source of the process's resident memory
pub trait MemoryProbe: Send {
    /// Resident bytes, or `None` when unavailable
    fn resident_bytes(&mut self) -> Option<u64>;
}

/// Reads the current process's resident set via sysinfo (single-PID refresh)
pub struct SysinfoProbe {
    system: System,
    pid: Pid,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(std::process::id()),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn resident_bytes(&mut self) -> Option<u64> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        self.system.process(self.pid).map(|process| process.memory())
    }
}

pub struct MemoryWatcher {
    cache: Arc<StreamCache>,
    probe: Box<dyn MemoryProbe>,
    max_bytes: u64,
    interval: Duration,
    eviction_fraction: f64,
}

impl MemoryWatcher {
    pub fn new(
        cache: Arc<StreamCache>,
        probe: Box<dyn MemoryProbe>,
        max_bytes: u64,
        interval: Duration,
        eviction_fraction: f64,
    ) -> Self {
        Self {
            cache,
            probe,
            max_bytes,
            interval,
            eviction_fraction,
        }
    }

    /// Spawn the watcher as a background task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            max_bytes = self.max_bytes,
            interval_ms = self.interval.as_millis() as u64,
            "Memory watcher started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut watcher = self;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Memory watcher shutting down");
                    break;
                }
                _ = interval.tick() => {
                    watcher = match tokio::task::spawn_blocking(move || {
                        watcher.check();
                        watcher
                    })
                    .await
                    {
                        Ok(watcher) => watcher,
                        Err(e) => {
                            error!(error = %e, "Memory check panicked, watcher stopped");
                            break;
                        }
                    };
                }
            }
        }
    }

    /// Take one sample, evicting if over the ceiling
    ///
    /// Probes may read `/proc` synchronously, so the background loop runs
    /// this on the blocking pool. Returns the number of streams evicted.
    pub fn check(&mut self) -> usize {
        let Some(resident) = self.probe.resident_bytes() else {
            debug!("Process memory unavailable");
            return 0;
        };
        if resident <= self.max_bytes {
            return 0;
        }

        let victims = victim_count(self.cache.len(), self.eviction_fraction);
        let dropped = self.cache.drop_oldest(victims);
        let stats = self.cache.stats();
        warn!(
            resident_bytes = resident,
            max_bytes = self.max_bytes,
            dropped,
            remaining = stats.len,
            total_evictions = stats.evictions,
            "Memory pressure, evicted cached streams"
        );
        dropped
    }
}

/// Streams to evict: the configured share of `len`, rounded up
fn victim_count(len: usize, fraction: f64) -> usize {
    ((len as f64) * fraction).ceil().min(len as f64) as usize
}

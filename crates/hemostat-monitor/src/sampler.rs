use hemostat_docker::{CpuCounters, RawStats};
use hemostat_common::types::ResourceMetrics;
use std::collections::{HashMap, HashSet};

/// Per-container cache of the previous cumulative CPU counters.
///
/// CPU percent is a delta over two consecutive polls, so the first
/// observation of a container yields no value; a container that
/// disappears and reappears starts over.
#[derive(Default)]
pub struct SampleTracker {
    prev: HashMap<String, CpuCounters>,
}

impl SampleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive CPU percent from the previous and current counters using
    /// `(Δcpu_total / Δsystem_cpu) × online_cpus × 100`, then remember
    /// the current counters. Returns `None` on the first observation or
    /// when the deltas are unusable (counter reset, frozen system
    /// clock); values above 100 are legitimate on multi-core hosts.
    pub fn cpu_percent(&mut self, container: &str, current: CpuCounters) -> Option<f64> {
        let previous = self.prev.insert(container.to_string(), current);
        let previous = previous?;

        let cpu_delta = current.total_usage.checked_sub(previous.total_usage)?;
        let system_delta = current.system_usage.checked_sub(previous.system_usage)?;
        if system_delta == 0 {
            return None;
        }

        let cpus = current.online_cpus.max(1) as f64;
        Some((cpu_delta as f64 / system_delta as f64) * cpus * 100.0)
    }

    /// Whether the container has been observed at least twice, i.e.
    /// whether a CPU reading is possible this cycle.
    pub fn has_baseline(&self, container: &str) -> bool {
        self.prev.contains_key(container)
    }

    /// Forget containers that are no longer in the fleet.
    pub fn retain(&mut self, live: &HashSet<String>) {
        self.prev.retain(|name, _| live.contains(name));
    }
}

/// Memory percent with the page cache excluded, matching what
/// `docker stats` reports: `(usage − inactive_file) / limit × 100`,
/// clamped to [0, 100].
pub fn memory_percent(usage: u64, inactive_file: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    let actual = usage.saturating_sub(inactive_file) as f64;
    (actual / limit as f64 * 100.0).clamp(0.0, 100.0)
}

/// Assemble the gauge/counter block from one raw snapshot plus the
/// derived CPU value.
pub fn derive_metrics(stats: &RawStats, cpu_percent: Option<f64>) -> ResourceMetrics {
    ResourceMetrics {
        cpu_percent,
        memory_percent: memory_percent(
            stats.memory_usage,
            stats.memory_inactive_file,
            stats.memory_limit,
        ),
        memory_bytes: stats.memory_usage,
        memory_limit: stats.memory_limit,
        net_rx_bytes: stats.net_rx_bytes,
        net_tx_bytes: stats.net_tx_bytes,
        blkio_read_bytes: stats.blkio_read_bytes,
        blkio_write_bytes: stats.blkio_write_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(total: u64, system: u64, cpus: u32) -> CpuCounters {
        CpuCounters {
            total_usage: total,
            system_usage: system,
            online_cpus: cpus,
        }
    }

    #[test]
    fn first_observation_yields_no_cpu() {
        let mut tracker = SampleTracker::new();
        assert_eq!(tracker.cpu_percent("svc-a", counters(100, 1000, 4)), None);
        assert!(tracker.has_baseline("svc-a"));
    }

    #[test]
    fn second_observation_applies_the_formula() {
        let mut tracker = SampleTracker::new();
        tracker.cpu_percent("svc-a", counters(100, 1000, 4));
        // Δcpu=50, Δsystem=200, 4 cpus → 100%
        let cpu = tracker.cpu_percent("svc-a", counters(150, 1200, 4)).unwrap();
        assert!((cpu - 100.0).abs() < 1e-9);
    }

    #[test]
    fn counter_reset_yields_none_and_rebaselines() {
        let mut tracker = SampleTracker::new();
        tracker.cpu_percent("svc-a", counters(500, 5000, 2));
        // Counters went backwards (container restarted)
        assert_eq!(tracker.cpu_percent("svc-a", counters(10, 100, 2)), None);
        // Next delta computes from the reset baseline
        let cpu = tracker.cpu_percent("svc-a", counters(20, 300, 2)).unwrap();
        assert!(cpu > 0.0);
    }

    #[test]
    fn disappeared_container_starts_over() {
        let mut tracker = SampleTracker::new();
        tracker.cpu_percent("svc-a", counters(100, 1000, 1));
        tracker.retain(&HashSet::new());
        assert!(!tracker.has_baseline("svc-a"));
        assert_eq!(tracker.cpu_percent("svc-a", counters(200, 2000, 1)), None);
    }

    #[test]
    fn zero_system_delta_yields_none() {
        let mut tracker = SampleTracker::new();
        tracker.cpu_percent("svc-a", counters(100, 1000, 1));
        assert_eq!(tracker.cpu_percent("svc-a", counters(150, 1000, 1)), None);
    }

    #[test]
    fn memory_percent_excludes_cache_and_clamps() {
        // 800 MiB used, 300 MiB inactive file, 1 GiB limit → ~48.8%
        let pct = memory_percent(800 << 20, 300 << 20, 1 << 30);
        assert!((pct - 48.828125).abs() < 1e-6);

        assert_eq!(memory_percent(100, 0, 0), 0.0);
        assert_eq!(memory_percent(u64::MAX, 0, 1), 100.0);
        // Cache larger than usage saturates at zero
        assert_eq!(memory_percent(100, 200, 1000), 0.0);
    }
}

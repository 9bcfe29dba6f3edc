//! Per-cycle counters and their export to the metrics sink.

use std::collections::BTreeMap;

use metrics::{counter, gauge, histogram};

/// Counters for one chain (or the whole cycle) within a refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshCounters {
    /// Wallets a refresh was attempted for.
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
    /// Wallets passed over because their chain was cooling down.
    pub skipped: u64,
    pub new_items: u64,
    pub duplicate_items: u64,
    pub duration_ms: u64,
}

impl RefreshCounters {
    fn add(&mut self, other: &RefreshCounters) {
        self.processed += other.processed;
        self.success += other.success;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.new_items += other.new_items;
        self.duplicate_items += other.duplicate_items;
        self.duration_ms += other.duration_ms;
    }
}

/// Outcome of a single completed refresh cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub wallets_listed: usize,
    pub per_chain: BTreeMap<String, RefreshCounters>,
    pub duration_ms: u64,
    /// Non-expired entries in the hot cache once the cycle finished.
    pub wallets_in_cache: usize,
    /// Mean cached items per wallet, by chain.
    pub avg_items_per_chain: BTreeMap<String, f64>,
}

impl CycleReport {
    pub fn totals(&self) -> RefreshCounters {
        let mut totals = RefreshCounters::default();
        for counters in self.per_chain.values() {
            totals.add(counters);
        }
        totals
    }

    fn chain(&mut self, chain_key: &str) -> &mut RefreshCounters {
        self.per_chain.entry(chain_key.to_string()).or_default()
    }

    pub(crate) fn record_success(
        &mut self,
        chain_key: &str,
        new_items: u64,
        duplicate_items: u64,
        duration_ms: u64,
    ) {
        let c = self.chain(chain_key);
        c.processed += 1;
        c.success += 1;
        c.new_items += new_items;
        c.duplicate_items += duplicate_items;
        c.duration_ms += duration_ms;
    }

    pub(crate) fn record_failure(&mut self, chain_key: &str, duration_ms: u64) {
        let c = self.chain(chain_key);
        c.processed += 1;
        c.failed += 1;
        c.duration_ms += duration_ms;
    }

    pub(crate) fn record_skip(&mut self, chain_key: &str) {
        self.chain(chain_key).skipped += 1;
    }

    /// Pushes the cycle aggregates to the `metrics` recorder, if one is installed.
    pub(crate) fn emit_metrics(&self) {
        let totals = self.totals();
        counter!("hot_cache_refresh_total", "status" => "success").increment(totals.success);
        counter!("hot_cache_refresh_total", "status" => "failed").increment(totals.failed);
        counter!("hot_cache_refresh_total", "status" => "skipped").increment(totals.skipped);
        counter!("hot_cache_new_items_total").increment(totals.new_items);
        counter!("hot_cache_duplicate_items_total").increment(totals.duplicate_items);
        gauge!("hot_cache_wallets").set(self.wallets_in_cache as f64);
        for (chain, avg) in &self.avg_items_per_chain {
            gauge!("hot_cache_avg_items", "chain" => chain.clone()).set(*avg);
        }
        histogram!("hot_cache_cycle_duration_ms").record(self.duration_ms as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_every_chain() {
        let mut report = CycleReport::default();
        report.record_success("eth", 3, 1, 10);
        report.record_failure("eth", 5);
        report.record_success("sol", 0, 4, 7);
        report.record_skip("tron");

        let totals = report.totals();
        assert_eq!(totals.processed, 3);
        assert_eq!(totals.success, 2);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.skipped, 1);
        assert_eq!(totals.new_items, 3);
        assert_eq!(totals.duplicate_items, 5);
        assert_eq!(totals.duration_ms, 22);
        assert_eq!(report.per_chain["tron"].processed, 0);
    }

    #[test]
    fn emitting_without_recorder_is_a_noop() {
        let mut report = CycleReport::default();
        report.record_success("eth", 1, 0, 1);
        report.avg_items_per_chain.insert("eth".into(), 1.0);
        report.emit_metrics();
    }
}

//! Metrics sink
//!
//! Process-wide counters for the DNS path, rendered as Prometheus text for
//! the `/metrics` endpoint. Concurrency-safe by construction; resolvers hold
//! this behind an `Arc` and bump counters without coordination.

use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_NAMESPACE: &str = "landns";

#[derive(Debug)]
pub struct Metrics {
    namespace: String,
    queries: AtomicU64,
    errors: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    upstream_queries: AtomicU64,
}

impl Metrics {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            queries: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            upstream_queries: AtomicU64::new(0),
        }
    }

    pub fn query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upstream_query(&self) {
        self.upstream_queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Prometheus text exposition of every counter.
    pub fn render(&self) -> String {
        let counters = [
            ("queries_total", "Total DNS queries received.", &self.queries),
            ("errors_total", "Total resolver errors.", &self.errors),
            ("cache_hit_total", "Total cache hits.", &self.cache_hits),
            ("cache_miss_total", "Total cache misses.", &self.cache_misses),
            (
                "upstream_queries_total",
                "Total queries answered by an upstream server.",
                &self.upstream_queries,
            ),
        ];

        let mut out = String::new();
        for (name, help, counter) in counters {
            let full = format!("{}_{}", self.namespace, name);
            out.push_str(&format!("# HELP {} {}\n", full, help));
            out.push_str(&format!("# TYPE {} counter\n", full));
            out.push_str(&format!("{} {}\n", full, counter.load(Ordering::Relaxed)));
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::default();
        metrics.query();
        metrics.query();
        metrics.cache_hit();
        metrics.error();

        let text = metrics.render();
        assert!(text.contains("landns_queries_total 2"), "{}", text);
        assert!(text.contains("landns_cache_hit_total 1"), "{}", text);
        assert!(text.contains("landns_errors_total 1"), "{}", text);
        assert!(text.contains("landns_cache_miss_total 0"), "{}", text);
    }

    #[test]
    fn test_namespace_prefixes_every_metric() {
        let metrics = Metrics::new("homelab");
        let text = metrics.render();
        for line in text.lines() {
            if !line.starts_with('#') {
                assert!(line.starts_with("homelab_"), "{}", line);
            }
        }
    }
}

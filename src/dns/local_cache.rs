//! Local cache resolver
//!
//! Per-process cache over an arbitrary upstream resolver, keyed by
//! (qtype, name). Hits replay the stored records with their TTL decayed by
//! the age of the entry and mark the reply non-authoritative; misses
//! delegate to the upstream through a hook that captures the stream for the
//! cache. A sweeper task wakes at the earliest upcoming expiry (capped at
//! ten seconds) or on a nudge from a fresh fill.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dns::message::{Request, ResponseSink, SinkHook};
use crate::dns::record::{Domain, Record, RecordType};
use crate::dns::resolver::Resolver;
use crate::error::Result;
use crate::metrics::Metrics;

const SWEEP_FLOOR: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct CacheKey {
    qtype: RecordType,
    name: Domain,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    record: Record,
    created: Instant,
    expire: Instant,
}

type Entries = HashMap<CacheKey, Vec<CacheEntry>>;

pub struct LocalCache {
    upstream: Arc<dyn Resolver>,
    entries: Arc<Mutex<Entries>>,
    nudge: mpsc::Sender<()>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<Metrics>,
}

impl LocalCache {
    pub fn new(upstream: Arc<dyn Resolver>, metrics: Arc<Metrics>) -> Self {
        let entries = Arc::new(Mutex::new(Entries::new()));
        let (nudge, nudge_rx) = mpsc::channel(100);
        let shutdown = CancellationToken::new();
        let sweeper = Self::spawn_sweeper(entries.clone(), nudge_rx, shutdown.clone());

        Self {
            upstream,
            entries,
            nudge,
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
            metrics,
        }
    }

    fn spawn_sweeper(
        entries: Arc<Mutex<Entries>>,
        mut nudge: mpsc::Receiver<()>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let next = Self::sweep(&entries).await;
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(next) => {}
                    _ = nudge.recv() => {}
                }
            }
        })
    }

    /// Drop every key with any expired entry; returns how long the sweeper
    /// may sleep until the next expiry is due.
    async fn sweep(entries: &Mutex<Entries>) -> Duration {
        let now = Instant::now();
        let mut next = SWEEP_FLOOR;

        let mut map = entries.lock().await;
        map.retain(|_, list| {
            for entry in list.iter() {
                if entry.expire <= now {
                    return false;
                }
                let delta = entry.expire - now;
                if delta < next {
                    next = delta;
                }
            }
            true
        });

        next
    }

    async fn resolve_from_upstream(
        &self,
        entries: &mut Entries,
        key: CacheKey,
        sink: &mut dyn ResponseSink,
        req: &Request,
    ) -> Result<()> {
        let mut filled: Vec<Record> = Vec::new();
        {
            let mut hook = SinkHook::new(&mut *sink, |record: &Record| {
                // TTL 0 means "do not cache"; those pass through every time
                if record.ttl() > 0 {
                    filled.push(record.clone());
                }
            });
            self.upstream.resolve(&mut hook, req).await?;
        }

        // committed only on upstream success, so a failed fill leaves no
        // partial entries behind
        if !filled.is_empty() {
            let now = Instant::now();
            let list = filled
                .into_iter()
                .map(|record| {
                    let ttl = u64::from(record.ttl());
                    CacheEntry {
                        record,
                        created: now,
                        expire: now + Duration::from_secs(ttl),
                    }
                })
                .collect();
            entries.insert(key, list);
            let _ = self.nudge.try_send(());
        }

        Ok(())
    }

    fn resolve_from_cache(
        cached: &[CacheEntry],
        now: Instant,
        sink: &mut dyn ResponseSink,
    ) -> Result<()> {
        sink.set_no_authoritative();
        for entry in cached {
            let mut record = entry.record.clone();
            let elapsed = now.duration_since(entry.created).as_secs() as u32;
            record.set_ttl(record.ttl().saturating_sub(elapsed));
            sink.add(record)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Resolver for LocalCache {
    async fn resolve(&self, sink: &mut dyn ResponseSink, req: &Request) -> Result<()> {
        let key = CacheKey {
            qtype: req.qtype,
            name: req.name.clone(),
        };

        // the map lock is held across the upstream fill; concurrent queries
        // for the same key fill once
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if let Some(cached) = entries.get(&key) {
            if cached.iter().all(|entry| entry.expire > now) {
                self.metrics.cache_hit();
                return Self::resolve_from_cache(cached, now, sink);
            }
        }

        entries.remove(&key);
        self.metrics.cache_miss();
        self.resolve_from_upstream(&mut entries, key, sink, req).await
    }

    fn recursion_available(&self) -> bool {
        self.upstream.recursion_available()
    }

    async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        if let Some(handle) = self.sweeper.lock().await.take() {
            let _ = handle.await;
        }
        self.upstream.close().await
    }
}

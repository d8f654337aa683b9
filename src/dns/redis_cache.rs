//! Redis cache resolver
//!
//! Same contract as the local cache, backed by a Redis list per
//! (qtype, name) key so several servers can share one cache. Each member
//! carries its own absolute expiry next to the record text; the key's Redis
//! TTL is the minimum member TTL, set in the same MULTI/EXEC transaction as
//! the fill. Members whose expiry already passed are skipped on read, since
//! the natural Redis expiry leaves race windows.

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::dns::message::{Request, ResponseSink, SinkHook};
use crate::dns::record::Record;
use crate::dns::resolver::Resolver;
use crate::error::{Error, Result};
use crate::metrics::Metrics;

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn cache_key(req: &Request) -> String {
    format!("{}:{}", req.qtype, req.name)
}

fn encode_entry(record: &Record, expire: i64) -> String {
    format!("{} {}", expire, record)
}

fn decode_entry(member: &str) -> Result<(i64, Record)> {
    let (expire, text) = member
        .split_once(' ')
        .ok_or_else(|| Error::Internal(format!("malformed cache entry: \"{}\"", member)))?;
    let expire = expire
        .parse()
        .map_err(|_| Error::Internal(format!("malformed cache entry: \"{}\"", member)))?;
    Ok((expire, text.parse()?))
}

pub struct RedisCache {
    upstream: Arc<dyn Resolver>,
    conn: ConnectionManager,
    metrics: Arc<Metrics>,
}

impl RedisCache {
    /// Connect to the Redis server; an unreachable server is a startup
    /// failure, not something to retry at query time.
    pub async fn connect(
        addr: &str,
        database: i64,
        password: &str,
        upstream: Arc<dyn Resolver>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let url = if password.is_empty() {
            format!("redis://{}/{}", addr, database)
        } else {
            format!("redis://:{}@{}/{}", password, addr, database)
        };

        let client = redis::Client::open(url)
            .map_err(|e| Error::external("invalid Redis address", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::external("failed to connect to Redis server", e))?;

        Ok(Self {
            upstream,
            conn,
            metrics,
        })
    }

    async fn resolve_from_upstream(
        &self,
        sink: &mut dyn ResponseSink,
        req: &Request,
        key: &str,
    ) -> Result<()> {
        let mut filled: Vec<Record> = Vec::new();
        let mut min_ttl = u32::MAX;
        {
            let mut hook = SinkHook::new(&mut *sink, |record: &Record| {
                if record.ttl() < min_ttl {
                    min_ttl = record.ttl();
                }
                filled.push(record.clone());
            });
            // an upstream error discards the fill; nothing reaches Redis
            self.upstream.resolve(&mut hook, req).await?;
        }

        if filled.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        if min_ttl == 0 {
            // a zero-TTL member must not pin the key; delete instead of set
            let _: () = conn.del(key).await?;
            return Ok(());
        }

        let now = unix_now();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for record in &filled {
            pipe.rpush(key, encode_entry(record, now + i64::from(record.ttl())));
        }
        pipe.expire(key, i64::from(min_ttl));
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(())
    }

    fn resolve_from_cache(sink: &mut dyn ResponseSink, members: &[String]) -> Result<()> {
        let now = unix_now();
        for member in members {
            let (expire, mut record) = decode_entry(member)?;
            let remaining = expire - now;
            if remaining <= 0 {
                continue;
            }
            record.set_ttl(remaining as u32);
            sink.set_no_authoritative();
            sink.add(record)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Resolver for RedisCache {
    async fn resolve(&self, sink: &mut dyn ResponseSink, req: &Request) -> Result<()> {
        let key = cache_key(req);

        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.lrange(&key, 0, -1).await?;

        if members.is_empty() {
            self.metrics.cache_miss();
            self.resolve_from_upstream(sink, req, &key).await
        } else {
            self.metrics.cache_hit();
            Self::resolve_from_cache(sink, &members)
        }
    }

    fn recursion_available(&self) -> bool {
        self.upstream.recursion_available()
    }

    async fn close(&self) -> Result<()> {
        self.upstream.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::message::testutil::RecordingSink;
    use crate::dns::record::RecordType;

    fn record(line: &str) -> Record {
        line.parse().unwrap()
    }

    #[test]
    fn test_cache_key_format() {
        let req = Request::new("example.com.".parse().unwrap(), RecordType::AAAA, true);
        assert_eq!(cache_key(&req), "AAAA:example.com.");
    }

    #[test]
    fn test_entry_round_trip() {
        let original = record("example.com. 100 IN A 127.1.2.3");
        let member = encode_entry(&original, 1700000000);
        assert_eq!(member, "1700000000 example.com. 100 IN A 127.1.2.3");

        let (expire, decoded) = decode_entry(&member).unwrap();
        assert_eq!(expire, 1700000000);
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_entry("no-expiry-here").is_err());
        assert!(decode_entry("soon example.com. 100 IN A 127.0.0.1").is_err());
        assert!(decode_entry("1700000000 not a record").is_err());
    }

    #[test]
    fn test_cache_replay_reconstructs_remaining_ttl() {
        let now = unix_now();
        let members = vec![
            encode_entry(&record("example.com. 100 IN A 127.1.2.3"), now + 40),
            // already past its expiry: skipped
            encode_entry(&record("example.com. 100 IN A 127.9.9.9"), now - 5),
        ];

        let mut sink = RecordingSink::new();
        RedisCache::resolve_from_cache(&mut sink, &members).unwrap();

        assert_eq!(sink.records.len(), 1);
        assert!(!sink.authoritative);
        let ttl = sink.records[0].ttl();
        assert!((39..=40).contains(&ttl), "remaining ttl was {}", ttl);
    }

    #[test]
    fn test_cache_replay_of_only_stale_members_is_empty() {
        let now = unix_now();
        let members = vec![encode_entry(&record("example.com. 1 IN A 127.1.2.3"), now - 1)];

        let mut sink = RecordingSink::new();
        RedisCache::resolve_from_cache(&mut sink, &members).unwrap();
        assert!(sink.records.is_empty());
    }

    mod integration {
        //! Exercise a real Redis server; run with
        //! `cargo test -- --ignored` when one listens on 127.0.0.1:6379.

        use super::*;
        use crate::dns::resolver::testutil::StubResolver;
        use std::sync::Arc;

        async fn cache_over(upstream: Arc<StubResolver>) -> RedisCache {
            RedisCache::connect(
                "127.0.0.1:6379",
                0,
                "",
                upstream,
                Arc::new(Metrics::default()),
            )
            .await
            .expect("local Redis required")
        }

        #[tokio::test]
        #[ignore]
        async fn test_fill_and_hit() {
            let upstream = Arc::new(StubResolver::forwarding(vec![record(
                "redis-it.example.com. 100 IN A 127.1.2.3",
            )]));
            let cache = cache_over(upstream.clone()).await;

            let req = Request::new("redis-it.example.com.".parse().unwrap(), RecordType::A, true);

            let mut sink = RecordingSink::new();
            cache.resolve(&mut sink, &req).await.unwrap();
            assert_eq!(sink.records.len(), 1);
            assert_eq!(upstream.call_count(), 1);

            let mut sink = RecordingSink::new();
            cache.resolve(&mut sink, &req).await.unwrap();
            assert_eq!(sink.records.len(), 1);
            assert!(!sink.authoritative);
            assert!(sink.records[0].ttl() <= 100);
            assert_eq!(upstream.call_count(), 1);

            // clean up the shared keyspace
            let mut conn = cache.conn.clone();
            let _: () = conn.del(cache_key(&req)).await.unwrap();
        }

        #[tokio::test]
        #[ignore]
        async fn test_failed_upstream_writes_nothing() {
            let upstream = Arc::new(StubResolver::failing());
            let cache = cache_over(upstream).await;

            let req = Request::new("redis-err.example.com.".parse().unwrap(), RecordType::A, true);
            let mut sink = RecordingSink::new();
            assert!(cache.resolve(&mut sink, &req).await.is_err());

            let mut conn = cache.conn.clone();
            let members: Vec<String> = conn.lrange(cache_key(&req), 0, -1).await.unwrap();
            assert!(members.is_empty());
        }
    }
}

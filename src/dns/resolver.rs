//! Resolver trait and composition combinators
//!
//! A resolver answers one question by streaming records into the caller's
//! sink. Trees of resolvers are built once at startup from two combinators:
//! [`SequenceResolver`] concatenates every child's answers,
//! [`AlternateResolver`] stops at the first child that produced any record,
//! which is how local data wins over recursion.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dns::message::{Request, ResponseSink, SinkHook};
use crate::error::{ErrorSet, Result};

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Answer `req` by writing records into `sink`. Producing no records is
    /// success; errors abort the whole query.
    async fn resolve(&self, sink: &mut dyn ResponseSink, req: &Request) -> Result<()>;

    /// Whether this resolver (or any of its children) can recurse.
    fn recursion_available(&self) -> bool;

    /// Release background tasks and connections.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Concatenates the answers of all children, in child order.
pub struct SequenceResolver {
    children: Vec<Arc<dyn Resolver>>,
}

impl SequenceResolver {
    pub fn new(children: Vec<Arc<dyn Resolver>>) -> Self {
        Self { children }
    }
}

#[async_trait]
impl Resolver for SequenceResolver {
    async fn resolve(&self, sink: &mut dyn ResponseSink, req: &Request) -> Result<()> {
        for child in &self.children {
            child.resolve(sink, req).await?;
        }
        Ok(())
    }

    fn recursion_available(&self) -> bool {
        self.children.iter().any(|c| c.recursion_available())
    }

    async fn close(&self) -> Result<()> {
        let mut errors = ErrorSet::new();
        for child in &self.children {
            if let Err(err) = child.close().await {
                errors.push(err);
            }
        }
        errors.into_result()
    }
}

/// First child that produces at least one record wins; later children are
/// not consulted.
pub struct AlternateResolver {
    children: Vec<Arc<dyn Resolver>>,
}

impl AlternateResolver {
    pub fn new(children: Vec<Arc<dyn Resolver>>) -> Self {
        Self { children }
    }
}

#[async_trait]
impl Resolver for AlternateResolver {
    async fn resolve(&self, sink: &mut dyn ResponseSink, req: &Request) -> Result<()> {
        for child in &self.children {
            let mut resolved = false;
            {
                let mut hook = SinkHook::new(&mut *sink, |_| resolved = true);
                child.resolve(&mut hook, req).await?;
            }
            if resolved {
                break;
            }
        }
        Ok(())
    }

    fn recursion_available(&self) -> bool {
        self.children.iter().any(|c| c.recursion_available())
    }

    async fn close(&self) -> Result<()> {
        let mut errors = ErrorSet::new();
        for child in &self.children {
            if let Err(err) = child.close().await {
                errors.push(err);
            }
        }
        errors.into_result()
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::dns::record::Record;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fixed-answer resolver counting how often it was consulted.
    pub struct StubResolver {
        pub records: Vec<Record>,
        pub authoritative: bool,
        pub recursion: bool,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl StubResolver {
        pub fn answering(records: Vec<Record>) -> Self {
            Self {
                records,
                authoritative: true,
                recursion: false,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn forwarding(records: Vec<Record>) -> Self {
            Self {
                records,
                authoritative: false,
                recursion: true,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self {
                records: Vec::new(),
                authoritative: true,
                recursion: false,
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Resolver for StubResolver {
        async fn resolve(&self, sink: &mut dyn ResponseSink, _req: &Request) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Internal("stub failure".to_string()));
            }
            for record in &self.records {
                if !self.authoritative {
                    sink.set_no_authoritative();
                }
                sink.add(record.clone())?;
            }
            Ok(())
        }

        fn recursion_available(&self) -> bool {
            self.recursion
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::StubResolver;
    use super::*;
    use crate::dns::message::testutil::RecordingSink;
    use crate::dns::record::{Record, RecordType};

    fn record(line: &str) -> Record {
        line.parse().unwrap()
    }

    fn request(name: &str, qtype: RecordType) -> Request {
        Request::new(name.parse().unwrap(), qtype, true)
    }

    #[tokio::test]
    async fn test_sequence_concatenates_in_child_order() {
        let a = Arc::new(StubResolver::answering(vec![record(
            "a.test. 10 IN A 127.0.0.1",
        )]));
        let b = Arc::new(StubResolver::answering(vec![record(
            "b.test. 10 IN A 127.0.0.2",
        )]));
        let seq = SequenceResolver::new(vec![a.clone(), b.clone()]);

        let mut sink = RecordingSink::new();
        seq.resolve(&mut sink, &request("a.test.", RecordType::A))
            .await
            .unwrap();

        assert_eq!(sink.records.len(), 2);
        assert_eq!(sink.records[0].to_string(), "a.test. 10 IN A 127.0.0.1");
        assert_eq!(sink.records[1].to_string(), "b.test. 10 IN A 127.0.0.2");
        assert!(sink.authoritative);
    }

    #[tokio::test]
    async fn test_sequence_stops_on_error() {
        let a = Arc::new(StubResolver::failing());
        let b = Arc::new(StubResolver::answering(vec![record(
            "b.test. 10 IN A 127.0.0.2",
        )]));
        let seq = SequenceResolver::new(vec![a.clone(), b.clone()]);

        let mut sink = RecordingSink::new();
        let result = seq
            .resolve(&mut sink, &request("a.test.", RecordType::A))
            .await;

        assert!(result.is_err());
        assert_eq!(b.call_count(), 0);
    }

    #[tokio::test]
    async fn test_alternate_falls_through_to_forwarder() {
        let dynamic = Arc::new(StubResolver::answering(vec![]));
        let forward = Arc::new(StubResolver::forwarding(vec![record(
            "x.test. 10 IN A 127.0.0.9",
        )]));
        let alt = AlternateResolver::new(vec![dynamic.clone(), forward.clone()]);

        let mut sink = RecordingSink::new();
        alt.resolve(&mut sink, &request("x.test.", RecordType::A))
            .await
            .unwrap();

        assert_eq!(sink.records.len(), 1);
        assert!(!sink.authoritative);
        assert_eq!(dynamic.call_count(), 1);
        assert_eq!(forward.call_count(), 1);
    }

    #[tokio::test]
    async fn test_alternate_first_producer_wins() {
        let dynamic = Arc::new(StubResolver::answering(vec![record(
            "y.test. 10 IN A 127.0.0.1",
        )]));
        let forward = Arc::new(StubResolver::forwarding(vec![record(
            "y.test. 10 IN A 127.0.0.9",
        )]));
        let alt = AlternateResolver::new(vec![dynamic.clone(), forward.clone()]);

        let mut sink = RecordingSink::new();
        alt.resolve(&mut sink, &request("y.test.", RecordType::A))
            .await
            .unwrap();

        assert_eq!(sink.records.len(), 1);
        assert_eq!(sink.records[0].to_string(), "y.test. 10 IN A 127.0.0.1");
        assert!(sink.authoritative);
        assert_eq!(forward.call_count(), 0);
    }

    #[tokio::test]
    async fn test_alternate_propagates_errors() {
        let failing = Arc::new(StubResolver::failing());
        let forward = Arc::new(StubResolver::forwarding(vec![record(
            "z.test. 10 IN A 127.0.0.9",
        )]));
        let alt = AlternateResolver::new(vec![failing.clone(), forward.clone()]);

        let mut sink = RecordingSink::new();
        let result = alt
            .resolve(&mut sink, &request("z.test.", RecordType::A))
            .await;

        assert!(result.is_err());
        assert_eq!(forward.call_count(), 0);
    }

    #[tokio::test]
    async fn test_recursion_available_is_any_child() {
        let a = Arc::new(StubResolver::answering(vec![]));
        let b = Arc::new(StubResolver::forwarding(vec![]));
        assert!(AlternateResolver::new(vec![a.clone(), b.clone()]).recursion_available());
        assert!(!SequenceResolver::new(vec![a]).recursion_available());
    }
}

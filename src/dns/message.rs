//! Query descriptor and response sinks
//!
//! Resolvers never build DNS replies themselves; they stream typed records
//! into a [`ResponseSink`]. The sink carries the one-way authoritative flag,
//! and [`SinkHook`] is the interception point the caches and the alternate
//! combinator use to observe the stream.

use hickory_proto::op::{Message, MessageType};
use hickory_proto::rr::DNSClass;

use crate::dns::record::{Domain, Record, RecordType};
use crate::error::Result;

/// A single DNS question as seen by the resolver pipeline.
#[derive(Debug, Clone)]
pub struct Request {
    pub name: Domain,
    pub qtype: RecordType,
    pub qclass: DNSClass,
    pub recursion_desired: bool,
}

impl Request {
    pub fn new(name: Domain, qtype: RecordType, recursion_desired: bool) -> Self {
        Self {
            name,
            qtype,
            qclass: DNSClass::IN,
            recursion_desired,
        }
    }
}

/// Streaming answer sink handed to every resolver.
///
/// The authoritative flag starts true and can only be cleared; clearing is
/// idempotent and never reversed.
pub trait ResponseSink: Send {
    /// Append an answer. The sink may reject it, which aborts resolution.
    fn add(&mut self, record: Record) -> Result<()>;

    fn is_authoritative(&self) -> bool;

    /// One-way flag clearing; once cleared the sink never reports
    /// authoritative again.
    fn set_no_authoritative(&mut self);
}

/// Decorator forwarding all sink methods to `inner`, invoking the callback
/// for each record that was accepted.
pub struct SinkHook<'a, F: FnMut(&Record) + Send> {
    inner: &'a mut dyn ResponseSink,
    on_add: F,
}

impl<'a, F: FnMut(&Record) + Send> SinkHook<'a, F> {
    pub fn new(inner: &'a mut dyn ResponseSink, on_add: F) -> Self {
        Self { inner, on_add }
    }
}

impl<'a, F: FnMut(&Record) + Send> ResponseSink for SinkHook<'a, F> {
    fn add(&mut self, record: Record) -> Result<()> {
        self.inner.add(record.clone())?;
        (self.on_add)(&record);
        Ok(())
    }

    fn is_authoritative(&self) -> bool {
        self.inner.is_authoritative()
    }

    fn set_no_authoritative(&mut self) {
        self.inner.set_no_authoritative();
    }
}

/// Terminal sink materializing records through a callback; used by the HTTP
/// endpoints that list records into a collection.
pub struct CallbackSink<F: FnMut(Record) -> Result<()> + Send> {
    callback: F,
    authoritative: bool,
}

impl<F: FnMut(Record) -> Result<()> + Send> CallbackSink<F> {
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            authoritative: true,
        }
    }
}

impl<F: FnMut(Record) -> Result<()> + Send> ResponseSink for CallbackSink<F> {
    fn add(&mut self, record: Record) -> Result<()> {
        (self.callback)(record)
    }

    fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    fn set_no_authoritative(&mut self) {
        self.authoritative = false;
    }
}

/// Sink accumulating answers for a final DNS reply message.
#[derive(Debug)]
pub struct MessageBuilder {
    records: Vec<Record>,
    authoritative: bool,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            authoritative: true,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Answers with duplicates removed, keeping first-seen order.
    fn dedup_answers(&self) -> Vec<&Record> {
        let mut seen = std::collections::HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.to_string()))
            .collect()
    }

    /// Produce the reply for `query`: question echoed back, answers deduped,
    /// authoritative flag as accumulated, recursion-available from the server
    /// configuration.
    pub fn to_reply(&self, query: &Message, recursion_available: bool) -> Result<Message> {
        let mut reply = Message::new();
        reply.set_id(query.id());
        reply.set_message_type(MessageType::Response);
        reply.set_op_code(query.op_code());
        reply.set_recursion_desired(query.recursion_desired());
        reply.set_recursion_available(recursion_available);
        reply.set_authoritative(self.authoritative);
        for question in query.queries() {
            reply.add_query(question.clone());
        }

        for record in self.dedup_answers() {
            reply.add_answer(record.to_rr()?);
        }

        Ok(reply)
    }
}

impl ResponseSink for MessageBuilder {
    fn add(&mut self, record: Record) -> Result<()> {
        self.records.push(record);
        Ok(())
    }

    fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    fn set_no_authoritative(&mut self) {
        self.authoritative = false;
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Collects records and the final authoritative flag; test-only sink.
    #[derive(Debug)]
    pub struct RecordingSink {
        pub records: Vec<Record>,
        pub authoritative: bool,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self {
                records: Vec::new(),
                authoritative: true,
            }
        }
    }

    impl ResponseSink for RecordingSink {
        fn add(&mut self, record: Record) -> Result<()> {
            self.records.push(record);
            Ok(())
        }

        fn is_authoritative(&self) -> bool {
            self.authoritative
        }

        fn set_no_authoritative(&mut self) {
            self.authoritative = false;
        }
    }
}

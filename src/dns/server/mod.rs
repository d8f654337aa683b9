//! DNS servers
//!
//! The shared query handler plus the UDP and TCP front ends. Only standard
//! queries are processed; anything else gets an empty reply, and a resolver
//! failure is answered as "no answer" rather than SERVFAIL so downstream
//! resolvers are not poisoned.

mod tcp;
mod udp;

pub use tcp::TcpDnsServer;
pub use udp::UdpDnsServer;

use std::sync::Arc;

use hickory_proto::op::{Message, MessageType, OpCode};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tracing::{debug, warn};

use crate::dns::message::{MessageBuilder, Request, ResponseSink};
use crate::dns::record::{Domain, RecordType};
use crate::dns::resolver::Resolver;
use crate::metrics::Metrics;

/// Answers raw DNS messages through the composed resolver tree.
pub struct DnsHandler {
    resolver: Arc<dyn Resolver>,
    metrics: Arc<Metrics>,
}

impl DnsHandler {
    pub fn new(resolver: Arc<dyn Resolver>, metrics: Arc<Metrics>) -> Self {
        Self { resolver, metrics }
    }

    fn empty_reply(query: &Message, recursion_available: bool) -> Message {
        let mut reply = Message::new();
        reply.set_id(query.id());
        reply.set_message_type(MessageType::Response);
        reply.set_op_code(query.op_code());
        reply.set_recursion_desired(query.recursion_desired());
        reply.set_recursion_available(recursion_available);
        for question in query.queries() {
            reply.add_query(question.clone());
        }
        reply
    }

    /// Build the reply for one query message.
    pub async fn reply_to(&self, query: &Message) -> Message {
        let recursion_available = self.resolver.recursion_available();

        if query.op_code() != OpCode::Query {
            return Self::empty_reply(query, recursion_available);
        }

        let mut builder = MessageBuilder::new();

        for question in query.queries() {
            self.metrics.query();

            // unknown qtypes and unparseable names yield empty answers
            let Some(qtype) = RecordType::from_wire(question.query_type()) else {
                continue;
            };
            let Ok(name) = question.name().to_string().parse::<Domain>() else {
                continue;
            };

            let req = Request {
                name,
                qtype,
                qclass: question.query_class(),
                recursion_desired: query.recursion_desired(),
            };

            // answer each question into its own sink so a failed question
            // contributes nothing to the reply
            let mut answers = MessageBuilder::new();
            match self.resolver.resolve(&mut answers, &req).await {
                Ok(()) => {
                    if !answers.is_authoritative() {
                        builder.set_no_authoritative();
                    }
                    for record in answers.records() {
                        // MessageBuilder::add never fails
                        let _ = builder.add(record.clone());
                    }
                }
                Err(err) => {
                    warn!("failed to resolve {} {}: {}", req.name, req.qtype, err);
                    self.metrics.error();
                }
            }
        }

        match builder.to_reply(query, recursion_available) {
            Ok(reply) => reply,
            Err(err) => {
                warn!("failed to build reply: {}", err);
                self.metrics.error();
                Self::empty_reply(query, recursion_available)
            }
        }
    }

    /// Answer one raw message; `None` when the input is not a DNS message
    /// or the reply cannot be encoded.
    pub async fn handle(&self, data: &[u8]) -> Option<Vec<u8>> {
        let query = match Message::from_bytes(data) {
            Ok(query) => query,
            Err(err) => {
                debug!("dropping unparseable query: {}", err);
                return None;
            }
        };

        let reply = self.reply_to(&query).await;
        match reply.to_bytes() {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!("failed to encode reply: {}", err);
                None
            }
        }
    }
}

//! Forward resolver
//!
//! Recursive resolution against configured upstream name servers. Upstreams
//! are tried in order over UDP with a per-attempt timeout; the first one that
//! answers wins, and a dead upstream silently falls through to the next.
//! Exhausting every upstream is success with no records, never an error.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::Name;
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use crate::dns::message::{Request, ResponseSink};
use crate::dns::record::Record;
use crate::dns::resolver::Resolver;
use crate::error::{Error, Result};
use crate::metrics::Metrics;

pub struct ForwardResolver {
    upstreams: Vec<SocketAddr>,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl ForwardResolver {
    pub fn new(upstreams: Vec<SocketAddr>, timeout: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            upstreams,
            timeout,
            metrics,
        }
    }

    fn build_query(&self, req: &Request) -> Result<(u16, Vec<u8>)> {
        let id: u16 = rand::random();
        let mut message = Message::new();
        message.set_id(id);
        message.set_message_type(MessageType::Query);
        message.set_op_code(OpCode::Query);
        message.set_recursion_desired(true);

        let name = Name::from_str_relaxed(req.name.as_str())?;
        let mut query = Query::query(name, req.qtype.to_wire());
        query.set_query_class(req.qclass);
        message.add_query(query);

        Ok((id, message.to_bytes()?))
    }

    async fn exchange(&self, query: &[u8], id: u16, upstream: SocketAddr) -> Result<Message> {
        let bind_addr = if upstream.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.send_to(query, upstream).await?;

        let mut buf = vec![0u8; 4096];
        let (len, _) = timeout(self.timeout, socket.recv_from(&mut buf))
            .await
            .map_err(|_| {
                Error::External(format!("upstream timeout after {:?}", self.timeout))
            })??;

        let reply = Message::from_bytes(&buf[..len])?;
        if reply.id() != id {
            return Err(Error::External(format!(
                "upstream reply id mismatch: {} != {}",
                reply.id(),
                id
            )));
        }
        Ok(reply)
    }
}

#[async_trait]
impl Resolver for ForwardResolver {
    async fn resolve(&self, sink: &mut dyn ResponseSink, req: &Request) -> Result<()> {
        if !req.recursion_desired {
            return Ok(());
        }

        let (id, query) = self.build_query(req)?;

        for upstream in &self.upstreams {
            let reply = match self.exchange(&query, id, *upstream).await {
                Ok(reply) => reply,
                Err(err) => {
                    debug!("upstream {} failed: {}", upstream, err);
                    continue;
                }
            };

            self.metrics.upstream_query();
            for answer in reply.answers() {
                match Record::from_rr(answer) {
                    Ok(record) => {
                        sink.set_no_authoritative();
                        sink.add(record)?;
                    }
                    Err(err) => debug!("skipping upstream answer: {}", err),
                }
            }
            break;
        }

        Ok(())
    }

    fn recursion_available(&self) -> bool {
        true
    }
}

//! TCP DNS server
//!
//! Standard DNS over TCP framing: each message is preceded by a two-byte
//! big-endian length. A connection serves queries until the peer closes it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use super::DnsHandler;
use crate::error::{Error, Result};

pub struct TcpDnsServer {
    listener: TcpListener,
    handler: Arc<DnsHandler>,
}

impl TcpDnsServer {
    pub async fn bind(bind_addr: SocketAddr, handler: Arc<DnsHandler>) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| Error::external(format!("failed to bind TCP socket to {}", bind_addr), e))?;

        info!("TCP DNS server bound to {}", bind_addr);

        Ok(Self { listener, handler })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| Error::external("failed to get local address", e))
    }

    /// Accept connections until the process shuts down, one task each.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        if let Err(err) = Self::serve_connection(handler, stream).await {
                            warn!("error on TCP connection from {}: {}", peer, err);
                        }
                    });
                }
                Err(err) => {
                    error!("error accepting TCP connection: {}", err);
                }
            }
        }
    }

    async fn serve_connection(handler: Arc<DnsHandler>, mut stream: TcpStream) -> Result<()> {
        loop {
            let mut len_buf = [0u8; 2];
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                // clean end of stream
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(err) => return Err(Error::external("failed to read query length", err)),
            }

            let len = u16::from_be_bytes(len_buf) as usize;
            let mut data = vec![0u8; len];
            stream
                .read_exact(&mut data)
                .await
                .map_err(|e| Error::external("failed to read query", e))?;

            let Some(reply) = handler.handle(&data).await else {
                debug!("no reply for TCP query");
                continue;
            };

            let reply_len = u16::try_from(reply.len())
                .map_err(|_| Error::Internal(format!("reply too large: {} bytes", reply.len())))?;
            stream
                .write_all(&reply_len.to_be_bytes())
                .await
                .map_err(|e| Error::external("failed to write reply length", e))?;
            stream
                .write_all(&reply)
                .await
                .map_err(|e| Error::external("failed to write reply", e))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::resolver::testutil::StubResolver;
    use crate::metrics::Metrics;
    use hickory_proto::op::{Message, MessageType, OpCode, Query};
    use hickory_proto::rr::{Name, RecordType as WireRecordType};
    use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
    use std::str::FromStr;

    #[tokio::test]
    async fn test_tcp_query_round_trip() {
        let resolver = Arc::new(StubResolver::answering(vec![
            "example.com. 128 IN A 127.1.2.3".parse().unwrap(),
        ]));
        let handler = Arc::new(DnsHandler::new(resolver, Arc::new(Metrics::default())));

        let server = Arc::new(
            TcpDnsServer::bind("127.0.0.1:0".parse().unwrap(), handler)
                .await
                .unwrap(),
        );
        let addr = server.local_addr().unwrap();
        let serving = tokio::spawn(server.run());

        let mut query = Message::new();
        query.set_id(9);
        query.set_message_type(MessageType::Query);
        query.set_op_code(OpCode::Query);
        query.add_query(Query::query(
            Name::from_str("example.com.").unwrap(),
            WireRecordType::A,
        ));
        let query_bytes = query.to_bytes().unwrap();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&(query_bytes.len() as u16).to_be_bytes())
            .await
            .unwrap();
        stream.write_all(&query_bytes).await.unwrap();

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut reply_buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
        stream.read_exact(&mut reply_buf).await.unwrap();

        let reply = Message::from_bytes(&reply_buf).unwrap();
        assert_eq!(reply.id(), 9);
        assert_eq!(reply.answers().len(), 1);

        serving.abort();
    }
}

//! UDP DNS server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use super::DnsHandler;
use crate::error::{Error, Result};

pub struct UdpDnsServer {
    socket: UdpSocket,
    handler: Arc<DnsHandler>,
}

impl UdpDnsServer {
    pub async fn bind(bind_addr: SocketAddr, handler: Arc<DnsHandler>) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| Error::external(format!("failed to bind UDP socket to {}", bind_addr), e))?;

        info!("UDP DNS server bound to {}", bind_addr);

        Ok(Self { socket, handler })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::external("failed to get local address", e))
    }

    /// Serve queries until the process shuts down, one task per datagram.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut buf = vec![0u8; 4096];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => {
                    let data = buf[..len].to_vec();
                    let server = self.clone();

                    tokio::spawn(async move {
                        if let Err(err) = server.answer(data, src).await {
                            warn!("error handling UDP query from {}: {}", src, err);
                        }
                    });
                }
                Err(err) => {
                    error!("error receiving UDP packet: {}", err);
                }
            }
        }
    }

    async fn answer(&self, data: Vec<u8>, src: SocketAddr) -> Result<()> {
        let Some(reply) = self.handler.handle(&data).await else {
            debug!("no reply for datagram from {}", src);
            return Ok(());
        };

        self.socket
            .send_to(&reply, src)
            .await
            .map_err(|e| Error::external(format!("failed to send reply to {}", src), e))?;

        Ok(())
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
    async fn test_udp_query_round_trip() {
        let resolver = Arc::new(StubResolver::answering(vec![
            "example.com. 128 IN A 127.1.2.3".parse().unwrap(),
        ]));
        let handler = Arc::new(DnsHandler::new(resolver, Arc::new(Metrics::default())));

        let server = Arc::new(
            UdpDnsServer::bind("127.0.0.1:0".parse().unwrap(), handler)
                .await
                .unwrap(),
        );
        let addr = server.local_addr().unwrap();
        let serving = tokio::spawn(server.run());

        let mut query = Message::new();
        query.set_id(7);
        query.set_message_type(MessageType::Query);
        query.set_op_code(OpCode::Query);
        query.add_query(Query::query(
            Name::from_str("example.com.").unwrap(),
            WireRecordType::A,
        ));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(&query.to_bytes().unwrap(), addr)
            .await
            .unwrap();

        let mut buf = vec![0u8; 4096];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        let reply = Message::from_bytes(&buf[..len]).unwrap();

        assert_eq!(reply.id(), 7);
        assert_eq!(reply.answers().len(), 1);

        serving.abort();
    }
}

use crate::config::UnitConfig;
use crate::error::{Error, Result};
use crate::unit::{InitContext, Report, ResourceStrategy};
use async_trait::async_trait;
use serde_json::Value;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tracing::debug;

/// Transport protocol of a network endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// Resolved endpoint.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub addr: SocketAddr,
    timeout: Duration,
}

/// Network endpoint bring-up: resolve, then reach the port over TCP or UDP.
///
/// UDP is connectionless, so reachability only means a datagram could be
/// sent without the OS reporting an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkStrategy;

impl NetworkStrategy {
    pub fn new() -> Self {
        Self
    }
}

async fn reach(endpoint: &Endpoint, payload: &[u8]) -> Result<()> {
    match endpoint.protocol {
        Protocol::Tcp => {
            tokio::time::timeout(endpoint.timeout, TcpStream::connect(endpoint.addr))
                .await
                .map_err(|_| {
                    Error::Protocol(format!("TCP connect to {} timed out", endpoint.addr))
                })??;
        }
        Protocol::Udp => {
            let bind: SocketAddr = if endpoint.addr.is_ipv4() {
                (Ipv4Addr::UNSPECIFIED, 0).into()
            } else {
                (Ipv6Addr::UNSPECIFIED, 0).into()
            };
            let socket = UdpSocket::bind(bind).await?;
            socket.connect(endpoint.addr).await?;
            socket.send(payload).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl ResourceStrategy for NetworkStrategy {
    type Handle = Endpoint;

    fn kind(&self) -> &'static str {
        "network"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        &["host", "port", "protocol"]
    }

    fn validate(&self, config: &UnitConfig) -> Vec<String> {
        let mut problems = Vec::new();
        if config.str("host").is_none() {
            problems.push("'host' must be a string".to_string());
        }
        if config.port("port").is_none() {
            problems.push("'port' must be an integer between 1 and 65535".to_string());
        }
        if config.str("protocol").and_then(Protocol::parse).is_none() {
            problems.push("'protocol' must be 'tcp' or 'udp'".to_string());
        }
        problems
    }

    async fn connect(&self, config: &UnitConfig, timeout: Duration) -> Result<Endpoint> {
        let host = config
            .str("host")
            .ok_or_else(|| Error::Protocol("'host' is not set".to_string()))?;
        let port = config
            .port("port")
            .ok_or_else(|| Error::Protocol("'port' is not set".to_string()))?;
        let protocol = config
            .str("protocol")
            .and_then(Protocol::parse)
            .ok_or_else(|| Error::Protocol("'protocol' is not set".to_string()))?;

        let addr = lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| Error::Protocol(format!("{} did not resolve to any address", host)))?;
        debug!(host, port, %addr, "Resolved network endpoint");

        Ok(Endpoint {
            host: host.to_string(),
            port,
            protocol,
            addr,
            timeout,
        })
    }

    async fn probe(&self, endpoint: &mut Endpoint) -> Result<()> {
        reach(endpoint, b"").await
    }

    async fn initialize(&self, endpoint: &mut Endpoint, ctx: &InitContext<'_>) -> Result<Report> {
        reach(endpoint, ctx.artifact.as_bytes()).await?;

        let mut report = Report::new();
        report.insert("host".to_string(), Value::from(endpoint.host.clone()));
        report.insert("port".to_string(), Value::from(endpoint.port));
        report.insert("protocol".to_string(), Value::from(endpoint.protocol.as_str()));
        report.insert("address".to_string(), Value::from(endpoint.addr.to_string()));
        Ok(report)
    }

    async fn cleanup(&self, _endpoint: &mut Endpoint, _ctx: &InitContext<'_>) -> Result<()> {
        // Nothing is left behind by a connect or a datagram
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parsing() {
        assert_eq!(Protocol::parse("TCP"), Some(Protocol::Tcp));
        assert_eq!(Protocol::parse(" udp "), Some(Protocol::Udp));
        assert_eq!(Protocol::parse("sctp"), None);
    }

    #[test]
    fn validation_rejects_bad_port_and_protocol() {
        let config = UnitConfig::new()
            .with("host", "localhost")
            .with("port", 0)
            .with("protocol", "icmp");
        assert_eq!(NetworkStrategy.validate(&config).len(), 2);
    }
}

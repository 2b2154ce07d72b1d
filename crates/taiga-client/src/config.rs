//! Client configuration from environment variables

use std::net::Ipv4Addr;

use taiga_crypto::{PublicKey, SecretKey};
use taiga_net::{transport::normalize_ws_url, TransportConfig};
use taiga_proto::Protocol;

use crate::error::{ClientError, ClientResult};

/// Runtime configuration for the client daemon
#[derive(Clone)]
pub struct ClientConfig {
    /// Client's private key
    pub private_key: SecretKey,
    /// Node's public key, frames are sealed to it
    pub node_public_key: PublicKey,
    /// Address for the client's TUN interface, e.g. `11.0.0.2`
    pub local_ip: Ipv4Addr,
    /// Node's address inside the tunnel, e.g. `11.0.0.1`
    pub node_vpn_ip: Ipv4Addr,
    /// Physical default gateway, used to keep the node reachable directly
    pub gateway_ip: Ipv4Addr,
    /// Node's public address, excluded from tunnel routing
    pub remote_host: String,
    /// Selected transport backend plus endpoint
    pub transport: TransportConfig,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("private_key", &"<redacted>")
            .field("node_public_key", &self.node_public_key)
            .field("local_ip", &self.local_ip)
            .field("node_vpn_ip", &self.node_vpn_ip)
            .field("gateway_ip", &self.gateway_ip)
            .field("remote_host", &self.remote_host)
            .field("transport", &self.transport)
            .finish()
    }
}

impl ClientConfig {
    /// Read configuration from process environment
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Read configuration from an arbitrary variable source
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> ClientResult<Self> {
        let conn_type: Protocol = require(lookup, "CONN_TYPE")?
            .parse()
            .map_err(|_| ClientError::Config("CONN_TYPE must be wss or udp".to_string()))?;

        let transport = match conn_type {
            Protocol::Wss => {
                let url = require(lookup, "WS_URL")?;
                let url = normalize_ws_url(&url)
                    .map_err(|e| ClientError::Config(format!("WS_URL: {}", e)))?;
                TransportConfig::Ws { url }
            }
            Protocol::Udp => TransportConfig::Udp {
                addr: require(lookup, "UDP_ADDR")?,
            },
        };

        let private_key = SecretKey::from_hex(&require(lookup, "PRIVATE_KEY")?)
            .map_err(|_| ClientError::Config("PRIVATE_KEY must be 32 bytes hex".to_string()))?;

        let node_public_key = PublicKey::from_hex(&require(lookup, "NODE_PUBLIC_KEY")?)
            .map_err(|_| ClientError::Config("NODE_PUBLIC_KEY must be 32 bytes hex".to_string()))?;

        let local_ip = parse_ip(lookup, "LOCAL_IP")?;
        let node_vpn_ip = parse_ip(lookup, "NODE_VPN_IP")?;
        let gateway_ip = parse_ip(lookup, "GATEWAY_IP")?;
        let remote_host = require(lookup, "REMOTE_HOST")?;

        Ok(Self {
            private_key,
            node_public_key,
            local_ip,
            node_vpn_ip,
            gateway_ip,
            remote_host,
            transport,
        })
    }
}

fn require(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> ClientResult<String> {
    lookup(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ClientError::Config(format!("{} is not set", key)))
}

fn parse_ip(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> ClientResult<Ipv4Addr> {
    require(lookup, key)?
        .parse()
        .map_err(|_| ClientError::Config(format!("{} must be an IPv4 address", key)))
}

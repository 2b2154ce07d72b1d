//! Node configuration from environment variables

use std::net::Ipv4Addr;

use taiga_crypto::{PublicKey, SecretKey};
use taiga_proto::Protocol;

use crate::error::{NodeError, NodeResult};

/// Default listen address when `LISTEN_ADDR` is unset
const DEFAULT_LISTEN_ADDR: &str = ":8080";

/// Runtime configuration for the node daemon
#[derive(Clone)]
pub struct NodeConfig {
    // NOTE: Debug is implemented manually below to avoid printing `private_key`.
    /// Node's private key for decrypting client frames
    pub private_key: SecretKey,
    /// Node's public key (derived when not provided)
    pub public_key: PublicKey,
    /// Transport listen address, e.g. `0.0.0.0:8080`
    pub listen_addr: String,
    /// Address of the node's TUN interface, e.g. `11.0.0.1`
    pub tun_ip: Ipv4Addr,
    /// Subnet assigned to clients, e.g. `11.0.0.0/24`
    pub vpn_subnet: String,
    /// Which transport backend to serve
    pub transport: Protocol,
}

impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .field("listen_addr", &self.listen_addr)
            .field("tun_ip", &self.tun_ip)
            .field("vpn_subnet", &self.vpn_subnet)
            .field("transport", &self.transport)
            .finish()
    }
}

impl NodeConfig {
    /// Read configuration from process environment
    pub fn from_env() -> NodeResult<Self> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Read configuration from an arbitrary variable source
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> NodeResult<Self> {
        let private_hex = require(lookup, "NODE_PRIVATE_KEY")?;
        let private_key = SecretKey::from_hex(&private_hex)
            .map_err(|_| NodeError::Config("NODE_PRIVATE_KEY must be 32 bytes hex".to_string()))?;

        let public_key = match lookup("NODE_PUBLIC_KEY") {
            Some(hex) if !hex.is_empty() => PublicKey::from_hex(&hex).map_err(|_| {
                NodeError::Config("NODE_PUBLIC_KEY must be 32 bytes hex".to_string())
            })?,
            _ => private_key.public_key(),
        };

        let listen_addr = normalize_listen_addr(
            &lookup("LISTEN_ADDR")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
        );

        let tun_ip: Ipv4Addr = require(lookup, "TUN_IP")?
            .parse()
            .map_err(|_| NodeError::Config("TUN_IP must be an IPv4 address".to_string()))?;

        let vpn_subnet = require(lookup, "VPN_SUBNET")?;
        validate_subnet(&vpn_subnet)?;

        let transport: Protocol = require(lookup, "TRANSPORT_TYPE")?
            .parse()
            .map_err(|_| NodeError::Config("TRANSPORT_TYPE must be wss or udp".to_string()))?;

        Ok(Self {
            private_key,
            public_key,
            listen_addr,
            tun_ip,
            vpn_subnet,
            transport,
        })
    }
}

fn require(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> NodeResult<String> {
    lookup(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| NodeError::Config(format!("{} is not set", key)))
}

/// A bare `:port` binds every interface
fn normalize_listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

fn validate_subnet(subnet: &str) -> NodeResult<()> {
    let err = || NodeError::Config(format!("VPN_SUBNET must be IPv4 CIDR, got: {}", subnet));

    let (ip, prefix) = subnet.split_once('/').ok_or_else(err)?;
    ip.parse::<Ipv4Addr>().map_err(|_| err())?;
    let prefix: u8 = prefix.parse().map_err(|_| err())?;
    if prefix > 32 {
        return Err(err());
    }
    Ok(())
}

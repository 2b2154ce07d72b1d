//! Platform network configuration
//!
//! Routes, IP forwarding, NAT, and DNS around a tunnel session. All OS
//! branches live here; callers see two operations, [`PlatformConfigurator::
//! install`] and [`PlatformConfigurator::teardown`]. Teardown is idempotent
//! and best-effort: individual step failures are logged, never returned.

use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{NetError, NetResult};

/// What the helper configures around the device
#[derive(Debug, Clone)]
pub enum NetProfile {
    /// Client endpoint: route everything through the tunnel except the node
    Client {
        /// Node's public address, excluded from tunnel routing
        node_ip: String,
        /// Current default gateway, used to reach the node directly
        gateway_ip: String,
        /// Node's address inside the tunnel
        node_vpn_ip: String,
        /// DNS servers to use while the tunnel is up
        dns_servers: Vec<String>,
    },
    /// Node endpoint: route the VPN subnet in, forward and masquerade out
    Node {
        /// Subnet assigned to clients, CIDR form
        vpn_subnet: String,
    },
}

impl NetProfile {
    /// Client profile with the stock resolver set
    pub fn client(node_ip: &str, gateway_ip: &str, node_vpn_ip: &str) -> Self {
        NetProfile::Client {
            node_ip: node_ip.to_string(),
            gateway_ip: gateway_ip.to_string(),
            node_vpn_ip: node_vpn_ip.to_string(),
            dns_servers: vec!["8.8.8.8".to_string(), "1.1.1.1".to_string()],
        }
    }

    /// Node profile for the given client subnet
    pub fn node(vpn_subnet: &str) -> Self {
        NetProfile::Node {
            vpn_subnet: vpn_subnet.to_string(),
        }
    }
}

/// Installs and removes the OS-side configuration for one tunnel device
pub struct PlatformConfigurator {
    tun_name: String,
    #[cfg(target_os = "macos")]
    network_service: Option<String>,
    #[cfg(target_os = "macos")]
    original_dns: Vec<String>,
}

impl PlatformConfigurator {
    pub fn new(tun_name: impl Into<String>) -> Self {
        Self {
            tun_name: tun_name.into(),
            #[cfg(target_os = "macos")]
            network_service: None,
            #[cfg(target_os = "macos")]
            original_dns: Vec::new(),
        }
    }

    /// Apply routes, forwarding, NAT, and DNS for the profile
    ///
    /// A failed step returns an error; the caller is expected to tear the
    /// device down and exit.
    pub async fn install(&mut self, profile: &NetProfile) -> NetResult<()> {
        #[cfg(target_os = "linux")]
        {
            self.install_linux(profile).await?;
        }

        #[cfg(target_os = "macos")]
        {
            self.install_macos(profile).await?;
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let _ = profile;
            return Err(NetError::Device(
                "platform not supported for network setup".to_string(),
            ));
        }

        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            info!(tun = %self.tun_name, "platform network setup complete");
            Ok(())
        }
    }

    /// Remove everything `install` added
    ///
    /// Safe to call multiple times and on partially-installed state.
    pub async fn teardown(&mut self, profile: &NetProfile) {
        #[cfg(target_os = "linux")]
        self.teardown_linux(profile).await;

        #[cfg(target_os = "macos")]
        self.teardown_macos(profile).await;

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        let _ = profile;

        info!(tun = %self.tun_name, "platform network teardown complete");
    }

    #[cfg(target_os = "linux")]
    async fn install_linux(&self, profile: &NetProfile) -> NetResult<()> {
        match profile {
            NetProfile::Client {
                node_ip,
                gateway_ip,
                ..
            } => {
                for args in client_route_args_linux(&self.tun_name, node_ip, gateway_ip) {
                    run_tolerant("ip", &args).await?;
                }
            }
            NetProfile::Node { vpn_subnet } => {
                run_tolerant(
                    "ip",
                    &["route", "add", vpn_subnet.as_str(), "dev", self.tun_name.as_str()],
                )
                .await?;
                run("sysctl", &["-w", "net.ipv4.ip_forward=1"]).await?;

                // Add the masquerade rule only if a previous run did not leave it
                let check = masquerade_args(vpn_subnet, "-C");
                if run("iptables", &check).await.is_err() {
                    run("iptables", &masquerade_args(vpn_subnet, "-A")).await?;
                }
            }
        }
        Ok(())
    }

    #[cfg(target_os = "linux")]
    async fn teardown_linux(&self, profile: &NetProfile) {
        match profile {
            NetProfile::Client { node_ip, .. } => {
                let tun = self.tun_name.as_str();
                let node_route = format!("{}/32", node_ip);
                run_best_effort("ip", &["route", "del", "0.0.0.0/1", "dev", tun]).await;
                run_best_effort("ip", &["route", "del", "128.0.0.0/1", "dev", tun]).await;
                run_best_effort("ip", &["route", "del", node_route.as_str()]).await;
            }
            NetProfile::Node { vpn_subnet } => {
                run_best_effort("iptables", &masquerade_args(vpn_subnet, "-D")).await;
                run_best_effort(
                    "ip",
                    &["route", "del", vpn_subnet.as_str(), "dev", self.tun_name.as_str()],
                )
                .await;
            }
        }
    }

    #[cfg(target_os = "macos")]
    async fn install_macos(&mut self, profile: &NetProfile) -> NetResult<()> {
        match profile {
            NetProfile::Client {
                node_ip,
                gateway_ip,
                node_vpn_ip,
                dns_servers,
            } => {
                run(
                    "route",
                    &["add", "-host", node_ip.as_str(), gateway_ip.as_str()],
                )
                .await?;
                run("route", &["add", "-net", "0.0.0.0/1", node_vpn_ip.as_str()]).await?;
                run("route", &["add", "-net", "128.0.0.0/1", node_vpn_ip.as_str()]).await?;

                if !dns_servers.is_empty() {
                    if let Err(e) = self.setup_dns_macos(dns_servers).await {
                        warn!("DNS setup failed: {}", e);
                    }
                }
            }
            NetProfile::Node { vpn_subnet } => {
                run_tolerant(
                    "route",
                    &["add", "-net", vpn_subnet.as_str(), "-interface", self.tun_name.as_str()],
                )
                .await?;
                run("sysctl", &["-w", "net.inet.ip.forwarding=1"]).await?;

                let nat_rule = format!("nat on en0 from {} to any -> (en0)\n", vpn_subnet);
                let script = format!("echo '{}' | pfctl -ef -", nat_rule);
                if let Err(e) = run("sh", &["-c", &script]).await {
                    warn!("NAT setup failed: {}", e);
                }
            }
        }
        Ok(())
    }

    #[cfg(target_os = "macos")]
    async fn teardown_macos(&mut self, profile: &NetProfile) {
        match profile {
            NetProfile::Client { node_ip, .. } => {
                run_best_effort("route", &["delete", "-net", "0.0.0.0/1"]).await;
                run_best_effort("route", &["delete", "-net", "128.0.0.0/1"]).await;
                run_best_effort("route", &["delete", "-host", node_ip.as_str()]).await;
                self.restore_dns_macos().await;
            }
            NetProfile::Node { vpn_subnet } => {
                run_best_effort("pfctl", &["-d"]).await;
                run_best_effort("route", &["delete", "-net", vpn_subnet.as_str()]).await;
            }
        }
    }

    #[cfg(target_os = "macos")]
    async fn setup_dns_macos(&mut self, dns_servers: &[String]) -> NetResult<()> {
        let service = active_network_service().await;
        if service.is_empty() {
            return Err(NetError::Device(
                "could not detect active network service".to_string(),
            ));
        }

        // Remember the current resolvers so teardown can put them back
        if let Ok(output) = Command::new("networksetup")
            .args(["-getdnsservers", &service])
            .output()
            .await
        {
            let text = String::from_utf8_lossy(&output.stdout);
            for line in text.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.contains("aren't any") {
                    self.original_dns.push(line.to_string());
                }
            }
        }

        let mut args = vec!["-setdnsservers".to_string(), service.clone()];
        args.extend(dns_servers.iter().cloned());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        run("networksetup", &arg_refs).await?;

        info!(service = %service, dns = ?dns_servers, "DNS configured");
        self.network_service = Some(service);
        Ok(())
    }

    #[cfg(target_os = "macos")]
    async fn restore_dns_macos(&mut self) {
        let Some(service) = self.network_service.take() else {
            return;
        };

        let mut args = vec!["-setdnsservers".to_string(), service.clone()];
        if self.original_dns.is_empty() {
            // Back to DHCP-provided resolvers
            args.push("empty".to_string());
        } else {
            args.extend(self.original_dns.drain(..));
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        run_best_effort("networksetup", &arg_refs).await;
        info!(service = %service, "DNS restored");
    }
}

#[cfg(target_os = "linux")]
fn client_route_args_linux<'a>(
    tun_name: &'a str,
    node_ip: &'a str,
    gateway_ip: &'a str,
) -> Vec<Vec<String>> {
    vec![
        vec![
            "route".into(),
            "add".into(),
            format!("{}/32", node_ip),
            "via".into(),
            gateway_ip.into(),
        ],
        vec![
            "route".into(),
            "add".into(),
            "0.0.0.0/1".into(),
            "dev".into(),
            tun_name.into(),
        ],
        vec![
            "route".into(),
            "add".into(),
            "128.0.0.0/1".into(),
            "dev".into(),
            tun_name.into(),
        ],
    ]
}

#[cfg(target_os = "linux")]
fn masquerade_args(vpn_subnet: &str, action: &str) -> Vec<String> {
    vec![
        "-t".into(),
        "nat".into(),
        action.into(),
        "POSTROUTING".into(),
        "-s".into(),
        vpn_subnet.into(),
        "-j".into(),
        "MASQUERADE".into(),
    ]
}

#[cfg(target_os = "macos")]
async fn active_network_service() -> String {
    for service in ["Wi-Fi", "Ethernet", "Thunderbolt Ethernet"] {
        if let Ok(output) = Command::new("networksetup")
            .args(["-getinfo", service])
            .output()
            .await
        {
            if String::from_utf8_lossy(&output.stdout).contains("IP address:") {
                return service.to_string();
            }
        }
    }
    "Wi-Fi".to_string()
}

/// Run a command, failing on non-zero exit
async fn run<S: AsRef<str>>(cmd: &str, args: &[S]) -> NetResult<()> {
    let arg_strs: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    let output = Command::new(cmd)
        .args(&arg_strs)
        .output()
        .await
        .map_err(|e| NetError::Device(format!("{} failed to start: {}", cmd, e)))?;

    if !output.status.success() {
        return Err(NetError::Device(format!(
            "{} {:?} failed: {}",
            cmd,
            arg_strs,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Like [`run`] but treats leftover state from a previous run as success
#[allow(dead_code)]
async fn run_tolerant<S: AsRef<str>>(cmd: &str, args: &[S]) -> NetResult<()> {
    let arg_strs: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    let output = Command::new(cmd)
        .args(&arg_strs)
        .output()
        .await
        .map_err(|e| NetError::Device(format!("{} failed to start: {}", cmd, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.contains("File exists") {
            return Err(NetError::Device(format!(
                "{} {:?} failed: {}",
                cmd,
                arg_strs,
                stderr.trim()
            )));
        }
    }
    Ok(())
}

/// Run a teardown command, logging failures instead of returning them
#[allow(dead_code)]
async fn run_best_effort<S: AsRef<str>>(cmd: &str, args: &[S]) {
    if let Err(e) = run(cmd, args).await {
        warn!("teardown step failed: {}", e);
    }
}

//! TUN device implementation over the `tun` crate

use std::net::Ipv4Addr;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tracing::info;

use super::TunIo;
use crate::error::{NetError, NetResult};
use crate::MTU;

/// TUN device configuration
#[derive(Clone, Debug)]
pub struct TunConfig {
    /// Device name requested from the OS
    pub name: String,

    /// Interface address
    pub address: Ipv4Addr,

    /// Subnet mask
    pub netmask: Ipv4Addr,

    /// Maximum transmission unit
    pub mtu: u16,
}

impl TunConfig {
    /// Standard tunnel configuration for the given interface address
    pub fn new(address: Ipv4Addr) -> Self {
        Self {
            name: "taiga0".to_string(),
            address,
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            mtu: MTU as u16,
        }
    }
}

/// Async TUN device with independent read and write halves
///
/// The halves are split so the ingress and egress pumps can block on the
/// device concurrently.
pub struct TunDevice {
    reader: Mutex<ReadHalf<tun::AsyncDevice>>,
    writer: Mutex<WriteHalf<tun::AsyncDevice>>,
    name: String,
}

impl TunDevice {
    /// Create and bring up the device
    pub fn open(config: &TunConfig) -> NetResult<Self> {
        let mut tun_config = tun::Configuration::default();

        tun_config
            .name(&config.name)
            .address(config.address)
            .netmask(config.netmask)
            .mtu(config.mtu as i32)
            .up();

        #[cfg(target_os = "linux")]
        tun_config.platform(|platform| {
            platform.packet_information(false);
        });

        let device = tun::create_as_async(&tun_config)
            .map_err(|e| NetError::Device(format!("failed to create TUN device: {}", e)))?;

        info!(
            name = %config.name,
            address = %config.address,
            mtu = config.mtu,
            "created TUN device"
        );

        let (reader, writer) = tokio::io::split(device);
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            name: config.name.clone(),
        })
    }
}

#[async_trait]
impl TunIo for TunDevice {
    async fn recv(&self, buf: &mut [u8]) -> NetResult<usize> {
        let mut reader = self.reader.lock().await;
        let n = reader
            .read(buf)
            .await
            .map_err(|e| NetError::Device(format!("TUN read failed: {}", e)))?;
        Ok(n)
    }

    async fn send(&self, packet: &[u8]) -> NetResult<usize> {
        let mut writer = self.writer.lock().await;
        let n = writer
            .write(packet)
            .await
            .map_err(|e| NetError::Device(format!("TUN write failed: {}", e)))?;
        if n != packet.len() {
            return Err(NetError::ShortWrite {
                written: n,
                expected: packet.len(),
            });
        }
        Ok(n)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

//! Virtual interface I/O
//!
//! L3 tunnel device: one IP packet per read, one per write. Address, netmask,
//! and MTU are set when the device is opened; routes, NAT, and DNS are the
//! platform helper's job ([`platform`]).

mod device;
pub mod platform;

pub use device::{TunConfig, TunDevice};
pub use platform::{NetProfile, PlatformConfigurator};

use async_trait::async_trait;

use crate::error::NetResult;

/// Packet-level access to an L3 virtual interface
///
/// The node and client pumps depend on this seam rather than a concrete
/// device so tests can substitute [`crate::mock::MockTun`].
#[async_trait]
pub trait TunIo: Send + Sync {
    /// Read one IP packet into `buf`, returning its length
    async fn recv(&self, buf: &mut [u8]) -> NetResult<usize>;

    /// Write one IP packet, returning the number of bytes accepted
    async fn send(&self, packet: &[u8]) -> NetResult<usize>;

    /// Interface name (e.g. "taiga0")
    fn name(&self) -> &str;
}

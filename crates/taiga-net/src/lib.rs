//! Taiga Network Layer
//!
//! Client and server transports (WebSocket and UDP), virtual-interface I/O,
//! and the platform helper that installs routes, NAT, and DNS around a
//! tunnel session. Mock implementations for protocol-level tests live in
//! [`mock`].

pub mod error;
pub mod mock;
pub mod server;
pub mod transport;
pub mod tun;

pub use error::{NetError, NetResult};
pub use server::{ConnHandle, ConnId, FrameHandler, UdpServer, WsServer};
pub use transport::{connect, Transport, TransportConfig, UdpTransport, WsTransport};
pub use tun::{NetProfile, PlatformConfigurator, TunConfig, TunDevice, TunIo};

/// Tunnel MTU: inner IP packets never exceed this
pub const MTU: usize = 1300;

/// Read buffer size for virtual-interface packet pumps
pub const IFACE_BUFSIZE: usize = 1500;

/// Largest datagram a transport will accept
pub const MAX_DATAGRAM: usize = 65535;

//! Taiga Tunnel Client
//!
//! Registers with a node over the configured transport, then runs two pumps:
//! interface packets sealed and sent up the tunnel, tunnel frames opened and
//! written back to the interface.

pub mod client;
pub mod config;
pub mod error;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};

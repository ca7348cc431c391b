//! In-memory OCPP transport for exercising a central system without sockets.

pub mod client;
pub mod codec;
pub mod error;
pub mod network;
mod pending;
pub mod registry;
pub mod server;

pub use client::{ChargePointClient, PeerReceivers, Responder};
pub use codec::{Frame, WireCodec};
pub use error::TransportError;
pub use network::NetworkOptions;
pub use registry::{address, TransportRegistry};
pub use server::{InMemoryServer, InMemoryServerFactory};
pub use ocpp_core::Server; // Re-export core trait

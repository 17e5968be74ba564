//! Control plane: line-delimited JSON-RPC over TCP

pub mod methods;
pub mod protocol;
pub mod server;

pub use server::ControlPlaneServer;

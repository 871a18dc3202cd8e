//! Daemon wiring and lifecycle.

mod server;

pub use server::Server;

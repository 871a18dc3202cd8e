//! Admin HTTP API.
//!
//! The REST surface over the registry: connector lifecycle, routing rules,
//! filters, dry-run route evaluation, message submission, and the usual
//! health and metrics endpoints.

pub mod handlers;
mod server;

pub use server::{build_router, AdminServer, AdminState};

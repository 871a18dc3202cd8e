//! connectord: control-plane daemon for an SMS gateway's SMPP connectors.
//!
//! The gateway itself terminates SMPP sessions and moves messages; this
//! daemon manages it. It owns the desired-state records for connectors,
//! routing rules and filters, drives the gateway over its administrative
//! Telnet interface, keeps local state reconciled against gateway truth,
//! and exposes the whole thing as a REST API.

pub mod admin;
pub mod bootstrap;
pub mod config;
pub mod events;
pub mod gateway;
pub mod registry;
pub mod routing;
pub mod sync;
pub mod telemetry;

//! Route and filter evaluation.
//!
//! Routes are ordered rules binding filter predicates to target connectors.
//! The external message pipeline consults [`RouteTable::evaluate`] per
//! outbound message and reports delivery outcomes back through the registry.

mod filter;
mod message;
mod table;

pub use filter::{CompiledFilter, Filter, FilterConfigError, FilterType};
pub use message::MessageContext;
pub use table::{Route, RouteMatch, RouteTable, RouteType, RoutingError};

//! Adapters for the [`CommerceBackend`](crate::domain::ports::CommerceBackend) port.

pub mod http;
pub mod in_memory;

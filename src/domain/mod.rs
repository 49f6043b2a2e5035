//! Domain layer: the value types shown by the timeline and the port to the commerce backend.

pub mod log;
pub mod payment;
pub mod ports;
pub mod product;
pub mod step;

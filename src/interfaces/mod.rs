//! Display surfaces that render timeline snapshots.

pub mod console;

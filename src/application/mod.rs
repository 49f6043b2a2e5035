//! Application layer: the timed flow that drives the agent timeline.
//!
//! [`timeline::Timeline`] is a pure state machine over discrete events. The
//! [`orchestrator::Orchestrator`] runs it on tokio as an actor, owning every timer and
//! backend call so that a restart can cancel them.

pub mod log_stream;
pub mod orchestrator;
pub mod timeline;

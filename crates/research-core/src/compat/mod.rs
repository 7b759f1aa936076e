//! Rig compatibility layer
//!
//! Bridges Rig's provider ecosystem into the research engine's
//! [`TextGenerator`](crate::llm::TextGenerator) port.

mod rig_adapter;

pub use rig_adapter::RigGenerator;

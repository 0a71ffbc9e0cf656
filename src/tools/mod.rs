//! Capabilities the model can invoke during an analysis run.

pub mod builtin;
pub mod capability;
pub mod registry;
pub mod store;

pub use capability::{Capability, CapabilityOutput};
pub use registry::CapabilityRegistry;
pub use store::ToolResultStore;

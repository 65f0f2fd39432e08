//! Browser connections: the automation-engine contract, the CDP-backed
//! implementation, and the session/context/page registry.

pub mod cdp;
pub mod engine;
pub mod registry;

pub use engine::{AutomationEngine, BrowserHandle, ContextHandle, DisconnectHook, PageHandle};
pub use registry::BrowserRegistry;

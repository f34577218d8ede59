//! The four long-running components described in §4: Collector, Local
//! Manager, Global Manager, and the Supervisor that launches a configured
//! subset of them sharing one RPC transport.

pub mod collector;
pub mod global_manager;
pub mod local_manager;
pub mod supervisor;

//! An in-process transport for the triple RPC core, plus logging setup for
//! the binaries built on it.

pub mod logging;
pub mod loopback;

pub use loopback::Loopback;
pub use triple_core;

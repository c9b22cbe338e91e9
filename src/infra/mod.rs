//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod storage;
pub mod telemetry;
pub mod transport;

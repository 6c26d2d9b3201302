//! Data models for pgclient.
//!
//! - `options` - Options, the caller-supplied connection record
//! - `pool` - PoolTuning, PoolStatus
//! - `command` - CommandTag

pub mod command;
pub mod options;
pub mod pool;

pub use command::CommandTag;
pub use options::Options;
pub use pool::{PoolStatus, PoolTuning};

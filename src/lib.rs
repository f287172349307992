pub mod adapter;
pub mod config;
pub mod error;
pub mod frame;
pub mod position;
pub mod qtm;
pub mod registry;
pub mod rotation;
pub mod session;
pub mod sink;
pub mod source;

pub use error::{BridgeError, Result};

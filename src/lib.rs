pub mod aggregator;
pub mod calculator;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod persist;
pub mod registry;
pub mod rpc;
pub mod upstream;

pub use config::Settings;
pub use error::{AggrError, AggrResult};

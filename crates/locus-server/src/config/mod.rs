// crates/locus-server/src/config/mod.rs
// Configuration and shared constants

pub mod env;
pub mod file;

pub use env::{ApiKeys, EnvConfig};
pub use file::BrokerConfig;

pub mod cli;
pub mod client;
pub mod config;
pub mod exporter;
pub mod fields;
pub mod logging;
pub mod mapper;
pub mod server;
pub mod signals;
pub mod watcher;

pub use config::Config;
pub use exporter::Exporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Utility modules for bamort-importer

pub mod compression;
pub mod monitored_tx;

pub use compression::{compress, decompress};
pub use monitored_tx::{begin_monitored, MonitoredTransaction};

//! Audit sink implementations and the default sink set.

pub mod console;
pub mod disk;
pub mod log_file;
pub mod network;
pub mod push;

use std::sync::Arc;

pub use console::ConsoleSink;
pub use disk::{DiskSink, LogFileWriters};
pub use log_file::{LogFileCreator, DEFAULT_FILE_TEMPLATE};
pub use network::{NetworkSink, NetworkSinkStats};
pub use push::ServerPushSink;

use crate::application::ports::AuditSink;
use crate::config::AuditConfig;
use crate::domain::ConfigurationError;

pub const CONSOLE_SINK_LABEL: &str = "console";
pub const DISK_SINK_LABEL: &str = "disk";

/// Log file naming from the audit config.
pub fn log_file_creator(config: &AuditConfig) -> Result<LogFileCreator, ConfigurationError> {
    let creator = LogFileCreator::new(&config.log_dir, &config.context);
    match &config.file_template {
        Some(template) => creator.with_template(template),
        None => Ok(creator),
    }
}

/// Console and disk sinks enabled in `config`, as `(label, sink)`.
///
/// One instance of each is shared by every operation that gets the defaults.
pub fn default_sinks(config: &AuditConfig) -> Result<Vec<(&'static str, Arc<dyn AuditSink>)>, ConfigurationError> {
    let mut sinks: Vec<(&'static str, Arc<dyn AuditSink>)> = Vec::new();
    if config.console {
        sinks.push((CONSOLE_SINK_LABEL, Arc::new(ConsoleSink::stdout())));
    }
    if config.disk {
        sinks.push((DISK_SINK_LABEL, Arc::new(DiskSink::new(log_file_creator(config)?))));
    }
    Ok(sinks)
}

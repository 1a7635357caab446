//! Infrastructure layer - audit sinks

pub mod sinks;

pub use sinks::{
    default_sinks, ConsoleSink, DiskSink, LogFileCreator, LogFileWriters, NetworkSink, NetworkSinkStats,
    ServerPushSink,
};

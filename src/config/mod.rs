mod settings;

pub use settings::{LogConfig, RealtimeConfig, Settings};

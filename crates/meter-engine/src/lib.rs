//! `rusty_meter`'s engine: the top-level library wiring the meter-* stage
//! crates into the threaded pipeline of spec.md §5. This is the crate the
//! root package and any external UI/CLI driver link against.

pub mod config;
pub mod engine;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod sink;

pub use config::{CaptureConfig, Config, ConfigError, load_config_from_path, load_config_from_str};
pub use engine::{Engine, EngineError, EngineSnapshot};
pub use metrics::PipelineMetrics;
pub use pipeline::{default_registry, Pipeline, PipelineError};

// Re-exported so embedders can build a `Config`/call control methods
// without depending on the stage crates directly.
pub use meter_session::Mode;

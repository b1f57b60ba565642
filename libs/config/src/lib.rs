//! Domain configuration for the cell messaging kernel
//!
//! - [`DomainConfig`]: domain identity, routing limits, per-cell runtime
//!   settings, codec choice and logging
//! - [`init_tracing`]: global tracing subscriber from [`LoggingConfig`]

pub mod domain_config;
pub mod logging;

pub use domain_config::{
    CellSettings, CodecSettings, DomainConfig, DomainSettings, LoggingConfig, DEFAULT_CONFIG_PATH,
    ENV_PREFIX,
};
pub use logging::init_tracing;

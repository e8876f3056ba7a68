//! Service layer: catalogue access, matching, substitution, the DSP client
//! and the load orchestrator

pub mod catalog_cache;
pub mod catalog_matcher;
pub mod device_monitor;
pub mod dsp_client;
pub mod gain_filter;
pub mod orchestrator;
pub mod substitution;

pub use catalog_cache::CatalogCache;
pub use device_monitor::DeviceMonitor;
pub use dsp_client::DspClient;
pub use orchestrator::{LoadOptions, Orchestrator};

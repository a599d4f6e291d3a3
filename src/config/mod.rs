//! Configuration loading.

mod settings;

pub use settings::{
    CacheConfig, Config, ExportConfig, PortalConfig, ServerConfig, TransportType,
    SESSION_COOKIE_ENV,
};

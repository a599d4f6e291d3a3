//! Registrar: academic portal MCP server
//!
//! Serves a student's grades, term calendar and classroom availability from
//! a university portal over MCP, with per-domain caching so repeated
//! questions do not refetch.

pub mod cache;
pub mod calendar;
pub mod classrooms;
pub mod config;
pub mod entities;
pub mod error;
pub mod export;
pub mod mcp;
pub mod metrics;
pub mod portal;
pub mod service;
pub mod weeks;

pub use cache::{CacheDomain, CacheStats, Freshness, KeyedCache};
pub use calendar::{TermCalendar, WeekPosition};
pub use classrooms::{ClassroomCriteria, ClassroomFinder, ClassroomSearch};
pub use config::Config;
pub use error::{FetchError, NotFoundError, RegistrarError, Result, ValidationError};
pub use mcp::{run_server, RegistrarServer};
pub use metrics::{get_metrics, Metrics, MetricsSnapshot};
pub use portal::{HttpPortalClient, PortalFetcher};
pub use service::RecordsService;
pub use weeks::{WeekMask, WeekSelection};

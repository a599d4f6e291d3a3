//! Response payloads returned by the registrar tools.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::calendar::WeekPosition;
use crate::entities::{
    Building, Classroom, GpaSummary, GradeRecord, GradeTerm, TermDescriptor, TermKey,
};
use crate::metrics::MetricsSnapshot;
use crate::weeks::WeekMask;

/// All grades with the summary loaded alongside them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradesResponse {
    pub total: usize,
    pub records: Vec<GradeRecord>,
    pub gpa: GpaSummary,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeTermsResponse {
    pub total: usize,
    pub terms: Vec<GradeTerm>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermGradesResponse {
    pub term_code: String,
    pub total: usize,
    pub records: Vec<GradeRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    /// Absolute path of the written file.
    pub path: String,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermsResponse {
    pub total: usize,
    pub terms: Vec<TermDescriptor>,
}

/// A term with its first day attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermFirstDayResponse {
    pub term: TermDescriptor,
    pub first_day: NaiveDate,
    pub first_day_weekday: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocateDateResponse {
    pub term: TermKey,
    #[serde(flatten)]
    pub position: WeekPosition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingsResponse {
    pub total: usize,
    pub buildings: Vec<Building>,
}

/// Free classrooms plus the filter that selected them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindClassroomsResponse {
    pub term: TermKey,
    pub building_code: String,
    pub weeks: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekday: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub periods: Option<String>,
    pub total: usize,
    pub bookable_total: usize,
    pub classrooms: Vec<Classroom>,
    pub queried_at: DateTime<Utc>,
}

/// A week set in every representation the tools accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekMaskResponse {
    pub mask: u32,
    pub description: String,
    pub weeks: Vec<u32>,
    pub portal_string: String,
}

impl From<WeekMask> for WeekMaskResponse {
    fn from(mask: WeekMask) -> Self {
        Self {
            mask: mask.bits(),
            description: mask.describe(),
            weeks: mask.weeks().collect(),
            portal_string: mask.to_portal_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub message: String,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub availability_ttl_secs: u64,
    pub domains: Vec<CacheStats>,
    pub metrics: MetricsSnapshot,
    pub uptime_secs: u64,
}

/// A group of related tools in the server catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCategory {
    pub category: String,
    pub tools: Vec<String>,
}

/// What the server offers and how it is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfoResponse {
    pub name: String,
    pub version: String,
    pub portal: String,
    pub session_cookie_configured: bool,
    pub availability_ttl_secs: u64,
    pub features: Vec<String>,
    pub tool_categories: Vec<ToolCategory>,
    pub tips: Vec<String>,
}

/// Body of the HTTP health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when a domain has failed fetches and nothing cached.
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub cache: Vec<CacheStats>,
}

impl HealthResponse {
    pub fn from_stats(cache: Vec<CacheStats>, uptime_secs: u64) -> Self {
        let degraded = cache.iter().any(|d| d.failures > 0 && d.entries == 0);
        Self {
            status: if degraded { "degraded" } else { "ok" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs,
            cache,
        }
    }
}

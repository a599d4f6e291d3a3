//! MCP server implementation for the registrar.

use std::sync::Arc;
use std::time::Instant;

use chrono::Datelike;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::CacheDomain;
use crate::calendar::{parse_date, weekday_name, TermCalendar};
use crate::classrooms::{ClassroomCriteria, ClassroomFinder};
use crate::config::Config;
use crate::error::{RegistrarError, ValidationError};
use crate::export::{confined_export_path, write_grades_csv};
use crate::mcp::tools::{
    BuildingsResponse, CacheStatsResponse, ExportResponse, FindClassroomsResponse,
    GradeTermsResponse, GradesResponse, LocateDateResponse, RefreshResponse, ServerInfoResponse,
    TermFirstDayResponse, TermGradesResponse, TermsResponse, ToolCategory, WeekMaskResponse,
};
use crate::metrics::get_metrics;
use crate::portal::{HttpPortalClient, PortalFetcher};
use crate::service::RecordsService;
use crate::weeks::{WeekMask, WeekSelection};

/// Registrar MCP server state.
pub struct RegistrarState {
    /// Server configuration
    pub config: Config,
    /// Start time for uptime calculation
    pub start_time: Instant,
    /// Cached portal data, shared across sessions
    pub service: Arc<RecordsService>,
    pub calendar: TermCalendar,
    pub finder: ClassroomFinder,
}

impl RegistrarState {
    pub fn new(config: Config, service: Arc<RecordsService>) -> Self {
        Self {
            calendar: TermCalendar::new(Arc::clone(&service)),
            finder: ClassroomFinder::new(Arc::clone(&service)),
            config,
            start_time: Instant::now(),
            service,
        }
    }
}

/// Registrar MCP server handler.
#[derive(Clone)]
pub struct RegistrarServer {
    state: Arc<RegistrarState>,
    tool_router: ToolRouter<Self>,
}

impl RegistrarServer {
    /// Create a server with its own caches over `fetcher`.
    pub fn new(config: Config, fetcher: Arc<dyn PortalFetcher>) -> Self {
        let service = Arc::new(RecordsService::new(fetcher, &config.cache));
        Self::with_service(config, service)
    }

    /// Create a server over an existing service so several sessions share one cache.
    pub fn with_service(config: Config, service: Arc<RecordsService>) -> Self {
        Self {
            state: Arc::new(RegistrarState::new(config, service)),
            tool_router: Self::tool_router(),
        }
    }

    /// Create a server talking to the portal over HTTP.
    pub fn from_config(config: Config) -> crate::error::Result<Self> {
        let client = HttpPortalClient::from_config(&config.portal)?;
        Ok(Self::new(config, Arc::new(client)))
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// The service backing this server.
    pub fn service(&self) -> Arc<RecordsService> {
        Arc::clone(&self.state.service)
    }
}

// Parameters for tools that only take a reload flag
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ReloadParams {
    /// Bypass the cache and fetch fresh data from the portal
    #[serde(default)]
    pub force_reload: Option<bool>,
}

// Parameters for get_term_grades tool
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TermGradesParams {
    /// Term code as listed by list_grade_terms (e.g., '2023-20241')
    pub term_code: String,
}

// Parameters for export_grades_csv tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ExportGradesParams {
    /// File name or relative path inside the export directory; '.csv' is
    /// appended when missing (default: grades.csv)
    #[serde(default)]
    pub filename: Option<String>,
}

// Parameters for get_term_first_day tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TermParams {
    /// Academic year such as '2023-2024' (default: current)
    #[serde(default)]
    pub academic_year: Option<String>,
    /// Term number within the year: 1, 2 or 3 (default: current)
    #[serde(default)]
    pub term: Option<u8>,
    /// Bypass the cache and fetch fresh data from the portal
    #[serde(default)]
    pub force_reload: Option<bool>,
}

// Parameters for locate_date tool
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct LocateDateParams {
    /// Date to locate, YYYY-MM-DD
    pub target_date: String,
    /// Academic year such as '2023-2024' (default: current)
    #[serde(default)]
    pub academic_year: Option<String>,
    /// Term number within the year (default: current)
    #[serde(default)]
    pub term: Option<u8>,
}

// Parameters for query_classroom_availability tool
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AvailabilityParams {
    /// Building code as listed by list_buildings
    pub building_code: String,
    /// Explicit week numbers, e.g. [1, 2, 3]
    #[serde(default)]
    pub week_numbers: Option<Vec<i64>>,
    /// Week spec such as '1-8,10,12-16'; used when week_numbers is absent
    #[serde(default)]
    pub week_spec: Option<String>,
    /// Academic year (default: current)
    #[serde(default)]
    pub academic_year: Option<String>,
    /// Term number (default: current)
    #[serde(default)]
    pub term: Option<u8>,
    /// Bypass the cache and fetch fresh data from the portal
    #[serde(default)]
    pub force_reload: Option<bool>,
}

// Parameters for find_available_classrooms tool
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FindClassroomsParams {
    /// Building code as listed by list_buildings
    pub building_code: String,
    /// Explicit week numbers, e.g. [1, 2, 3]
    #[serde(default)]
    pub week_numbers: Option<Vec<i64>>,
    /// Week spec such as '1-8,10,12-16'; used when week_numbers is absent
    #[serde(default)]
    pub week_spec: Option<String>,
    /// Weekday 1 (Monday) to 7 (Sunday); any day when absent
    #[serde(default)]
    pub weekday: Option<i64>,
    /// First class period of the wanted slot
    #[serde(default)]
    pub start_period: Option<i64>,
    /// Last class period of the wanted slot (default: start_period)
    #[serde(default)]
    pub end_period: Option<i64>,
    /// Minimum number of seats
    #[serde(default)]
    pub min_seats: Option<i64>,
    /// Require (true) or exclude (false) movable seating
    #[serde(default)]
    pub movable_seats: Option<bool>,
    /// Require (true) or exclude (false) tiered seating
    #[serde(default)]
    pub tiered: Option<bool>,
    /// Academic year (default: current)
    #[serde(default)]
    pub academic_year: Option<String>,
    /// Term number (default: current)
    #[serde(default)]
    pub term: Option<u8>,
    /// Bypass the cache and fetch fresh data from the portal
    #[serde(default)]
    pub force_reload: Option<bool>,
}

// Parameters for encode_weeks tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct EncodeWeeksParams {
    /// Explicit week numbers, e.g. [1, 2, 3]
    #[serde(default)]
    pub week_numbers: Option<Vec<i64>>,
    /// Week spec such as '1-8,10,12-16'; used when week_numbers is absent
    #[serde(default)]
    pub week_spec: Option<String>,
}

// Parameters for describe_week_mask tool
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DescribeMaskParams {
    /// Bit mask where bit 0 is week 1
    pub mask: u32,
}

#[tool_router]
impl RegistrarServer {
    #[tool(description = "Get all grade records with the GPA summary.")]
    pub async fn get_grades(
        &self,
        Parameters(params): Parameters<ReloadParams>,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .state
            .service
            .grade_book(params.force_reload.unwrap_or(false))
            .await
            .map(|book| GradesResponse {
                total: book.records.len(),
                records: book.records.clone(),
                gpa: book.gpa.clone(),
                loaded_at: book.loaded_at,
            });
        respond(result)
    }

    #[tool(description = "Get the GPA summary: GPA, averages, rank and cohort size.")]
    pub async fn get_gpa(
        &self,
        Parameters(params): Parameters<ReloadParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.state
                .service
                .gpa(params.force_reload.unwrap_or(false))
                .await,
        )
    }

    #[tool(description = "List the terms that have grade records, newest first.")]
    pub async fn list_grade_terms(&self) -> Result<CallToolResult, McpError> {
        let result = self
            .state
            .service
            .grade_terms()
            .await
            .map(|terms| GradeTermsResponse {
                total: terms.len(),
                terms,
            });
        respond(result)
    }

    #[tool(description = "Get the grade records of one term.")]
    pub async fn get_term_grades(
        &self,
        Parameters(params): Parameters<TermGradesParams>,
    ) -> Result<CallToolResult, McpError> {
        let term_code = params.term_code.trim().to_string();
        let result = self
            .state
            .service
            .term_grades(&term_code)
            .await
            .map(|records| TermGradesResponse {
                term_code,
                total: records.len(),
                records,
            });
        respond(result)
    }

    #[tool(
        description = "Export all grades and the GPA summary to a UTF-8 CSV file. Returns the absolute path."
    )]
    pub async fn export_grades_csv(
        &self,
        Parameters(params): Parameters<ExportGradesParams>,
    ) -> Result<CallToolResult, McpError> {
        let result = async {
            let path =
                confined_export_path(&self.state.config.export_dir(), params.filename.as_deref())?;
            let book = self.state.service.grade_book(false).await?;
            let written = write_grades_csv(&book, &path).await?;
            Ok::<_, RegistrarError>(ExportResponse {
                path: written.display().to_string(),
                records: book.records.len(),
            })
        }
        .await;
        respond(result)
    }

    #[tool(description = "Get the current academic year and term.")]
    pub async fn get_current_term(
        &self,
        Parameters(params): Parameters<ReloadParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.state
                .calendar
                .current_term(params.force_reload.unwrap_or(false))
                .await,
        )
    }

    #[tool(description = "List every academic term the portal knows.")]
    pub async fn list_terms(
        &self,
        Parameters(params): Parameters<ReloadParams>,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .state
            .service
            .terms(params.force_reload.unwrap_or(false))
            .await
            .map(|terms| TermsResponse {
                total: terms.len(),
                terms: terms.as_ref().clone(),
            });
        respond(result)
    }

    #[tool(description = "Get the first calendar day of a term (default: current term).")]
    pub async fn get_term_first_day(
        &self,
        Parameters(params): Parameters<TermParams>,
    ) -> Result<CallToolResult, McpError> {
        let calendar = &self.state.calendar;
        let result = async {
            let term = calendar.resolve_term(params.academic_year, params.term).await?;
            let first_day = calendar
                .first_day_of(&term, params.force_reload.unwrap_or(false))
                .await?;
            let descriptor = calendar.find_term(&term).await?.with_first_day(first_day);
            Ok::<_, RegistrarError>(TermFirstDayResponse {
                term: descriptor,
                first_day,
                first_day_weekday: weekday_name(first_day.weekday()).to_string(),
            })
        }
        .await;
        respond(result)
    }

    #[tool(description = "Find the term week number and weekday of a date.")]
    pub async fn locate_date(
        &self,
        Parameters(params): Parameters<LocateDateParams>,
    ) -> Result<CallToolResult, McpError> {
        let calendar = &self.state.calendar;
        let result = async {
            let target = parse_date(&params.target_date)?;
            let (term, position) = calendar
                .locate(target, params.academic_year, params.term)
                .await?;
            Ok::<_, RegistrarError>(LocateDateResponse { term, position })
        }
        .await;
        respond(result)
    }

    #[tool(description = "List teaching buildings with their codes.")]
    pub async fn list_buildings(
        &self,
        Parameters(params): Parameters<ReloadParams>,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .state
            .service
            .buildings(params.force_reload.unwrap_or(false))
            .await
            .map(|buildings| BuildingsResponse {
                total: buildings.len(),
                buildings: buildings.as_ref().clone(),
            });
        respond(result)
    }

    #[tool(
        description = "Get the raw classroom list and occupancy of a building for a set of weeks."
    )]
    pub async fn query_classroom_availability(
        &self,
        Parameters(params): Parameters<AvailabilityParams>,
    ) -> Result<CallToolResult, McpError> {
        let result = async {
            let weeks = week_selection(params.week_numbers, params.week_spec)?;
            let availability = self
                .state
                .finder
                .availability(
                    params.academic_year,
                    params.term,
                    &params.building_code,
                    &weeks,
                    params.force_reload.unwrap_or(false),
                )
                .await?;
            Ok::<_, RegistrarError>(availability.as_ref().clone())
        }
        .await;
        respond(result)
    }

    #[tool(
        description = "Find classrooms free for the given weeks, weekday and periods, sorted by seats."
    )]
    pub async fn find_available_classrooms(
        &self,
        Parameters(params): Parameters<FindClassroomsParams>,
    ) -> Result<CallToolResult, McpError> {
        let result = async {
            let weeks = week_selection(params.week_numbers, params.week_spec)?;
            let periods = match (params.start_period, params.end_period) {
                (Some(start), Some(end)) => Some((start, end)),
                (Some(period), None) | (None, Some(period)) => Some((period, period)),
                (None, None) => None,
            };
            let criteria = ClassroomCriteria {
                academic_year: params.academic_year,
                term: params.term,
                weekday: params.weekday,
                periods,
                min_seats: params.min_seats,
                movable_seats: params.movable_seats,
                tiered: params.tiered,
                force_reload: params.force_reload.unwrap_or(false),
                ..ClassroomCriteria::new(params.building_code, weeks)
            };
            let search = self.state.finder.find_available(&criteria).await?;
            Ok::<_, RegistrarError>(FindClassroomsResponse {
                term: search.key.term.clone(),
                building_code: search.key.building_code.clone(),
                weeks: search.key.weeks.describe(),
                weekday: criteria.weekday,
                periods: periods.map(|(start, end)| format!("{}-{}", start, end)),
                total: search.classrooms.len(),
                bookable_total: search.bookable_total,
                classrooms: search.classrooms,
                queried_at: search.queried_at,
            })
        }
        .await;
        respond(result)
    }

    #[tool(
        description = "Encode week numbers or a week spec into the week bit mask and the portal's week string."
    )]
    pub async fn encode_weeks(
        &self,
        Parameters(params): Parameters<EncodeWeeksParams>,
    ) -> Result<CallToolResult, McpError> {
        let result = week_selection(params.week_numbers, params.week_spec)
            .and_then(|selection| selection.to_mask().map_err(RegistrarError::from))
            .map(WeekMaskResponse::from);
        respond(result)
    }

    #[tool(description = "Describe a week bit mask as compact ranges such as '1-8,10'.")]
    pub async fn describe_week_mask(
        &self,
        Parameters(params): Parameters<DescribeMaskParams>,
    ) -> Result<CallToolResult, McpError> {
        let result = WeekMask::from_bits(params.mask)
            .map(WeekMaskResponse::from)
            .map_err(RegistrarError::from);
        respond(result)
    }

    #[tool(description = "Drop all cached portal data. The next query of each kind refetches.")]
    pub async fn refresh_cache(&self) -> Result<CallToolResult, McpError> {
        self.state.service.invalidate_all();
        respond(Ok(RefreshResponse {
            message: "All cached portal data invalidated".to_string(),
            domains: CacheDomain::ALL.iter().map(|d| d.to_string()).collect(),
        }))
    }

    #[tool(description = "Describe the server: features, tools by category, usage tips and portal settings.")]
    pub async fn get_server_info(&self) -> Result<CallToolResult, McpError> {
        let config = &self.state.config;
        respond(Ok(ServerInfoResponse {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            portal: config.portal.base_url.clone(),
            session_cookie_configured: config.portal.session_cookie.is_some(),
            availability_ttl_secs: config.cache.availability_ttl_secs,
            features: to_strings(FEATURES),
            tool_categories: TOOL_CATEGORIES
                .iter()
                .map(|(category, tools)| ToolCategory {
                    category: category.to_string(),
                    tools: to_strings(tools),
                })
                .collect(),
            tips: to_strings(TIPS),
        }))
    }

    #[tool(description = "Get cache activity per data domain and server metrics.")]
    pub async fn get_cache_stats(&self) -> Result<CallToolResult, McpError> {
        let metrics = get_metrics();
        metrics.update_uptime();
        respond(Ok(CacheStatsResponse {
            availability_ttl_secs: self.state.config.cache.availability_ttl_secs,
            domains: self.state.service.cache_stats(),
            metrics: metrics.export_json(),
            uptime_secs: self.state.start_time.elapsed().as_secs(),
        }))
    }
}

#[tool_handler]
impl ServerHandler for RegistrarServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Registrar answers questions about a student's academic portal. \
                 Use 'get_grades' and 'get_gpa' for results, 'get_current_term' and \
                 'locate_date' for the term calendar, and 'find_available_classrooms' \
                 to look for free rooms. Portal data is cached; pass force_reload or \
                 call 'refresh_cache' to refetch. 'get_server_info' lists every tool."
                    .to_string(),
            ),
        }
    }
}

const FEATURES: &[&str] = &[
    "Grade records with GPA, averages and rank",
    "Per-term grade views and CSV export",
    "Term calendar: current term, first days, week and weekday of a date",
    "Free classroom search by weeks, weekday, periods, seats and room type",
    "Week spec and bit mask conversion",
    "Cached portal data with refresh and statistics",
];

const TOOL_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "grades",
        &["get_grades", "get_gpa", "list_grade_terms", "get_term_grades", "export_grades_csv"],
    ),
    (
        "calendar",
        &["get_current_term", "list_terms", "get_term_first_day", "locate_date"],
    ),
    (
        "classrooms",
        &["list_buildings", "query_classroom_availability", "find_available_classrooms"],
    ),
    ("weeks", &["encode_weeks", "describe_week_mask"]),
    ("cache", &["refresh_cache", "get_cache_stats", "get_server_info"]),
];

const TIPS: &[&str] = &[
    "Week specs look like '1-8,10,12-16'; week numbers start at 1",
    "Weekday runs from 1 (Monday) to 7 (Sunday)",
    "Omit academic_year and term to use the current term",
    "Call list_buildings first to get building codes for classroom searches",
    "Pass force_reload or call refresh_cache after the portal data changes",
];

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn week_selection(
    week_numbers: Option<Vec<i64>>,
    week_spec: Option<String>,
) -> crate::error::Result<WeekSelection> {
    WeekSelection::from_parts(week_numbers, week_spec)
        .ok_or_else(|| ValidationError::EmptyWeekSelection.into())
}

/// Turn a service result into a tool result.
///
/// Bad input becomes an invalid-params error; portal failures become a tool
/// error result so the client can show the message.
fn respond<T: Serialize>(result: crate::error::Result<T>) -> Result<CallToolResult, McpError> {
    get_metrics().tool_calls_total.inc();
    match result {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value).map_err(|e| {
                McpError::internal_error(format!("Failed to serialize response: {}", e), None)
            })?;
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
        Err(e) if e.is_caller_error() => Err(McpError::invalid_params(e.to_string(), None)),
        Err(e) => {
            warn!(error = %e, "Tool call failed");
            Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
        }
    }
}

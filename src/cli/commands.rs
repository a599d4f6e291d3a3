//! CLI command handlers.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use registrar::{
    calendar::{parse_date, TermCalendar},
    classrooms::{parse_period_spec, ClassroomCriteria, ClassroomFinder},
    export::{export_path, write_grades_csv},
    mcp::{
        BuildingsResponse, ExportResponse, FindClassroomsResponse, GradesResponse,
        LocateDateResponse, TermGradesResponse, TermsResponse, WeekMaskResponse,
    },
    weeks::{WeekMask, WeekSelection},
    Config, HttpPortalClient, RecordsService,
};

use super::output;

/// Services shared by the one-shot commands.
pub struct CliContext {
    pub config: Config,
    pub service: Arc<RecordsService>,
    pub calendar: TermCalendar,
    pub finder: ClassroomFinder,
}

impl CliContext {
    /// Connect to the portal described by `config`.
    pub fn connect(config: Config) -> Result<Self> {
        let client = HttpPortalClient::from_config(&config.portal)
            .context("Failed to create portal client")?;
        let service = Arc::new(RecordsService::new(Arc::new(client), &config.cache));
        Ok(Self {
            calendar: TermCalendar::new(Arc::clone(&service)),
            finder: ClassroomFinder::new(Arc::clone(&service)),
            service,
            config,
        })
    }
}

/// Filters accepted by the classrooms command.
#[derive(Debug, Clone, Default)]
pub struct ClassroomArgs {
    pub building: String,
    pub weeks: String,
    pub weekday: Option<i64>,
    pub periods: Option<String>,
    pub min_seats: Option<i64>,
    pub movable: Option<bool>,
    pub tiered: Option<bool>,
    pub year: Option<String>,
    pub term: Option<u8>,
}

/// Run the grades command, optionally limited to one term.
pub async fn run_grades(ctx: &CliContext, term: Option<String>, json: bool) -> Result<()> {
    match term {
        Some(term_code) => {
            let records = ctx.service.term_grades(&term_code).await?;
            let result = TermGradesResponse {
                term_code,
                total: records.len(),
                records,
            };
            output::print_term_grades(&result, json)
        }
        None => {
            let book = ctx.service.grade_book(false).await?;
            let result = GradesResponse {
                total: book.records.len(),
                records: book.records.clone(),
                gpa: book.gpa.clone(),
                loaded_at: book.loaded_at,
            };
            output::print_grades(&result, json)
        }
    }
}

/// Run the gpa command.
pub async fn run_gpa(ctx: &CliContext, json: bool) -> Result<()> {
    let gpa = ctx.service.gpa(false).await?;
    output::print_gpa(&gpa, json)
}

/// Run the terms command.
pub async fn run_terms(ctx: &CliContext, json: bool) -> Result<()> {
    let terms = ctx.service.terms(false).await?;
    let result = TermsResponse {
        total: terms.len(),
        terms: terms.as_ref().clone(),
    };
    output::print_terms(&result, json)
}

/// Run the current-term command.
pub async fn run_current_term(ctx: &CliContext, json: bool) -> Result<()> {
    let current = ctx.calendar.current_term(false).await?;
    let descriptor = match ctx.service.term_first_day(&current.key, false).await {
        Ok(first_day) => current.with_first_day(first_day),
        Err(e) => {
            tracing::warn!(term = %current.key, error = %e, "First day unavailable");
            current
        }
    };
    output::print_term(&descriptor, json)
}

/// Run the locate command.
pub async fn run_locate(
    ctx: &CliContext,
    date: Option<String>,
    year: Option<String>,
    term: Option<u8>,
    json: bool,
) -> Result<()> {
    let target = match date {
        Some(text) => parse_date(&text)?,
        None => chrono::Local::now().date_naive(),
    };
    let (term, position) = ctx.calendar.locate(target, year, term).await?;
    output::print_position(&LocateDateResponse { term, position }, json)
}

/// Run the buildings command.
pub async fn run_buildings(ctx: &CliContext, json: bool) -> Result<()> {
    let buildings = ctx.service.buildings(false).await?;
    let result = BuildingsResponse {
        total: buildings.len(),
        buildings: buildings.as_ref().clone(),
    };
    output::print_buildings(&result, json)
}

/// Run the classrooms command.
pub async fn run_classrooms(ctx: &CliContext, args: ClassroomArgs, json: bool) -> Result<()> {
    let periods = args.periods.as_deref().map(parse_period_spec).transpose()?;
    let criteria = ClassroomCriteria {
        academic_year: args.year,
        term: args.term,
        weekday: args.weekday,
        periods,
        min_seats: args.min_seats,
        movable_seats: args.movable,
        tiered: args.tiered,
        ..ClassroomCriteria::new(args.building, WeekSelection::Spec(args.weeks))
    };
    let search = ctx.finder.find_available(&criteria).await?;
    let result = FindClassroomsResponse {
        term: search.key.term.clone(),
        building_code: search.key.building_code.clone(),
        weeks: search.key.weeks.describe(),
        weekday: criteria.weekday,
        periods: periods.map(|(start, end)| format!("{}-{}", start, end)),
        total: search.classrooms.len(),
        bookable_total: search.bookable_total,
        classrooms: search.classrooms,
        queried_at: search.queried_at,
    };
    output::print_classrooms(&result, json)
}

/// Run the weeks command: encode a spec, or describe a raw mask. Needs no
/// portal access.
pub fn run_weeks(spec: Option<String>, mask: Option<u32>, json: bool) -> Result<()> {
    let mask = match (mask, spec) {
        (Some(bits), _) => WeekMask::from_bits(bits)?,
        (None, Some(spec)) => WeekSelection::Spec(spec).to_mask()?,
        (None, None) => anyhow::bail!("Give a week spec such as '1-8,10' or --mask"),
    };
    output::print_weeks(&WeekMaskResponse::from(mask), json)
}

/// Run the export command.
pub async fn run_export(ctx: &CliContext, path: Option<String>, json: bool) -> Result<()> {
    let target = export_path(&ctx.config.export_dir(), path.as_deref());
    let book = ctx.service.grade_book(false).await?;
    let written = write_grades_csv(&book, &target).await?;
    let result = ExportResponse {
        path: written.display().to_string(),
        records: book.records.len(),
    };
    output::print_export(&result, json)
}

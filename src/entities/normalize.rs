//! Conversion of raw portal records into typed entities.
//!
//! Raw records are string-keyed JSON objects exactly as the portal returns
//! them. Values may arrive as strings or numbers; every accessor here accepts
//! both. List normalizers skip records that cannot be interpreted and log a
//! warning, so one malformed row never discards a whole load.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::warn;

use crate::error::{FetchError, FetchResult};
use crate::portal::{RawClassroomReport, RawGradeReport, RawRecord};
use crate::weeks::{WeekMask, PORTAL_MASK_LEN};

use super::types::{
    AvailabilityKey, Building, Classroom, ClassroomAvailability, GpaSummary, GradeBook,
    GradeRecord, OccupancySlot, PeriodRange, Score, TermDescriptor, TermKey,
};

/// Portal field names.
mod field {
    // grade rows
    pub const COURSE_ID: &str = "kcdm";
    pub const COURSE_NAME: &str = "kcmc";
    pub const COURSE_NAME_EN: &str = "kcmc_en";
    pub const CREDIT: &str = "xf";
    pub const TERM_CODE: &str = "xnxq";
    pub const TERM_NAME: &str = "xnxqmc";
    pub const SCORE: &str = "zzcj";
    pub const RAW_SCORE: &str = "zzzscj";
    pub const EXAM_TYPE: &str = "khfs";
    pub const COURSE_TYPE: &str = "kcxz";
    pub const COURSE_CATEGORY: &str = "kclb";
    pub const DEPARTMENT: &str = "yxmc";
    pub const PASS_FLAG: &str = "sfjg";
    pub const RETAKE_FLAG: &str = "sfyfx";
    pub const COURSE_RANK: &str = "pm";
    pub const COURSE_COHORT: &str = "zrs";

    // GPA summary
    pub const GPA: &str = "GPA";
    pub const ALL_COURSE_GPA: &str = "GPA_QBJQKC";
    pub const AVERAGE: &str = "PJXFJ";
    pub const ALL_COURSE_AVERAGE: &str = "QBKCPJXFJ";
    pub const RANK: &str = "PM";
    pub const COHORT: &str = "ZRS";
    pub const PASSED: &str = "TGKC";
    pub const CREDIT_EARNED: &str = "HDXF";

    // term list
    pub const YEAR: &str = "xn";
    pub const ORDINAL: &str = "xq";
    pub const YEAR_NAME: &str = "xnmc";
    pub const YEAR_NAME_EN: &str = "xnmc_en";
    pub const ORDINAL_NAME: &str = "xqmc";
    pub const ORDINAL_NAME_EN: &str = "xqmc_en";

    // current term
    pub const CURRENT_YEAR: &str = "XN";
    pub const CURRENT_ORDINAL: &str = "XQ";

    // term calendar
    pub const CALENDAR_DATE: &str = "RQ";

    // buildings and classrooms
    pub const NAME: &str = "MC";
    pub const CODE: &str = "DM";
    pub const NAME_EN: &str = "MC_EN";
    pub const SEATS: &str = "ZWS";
    pub const BOOKABLE: &str = "SFKJ";
    pub const MOVABLE_SEATS: &str = "ZYSFKYD";
    pub const TIERED: &str = "SFJTJS";
    pub const ROW_ID: &str = "ROW_ID";

    // occupancy
    pub const ROOM_CODE: &str = "CDDM";
    pub const WEEKDAY: &str = "XQJ";
    pub const PERIOD: &str = "XJ";
    pub const PERIOD_START: &str = "KSJC";
    pub const PERIOD_END: &str = "JSJC";
    pub const WEEKS: &str = "ZC";
    pub const REASON: &str = "PKBJ";
}

// ============================================================================
// Field accessors
// ============================================================================

fn text(raw: &RawRecord, key: &str) -> String {
    match raw.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn optional_text(raw: &RawRecord, key: &str) -> Option<String> {
    let value = text(raw, key);
    (!value.is_empty()).then_some(value)
}

fn required_text(raw: &RawRecord, key: &str) -> FetchResult<String> {
    optional_text(raw, key).ok_or_else(|| FetchError::MissingField(key.to_string()))
}

fn number(raw: &RawRecord, key: &str) -> Option<f64> {
    match raw.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn count(raw: &RawRecord, key: &str) -> Option<u32> {
    number(raw, key)
        .filter(|v| *v >= 0.0 && v.fract() == 0.0 && *v <= f64::from(u32::MAX))
        .map(|v| v as u32)
}

fn flag(raw: &RawRecord, key: &str, truthy: &str) -> bool {
    text(raw, key) == truthy
}

/// Normalize each record, skipping and logging the ones that fail.
fn normalize_all<T>(
    kind: &str,
    raws: &[RawRecord],
    normalize: impl Fn(&RawRecord) -> FetchResult<T>,
) -> Vec<T> {
    raws.iter()
        .enumerate()
        .filter_map(|(index, raw)| match normalize(raw) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!(kind, index, error = %e, "Skipping malformed raw record");
                None
            }
        })
        .collect()
}

// ============================================================================
// Grades
// ============================================================================

/// Normalize one grade row.
pub fn grade_record(raw: &RawRecord) -> FetchResult<GradeRecord> {
    // ranks of 0 mean "not ranked"
    let rank = count(raw, field::COURSE_RANK).filter(|r| *r > 0);
    let cohort_size = count(raw, field::COURSE_COHORT).filter(|n| *n > 0);

    Ok(GradeRecord {
        course_id: required_text(raw, field::COURSE_ID)?,
        course_name: text(raw, field::COURSE_NAME),
        course_name_en: text(raw, field::COURSE_NAME_EN),
        credit: number(raw, field::CREDIT).unwrap_or(0.0).max(0.0),
        term_code: text(raw, field::TERM_CODE),
        term_name: text(raw, field::TERM_NAME),
        score: Score::from_raw(&text(raw, field::SCORE)),
        raw_score: Score::from_raw(&text(raw, field::RAW_SCORE)),
        exam_type: text(raw, field::EXAM_TYPE),
        course_type: text(raw, field::COURSE_TYPE),
        course_category: text(raw, field::COURSE_CATEGORY),
        department: text(raw, field::DEPARTMENT),
        passed: flag(raw, field::PASS_FLAG, "0"),
        retake: flag(raw, field::RETAKE_FLAG, "1"),
        rank,
        cohort_size,
    })
}

/// Build the grade book: records in portal order plus the GPA summary.
pub fn grade_book(report: &RawGradeReport, loaded_at: DateTime<Utc>) -> GradeBook {
    let records = normalize_all("grade", &report.records, grade_record);
    let gpa = gpa_summary(report.summary.as_ref(), &records);
    GradeBook {
        records,
        gpa,
        loaded_at,
    }
}

/// Combine the portal's official summary with values derived from the
/// records. Portal values win; derivable gaps are filled from the records.
pub fn gpa_summary(summary: Option<&RawRecord>, records: &[GradeRecord]) -> GpaSummary {
    let passed: Vec<&GradeRecord> = records.iter().filter(|r| r.passed).collect();
    let derived_passed = passed.len() as u32;
    let derived_credit: f64 = passed.iter().map(|r| r.credit).sum();
    let derived_average = credit_weighted_average(records);

    let official = |key: &str| summary.and_then(|raw| number(raw, key));
    let rank = summary.and_then(|raw| count(raw, field::RANK)).unwrap_or(0);
    let cohort_size = summary.and_then(|raw| count(raw, field::COHORT)).unwrap_or(0);

    GpaSummary {
        gpa: official(field::GPA).unwrap_or(0.0),
        all_course_gpa: official(field::ALL_COURSE_GPA).unwrap_or(0.0),
        average_score: official(field::AVERAGE).unwrap_or(derived_average),
        all_course_average: official(field::ALL_COURSE_AVERAGE).unwrap_or(derived_average),
        rank,
        cohort_size,
        rank_percentage: rank_percentage(rank, cohort_size),
        passed_courses: summary
            .and_then(|raw| count(raw, field::PASSED))
            .unwrap_or(derived_passed),
        total_credit: official(field::CREDIT_EARNED).unwrap_or(derived_credit),
    }
}

fn credit_weighted_average(records: &[GradeRecord]) -> f64 {
    let (weighted, credits) = records
        .iter()
        .filter_map(|r| r.score.as_number().map(|score| (score, r.credit)))
        .filter(|(_, credit)| *credit > 0.0)
        .fold((0.0, 0.0), |(sum, total), (score, credit)| {
            (sum + score * credit, total + credit)
        });
    if credits > 0.0 {
        round2(weighted / credits)
    } else {
        0.0
    }
}

fn rank_percentage(rank: u32, cohort_size: u32) -> f64 {
    if cohort_size == 0 {
        return 0.0;
    }
    round2(f64::from(rank) / f64::from(cohort_size) * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// Terms
// ============================================================================

fn term_ordinal(raw: &RawRecord, key: &str) -> FetchResult<u8> {
    let value = required_text(raw, key)?;
    value
        .parse::<u8>()
        .map_err(|_| FetchError::Decode(format!("term ordinal '{}' is not a number", value)))
}

/// Normalize one entry of the term list.
pub fn term_descriptor(raw: &RawRecord) -> FetchResult<TermDescriptor> {
    Ok(TermDescriptor {
        key: TermKey::new(
            required_text(raw, field::YEAR)?,
            term_ordinal(raw, field::ORDINAL)?,
        ),
        year_name: text(raw, field::YEAR_NAME),
        year_name_en: text(raw, field::YEAR_NAME_EN),
        term_name: text(raw, field::ORDINAL_NAME),
        term_name_en: text(raw, field::ORDINAL_NAME_EN),
        first_day: None,
    })
}

pub fn term_list(raws: &[RawRecord]) -> Vec<TermDescriptor> {
    normalize_all("term", raws, term_descriptor)
}

/// Normalize the portal's current-term signal.
pub fn current_term(raw: &RawRecord) -> FetchResult<TermKey> {
    Ok(TermKey::new(
        required_text(raw, field::CURRENT_YEAR)?,
        term_ordinal(raw, field::CURRENT_ORDINAL)?,
    ))
}

/// Normalize the first entry of a term calendar into the term's first day.
pub fn term_first_day(raw: &RawRecord) -> FetchResult<NaiveDate> {
    let value = required_text(raw, field::CALENDAR_DATE)?;
    NaiveDate::parse_from_str(&value, "%Y-%m-%d")
        .map_err(|e| FetchError::Decode(format!("calendar date '{}': {}", value, e)))
}

// ============================================================================
// Buildings, classrooms, occupancy
// ============================================================================

pub fn building(raw: &RawRecord) -> FetchResult<Building> {
    Ok(Building {
        code: required_text(raw, field::CODE)?,
        name: text(raw, field::NAME),
        name_en: optional_text(raw, field::NAME_EN),
    })
}

pub fn building_list(raws: &[RawRecord]) -> Vec<Building> {
    normalize_all("building", raws, building)
}

pub fn classroom(raw: &RawRecord) -> FetchResult<Classroom> {
    Ok(Classroom {
        code: required_text(raw, field::CODE)?,
        name: text(raw, field::NAME),
        name_en: text(raw, field::NAME_EN),
        seats: count(raw, field::SEATS).unwrap_or(0),
        is_available: flag(raw, field::BOOKABLE, "1"),
        has_movable_seats: flag(raw, field::MOVABLE_SEATS, "1"),
        is_tiered: flag(raw, field::TIERED, "1"),
        order_key: count(raw, field::ROW_ID).unwrap_or(0),
    })
}

fn period(raw: &RawRecord, key: &str) -> Option<u8> {
    count(raw, key)
        .filter(|p| (1..=u32::from(u8::MAX)).contains(p))
        .map(|p| p as u8)
}

/// Normalize one occupancy row. Rows without week information inherit
/// `requested_weeks`, since the portal filters them by week already.
///
/// A row is only rejected when it names no classroom. Any other field that
/// cannot be decoded widens the slot (all requested weeks, every day, every
/// period) so the room still counts as taken.
pub fn occupancy_slot(raw: &RawRecord, requested_weeks: WeekMask) -> FetchResult<OccupancySlot> {
    let classroom_code = required_text(raw, field::ROOM_CODE)?;

    let weekday = count(raw, field::WEEKDAY)
        .filter(|d| (1..=7).contains(d))
        .map(|d| d as u8);
    if weekday.is_none() {
        warn!(classroom = %classroom_code, "Occupancy row without a usable weekday, blocking every day");
    }

    let periods = match (
        period(raw, field::PERIOD_START),
        period(raw, field::PERIOD_END),
        period(raw, field::PERIOD),
    ) {
        (Some(start), Some(end), _) if start <= end => Some(PeriodRange { start, end }),
        (_, _, Some(single)) => Some(PeriodRange::single(single)),
        _ => {
            warn!(classroom = %classroom_code, "Occupancy row without usable class periods, blocking every period");
            None
        }
    };

    let weeks = match optional_text(raw, field::WEEKS) {
        None => requested_weeks,
        Some(text) => {
            let parsed = if text.len() == PORTAL_MASK_LEN {
                WeekMask::from_portal_string(&text)
            } else {
                WeekMask::parse(&text)
            };
            parsed.unwrap_or_else(|e| {
                warn!(classroom = %classroom_code, weeks = %text, error = %e, "Undecodable occupancy weeks, using the requested weeks");
                requested_weeks
            })
        }
    };

    Ok(OccupancySlot {
        classroom_code,
        weekday,
        periods,
        weeks,
        reason: text(raw, field::REASON),
    })
}

/// Normalize a building's classrooms and occupancy for one query key.
pub fn classroom_availability(
    key: AvailabilityKey,
    report: &RawClassroomReport,
    queried_at: DateTime<Utc>,
) -> ClassroomAvailability {
    let classrooms = normalize_all("classroom", &report.classrooms, classroom);
    let occupancies = normalize_all("occupancy", &report.occupancies, |raw| {
        occupancy_slot(raw, key.weeks)
    });
    ClassroomAvailability {
        key,
        classrooms,
        occupancies,
        queried_at,
    }
}

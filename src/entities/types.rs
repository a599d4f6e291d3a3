//! Normalized academic-record entities.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::weeks::WeekMask;

// ============================================================================
// Grades
// ============================================================================

/// A course score as the portal reports it: a number, or a textual status
/// such as "Pass" or "Exempt".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Score {
    Numeric(f64),
    Status(String),
    Missing,
}

impl Score {
    /// Classify a raw score string.
    pub fn from_raw(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::Missing;
        }
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Self::Numeric(value),
            _ => Self::Status(raw.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Numeric(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(value) => write!(f, "{}", value),
            Self::Status(status) => f.write_str(status),
            Self::Missing => Ok(()),
        }
    }
}

/// One course result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub course_id: String,
    pub course_name: String,
    pub course_name_en: String,
    /// Non-negative credit value.
    pub credit: f64,
    /// Portal term code, e.g. `2023-20241`.
    pub term_code: String,
    pub term_name: String,
    pub score: Score,
    pub raw_score: Score,
    pub exam_type: String,
    pub course_type: String,
    pub course_category: String,
    pub department: String,
    pub passed: bool,
    pub retake: bool,
    /// Absent when the portal omits ranking for the course.
    pub rank: Option<u32>,
    pub cohort_size: Option<u32>,
}

/// GPA and ranking metrics for the whole transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpaSummary {
    pub gpa: f64,
    pub all_course_gpa: f64,
    pub average_score: f64,
    pub all_course_average: f64,
    pub rank: u32,
    pub cohort_size: u32,
    /// `rank / cohort_size * 100`, two decimals; 0 when the cohort is unknown.
    pub rank_percentage: f64,
    pub passed_courses: u32,
    pub total_credit: f64,
}

/// The unit cached per grade load: every record in portal order plus the
/// summary computed alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBook {
    pub records: Vec<GradeRecord>,
    pub gpa: GpaSummary,
    pub loaded_at: DateTime<Utc>,
}

/// A term that has at least one grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeTerm {
    pub code: String,
    pub name: String,
}

impl GradeBook {
    /// Distinct terms with grades, newest code first.
    pub fn terms(&self) -> Vec<GradeTerm> {
        let mut terms: Vec<GradeTerm> = Vec::new();
        for record in &self.records {
            if !terms.iter().any(|t| t.code == record.term_code) {
                terms.push(GradeTerm {
                    code: record.term_code.clone(),
                    name: record.term_name.clone(),
                });
            }
        }
        terms.sort_by(|a, b| b.code.cmp(&a.code));
        terms
    }

    /// Records for one term code, in collection order.
    pub fn for_term(&self, term_code: &str) -> Vec<GradeRecord> {
        self.records
            .iter()
            .filter(|r| r.term_code == term_code)
            .cloned()
            .collect()
    }
}

// ============================================================================
// Terms
// ============================================================================

/// Identity of a term: academic year plus ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TermKey {
    /// Academic year, e.g. `2024-2025`.
    pub academic_year: String,
    /// Ordinal within the year (1 = autumn, 2 = spring).
    pub term: u8,
}

impl TermKey {
    pub fn new(academic_year: impl Into<String>, term: u8) -> Self {
        Self {
            academic_year: academic_year.into(),
            term,
        }
    }

    /// The portal's concatenated code, e.g. `2024-20252`.
    pub fn portal_code(&self) -> String {
        format!("{}{}", self.academic_year, self.term)
    }
}

impl fmt::Display for TermKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.academic_year, self.term)
    }
}

/// A term known to the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermDescriptor {
    pub key: TermKey,
    pub year_name: String,
    pub year_name_en: String,
    pub term_name: String,
    pub term_name_en: String,
    /// Attached once the term calendar has been resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_day: Option<NaiveDate>,
}

impl TermDescriptor {
    /// Descriptor carrying only the key, for terms the portal names elsewhere.
    pub fn bare(key: TermKey) -> Self {
        Self {
            key,
            year_name: String::new(),
            year_name_en: String::new(),
            term_name: String::new(),
            term_name_en: String::new(),
            first_day: None,
        }
    }

    pub fn with_first_day(mut self, first_day: NaiveDate) -> Self {
        self.first_day = Some(first_day);
        self
    }
}

// ============================================================================
// Buildings and classrooms
// ============================================================================

/// A teaching building. `code` is the only valid key for classroom queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
}

/// A classroom within one building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classroom {
    pub code: String,
    pub name: String,
    pub name_en: String,
    pub seats: u32,
    /// Whether the room can be booked at all.
    pub is_available: bool,
    pub has_movable_seats: bool,
    pub is_tiered: bool,
    /// Stable ordering key assigned by the portal.
    pub order_key: u32,
}

/// Inclusive range of class periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodRange {
    pub start: u8,
    pub end: u8,
}

impl PeriodRange {
    pub fn single(period: u8) -> Self {
        Self {
            start: period,
            end: period,
        }
    }

    pub fn overlaps(&self, other: &PeriodRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for PeriodRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// A weekly-recurring occupation of a classroom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancySlot {
    pub classroom_code: String,
    /// 1 = Monday ... 7 = Sunday. `None` when the portal row gave no usable
    /// weekday; the slot then occupies the room on every day.
    pub weekday: Option<u8>,
    /// `None` occupies every period.
    pub periods: Option<PeriodRange>,
    pub weeks: WeekMask,
    /// Portal marker for why the room is taken (scheduled class, booking, exam).
    pub reason: String,
}

/// Identity of a classroom-availability snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AvailabilityKey {
    pub term: TermKey,
    pub building_code: String,
    pub weeks: WeekMask,
}

impl fmt::Display for AvailabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.term, self.building_code, self.weeks)
    }
}

/// Classrooms and occupancy for one building, term and week selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassroomAvailability {
    pub key: AvailabilityKey,
    pub classrooms: Vec<Classroom>,
    pub occupancies: Vec<OccupancySlot>,
    pub queried_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_classification() {
        assert_eq!(Score::from_raw(" 92.5 "), Score::Numeric(92.5));
        assert_eq!(Score::from_raw("Pass"), Score::Status("Pass".to_string()));
        assert_eq!(Score::from_raw(""), Score::Missing);
        assert_eq!(Score::from_raw("NaN"), Score::Status("NaN".to_string()));
        assert_eq!(Score::Numeric(88.0).to_string(), "88");
    }

    #[test]
    fn test_period_overlap() {
        let morning = PeriodRange { start: 1, end: 2 };
        let mid = PeriodRange { start: 2, end: 4 };
        let late = PeriodRange { start: 5, end: 6 };
        assert!(morning.overlaps(&mid));
        assert!(mid.overlaps(&morning));
        assert!(!morning.overlaps(&late));
        assert!(PeriodRange::single(3).overlaps(&mid));
    }

    #[test]
    fn test_term_key_codes() {
        let key = TermKey::new("2024-2025", 2);
        assert_eq!(key.portal_code(), "2024-20252");
        assert_eq!(key.to_string(), "2024-2025#2");
    }
}

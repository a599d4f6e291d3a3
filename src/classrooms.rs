//! Classroom availability queries.
//!
//! A classroom is free for a request when it is bookable and no occupancy
//! slot of it matches the requested weekday, intersects the requested weeks
//! and overlaps the requested periods. Leaving the weekday or periods out
//! widens the request to every weekday or every period.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::TermCalendar;
use crate::entities::{AvailabilityKey, Classroom, ClassroomAvailability, PeriodRange};
use crate::error::{NotFoundError, Result, ValidationError};
use crate::service::RecordsService;
use crate::weeks::{WeekMask, WeekSelection};

/// Caller-supplied classroom search, before validation.
#[derive(Debug, Clone)]
pub struct ClassroomCriteria {
    pub academic_year: Option<String>,
    pub term: Option<u8>,
    pub building_code: String,
    pub weeks: WeekSelection,
    pub weekday: Option<i64>,
    /// Inclusive `(start, end)` class periods.
    pub periods: Option<(i64, i64)>,
    pub min_seats: Option<i64>,
    pub movable_seats: Option<bool>,
    pub tiered: Option<bool>,
    pub force_reload: bool,
}

impl ClassroomCriteria {
    /// Criteria with only the required parts; everything else unrestricted.
    pub fn new(building_code: impl Into<String>, weeks: WeekSelection) -> Self {
        Self {
            academic_year: None,
            term: None,
            building_code: building_code.into(),
            weeks,
            weekday: None,
            periods: None,
            min_seats: None,
            movable_seats: None,
            tiered: None,
            force_reload: false,
        }
    }
}

/// Validated filter applied to an availability snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomFilter {
    pub weeks: WeekMask,
    pub weekday: Option<u8>,
    pub periods: Option<PeriodRange>,
    pub min_seats: u32,
    pub movable_seats: Option<bool>,
    pub tiered: Option<bool>,
}

impl RoomFilter {
    pub fn from_criteria(criteria: &ClassroomCriteria) -> std::result::Result<Self, ValidationError> {
        let weeks = criteria.weeks.to_mask()?;

        let weekday = criteria
            .weekday
            .map(|day| match day {
                1..=7 => Ok(day as u8),
                _ => Err(ValidationError::InvalidWeekday(day)),
            })
            .transpose()?;

        let periods = criteria
            .periods
            .map(|(start, end)| period_range(start, end))
            .transpose()?;

        let min_seats = match criteria.min_seats {
            Some(seats) if seats < 0 => return Err(ValidationError::NegativeSeatCount(seats)),
            Some(seats) => u32::try_from(seats).unwrap_or(u32::MAX),
            None => 0,
        };

        Ok(Self {
            weeks,
            weekday,
            periods,
            min_seats,
            movable_seats: criteria.movable_seats,
            tiered: criteria.tiered,
        })
    }

    fn accepts(&self, room: &Classroom) -> bool {
        room.is_available
            && room.seats >= self.min_seats
            && self.movable_seats.map_or(true, |want| room.has_movable_seats == want)
            && self.tiered.map_or(true, |want| room.is_tiered == want)
    }
}

fn period_range(start: i64, end: i64) -> std::result::Result<PeriodRange, ValidationError> {
    if start > end {
        return Err(ValidationError::InvertedPeriodRange { start, end });
    }
    let check = |period: i64| {
        u8::try_from(period)
            .ok()
            .filter(|p| *p >= 1)
            .ok_or(ValidationError::InvalidPeriod(period))
    };
    Ok(PeriodRange {
        start: check(start)?,
        end: check(end)?,
    })
}

/// Parse `"a-b"` or a single period `"a"` into an inclusive pair.
pub fn parse_period_spec(spec: &str) -> std::result::Result<(i64, i64), ValidationError> {
    let number = |text: &str| {
        text.trim()
            .parse::<i64>()
            .map_err(|_| ValidationError::MalformedPeriodSpec(spec.to_string()))
    };
    match spec.split_once('-') {
        Some((start, end)) => Ok((number(start)?, number(end)?)),
        None => {
            let period = number(spec)?;
            Ok((period, period))
        }
    }
}

/// Classrooms of one snapshot that are free under `filter`, ordered by
/// seat count descending, then by the portal's ordering key.
pub fn filter_available(availability: &ClassroomAvailability, filter: &RoomFilter) -> Vec<Classroom> {
    let mut rooms: Vec<Classroom> = availability
        .classrooms
        .iter()
        .filter(|room| filter.accepts(room))
        .filter(|room| {
            !availability.occupancies.iter().any(|slot| {
                slot.classroom_code == room.code
                    && slot.weeks.intersects(filter.weeks)
                    && match (filter.weekday, slot.weekday) {
                        (Some(wanted), Some(day)) => wanted == day,
                        _ => true,
                    }
                    && match (filter.periods, slot.periods) {
                        (Some(wanted), Some(periods)) => periods.overlaps(&wanted),
                        _ => true,
                    }
            })
        })
        .cloned()
        .collect();
    rooms.sort_by(|a, b| b.seats.cmp(&a.seats).then(a.order_key.cmp(&b.order_key)));
    rooms
}

/// Free classrooms for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassroomSearch {
    pub key: AvailabilityKey,
    pub classrooms: Vec<Classroom>,
    /// Bookable rooms in the building before occupancy filtering.
    pub bookable_total: usize,
    pub queried_at: DateTime<Utc>,
}

/// Answers classroom queries from cached availability snapshots.
#[derive(Clone)]
pub struct ClassroomFinder {
    service: Arc<RecordsService>,
    calendar: TermCalendar,
}

impl ClassroomFinder {
    pub fn new(service: Arc<RecordsService>) -> Self {
        let calendar = TermCalendar::new(Arc::clone(&service));
        Self { service, calendar }
    }

    /// Raw availability snapshot for a building, term and week selection.
    pub async fn availability(
        &self,
        academic_year: Option<String>,
        term: Option<u8>,
        building_code: &str,
        weeks: &WeekSelection,
        force_reload: bool,
    ) -> Result<Arc<ClassroomAvailability>> {
        let weeks = weeks.to_mask()?;
        let key = self
            .availability_key(academic_year, term, building_code, weeks)
            .await?;
        self.service.classroom_availability(&key, force_reload).await
    }

    /// Free classrooms matching `criteria`.
    pub async fn find_available(&self, criteria: &ClassroomCriteria) -> Result<ClassroomSearch> {
        let filter = RoomFilter::from_criteria(criteria)?;
        let key = self
            .availability_key(
                criteria.academic_year.clone(),
                criteria.term,
                &criteria.building_code,
                filter.weeks,
            )
            .await?;
        let availability = self
            .service
            .classroom_availability(&key, criteria.force_reload)
            .await?;

        let classrooms = filter_available(&availability, &filter);
        tracing::debug!(
            key = %key,
            free = classrooms.len(),
            "Classroom search complete"
        );
        Ok(ClassroomSearch {
            key,
            classrooms,
            bookable_total: availability
                .classrooms
                .iter()
                .filter(|room| room.is_available)
                .count(),
            queried_at: availability.queried_at,
        })
    }

    async fn availability_key(
        &self,
        academic_year: Option<String>,
        term: Option<u8>,
        building_code: &str,
        weeks: WeekMask,
    ) -> Result<AvailabilityKey> {
        let building_code = building_code.trim();
        let buildings = self.service.buildings(false).await?;
        if !buildings.iter().any(|b| b.code == building_code) {
            return Err(NotFoundError::Building(building_code.to_string()).into());
        }
        let term = self.calendar.resolve_term(academic_year, term).await?;
        Ok(AvailabilityKey {
            term,
            building_code: building_code.to_string(),
            weeks,
        })
    }
}

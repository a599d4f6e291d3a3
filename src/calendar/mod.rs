//! Term calendar: term resolution, first days and week positions.
//!
//! A term's first day comes from the portal's term calendar and is cached
//! per term. Week positions are pure arithmetic on top of it, see
//! [`week_position`].
//!
//! Operations that take an optional academic year and term fill the missing
//! parts from the portal's current term.

mod position;

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::warn;

use crate::entities::{TermDescriptor, TermKey};
use crate::error::{NotFoundError, Result};
use crate::service::RecordsService;

pub use position::{parse_date, week_position, weekday_name, WeekPosition};

/// Term-relative date queries over the records service.
#[derive(Clone)]
pub struct TermCalendar {
    service: Arc<RecordsService>,
}

impl TermCalendar {
    pub fn new(service: Arc<RecordsService>) -> Self {
        Self { service }
    }

    /// Build a term key, defaulting missing parts to the current term.
    pub async fn resolve_term(
        &self,
        academic_year: Option<String>,
        term: Option<u8>,
    ) -> Result<TermKey> {
        let academic_year = academic_year
            .map(|year| year.trim().to_string())
            .filter(|year| !year.is_empty());
        match (academic_year, term) {
            (Some(academic_year), Some(term)) => Ok(TermKey::new(academic_year, term)),
            (academic_year, term) => {
                let current = self.service.current_term_key(false).await?;
                Ok(TermKey::new(
                    academic_year.unwrap_or(current.academic_year),
                    term.unwrap_or(current.term),
                ))
            }
        }
    }

    /// The descriptor of `term` from the portal's term list.
    pub async fn find_term(&self, term: &TermKey) -> Result<TermDescriptor> {
        let terms = self.service.terms(false).await?;
        terms
            .iter()
            .find(|descriptor| descriptor.key == *term)
            .cloned()
            .ok_or_else(|| {
                NotFoundError::Term {
                    academic_year: term.academic_year.clone(),
                    term: term.term,
                }
                .into()
            })
    }

    /// First calendar day of a term the portal knows.
    pub async fn first_day_of(&self, term: &TermKey, force_reload: bool) -> Result<NaiveDate> {
        self.find_term(term).await?;
        self.service.term_first_day(term, force_reload).await
    }

    /// Term descriptor with its first day attached.
    pub async fn describe_term(&self, term: &TermKey, force_reload: bool) -> Result<TermDescriptor> {
        let descriptor = self.find_term(term).await?;
        let first_day = self.service.term_first_day(term, force_reload).await?;
        Ok(descriptor.with_first_day(first_day))
    }

    /// Week number and weekday of `target` within `term`.
    pub async fn week_and_weekday(&self, target: NaiveDate, term: &TermKey) -> Result<WeekPosition> {
        let first_day = self.first_day_of(term, false).await?;
        Ok(week_position(first_day, target)?)
    }

    /// Locate a date in the given term, or in the current term.
    pub async fn locate(
        &self,
        target: NaiveDate,
        academic_year: Option<String>,
        term: Option<u8>,
    ) -> Result<(TermKey, WeekPosition)> {
        let term = self.resolve_term(academic_year, term).await?;
        let position = self.week_and_weekday(target, &term).await?;
        Ok((term, position))
    }

    /// The current term, named from the term list when it is listed there.
    pub async fn current_term(&self, force_reload: bool) -> Result<TermDescriptor> {
        let key = self.service.current_term_key(force_reload).await?;
        match self.find_term(&key).await {
            Ok(descriptor) => Ok(descriptor),
            Err(e) => {
                warn!(term = %key, error = %e, "Current term missing from term list; returning bare key");
                Ok(TermDescriptor::bare(key))
            }
        }
    }
}

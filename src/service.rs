//! Records service: one cache per domain in front of the portal fetcher.
//!
//! Every read goes through its domain's [`KeyedCache`], so each domain loads
//! lazily on first use and no read depends on another having happened first.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::cache::{CacheDomain, CacheStats, Freshness, KeyedCache};
use crate::config::CacheConfig;
use crate::entities::normalize;
use crate::entities::{
    AvailabilityKey, Building, ClassroomAvailability, GpaSummary, GradeBook, GradeRecord,
    GradeTerm, TermDescriptor, TermKey,
};
use crate::error::{NotFoundError, Result};
use crate::metrics::get_metrics;
use crate::portal::PortalFetcher;

/// Keys a term-keyed domain may hold. Terms are few, so this is generous.
const MAX_TERM_KEYS: u64 = 64;

/// Cached access to every portal data domain.
pub struct RecordsService {
    fetcher: Arc<dyn PortalFetcher>,
    grades: KeyedCache<(), GradeBook>,
    terms: KeyedCache<(), Vec<TermDescriptor>>,
    current_term: KeyedCache<(), TermKey>,
    buildings: KeyedCache<(), Vec<Building>>,
    first_days: KeyedCache<TermKey, NaiveDate>,
    availability: KeyedCache<AvailabilityKey, ClassroomAvailability>,
}

impl RecordsService {
    pub fn new(fetcher: Arc<dyn PortalFetcher>, config: &CacheConfig) -> Self {
        Self {
            fetcher,
            grades: KeyedCache::new(CacheDomain::Grades, Freshness::Forever, 1),
            terms: KeyedCache::new(CacheDomain::Terms, Freshness::Forever, 1),
            current_term: KeyedCache::new(CacheDomain::CurrentTerm, Freshness::Forever, 1),
            buildings: KeyedCache::new(CacheDomain::Buildings, Freshness::Forever, 1),
            first_days: KeyedCache::new(
                CacheDomain::TermFirstDay,
                Freshness::Forever,
                MAX_TERM_KEYS,
            ),
            availability: KeyedCache::new(
                CacheDomain::ClassroomAvailability,
                Freshness::Ttl(config.availability_ttl()),
                config.max_availability_entries,
            ),
        }
    }

    /// All grade records with the GPA summary computed in the same load.
    pub async fn grade_book(&self, force_reload: bool) -> Result<Arc<GradeBook>> {
        self.grades
            .get(&(), force_reload, || async {
                self.fetcher
                    .fetch_grades()
                    .await
                    .map(|report| normalize::grade_book(&report, Utc::now()))
            })
            .await
    }

    pub async fn gpa(&self, force_reload: bool) -> Result<GpaSummary> {
        Ok(self.grade_book(force_reload).await?.gpa.clone())
    }

    /// Terms that have at least one grade, newest first.
    pub async fn grade_terms(&self) -> Result<Vec<GradeTerm>> {
        Ok(self.grade_book(false).await?.terms())
    }

    /// Grades of one term code, in collection order.
    pub async fn term_grades(&self, term_code: &str) -> Result<Vec<GradeRecord>> {
        let records = self.grade_book(false).await?.for_term(term_code.trim());
        if records.is_empty() {
            return Err(NotFoundError::GradeTerm(term_code.to_string()).into());
        }
        Ok(records)
    }

    /// Every term the portal knows about.
    pub async fn terms(&self, force_reload: bool) -> Result<Arc<Vec<TermDescriptor>>> {
        self.terms
            .get(&(), force_reload, || async {
                self.fetcher
                    .fetch_terms()
                    .await
                    .map(|raws| normalize::term_list(&raws))
            })
            .await
    }

    /// The portal's current-term signal.
    pub async fn current_term_key(&self, force_reload: bool) -> Result<TermKey> {
        let key = self
            .current_term
            .get(&(), force_reload, || async {
                self.fetcher
                    .fetch_current_term()
                    .await
                    .and_then(|raw| normalize::current_term(&raw))
            })
            .await?;
        Ok((*key).clone())
    }

    pub async fn buildings(&self, force_reload: bool) -> Result<Arc<Vec<Building>>> {
        self.buildings
            .get(&(), force_reload, || async {
                self.fetcher
                    .fetch_buildings()
                    .await
                    .map(|raws| normalize::building_list(&raws))
            })
            .await
    }

    /// First calendar day of `term`, as reported by the term calendar.
    pub async fn term_first_day(&self, term: &TermKey, force_reload: bool) -> Result<NaiveDate> {
        let day = self
            .first_days
            .get(term, force_reload, || async {
                self.fetcher
                    .fetch_term_first_day(term)
                    .await
                    .and_then(|raw| normalize::term_first_day(&raw))
            })
            .await?;
        Ok(*day)
    }

    /// Classrooms and occupancy snapshot for a building, term and weeks.
    pub async fn classroom_availability(
        &self,
        key: &AvailabilityKey,
        force_reload: bool,
    ) -> Result<Arc<ClassroomAvailability>> {
        self.availability
            .get(key, force_reload, || async {
                self.fetcher
                    .fetch_classrooms_and_occupancy(key)
                    .await
                    .map(|report| {
                        normalize::classroom_availability(key.clone(), &report, Utc::now())
                    })
            })
            .await
    }

    /// Drop every cached entry in every domain. Fetches nothing.
    pub fn invalidate_all(&self) {
        self.grades.invalidate_all();
        self.terms.invalidate_all();
        self.current_term.invalidate_all();
        self.buildings.invalidate_all();
        self.first_days.invalidate_all();
        self.availability.invalidate_all();
        get_metrics().invalidations_total.inc();
        info!("All cached portal data invalidated");
    }

    /// Activity counters per domain.
    pub fn cache_stats(&self) -> Vec<CacheStats> {
        vec![
            self.grades.stats(),
            self.terms.stats(),
            self.current_term.stats(),
            self.buildings.stats(),
            self.first_days.stats(),
            self.availability.stats(),
        ]
    }
}

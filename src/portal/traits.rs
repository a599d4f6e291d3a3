//! Fetch collaborator trait and the raw payloads it returns.

use async_trait::async_trait;

use crate::entities::{AvailabilityKey, TermKey};
use crate::error::FetchResult;

/// One record exactly as the portal returned it.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Raw grade rows plus the portal's official GPA summary, when it has one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGradeReport {
    pub records: Vec<RawRecord>,
    pub summary: Option<RawRecord>,
}

/// Raw classroom list and occupancy rows for one building query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawClassroomReport {
    pub classrooms: Vec<RawRecord>,
    pub occupancies: Vec<RawRecord>,
}

/// Source of raw portal data, one method per cache domain.
///
/// Implementations perform no normalization and no caching; transport and
/// session failures are reported as [`crate::error::FetchError`].
#[async_trait]
pub trait PortalFetcher: Send + Sync {
    async fn fetch_grades(&self) -> FetchResult<RawGradeReport>;

    async fn fetch_terms(&self) -> FetchResult<Vec<RawRecord>>;

    async fn fetch_current_term(&self) -> FetchResult<RawRecord>;

    async fn fetch_buildings(&self) -> FetchResult<Vec<RawRecord>>;

    /// First entry of the term's calendar, carrying its first day.
    async fn fetch_term_first_day(&self, term: &TermKey) -> FetchResult<RawRecord>;

    async fn fetch_classrooms_and_occupancy(
        &self,
        key: &AvailabilityKey,
    ) -> FetchResult<RawClassroomReport>;
}

//! Academic-record entities and the normalizer that builds them.
//!
//! The fetch collaborator hands over raw, string-keyed records; everything
//! past [`normalize`] works with the typed entities in [`types`].

pub mod normalize;
pub mod types;

pub use types::{
    AvailabilityKey, Building, Classroom, ClassroomAvailability, GpaSummary, GradeBook,
    GradeRecord, GradeTerm, OccupancySlot, PeriodRange, Score, TermDescriptor, TermKey,
};

//! Tests for classroom availability queries.

use std::sync::Arc;
use std::time::Duration;

use registrar::error::{NotFoundError, ValidationError};
use registrar::{ClassroomCriteria, ClassroomFinder, RegistrarError, WeekSelection};

use crate::common::{service_with, CallCounts, ScriptedPortal};

fn finder(portal: &Arc<ScriptedPortal>) -> ClassroomFinder {
    ClassroomFinder::new(service_with(Arc::clone(portal)))
}

fn criteria(weeks: &str) -> ClassroomCriteria {
    ClassroomCriteria::new("A", WeekSelection::Spec(weeks.to_string()))
}

fn codes(search: &registrar::ClassroomSearch) -> Vec<&str> {
    search.classrooms.iter().map(|room| room.code.as_str()).collect()
}

#[tokio::test]
async fn test_occupied_slot_excludes_room() {
    let portal = Arc::new(ScriptedPortal::new());
    let finder = finder(&portal);

    let search = finder
        .find_available(&ClassroomCriteria {
            weekday: Some(3),
            periods: Some((3, 4)),
            ..criteria("1-8")
        })
        .await
        .unwrap();

    assert_eq!(codes(&search), vec!["A102", "A104"]);
    assert_eq!(search.bookable_total, 3);
    assert_eq!(search.key.building_code, "A");
    assert_eq!(search.key.weeks.describe(), "1-8");
}

#[tokio::test]
async fn test_non_overlapping_slots_keep_room() {
    let portal = Arc::new(ScriptedPortal::new());
    let finder = finder(&portal);

    let other_day = finder
        .find_available(&ClassroomCriteria {
            weekday: Some(2),
            periods: Some((3, 4)),
            ..criteria("1-8")
        })
        .await
        .unwrap();
    assert_eq!(codes(&other_day), vec!["A101", "A102", "A104"]);

    let other_periods = finder
        .find_available(&ClassroomCriteria {
            weekday: Some(3),
            periods: Some((5, 6)),
            ..criteria("1-8")
        })
        .await
        .unwrap();
    assert_eq!(codes(&other_periods), vec!["A101", "A102", "A104"]);

    let other_weeks = finder.find_available(&criteria("9-16")).await.unwrap();
    assert_eq!(codes(&other_weeks), vec!["A101", "A102", "A104"]);
}

#[tokio::test]
async fn test_room_attribute_filters() {
    let portal = Arc::new(ScriptedPortal::new());
    let finder = finder(&portal);

    let large = finder
        .find_available(&ClassroomCriteria {
            min_seats: Some(100),
            ..criteria("9-16")
        })
        .await
        .unwrap();
    assert_eq!(codes(&large), vec!["A101"]);

    let tiered = finder
        .find_available(&ClassroomCriteria {
            tiered: Some(true),
            ..criteria("9-16")
        })
        .await
        .unwrap();
    assert_eq!(codes(&tiered), vec!["A104"]);

    let flat = finder
        .find_available(&ClassroomCriteria {
            tiered: Some(false),
            ..criteria("9-16")
        })
        .await
        .unwrap();
    assert_eq!(codes(&flat), vec!["A101", "A102"]);
}

#[tokio::test]
async fn test_unknown_building_fetches_nothing() {
    let portal = Arc::new(ScriptedPortal::new());
    let finder = finder(&portal);

    let err = finder
        .find_available(&ClassroomCriteria::new(
            "Z9",
            WeekSelection::List(vec![1, 2]),
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrarError::NotFound(NotFoundError::Building(ref code)) if code == "Z9"
    ));
    assert_eq!(CallCounts::get(&portal.calls.availability), 0);
}

#[tokio::test]
async fn test_invalid_criteria_fetch_nothing() {
    let portal = Arc::new(ScriptedPortal::new());
    let finder = finder(&portal);

    let err = finder
        .find_available(&ClassroomCriteria {
            weekday: Some(8),
            ..criteria("1-8")
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrarError::Validation(ValidationError::InvalidWeekday(8))
    ));

    let err = finder
        .find_available(&ClassroomCriteria::new("A", WeekSelection::List(vec![])))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrarError::Validation(ValidationError::EmptyWeekSelection)
    ));

    assert_eq!(CallCounts::get(&portal.calls.buildings), 0);
    assert_eq!(CallCounts::get(&portal.calls.availability), 0);
}

#[tokio::test]
async fn test_raw_availability_snapshot() {
    let portal = Arc::new(ScriptedPortal::new());
    let finder = finder(&portal);

    let availability = finder
        .availability(None, None, "A", &WeekSelection::List(vec![1, 2, 3]), false)
        .await
        .unwrap();
    assert_eq!(availability.classrooms.len(), 4);
    assert_eq!(availability.occupancies.len(), 1);
    assert_eq!(availability.occupancies[0].weeks.describe(), "1-8");
    assert_eq!(availability.key.term.academic_year, "2023-2024");
}

#[tokio::test(start_paused = true)]
async fn test_availability_expires_after_ttl() {
    let portal = Arc::new(ScriptedPortal::new());
    let finder = finder(&portal);

    finder.find_available(&criteria("1-8")).await.unwrap();
    assert_eq!(CallCounts::get(&portal.calls.availability), 1);

    tokio::time::advance(Duration::from_secs(4 * 60)).await;
    finder.find_available(&criteria("1-8")).await.unwrap();
    assert_eq!(CallCounts::get(&portal.calls.availability), 1);

    tokio::time::advance(Duration::from_secs(2 * 60)).await;
    finder.find_available(&criteria("1-8")).await.unwrap();
    assert_eq!(CallCounts::get(&portal.calls.availability), 2);

    // other domains never expire
    assert_eq!(CallCounts::get(&portal.calls.buildings), 1);
}

#[tokio::test]
async fn test_week_sets_are_cached_separately() {
    let portal = Arc::new(ScriptedPortal::new());
    let finder = finder(&portal);

    finder.find_available(&criteria("1-8")).await.unwrap();
    finder.find_available(&criteria("1-4")).await.unwrap();
    // same set, different spelling
    finder
        .find_available(&ClassroomCriteria::new(
            "A",
            WeekSelection::List(vec![4, 3, 2, 1]),
        ))
        .await
        .unwrap();
    assert_eq!(CallCounts::get(&portal.calls.availability), 2);
}

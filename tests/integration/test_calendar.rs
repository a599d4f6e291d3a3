//! Tests for term resolution, first days and date positions.

use std::sync::Arc;

use chrono::NaiveDate;
use registrar::entities::TermKey;
use registrar::error::{NotFoundError, ValidationError};
use registrar::{RegistrarError, TermCalendar};

use crate::common::{service_with, CallCounts, ScriptedPortal};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn calendar(portal: &Arc<ScriptedPortal>) -> TermCalendar {
    TermCalendar::new(service_with(Arc::clone(portal)))
}

#[tokio::test]
async fn test_missing_term_parts_default_to_current() {
    let portal = Arc::new(ScriptedPortal::new());
    let calendar = calendar(&portal);

    let term = calendar.resolve_term(None, None).await.unwrap();
    assert_eq!(term, TermKey::new("2023-2024", 2));

    let term = calendar
        .resolve_term(Some("2024-2025".to_string()), None)
        .await
        .unwrap();
    assert_eq!(term, TermKey::new("2024-2025", 2));

    // fully specified terms never ask for the current one
    let before = CallCounts::get(&portal.calls.current_term);
    calendar
        .resolve_term(Some("2023-2024".to_string()), Some(1))
        .await
        .unwrap();
    assert_eq!(CallCounts::get(&portal.calls.current_term), before);
}

#[tokio::test]
async fn test_first_day_is_cached_per_term() {
    let portal = Arc::new(ScriptedPortal::new());
    let calendar = calendar(&portal);
    let spring = TermKey::new("2023-2024", 2);
    let autumn = TermKey::new("2023-2024", 1);

    assert_eq!(
        calendar.first_day_of(&spring, false).await.unwrap(),
        date(2024, 2, 26)
    );
    assert_eq!(
        calendar.first_day_of(&spring, false).await.unwrap(),
        date(2024, 2, 26)
    );
    assert_eq!(CallCounts::get(&portal.calls.first_day), 1);

    assert_eq!(
        calendar.first_day_of(&autumn, false).await.unwrap(),
        date(2023, 9, 4)
    );
    assert_eq!(CallCounts::get(&portal.calls.first_day), 2);
}

#[tokio::test]
async fn test_unknown_term_is_not_found() {
    let portal = Arc::new(ScriptedPortal::new());
    let calendar = calendar(&portal);

    let err = calendar
        .first_day_of(&TermKey::new("2030-2031", 1), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrarError::NotFound(NotFoundError::Term { ref academic_year, term: 1 })
            if academic_year == "2030-2031"
    ));
    assert_eq!(CallCounts::get(&portal.calls.first_day), 0);
}

#[tokio::test]
async fn test_locate_in_current_term() {
    let portal = Arc::new(ScriptedPortal::new());
    let calendar = calendar(&portal);

    let (term, position) = calendar.locate(date(2024, 3, 20), None, None).await.unwrap();
    assert_eq!(term, TermKey::new("2023-2024", 2));
    assert_eq!(position.first_day, date(2024, 2, 26));
    assert_eq!(position.week, 4);
    assert_eq!(position.weekday, 3);
    assert_eq!(position.weekday_name, "Wednesday");
}

#[tokio::test]
async fn test_locate_in_explicit_term() {
    let portal = Arc::new(ScriptedPortal::new());
    let calendar = calendar(&portal);

    let (term, position) = calendar
        .locate(date(2023, 9, 10), Some("2023-2024".to_string()), Some(1))
        .await
        .unwrap();
    assert_eq!(term, TermKey::new("2023-2024", 1));
    assert_eq!((position.week, position.weekday), (1, 7));
}

#[tokio::test]
async fn test_locate_before_first_day_is_rejected() {
    let portal = Arc::new(ScriptedPortal::new());
    let calendar = calendar(&portal);

    let err = calendar
        .locate(date(2024, 2, 1), None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrarError::Validation(ValidationError::DateBeforeTermStart { .. })
    ));
}

#[tokio::test]
async fn test_current_term_descriptor() {
    let portal = Arc::new(ScriptedPortal::new());
    let calendar = calendar(&portal);

    let current = calendar.current_term(false).await.unwrap();
    assert_eq!(current.key, TermKey::new("2023-2024", 2));
    assert_eq!(current.term_name, "Spring");

    let described = calendar.describe_term(&current.key, false).await.unwrap();
    assert_eq!(described.first_day, Some(date(2024, 2, 26)));
}

#[tokio::test]
async fn test_current_term_missing_from_list_is_bare() {
    let portal = Arc::new(ScriptedPortal::new());
    portal.set_current_term("2031-2032", 1);
    let calendar = calendar(&portal);

    let current = calendar.current_term(false).await.unwrap();
    assert_eq!(current.key, TermKey::new("2031-2032", 1));
    assert!(current.term_name.is_empty());
    assert_eq!(current.first_day, None);
}

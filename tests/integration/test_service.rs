//! Tests for the records service and its per-domain caches.

use std::sync::Arc;
use std::time::Duration;

use registrar::error::{FetchError, NotFoundError};
use registrar::{CacheDomain, RegistrarError};

use crate::common::{service_with, CallCounts, ScriptedPortal};

#[tokio::test]
async fn test_domains_load_lazily() {
    let portal = Arc::new(ScriptedPortal::new());
    let service = service_with(Arc::clone(&portal));

    assert_eq!(CallCounts::get(&portal.calls.grades), 0);

    let buildings = service.buildings(false).await.unwrap();
    assert_eq!(buildings.len(), 2);
    assert_eq!(CallCounts::get(&portal.calls.buildings), 1);
    assert_eq!(CallCounts::get(&portal.calls.grades), 0);
    assert_eq!(CallCounts::get(&portal.calls.terms), 0);
}

#[tokio::test]
async fn test_grades_and_gpa_share_one_load() {
    let portal = Arc::new(ScriptedPortal::new());
    let service = service_with(Arc::clone(&portal));

    let book = service.grade_book(false).await.unwrap();
    assert_eq!(book.records.len(), 3);
    let gpa = service.gpa(false).await.unwrap();
    assert_eq!(gpa, book.gpa);
    assert_eq!(CallCounts::get(&portal.calls.grades), 1);

    service.grade_book(true).await.unwrap();
    assert_eq!(CallCounts::get(&portal.calls.grades), 2);
}

#[tokio::test]
async fn test_gpa_summary_values() {
    let portal = Arc::new(ScriptedPortal::new());
    let service = service_with(portal);

    let gpa = service.gpa(false).await.unwrap();
    assert_eq!(gpa.gpa, 3.72);
    assert_eq!(gpa.all_course_gpa, 3.70);
    assert_eq!(gpa.rank, 12);
    assert_eq!(gpa.cohort_size, 240);
    assert_eq!(gpa.rank_percentage, 5.0);
    assert_eq!(gpa.passed_courses, 3);
    assert_eq!(gpa.total_credit, 9.0);
    // (95 * 3 + 85 * 5) / 8; the pass/fail course has no numeric score
    assert_eq!(gpa.average_score, 88.75);
}

#[tokio::test]
async fn test_grade_terms_and_term_filter() {
    let portal = Arc::new(ScriptedPortal::new());
    let service = service_with(portal);

    let terms = service.grade_terms().await.unwrap();
    let codes: Vec<&str> = terms.iter().map(|t| t.code.as_str()).collect();
    assert_eq!(codes, vec!["2023-20242", "2023-20241"]);

    let autumn = service.term_grades("2023-20241").await.unwrap();
    let courses: Vec<&str> = autumn.iter().map(|r| r.course_id.as_str()).collect();
    assert_eq!(courses, vec!["CS201", "MA101"]);

    let err = service.term_grades("1999-20001").await.unwrap_err();
    assert!(matches!(
        err,
        RegistrarError::NotFound(NotFoundError::GradeTerm(_))
    ));
    assert!(err.is_caller_error());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_reads_share_one_fetch() {
    let portal = Arc::new(ScriptedPortal::new().with_delay(Duration::from_millis(200)));
    let service = service_with(Arc::clone(&portal));

    let (a, b, c, d) = tokio::join!(
        service.terms(false),
        service.terms(false),
        service.terms(false),
        service.terms(false),
    );
    for terms in [a, b, c, d] {
        assert_eq!(terms.unwrap().len(), 3);
    }
    assert_eq!(CallCounts::get(&portal.calls.terms), 1);
}

#[tokio::test]
async fn test_invalidate_all_forces_refetch() {
    let portal = Arc::new(ScriptedPortal::new());
    let service = service_with(Arc::clone(&portal));

    service.terms(false).await.unwrap();
    service.buildings(false).await.unwrap();
    service.invalidate_all();

    // nothing is fetched by the invalidation itself
    assert_eq!(CallCounts::get(&portal.calls.terms), 1);

    service.terms(false).await.unwrap();
    service.buildings(false).await.unwrap();
    assert_eq!(CallCounts::get(&portal.calls.terms), 2);
    assert_eq!(CallCounts::get(&portal.calls.buildings), 2);
}

#[tokio::test]
async fn test_failure_reports_domain_and_recovers() {
    let portal = Arc::new(ScriptedPortal::new());
    portal.set_failure(Some(FetchError::Auth("session expired".to_string())));
    let service = service_with(Arc::clone(&portal));

    let err = service.grade_book(false).await.unwrap_err();
    match err {
        RegistrarError::Upstream { key, source } => {
            assert_eq!(key, "grades");
            assert_eq!(source, FetchError::Auth("session expired".to_string()));
        }
        other => panic!("unexpected error: {}", other),
    }

    portal.set_failure(None);
    assert_eq!(service.grade_book(false).await.unwrap().records.len(), 3);
    assert_eq!(CallCounts::get(&portal.calls.grades), 2);
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_entry() {
    let portal = Arc::new(ScriptedPortal::new());
    let service = service_with(Arc::clone(&portal));

    service.buildings(false).await.unwrap();
    portal.set_failure(Some(FetchError::Transport("connection reset".to_string())));
    assert!(service.buildings(true).await.is_err());

    let buildings = service.buildings(false).await.unwrap();
    assert_eq!(buildings.len(), 2);
    assert_eq!(CallCounts::get(&portal.calls.buildings), 2);
}

#[tokio::test]
async fn test_cache_stats_cover_every_domain() {
    let portal = Arc::new(ScriptedPortal::new());
    let service = service_with(portal);

    service.terms(false).await.unwrap();
    service.terms(false).await.unwrap();

    let stats = service.cache_stats();
    assert_eq!(stats.len(), CacheDomain::ALL.len());
    let terms = stats
        .iter()
        .find(|s| s.domain == CacheDomain::Terms)
        .unwrap();
    assert_eq!(terms.fetches, 1);
    assert_eq!(terms.misses, 1);
    assert_eq!(terms.hits, 1);
}

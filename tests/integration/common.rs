//! Scripted portal fetcher shared by the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use registrar::config::CacheConfig;
use registrar::entities::{AvailabilityKey, TermKey};
use registrar::error::{FetchError, FetchResult};
use registrar::portal::{PortalFetcher, RawClassroomReport, RawGradeReport, RawRecord};
use registrar::RecordsService;

/// Per-method fetch counters.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub grades: AtomicUsize,
    pub terms: AtomicUsize,
    pub current_term: AtomicUsize,
    pub buildings: AtomicUsize,
    pub first_day: AtomicUsize,
    pub availability: AtomicUsize,
}

impl CallCounts {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Portal double returning fixed data, with optional latency and failure.
pub struct ScriptedPortal {
    pub calls: CallCounts,
    delay: Duration,
    failure: Mutex<Option<FetchError>>,
    current_term: Mutex<(String, u8)>,
}

impl ScriptedPortal {
    pub fn new() -> Self {
        Self {
            calls: CallCounts::default(),
            delay: Duration::ZERO,
            failure: Mutex::new(None),
            current_term: Mutex::new(("2023-2024".to_string(), 2)),
        }
    }

    /// Every fetch sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make every following fetch fail with `error`, or succeed again with `None`.
    pub fn set_failure(&self, error: Option<FetchError>) {
        *self.failure.lock().unwrap() = error;
    }

    pub fn set_current_term(&self, year: &str, term: u8) {
        *self.current_term.lock().unwrap() = (year.to_string(), term);
    }

    async fn answer<T>(&self, counter: &AtomicUsize, value: impl FnOnce() -> T) -> FetchResult<T> {
        counter.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failure = self.failure.lock().unwrap().clone();
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(value())
    }
}

pub fn record(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

#[async_trait]
impl PortalFetcher for ScriptedPortal {
    async fn fetch_grades(&self) -> FetchResult<RawGradeReport> {
        self.answer(&self.calls.grades, || RawGradeReport {
            records: vec![
                record(json!({
                    "kcdm": "CS201", "kcmc": "Data Structures", "xf": "3",
                    "xnxq": "2023-20241", "xnxqmc": "2023 Autumn",
                    "zzcj": "95", "zzzscj": "95", "sfjg": "0", "sfyfx": "0"
                })),
                record(json!({
                    "kcdm": "MA101", "kcmc": "Calculus", "xf": 5,
                    "xnxq": "2023-20241", "xnxqmc": "2023 Autumn",
                    "zzcj": "85", "zzzscj": "85", "sfjg": "0", "sfyfx": "0"
                })),
                record(json!({
                    "kcdm": "PE102", "kcmc": "Swimming", "xf": "1",
                    "xnxq": "2023-20242", "xnxqmc": "2024 Spring",
                    "zzcj": "Pass", "zzzscj": "Pass", "sfjg": "0", "sfyfx": "0"
                })),
            ],
            summary: Some(record(json!({
                "GPA": "3.72", "GPA_QBJQKC": "3.70", "PM": "12", "ZRS": "240"
            }))),
        })
        .await
    }

    async fn fetch_terms(&self) -> FetchResult<Vec<RawRecord>> {
        self.answer(&self.calls.terms, || {
            vec![
                record(json!({"xn": "2023-2024", "xq": "1", "xnmc": "2023-2024", "xqmc": "Autumn"})),
                record(json!({"xn": "2023-2024", "xq": "2", "xnmc": "2023-2024", "xqmc": "Spring"})),
                record(json!({"xn": "2024-2025", "xq": "1", "xnmc": "2024-2025", "xqmc": "Autumn"})),
            ]
        })
        .await
    }

    async fn fetch_current_term(&self) -> FetchResult<RawRecord> {
        let (year, term) = self.current_term.lock().unwrap().clone();
        self.answer(&self.calls.current_term, || {
            record(json!({"XN": year, "XQ": term.to_string()}))
        })
        .await
    }

    async fn fetch_buildings(&self) -> FetchResult<Vec<RawRecord>> {
        self.answer(&self.calls.buildings, || {
            vec![
                record(json!({"DM": "A", "MC": "Building A"})),
                record(json!({"DM": "T2", "MC": "Teaching Building 2"})),
            ]
        })
        .await
    }

    async fn fetch_term_first_day(&self, term: &TermKey) -> FetchResult<RawRecord> {
        let day = match (term.academic_year.as_str(), term.term) {
            ("2023-2024", 1) => "2023-09-04",
            ("2023-2024", 2) => "2024-02-26",
            _ => "2024-09-02",
        };
        self.answer(&self.calls.first_day, || record(json!({"RQ": day})))
            .await
    }

    async fn fetch_classrooms_and_occupancy(
        &self,
        _key: &AvailabilityKey,
    ) -> FetchResult<RawClassroomReport> {
        self.answer(&self.calls.availability, || RawClassroomReport {
            classrooms: vec![
                record(json!({"DM": "A101", "MC": "A101", "ZWS": "120", "SFKJ": "1", "ROW_ID": 1})),
                record(json!({"DM": "A102", "MC": "A102", "ZWS": "60", "SFKJ": "1", "ROW_ID": 2})),
                record(json!({"DM": "A103", "MC": "A103", "ZWS": "200", "SFKJ": "0", "ROW_ID": 3})),
                record(json!({
                    "DM": "A104", "MC": "A104", "ZWS": "60", "SFKJ": "1",
                    "SFJTJS": "1", "ROW_ID": 4
                })),
            ],
            occupancies: vec![record(json!({
                "CDDM": "A101", "XQJ": "3", "KSJC": "3", "JSJC": "4", "ZC": "1-8"
            }))],
        })
        .await
    }
}

pub fn cache_config() -> CacheConfig {
    CacheConfig::default()
}

pub fn service_with(portal: Arc<ScriptedPortal>) -> Arc<RecordsService> {
    Arc::new(RecordsService::new(portal, &cache_config()))
}

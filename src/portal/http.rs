//! HTTP implementation of [`PortalFetcher`] against the portal's JSON endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::PortalConfig;
use crate::entities::{AvailabilityKey, TermKey};
use crate::error::{ConfigError, FetchError, FetchResult, Result};

use super::{PortalFetcher, RawClassroomReport, RawGradeReport, RawRecord};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";
const OCCUPANCY_PAGE_SIZE: u32 = 1000;

/// Portal client authenticated by an existing session cookie.
pub struct HttpPortalClient {
    client: Client,
    base_url: String,
    page_size: u32,
}

impl HttpPortalClient {
    /// Create a client from configuration.
    pub fn from_config(config: &PortalConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert("rolecode", HeaderValue::from_static("01"));
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));

        match config.session_cookie.as_deref().map(str::trim) {
            Some(cookie) if !cookie.is_empty() => {
                let mut value = HeaderValue::from_str(cookie).map_err(|e| {
                    ConfigError::Invalid(format!("portal.session_cookie is not a valid header: {}", e))
                })?;
                value.set_sensitive(true);
                headers.insert(header::COOKIE, value);
            }
            _ => warn!("No portal session cookie configured; portal requests will be rejected"),
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
        })
    }

    fn post(&self, path: &str, referer: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header(header::REFERER, format!("{}{}", self.base_url, referer))
    }

    fn post_form(&self, path: &str, referer: &str, form: &[(&str, String)]) -> RequestBuilder {
        self.post(path, referer)
            .header(header::ACCEPT, "*/*")
            .header(header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .form(form)
    }

    async fn query_grades(&self, page_size: u32) -> FetchResult<Value> {
        let body = json!({
            "xn": null,
            "xq": null,
            "kcmc": null,
            "cxbj": "-1",
            "pylx": "1",
            "current": 1,
            "pageSize": page_size,
            "sffx": null
        });
        let request = self
            .post("/cjgl/grcjcx/grcjcx", "/cjgl/grcjcx/go/1")
            .json(&body);
        send(request).await
    }

    async fn fetch_gpa_summary(&self) -> FetchResult<RawRecord> {
        let request = self
            .post("/cjgl/grcjcx/getgpa", "/cjgl/grcjcx/go/1")
            .header(header::ACCEPT, "*/*")
            .header(header::CONTENT_TYPE, FORM_CONTENT_TYPE);
        into_record(send(request).await?, "GPA summary")
    }

    fn room_query(&self, key: &AvailabilityKey, page_size: u32) -> Vec<(&'static str, String)> {
        vec![
            ("pxn", key.term.academic_year.clone()),
            ("pxq", key.term.term.to_string()),
            ("dmmc", String::new()),
            ("xiaoqu", String::new()),
            ("jxl", key.building_code.clone()),
            ("cdlb", String::new()),
            ("zc", key.weeks.to_portal_string()),
            // rooms without classes are only listed with this flag
            ("wpksfxs", "1".to_string()),
            ("qsjsz", key.weeks.describe()),
            ("kjs", "0".to_string()),
            ("xsbkycd", "0".to_string()),
            ("zws", String::new()),
            ("pageNum", "1".to_string()),
            ("pageSize", page_size.to_string()),
        ]
    }
}

#[async_trait]
impl PortalFetcher for HttpPortalClient {
    async fn fetch_grades(&self) -> FetchResult<RawGradeReport> {
        let mut response = self.query_grades(self.page_size).await?;
        let total = response
            .pointer("/content/total")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if total > u64::from(self.page_size) {
            debug!(total, "Grade list exceeds one page; re-querying with full size");
            let full = u32::try_from(total)
                .map_err(|_| FetchError::Decode(format!("grade total {} is too large", total)))?;
            response = self.query_grades(full).await?;
        }

        let records = match response.pointer_mut("/content/list") {
            Some(list) => into_records(list.take(), "grade list")?,
            None => Vec::new(),
        };

        let summary = match self.fetch_gpa_summary().await {
            Ok(summary) => Some(summary),
            Err(e @ FetchError::Auth(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, "GPA summary unavailable; deriving from grade records");
                None
            }
        };

        Ok(RawGradeReport { records, summary })
    }

    async fn fetch_terms(&self) -> FetchResult<Vec<RawRecord>> {
        let request = self
            .post("/component/queryXnxqCdjy", "/cdkb/querycdzy")
            .header(header::ACCEPT, "*/*")
            .header(header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body("data=");
        let mut response = send(request).await?;

        let code = response.get("code").and_then(Value::as_i64);
        if code != Some(200) {
            return Err(FetchError::Decode(format!(
                "term list returned code {:?}",
                code
            )));
        }
        match response.get_mut("content") {
            Some(content) => into_records(content.take(), "term list"),
            None => Err(FetchError::MissingField("content".to_string())),
        }
    }

    async fn fetch_current_term(&self) -> FetchResult<RawRecord> {
        let request = self
            .post("/kbfbsz/querydqxnxq", "/cdkb/querycdzy")
            .header(header::ACCEPT, "*/*");
        into_record(send(request).await?, "current term")
    }

    async fn fetch_buildings(&self) -> FetchResult<Vec<RawRecord>> {
        let request = self
            .post("/pksd/queryjxlList", "/cdkb/querycdzy")
            .header(header::ACCEPT, "*/*");
        into_records(send(request).await?, "building list")
    }

    async fn fetch_term_first_day(&self, term: &TermKey) -> FetchResult<RawRecord> {
        let form = [
            ("dm", String::new()),
            ("zyw", "zh".to_string()),
            ("xnxq", String::new()),
            ("pxn", term.academic_year.clone()),
            ("pxq", term.term.to_string()),
        ];
        let mut response = send(self.post_form("/Xiaoli/queryMonthList", "/Xiaoli/query", &form)).await?;

        let first = response
            .get_mut("xlList")
            .and_then(Value::as_array_mut)
            .filter(|list| !list.is_empty())
            .map(|list| list.swap_remove(0))
            .ok_or_else(|| FetchError::Decode(format!("empty calendar for term {}", term)))?;
        into_record(first, "calendar entry")
    }

    async fn fetch_classrooms_and_occupancy(
        &self,
        key: &AvailabilityKey,
    ) -> FetchResult<RawClassroomReport> {
        let rooms_form = self.room_query(key, self.page_size);
        let mut rooms =
            send(self.post_form("/cdkb/querycdzyleftzhou", "/cdkb/querycdzy", &rooms_form)).await?;
        let classrooms = match rooms.get_mut("list") {
            Some(list) => into_records(list.take(), "classroom list")?,
            None => Vec::new(),
        };

        let occupancy_form = self.room_query(key, OCCUPANCY_PAGE_SIZE);
        let occupancy = send(self.post_form(
            "/cdkb/querycdzyrightzhou",
            "/cdkb/querycdzy",
            &occupancy_form,
        ))
        .await?;
        let occupancies = into_records(occupancy, "occupancy list")?;

        Ok(RawClassroomReport {
            classrooms,
            occupancies,
        })
    }
}

/// Send a request and decode its JSON body, classifying failures.
async fn send(request: RequestBuilder) -> FetchResult<Value> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            FetchError::Transport("request timed out".to_string())
        } else if e.is_connect() {
            FetchError::Transport(format!("connection failed: {}", e))
        } else {
            FetchError::Transport(format!("request failed: {}", e))
        }
    })?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FetchError::Auth(format!("portal answered {}", status)));
    }

    let text = response
        .text()
        .await
        .map_err(|e| FetchError::Transport(format!("failed to read body: {}", e)))?;

    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            message: text.chars().take(200).collect(),
        });
    }

    parse_body(&text)
}

/// Decode a response body. An HTML page where JSON was expected is the
/// portal's login redirect.
fn parse_body(text: &str) -> FetchResult<Value> {
    if text.trim_start().starts_with('<') {
        return Err(FetchError::Auth(
            "portal returned an HTML page; the session has likely expired".to_string(),
        ));
    }
    serde_json::from_str(text).map_err(|e| FetchError::Decode(format!("invalid JSON: {}", e)))
}

fn into_record(value: Value, context: &str) -> FetchResult<RawRecord> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(FetchError::Decode(format!(
            "{} is not an object: {}",
            context,
            type_name(&other)
        ))),
    }
}

/// Collect the objects of a JSON array. `null` reads as an empty list;
/// non-object items are dropped.
fn into_records(value: Value, context: &str) -> FetchResult<Vec<RawRecord>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect()),
        other => Err(FetchError::Decode(format!(
            "{} is not an array: {}",
            context,
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

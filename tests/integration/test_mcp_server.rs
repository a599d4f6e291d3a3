//! Tests for the MCP server tools.

use std::sync::Arc;

use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::ServerHandler;
use serde_json::Value;
use tempfile::TempDir;

use registrar::config::Config;
use registrar::error::FetchError;
use registrar::mcp::{
    DescribeMaskParams, EncodeWeeksParams, ExportGradesParams, FindClassroomsParams,
    HealthResponse, LocateDateParams, RegistrarServer, ReloadParams, TermGradesParams,
};

use crate::common::{CallCounts, ScriptedPortal};

fn create_server(portal: &Arc<ScriptedPortal>) -> RegistrarServer {
    RegistrarServer::new(Config::default(), Arc::clone(portal) as _)
}

/// Parse the JSON text a successful tool call returned.
fn payload(result: &CallToolResult) -> Value {
    let value = serde_json::to_value(result).unwrap();
    let text = value["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn test_server_info() {
    let portal = Arc::new(ScriptedPortal::new());
    let server = create_server(&portal);

    let info = server.get_info();
    assert!(!info.server_info.name.is_empty(), "Server should have a name");
    let instructions = info.instructions.unwrap();
    assert!(instructions.contains("find_available_classrooms"));
    // creating a server fetches nothing
    assert_eq!(CallCounts::get(&portal.calls.grades), 0);
    assert_eq!(CallCounts::get(&portal.calls.current_term), 0);
}

#[tokio::test]
async fn test_get_gpa_tool() {
    let portal = Arc::new(ScriptedPortal::new());
    let server = create_server(&portal);

    let result = server
        .get_gpa(Parameters(ReloadParams::default()))
        .await
        .unwrap();
    assert_eq!(result.is_error, Some(false));
    let gpa = payload(&result);
    assert_eq!(gpa["gpa"], 3.72);
    assert_eq!(gpa["rank"], 12);
}

#[tokio::test]
async fn test_term_grades_tool() {
    let portal = Arc::new(ScriptedPortal::new());
    let server = create_server(&portal);

    let result = server
        .get_term_grades(Parameters(TermGradesParams {
            term_code: "2023-20242".to_string(),
        }))
        .await
        .unwrap();
    let body = payload(&result);
    assert_eq!(body["total"], 1);
    assert_eq!(body["records"][0]["course_id"], "PE102");

    let unknown = server
        .get_term_grades(Parameters(TermGradesParams {
            term_code: "1999-20001".to_string(),
        }))
        .await;
    assert!(unknown.is_err());
}

#[tokio::test]
async fn test_locate_date_tool() {
    let portal = Arc::new(ScriptedPortal::new());
    let server = create_server(&portal);

    let result = server
        .locate_date(Parameters(LocateDateParams {
            target_date: "2024-03-20".to_string(),
            academic_year: None,
            term: None,
        }))
        .await
        .unwrap();
    let body = payload(&result);
    assert_eq!(body["week"], 4);
    assert_eq!(body["weekday"], 3);
    assert_eq!(body["term"]["academic_year"], "2023-2024");

    let malformed = server
        .locate_date(Parameters(LocateDateParams {
            target_date: "20/03/2024".to_string(),
            academic_year: None,
            term: None,
        }))
        .await;
    assert!(malformed.is_err());
}

#[tokio::test]
async fn test_find_available_classrooms_tool() {
    let portal = Arc::new(ScriptedPortal::new());
    let server = create_server(&portal);

    let params = FindClassroomsParams {
        building_code: "A".to_string(),
        week_numbers: None,
        week_spec: Some("1-8".to_string()),
        weekday: Some(3),
        start_period: Some(3),
        end_period: None,
        min_seats: None,
        movable_seats: None,
        tiered: None,
        academic_year: None,
        term: None,
        force_reload: None,
    };
    let result = server
        .find_available_classrooms(Parameters(params.clone()))
        .await
        .unwrap();
    let body = payload(&result);
    assert_eq!(body["total"], 2);
    assert_eq!(body["periods"], "3-3");
    assert_eq!(body["classrooms"][0]["code"], "A102");

    let no_weeks = server
        .find_available_classrooms(Parameters(FindClassroomsParams {
            week_spec: None,
            ..params
        }))
        .await;
    assert!(no_weeks.is_err());
}

#[tokio::test]
async fn test_week_tools() {
    let portal = Arc::new(ScriptedPortal::new());
    let server = create_server(&portal);

    let encoded = server
        .encode_weeks(Parameters(EncodeWeeksParams {
            week_numbers: None,
            week_spec: Some("1-3,5".to_string()),
        }))
        .await
        .unwrap();
    let body = payload(&encoded);
    assert_eq!(body["mask"], 23);
    assert_eq!(body["description"], "1-3,5");
    assert_eq!(body["portal_string"].as_str().unwrap().len(), 34);

    let described = server
        .describe_week_mask(Parameters(DescribeMaskParams { mask: 0b1111_0000 }))
        .await
        .unwrap();
    assert_eq!(payload(&described)["description"], "5-8");

    let out_of_range = server
        .describe_week_mask(Parameters(DescribeMaskParams { mask: 1 << 31 }))
        .await;
    assert!(out_of_range.is_err());
}

#[tokio::test]
async fn test_portal_failure_is_tool_error() {
    let portal = Arc::new(ScriptedPortal::new());
    portal.set_failure(Some(FetchError::Auth("session expired".to_string())));
    let server = create_server(&portal);

    let result = server
        .list_buildings(Parameters(ReloadParams::default()))
        .await
        .unwrap();
    assert_eq!(result.is_error, Some(true));
}

#[tokio::test]
async fn test_refresh_cache_tool() {
    let portal = Arc::new(ScriptedPortal::new());
    let server = create_server(&portal);

    server
        .list_terms(Parameters(ReloadParams::default()))
        .await
        .unwrap();
    let refreshed = server.refresh_cache().await.unwrap();
    assert_eq!(payload(&refreshed)["domains"].as_array().unwrap().len(), 6);
    assert_eq!(CallCounts::get(&portal.calls.terms), 1);

    server
        .list_terms(Parameters(ReloadParams::default()))
        .await
        .unwrap();
    assert_eq!(CallCounts::get(&portal.calls.terms), 2);

    let stats = payload(&server.get_cache_stats().await.unwrap());
    assert_eq!(stats["availability_ttl_secs"], 300);
    assert_eq!(stats["domains"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_export_grades_tool() {
    let export_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.export.directory = export_dir.path().to_string_lossy().to_string();
    let portal = Arc::new(ScriptedPortal::new());
    let server = RegistrarServer::new(config, Arc::clone(&portal) as _);

    let result = server
        .export_grades_csv(Parameters(ExportGradesParams {
            filename: Some("transcript".to_string()),
        }))
        .await
        .unwrap();
    let body = payload(&result);
    assert_eq!(body["records"], 3);
    let path = std::path::PathBuf::from(body["path"].as_str().unwrap());
    assert!(path.is_absolute());
    assert!(path.ends_with("transcript.csv"));
    assert!(path.exists());
}

#[tokio::test]
async fn test_export_rejects_names_outside_export_dir() {
    let export_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.export.directory = export_dir.path().join("exports").to_string_lossy().to_string();
    let portal = Arc::new(ScriptedPortal::new());
    let server = RegistrarServer::new(config, Arc::clone(&portal) as _);

    for name in ["../escaped", "/tmp/escaped"] {
        let result = server
            .export_grades_csv(Parameters(ExportGradesParams {
                filename: Some(name.to_string()),
            }))
            .await;
        assert!(result.is_err(), "{name} should be rejected");
    }
    assert!(!export_dir.path().join("escaped.csv").exists());
    // rejected before any portal traffic
    assert_eq!(CallCounts::get(&portal.calls.grades), 0);
}

#[tokio::test]
async fn test_server_info_tool_lists_every_tool() {
    let portal = Arc::new(ScriptedPortal::new());
    let server = create_server(&portal);

    let info = payload(&server.get_server_info().await.unwrap());
    assert_eq!(info["name"], "registrar");
    assert_eq!(info["availability_ttl_secs"], 300);
    assert_eq!(info["session_cookie_configured"], false);

    let tools: Vec<&str> = info["tool_categories"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|c| c["tools"].as_array().unwrap())
        .map(|t| t.as_str().unwrap())
        .collect();
    assert_eq!(tools.len(), 17);
    assert!(tools.contains(&"find_available_classrooms"));
    assert!(tools.contains(&"get_server_info"));
    assert!(!info["tips"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_health_reports_cache_state() {
    let portal = Arc::new(ScriptedPortal::new());
    let server = create_server(&portal);

    let healthy = HealthResponse::from_stats(server.service().cache_stats(), 5);
    assert_eq!(healthy.status, "ok");
    assert_eq!(healthy.cache.len(), 6);

    portal.set_failure(Some(FetchError::Auth("session expired".to_string())));
    assert!(server.service().grade_book(false).await.is_err());
    let degraded = HealthResponse::from_stats(server.service().cache_stats(), 5);
    assert_eq!(degraded.status, "degraded");

    portal.set_failure(None);
    server.service().grade_book(false).await.unwrap();
    let recovered = HealthResponse::from_stats(server.service().cache_stats(), 5);
    assert_eq!(recovered.status, "ok");
}

#[tokio::test]
async fn test_list_grade_terms_newest_first() {
    let portal = Arc::new(ScriptedPortal::new());
    let server = create_server(&portal);

    let body = payload(&server.list_grade_terms().await.unwrap());
    let codes: Vec<&str> = body["terms"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["2023-20242", "2023-20241"]);
    assert_eq!(body["total"], 2);
}

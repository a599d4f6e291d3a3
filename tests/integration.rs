//! Integration tests for the registrar MCP server.
//!
//! Every test runs against a scripted portal fetcher, so no network access
//! is needed.

#[path = "integration/common.rs"]
mod common;

#[path = "integration/test_service.rs"]
mod test_service;

#[path = "integration/test_calendar.rs"]
mod test_calendar;

#[path = "integration/test_classrooms.rs"]
mod test_classrooms;

#[path = "integration/test_mcp_server.rs"]
mod test_mcp_server;

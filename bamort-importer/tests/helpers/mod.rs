//! Test Helper Utilities
//!
//! Shared utilities for the bamort-importer integration tests

#![allow(dead_code)]

pub mod app;
pub mod db_utils;
pub mod log_capture;
pub mod mock_adapter;

pub use app::{build_test_app, call, json_body, multipart_request, TestApp, BOUNDARY};
pub use db_utils::{count_rows, create_test_db};
pub use log_capture::{capture_logs, LogCapture};
pub use mock_adapter::{sample_sheet, MockAdapter, MockAdapterHandle};

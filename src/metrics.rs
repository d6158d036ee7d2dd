//! Prometheus metrics.
//!
//! Recording is a no-op until a recorder is installed, which only the native
//! server does; the spin component emits nothing.

use std::time::Instant;

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "plaza_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "plaza_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "plaza_http_requests_in_flight";
    pub const CLIENT_ERRORS_TOTAL: &str = "plaza_client_errors_total";

    pub const OPERATION_DURATION_SECONDS: &str = "plaza_operation_duration_seconds";
    pub const USERS_CREATED_TOTAL: &str = "plaza_users_created_total";
    pub const USERS_DELETED_TOTAL: &str = "plaza_users_deleted_total";
    pub const PUBLICATIONS_CREATED_TOTAL: &str = "plaza_publications_created_total";
    pub const PUBLICATIONS_DELETED_TOTAL: &str = "plaza_publications_deleted_total";
}

/// Write operations that get their own timing and success counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateUser,
    DeleteUser,
    CreatePublication,
    DeletePublication,
}

impl Operation {
    fn label(self) -> &'static str {
        match self {
            Operation::CreateUser => "create_user",
            Operation::DeleteUser => "delete_user",
            Operation::CreatePublication => "create_publication",
            Operation::DeletePublication => "delete_publication",
        }
    }

    fn counter_name(self) -> &'static str {
        match self {
            Operation::CreateUser => names::USERS_CREATED_TOTAL,
            Operation::DeleteUser => names::USERS_DELETED_TOTAL,
            Operation::CreatePublication => names::PUBLICATIONS_CREATED_TOTAL,
            Operation::DeletePublication => names::PUBLICATIONS_DELETED_TOTAL,
        }
    }
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", route_label(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);

    if (400..500).contains(&status) {
        counter!(names::CLIENT_ERRORS_TOTAL).increment(1);
    }
}

/// Record how long an operation took and, on success, count it.
pub fn record_operation<T, E>(op: Operation, result: &Result<T, E>, started: Instant) {
    let status = if result.is_ok() { "success" } else { "failure" };
    let labels = [("operation", op.label()), ("status", status)];

    histogram!(names::OPERATION_DURATION_SECONDS, &labels).record(started.elapsed().as_secs_f64());
    if result.is_ok() {
        counter!(op.counter_name()).increment(1);
    }
}

/// Holds one slot in the in-flight gauge until dropped.
pub struct InFlight(());

impl InFlight {
    pub fn start() -> Self {
        gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
        InFlight(())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);
    }
}

/// Numeric ids become `:id` so each route is one label value.
fn route_label(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| if s.bytes().all(|b| b.is_ascii_digit()) { ":id" } else { s })
        .collect();
    format!("/{}", segments.join("/"))
}

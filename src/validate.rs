//! Declarative validation of loaded artifacts.
//!
//! Two validation procedures share one contract shape: run the task's case
//! list against a loaded artifact and report per-case pass/fail with
//! diagnostic payloads. Neither procedure panics; every failure, including a
//! host or render error, becomes a failed case result.
//!
//! Per case the checks form a short-circuiting pipeline. Services: status
//! (exact), then `equals` (deep body equality), `contains` (per-key
//! equality), `hasProps` (key presence). Components: `equalsHtml`, then
//! `htmlContains`, then `hasDataTestIds`. A case passes iff every present
//! checker matched.

use crate::loader::{ComponentHandle, ServiceHandle, ServiceRequest};
use crate::task::{ComponentSpec, EndpointSpec};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One outcome within a validation run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseResult {
    /// Position of the case in the task's case list
    pub index: usize,
    /// Whether every present checker matched
    pub passed: bool,
    /// Human-readable failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Expected payload echo for diagnostics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    /// Received payload echo for diagnostics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<Value>,
}

impl CaseResult {
    fn pass(index: usize) -> Self {
        Self {
            index,
            passed: true,
            reason: None,
            expected: None,
            received: None,
        }
    }

    fn fail(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            passed: false,
            reason: Some(reason.into()),
            expected: None,
            received: None,
        }
    }

    fn with_expected(mut self, expected: Value) -> Self {
        self.expected = Some(expected);
        self
    }

    fn with_received(mut self, received: Value) -> Self {
        self.received = Some(received);
        self
    }
}

/// Outcome of one validation run over a task's case list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    /// Logical AND over all case results; vacuously true when empty
    pub all_passed: bool,
    /// Per-case outcomes, in case order
    pub case_results: Vec<CaseResult>,
}

impl ValidationResult {
    fn from_cases(case_results: Vec<CaseResult>) -> Self {
        Self {
            all_passed: case_results.iter().all(|r| r.passed),
            case_results,
        }
    }

    /// Indices of the failing cases, for error summaries
    #[must_use]
    pub fn failed_indices(&self) -> Vec<usize> {
        self.case_results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.index)
            .collect()
    }
}

/// Deep JSON equality with numeric comparison by value, so `7` and `7.0`
/// compare equal the way they would in the generated runtime.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => fx == fy,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Run an endpoint test plan against a service artifact.
///
/// Each case synthesizes one request; the status is compared first and on
/// mismatch the body checks are skipped for that case.
pub fn validate_service(handle: &mut dyn ServiceHandle, spec: &EndpointSpec) -> ValidationResult {
    let mut case_results = Vec::with_capacity(spec.cases.len());

    for (index, case) in spec.cases.iter().enumerate() {
        let request = ServiceRequest {
            method: spec.method.to_lowercase(),
            path: spec.path.clone(),
            query: case.query.clone(),
            body: case.body.clone(),
            headers: case.headers.clone(),
        };

        let response = match handle.dispatch(&request) {
            Ok(response) => response,
            Err(e) => {
                case_results.push(CaseResult::fail(index, format!("Request failed: {e}")));
                continue;
            }
        };

        if response.status != case.status {
            case_results.push(
                CaseResult::fail(
                    index,
                    format!("Expected status {}, got {}", case.status, response.status),
                )
                .with_received(json!({ "status": response.status, "body": response.body })),
            );
            continue;
        }

        case_results.push(check_body(index, &case.expect, &response.body));
    }

    ValidationResult::from_cases(case_results)
}

fn check_body(index: usize, expect: &crate::task::Expectation, body: &Value) -> CaseResult {
    if let Some(equals) = &expect.equals {
        if !json_eq(body, equals) {
            return CaseResult::fail(index, "Body mismatch")
                .with_expected(equals.clone())
                .with_received(body.clone());
        }
    }

    if let Some(contains) = &expect.contains {
        for (key, expected) in contains {
            let received = body.get(key);
            if !received.is_some_and(|v| json_eq(v, expected)) {
                return CaseResult::fail(index, format!("Missing or mismatched key '{key}'"))
                    .with_expected(expected.clone())
                    .with_received(received.cloned().unwrap_or(Value::Null));
            }
        }
    }

    if let Some(props) = &expect.has_props {
        for prop in props {
            if body.get(prop).is_none() {
                return CaseResult::fail(index, format!("Missing property '{prop}'"))
                    .with_received(body.clone());
            }
        }
    }

    CaseResult::pass(index)
}

/// Run a component test plan against a component artifact.
///
/// Each case renders once; a render failure fails the case with its reason.
pub fn validate_component(
    handle: &mut dyn ComponentHandle,
    spec: &ComponentSpec,
) -> ValidationResult {
    let mut case_results = Vec::with_capacity(spec.cases.len());

    for (index, case) in spec.cases.iter().enumerate() {
        let html = match handle.render(&case.props) {
            Ok(html) => html,
            Err(e) => {
                case_results.push(CaseResult::fail(index, format!("Render failed: {e}")));
                continue;
            }
        };

        case_results.push(check_markup(index, &case.expect, &html));
    }

    ValidationResult::from_cases(case_results)
}

fn check_markup(index: usize, expect: &crate::task::ComponentExpectation, html: &str) -> CaseResult {
    if let Some(equals_html) = &expect.equals_html {
        if html != equals_html {
            return CaseResult::fail(index, "HTML mismatch")
                .with_expected(Value::String(equals_html.clone()))
                .with_received(Value::String(html.to_string()));
        }
    }

    if let Some(substrings) = &expect.html_contains {
        for substring in substrings {
            if !html.contains(substring.as_str()) {
                return CaseResult::fail(index, "Missing HTML substring")
                    .with_expected(Value::String(substring.clone()))
                    .with_received(Value::String(html.to_string()));
            }
        }
    }

    if let Some(test_ids) = &expect.has_data_test_ids {
        for test_id in test_ids {
            let marker = format!("data-testid=\"{test_id}\"");
            if !html.contains(&marker) {
                return CaseResult::fail(index, format!("Missing data-testid '{test_id}'"))
                    .with_received(Value::String(html.to_string()));
            }
        }
    }

    CaseResult::pass(index)
}

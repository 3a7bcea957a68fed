//! Sandboxed JavaScript execution tool.
//!
//! Code runs inside an embedded boa interpreter with no host surface: no
//! network, no filesystem, no process access — the engine exposes only the
//! ECMAScript builtins. Resource budget: a loop-iteration limit and recursion
//! limit inside the engine, plus a wall-clock timeout around the blocking
//! evaluation. Execution faults are caught and returned as a structured
//! failure value, never thrown to the caller.

use std::time::Duration;

use async_trait::async_trait;
use boa_engine::{Context, Source};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Tool, ToolContext};
use crate::conversation::ToolName;

const MAX_CODE_CHARS: usize = 10_000;
const MAX_LOG_LINES: usize = 50;
const MAX_LOG_LINE_CHARS: usize = 500;
const LOOP_ITERATION_LIMIT: u64 = 5_000_000;
const RECURSION_LIMIT: usize = 256;

/// Structured result of one sandboxed evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxOutcome {
    pub success: bool,
    pub result: Value,
    pub logs: Vec<String>,
    pub errors: Vec<String>,
    pub error: Option<String>,
}

impl SandboxOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: Value::Null,
            logs: Vec::new(),
            errors: Vec::new(),
            error: Some(message.into()),
        }
    }
}

pub struct ExecuteJsTool {
    timeout: Duration,
}

#[async_trait]
impl Tool for ExecuteJsTool {
    fn name(&self) -> ToolName {
        ToolName::ExecuteJavascript
    }

    fn description(&self) -> &str {
        "Execute JavaScript code in an isolated sandbox and return the value of its final 'return' statement plus captured console output. No network, filesystem, or host access."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "JavaScript function body to execute; use 'return' for the result and console.log for output"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let code = args["code"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'code' argument"))?;
        let outcome = self.run(code).await;
        Ok(serde_json::to_value(outcome)?)
    }
}

impl ExecuteJsTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Evaluate `code` under the full resource budget. Never fails: every
    /// fault path produces a `SandboxOutcome` with `success: false`.
    pub async fn run(&self, code: &str) -> SandboxOutcome {
        if code.trim().is_empty() {
            return SandboxOutcome::failure("no code provided");
        }
        if code.chars().count() > MAX_CODE_CHARS {
            return SandboxOutcome::failure(format!(
                "code exceeds {} character limit",
                MAX_CODE_CHARS
            ));
        }

        let owned = code.to_string();
        let handle = tokio::task::spawn_blocking(move || evaluate(&owned));

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => {
                tracing::error!(error = %join_err, "sandbox task panicked");
                SandboxOutcome::failure("sandbox execution fault")
            }
            Err(_) => SandboxOutcome::failure(format!(
                "execution timed out after {} seconds",
                self.timeout.as_secs()
            )),
        }
    }
}

/// Blocking evaluation inside a fresh engine per call. The wrapper turns the
/// user code into a function body, captures console output into JS-side
/// arrays, and serializes `{result, logs, errors}` with JSON.stringify so the
/// host only ever parses one well-formed string.
fn evaluate(code: &str) -> SandboxOutcome {
    let wrapped = wrap(code);

    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(LOOP_ITERATION_LIMIT);
    context
        .runtime_limits_mut()
        .set_recursion_limit(RECURSION_LIMIT);

    let value = match context.eval(Source::from_bytes(wrapped.as_bytes())) {
        Ok(value) => value,
        Err(err) => return SandboxOutcome::failure(err.to_string()),
    };

    let raw = match value.to_string(&mut context) {
        Ok(js_string) => js_string.to_std_string_escaped(),
        Err(err) => return SandboxOutcome::failure(err.to_string()),
    };

    let payload: Value = match serde_json::from_str(&raw) {
        Ok(payload) => payload,
        Err(err) => {
            return SandboxOutcome::failure(format!("malformed sandbox payload: {}", err))
        }
    };

    SandboxOutcome {
        success: true,
        result: payload.get("result").cloned().unwrap_or(Value::Null),
        logs: cap_lines(&payload, "logs"),
        errors: cap_lines(&payload, "errors"),
        error: None,
    }
}

fn wrap(code: &str) -> String {
    format!(
        r#"(function() {{
    var __logs = [];
    var __errors = [];
    function __fmt(args) {{
        var out = [];
        for (var i = 0; i < args.length; i++) {{
            var v = args[i];
            if (typeof v === "object" && v !== null) {{
                try {{ out.push(JSON.stringify(v)); }} catch (e) {{ out.push(String(v)); }}
            }} else {{
                out.push(String(v));
            }}
        }}
        return out.join(" ");
    }}
    var console = {{
        log: function() {{ __logs.push(__fmt(arguments)); }},
        info: function() {{ __logs.push(__fmt(arguments)); }},
        warn: function() {{ __errors.push(__fmt(arguments)); }},
        error: function() {{ __errors.push(__fmt(arguments)); }}
    }};
    var __value = (function() {{
{code}
    }})();
    var __out = {{ result: null, logs: __logs, errors: __errors }};
    if (__value !== undefined && typeof __value !== "function") {{
        __out.result = __value;
    }}
    try {{
        return JSON.stringify(__out);
    }} catch (e) {{
        __out.result = String(__value);
        return JSON.stringify(__out);
    }}
}})()"#
    )
}

fn cap_lines(payload: &Value, field: &str) -> Vec<String> {
    payload
        .get(field)
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .take(MAX_LOG_LINES)
                .map(|line| {
                    let text = match line {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    text.chars().take(MAX_LOG_LINE_CHARS).collect()
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> ExecuteJsTool {
        ExecuteJsTool::new(Duration::from_secs(3))
    }

    #[tokio::test]
    async fn simple_arithmetic_returns_value() {
        let outcome = tool().run("return 1+1").await;
        assert!(outcome.success, "error: {:?}", outcome.error);
        assert_eq!(outcome.result, json!(2));
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn console_output_is_captured() {
        let outcome = tool()
            .run("console.log(\"hello\", 42); console.error(\"oops\"); return true;")
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.logs, vec!["hello 42"]);
        assert_eq!(outcome.errors, vec!["oops"]);
        assert_eq!(outcome.result, json!(true));
    }

    #[tokio::test]
    async fn objects_survive_serialization() {
        let outcome = tool().run("return { a: 1, b: [1, 2, 3] };").await;
        assert!(outcome.success);
        assert_eq!(outcome.result, json!({ "a": 1, "b": [1, 2, 3] }));
    }

    #[tokio::test]
    async fn missing_return_yields_null_result() {
        let outcome = tool().run("var x = 5;").await;
        assert!(outcome.success);
        assert_eq!(outcome.result, Value::Null);
    }

    #[tokio::test]
    async fn infinite_loop_fails_within_the_budget() {
        let started = std::time::Instant::now();
        let outcome = tool().run("while (true) {}").await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn syntax_errors_are_structured_failures() {
        let outcome = tool().run("return ((;").await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn thrown_errors_are_structured_failures() {
        let outcome = tool().run("throw new Error(\"boom\");").await;
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap_or("").contains("boom"));
    }

    #[tokio::test]
    async fn no_host_globals_are_exposed() {
        let outcome = tool()
            .run("return [typeof fetch, typeof require, typeof process];")
            .await;
        assert!(outcome.success);
        assert_eq!(
            outcome.result,
            json!(["undefined", "undefined", "undefined"])
        );
    }

    #[tokio::test]
    async fn oversized_code_is_rejected() {
        let big = format!("return {};", "1+".repeat(8000) + "1");
        let outcome = tool().run(&big).await;
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap_or("").contains("limit"));
    }
}

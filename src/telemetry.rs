use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::config::RuntimeConfig;
use crate::controller::{ControllerEvent, RunOutcome, RunReport};

pub fn unix_ms_now() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Append-only JSONL sink. Write failures are logged and never fail a run.
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    pub enabled: bool,
    pub path: PathBuf,
    pub run_id: String,
    pub command: String,
}

impl TelemetrySink {
    pub fn new(cfg: &RuntimeConfig, command: String) -> Self {
        let run_id = format!("run-{}-{}", unix_ms_now(), std::process::id());
        Self {
            enabled: cfg.telemetry_enabled,
            path: PathBuf::from(&cfg.telemetry_path),
            run_id,
            command,
        }
    }

    pub fn emit(&self, event: &str, payload: Value) {
        if !self.enabled {
            return;
        }

        let mut record = serde_json::Map::new();
        record.insert("ts_unix_ms".to_string(), json!(unix_ms_now()));
        record.insert("event".to_string(), json!(event));
        record.insert("run_id".to_string(), json!(self.run_id));
        record.insert("command".to_string(), json!(self.command));

        if let Some(map) = payload.as_object() {
            for (key, value) in map {
                record.insert(key.clone(), value.clone());
            }
        }

        let value = Value::Object(record);
        if let Err(err) = self.append_event_line(&value) {
            tracing::warn!(
                event = event,
                path = %self.path.display(),
                error = %err,
                "telemetry write failed"
            );
        }
    }

    pub fn emit_controller_event(&self, event: &ControllerEvent) {
        let (name, payload) = controller_event_record(event);
        self.emit(name, payload);
    }

    pub fn emit_run_completed(&self, report: &RunReport) {
        self.emit("run_completed", run_completed_payload(report));
    }

    /// `product` is `None` when the user stopped at a prompt, before any run began.
    pub fn emit_interrupted(&self, product: Option<&str>) {
        self.emit(
            "run_interrupted",
            json!({ "product": product, "during_run": product.is_some() }),
        );
    }

    fn append_event_line(&self, value: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create telemetry directory '{}'",
                    parent.display()
                )
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open telemetry path '{}'", self.path.display()))?;

        serde_json::to_writer(&mut file, value).with_context(|| {
            format!("failed to serialize telemetry event for '{}'", self.command)
        })?;
        writeln!(file).context("failed to write telemetry newline")
    }
}

pub fn controller_event_record(event: &ControllerEvent) -> (&'static str, Value) {
    match event {
        ControllerEvent::AttemptStarted {
            strategy,
            scope,
            attempt,
            timeout,
        } => (
            "attempt_started",
            json!({
                "strategy": strategy,
                "scope": scope,
                "attempt": attempt,
                "timeout_secs": timeout.as_secs(),
            }),
        ),
        ControllerEvent::AttemptFailed {
            strategy,
            attempt,
            kind,
            message,
        } => (
            "attempt_failed",
            json!({
                "strategy": strategy,
                "attempt": attempt,
                "kind": kind,
                "message": message,
            }),
        ),
        ControllerEvent::RetryScheduled {
            strategy,
            retry,
            kind,
            delay,
        } => (
            "retry_scheduled",
            json!({
                "strategy": strategy,
                "retry": retry,
                "kind": kind,
                "delay_ms": delay.as_millis() as u64,
            }),
        ),
        ControllerEvent::StrategyAdvanced { from, to } => (
            "strategy_advanced",
            json!({ "from": from, "to": to }),
        ),
        ControllerEvent::Succeeded { strategy, attempt } => (
            "attempt_succeeded",
            json!({ "strategy": strategy, "attempt": attempt }),
        ),
    }
}

pub fn run_completed_payload(report: &RunReport) -> Value {
    let total_backoff_ms = report
        .backoff_delays
        .iter()
        .map(|delay| delay.as_millis() as u64)
        .sum::<u64>();
    let base = json!({
        "attempts": report.attempts.len(),
        "strategies_tried": report.strategies_tried(),
        "backoff_count": report.backoff_delays.len(),
        "backoff_total_ms": total_backoff_ms,
    });
    let outcome = match &report.outcome {
        RunOutcome::Succeeded {
            strategy, scope, ..
        } => json!({ "outcome": "succeeded", "strategy": strategy, "scope": scope }),
        RunOutcome::Exhausted { last_error } => json!({
            "outcome": "exhausted",
            "last_error_kind": last_error.as_ref().map(|err| err.kind),
        }),
        RunOutcome::Aborted { strategy, error } => json!({
            "outcome": "aborted",
            "strategy": strategy,
            "error_kind": error.kind,
        }),
    };

    let mut merged = base.as_object().cloned().unwrap_or_default();
    if let Some(map) = outcome.as_object() {
        for (key, value) in map {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::FailureKind;
    use std::time::Duration;

    fn sink_at(path: PathBuf, enabled: bool) -> TelemetrySink {
        TelemetrySink {
            enabled,
            path,
            run_id: "run-test".to_string(),
            command: "analyze".to_string(),
        }
    }

    #[test]
    fn events_are_appended_as_json_lines() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let path = dir.path().join("nested/events.jsonl");
        let sink = sink_at(path.clone(), true);

        sink.emit("run_started", json!({"product": "Solar Kettle"}));
        sink.emit_controller_event(&ControllerEvent::RetryScheduled {
            strategy: "Quick Analysis".to_string(),
            retry: 1,
            kind: FailureKind::RateLimited,
            delay: Duration::from_millis(11_500),
        });

        let content = std::fs::read_to_string(&path).expect("telemetry file should exist");
        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).expect("line should be JSON");
        assert_eq!(first["event"], "run_started");
        assert_eq!(first["run_id"], "run-test");
        assert_eq!(first["product"], "Solar Kettle");

        let second: Value = serde_json::from_str(lines[1]).expect("line should be JSON");
        assert_eq!(second["event"], "retry_scheduled");
        assert_eq!(second["kind"], "rate_limited");
        assert_eq!(second["delay_ms"], 11_500);
    }

    #[test]
    fn interruption_records_whether_a_run_had_started() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let path = dir.path().join("events.jsonl");
        let sink = sink_at(path.clone(), true);

        sink.emit_interrupted(None);
        sink.clone().emit_interrupted(Some("Solar Kettle"));

        let content = std::fs::read_to_string(&path).expect("telemetry file should exist");
        let records = content
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).expect("line should be JSON"))
            .collect::<Vec<_>>();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["event"], "run_interrupted");
        assert_eq!(records[0]["product"], Value::Null);
        assert_eq!(records[0]["during_run"], false);
        assert_eq!(records[1]["product"], "Solar Kettle");
        assert_eq!(records[1]["during_run"], true);
    }

    #[test]
    fn disabled_sink_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let path = dir.path().join("events.jsonl");
        sink_at(path.clone(), false).emit("run_started", json!({}));
        assert!(!path.exists());
    }

    #[test]
    fn advance_event_names_both_strategies() {
        let (name, payload) = controller_event_record(&ControllerEvent::StrategyAdvanced {
            from: "Full Analysis".to_string(),
            to: "Quick Analysis".to_string(),
        });
        assert_eq!(name, "strategy_advanced");
        assert_eq!(payload["from"], "Full Analysis");
        assert_eq!(payload["to"], "Quick Analysis");
    }
}

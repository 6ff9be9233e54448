// src/audit.rs

//! Append-only audit log
//!
//! Every run appends structured JSON lines recording run start/stop and each
//! download/install outcome, tagged with a per-run UUID so events from
//! interleaved or historical runs can be correlated. Audit writes are
//! best-effort: a failure to append is logged but never fails the run.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

/// Default audit log location.
pub const DEFAULT_AUDIT_PATH: &str = "/var/log/loopdown-audit.log";

pub struct AuditLog {
    path: Option<PathBuf>,
    run_id: Uuid,
}

impl AuditLog {
    /// Create a log writing to `path`, or a disabled log when `None`.
    pub fn new(path: Option<PathBuf>) -> Self {
        AuditLog {
            path,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn disabled() -> Self {
        AuditLog::new(None)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn run_start(&self, action: &str, argv: &[String]) {
        self.append(json!({
            "event": "run-start",
            "action": action,
            "argv": argv,
        }));
    }

    pub fn run_stop(&self, exit_code: i32) {
        self.append(json!({
            "event": "run-stop",
            "exit_code": exit_code,
        }));
    }

    /// Record a per-package event such as `download`, `install`, or
    /// `verify-failed`.
    pub fn package_event(&self, event: &str, package: &str, detail: &str) {
        self.append(json!({
            "event": event,
            "package": package,
            "detail": detail,
        }));
    }

    fn append(&self, mut value: serde_json::Value) {
        let Some(path) = &self.path else {
            return;
        };

        if let Some(map) = value.as_object_mut() {
            map.insert("run_id".to_string(), json!(self.run_id.to_string()));
            map.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
        }

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{value}"));

        if let Err(e) = result {
            warn!("Unable to append to audit log {}: {}", path.display(), e);
        }
    }
}

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::diff::diff_json;

const REDACTED_KEYS: &[&str] = &["password", "token"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeLogMode {
    Full,
    /// First response per path in full, later ones as changed leaves.
    Diffed,
}

/// NDJSON record of every API exchange, for offline debugging.
pub(crate) struct ExchangeLogger {
    mode: ExchangeLogMode,
    file: File,
    previous: HashMap<String, Value>,
}

fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if REDACTED_KEYS.contains(&k.as_str()) {
                        (k.clone(), Value::String("***".into()))
                    } else {
                        (k.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

impl ExchangeLogger {
    pub fn new(mode: ExchangeLogMode, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous: HashMap::new(),
        })
    }

    pub fn log_request(&mut self, method: &str, path: &str, body: Option<&Value>) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "method": method,
            "path": path,
            "body": body.map(redact),
        });
        self.write_line(&entry);
    }

    pub fn log_command(&mut self, action: &str, zone: Option<u64>, body: &Value) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "cmd",
            "action": action,
            "zone": zone,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_response(&mut self, path: &str, status: u16, body: &Value) {
        let body = redact(body);
        let entry = match (self.mode, self.previous.get(path)) {
            (ExchangeLogMode::Diffed, Some(prev)) if status == 200 => {
                let mut changes = Vec::new();
                diff_json(prev, &body, "", &mut changes);
                let changes: Vec<Value> = changes
                    .into_iter()
                    .map(|c| json!({ "path": c.path, "old": c.old, "new": c.new }))
                    .collect();
                json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "resp",
                    "path": path,
                    "status": status,
                    "changes": changes,
                })
            }
            (mode, _) => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "resp",
                "path": path,
                "status": status,
                "full": mode == ExchangeLogMode::Diffed,
                "body": body,
            }),
        };
        self.write_line(&entry);

        if self.mode == ExchangeLogMode::Diffed && status == 200 {
            self.previous.insert(path.to_string(), body);
        }
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write exchange log entry: {e}");
        }
    }
}

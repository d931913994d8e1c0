use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Outcome of one request, notification or handshake step.
#[derive(Debug, Serialize)]
pub struct CallRecord {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// `ok`, `sent` for notifications, `remote_error`, or a failure kind.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub timestamp: String,
}

impl CallRecord {
    pub fn new(method: &str, id: Option<Value>, status: &str, elapsed_ms: u64) -> Self {
        Self {
            method: method.to_string(),
            id,
            status: status.to_string(),
            response: None,
            error: None,
            elapsed_ms,
            timestamp: now_unix_seconds(),
        }
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

pub fn print_record(record: &CallRecord, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "ID", "STATUS", "ELAPSED", "DETAIL"])
                .add_row(vec![
                    record.method.clone(),
                    id_label(record.id.as_ref()),
                    record.status.clone(),
                    format!("{}ms", record.elapsed_ms),
                    detail(record),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "method={} id={} status={} elapsed={}ms",
                record.method,
                id_label(record.id.as_ref()),
                record.status,
                record.elapsed_ms
            );
            if let Some(response) = &record.response {
                println!(
                    "{}",
                    serde_json::to_string_pretty(response).unwrap_or_else(|_| response.to_string())
                );
            }
            if let Some(error) = &record.error {
                println!("error: {error}");
            }
        }
        OutputFormat::Raw => {
            if let Some(line) = raw_line(record) {
                println!("{line}");
            }
        }
    }
}

/// The response exactly as received, or `{"error": <kind>, "message": ...}`
/// for a call that produced none. Notifications print nothing.
fn raw_line(record: &CallRecord) -> Option<String> {
    if let Some(response) = &record.response {
        return Some(response.to_string());
    }
    record.error.as_ref().map(|message| {
        json!({"error": record.status, "message": message}).to_string()
    })
}

fn id_label(id: Option<&Value>) -> String {
    id.map(Value::to_string).unwrap_or_else(|| "-".to_string())
}

fn detail(record: &CallRecord) -> String {
    match (&record.response, &record.error) {
        (_, Some(error)) => error.clone(),
        (Some(response), None) => response
            .get("result")
            .or_else(|| response.get("error"))
            .map(Value::to_string)
            .unwrap_or_default(),
        (None, None) => String::new(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

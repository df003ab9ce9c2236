//! Tool audit trail
//!
//! One record per executed tool call. Arguments are stored only as a digest,
//! computed after PIN values are redacted.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Success,
    /// Tool-level error reported back to the model
    Rejected,
    /// Model asked for a tool that is not registered
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolAuditRecord {
    pub audit_id: Uuid,
    pub session_key: String,
    pub client_id: String,
    pub tool_name: String,
    pub outcome: ToolOutcome,
    pub arguments_digest: String,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl ToolAuditRecord {
    pub fn new(
        session_key: &str,
        client_id: &str,
        tool_name: &str,
        arguments: &Value,
        outcome: ToolOutcome,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            audit_id: Uuid::new_v4(),
            session_key: session_key.to_string(),
            client_id: client_id.to_string(),
            tool_name: tool_name.to_string(),
            outcome,
            arguments_digest: compute_arguments_digest(arguments),
            execution_time_ms,
            created_at: Utc::now(),
        }
    }
}

/// Audit trail storage
pub struct AuditLog {
    records: Arc<RwLock<HashMap<Uuid, ToolAuditRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn record(&self, record: ToolAuditRecord) -> Result<Uuid> {
        let audit_id = record.audit_id;
        let mut records = self.records.write().await;
        records.insert(audit_id, record);
        Ok(audit_id)
    }

    pub async fn get(&self, audit_id: Uuid) -> Result<Option<ToolAuditRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&audit_id).cloned())
    }

    /// All records for a client, oldest first
    pub async fn list_for_client(&self, client_id: &str) -> Result<Vec<ToolAuditRecord>> {
        let records = self.records.read().await;

        let mut items: Vec<ToolAuditRecord> = records
            .values()
            .filter(|record| record.client_id == client_id)
            .cloned()
            .collect();

        items.sort_by_key(|record| record.created_at);
        Ok(items)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

fn is_pin_key(key: &str) -> bool {
    key.to_ascii_lowercase().contains("pin")
}

/// Copy of `arguments` with every PIN-like field replaced
pub fn redact_arguments(arguments: &Value) -> Value {
    match arguments {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = if is_pin_key(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_arguments(value)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_arguments).collect()),
        other => other.clone(),
    }
}

/// SHA256 of the redacted arguments, streamed into the hasher
pub fn compute_arguments_digest(arguments: &Value) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), &redact_arguments(arguments)).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_digest_ignores_pin_values() {
        let a = json!({"card_number": "5000214044289662", "old_pin": "1234", "new_pin": "9876"});
        let b = json!({"card_number": "5000214044289662", "old_pin": "0000", "new_pin": "1111"});
        let c = json!({"card_number": "5000987612345678", "old_pin": "1234", "new_pin": "9876"});

        assert_eq!(compute_arguments_digest(&a), compute_arguments_digest(&b));
        assert_ne!(compute_arguments_digest(&a), compute_arguments_digest(&c));
        assert_eq!(compute_arguments_digest(&a).len(), 64);
    }

    #[test]
    fn test_redaction_is_recursive() {
        let redacted = redact_arguments(&json!({"nested": [{"PIN": "1234"}], "count": 3}));
        assert_eq!(redacted["nested"][0]["PIN"], REDACTED);
        assert_eq!(redacted["count"], 3);
    }

    #[tokio::test]
    async fn test_records_listed_per_client() {
        let log = AuditLog::new();
        let first = ToolAuditRecord::new("s1", "1001", "view_card_details", &json!({}), ToolOutcome::Success, 2);
        let id = log.record(first).await.unwrap();
        log.record(ToolAuditRecord::new("s2", "1002", "change_pin", &json!({}), ToolOutcome::Rejected, 5))
            .await
            .unwrap();

        let records = log.list_for_client("1001").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].audit_id, id);
        assert_eq!(log.len().await, 2);
        assert!(log.get(id).await.unwrap().is_some());
    }
}

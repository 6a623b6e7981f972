use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{FieldMap, QuickbaseSettings};
use crate::record::CanonicalRecord;

const QUICKBASE_API: &str = "https://api.quickbase.com/v1";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response from {url}: {status} {body}")]
    Rejected { url: String, status: u16, body: String },
}

/// Raw status and body of one submission, whatever the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkResponse {
    pub status: u16,
    pub body: String,
}

pub trait RecordSink {
    async fn submit(&self, record: &CanonicalRecord) -> Result<SinkResponse, SinkError>;
}

/// Quickbase table the importer writes to, one record per request.
pub struct QuickbaseSink {
    client: reqwest::Client,
    settings: QuickbaseSettings,
    fields: FieldMap,
}

impl QuickbaseSink {
    pub fn new(settings: QuickbaseSettings, fields: FieldMap) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            fields,
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("QB-Realm-Hostname", &self.settings.realm)
            .header(
                "Authorization",
                format!("QB-USER-TOKEN {}", self.settings.user_token),
            )
    }

    /// Field descriptions of the target table.
    pub async fn fetch_fields(&self) -> Result<Vec<FieldInfo>> {
        let url = format!("{}/fields", QUICKBASE_API);
        info!("Fetching field list for table {}", self.settings.table_id);
        let response = self
            .request(reqwest::Method::GET, &url)
            .query(&[("tableId", &self.settings.table_id)])
            .send()
            .await
            .map_err(|source| SinkError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.context("Failed to read field list")?;
        if !(200..300).contains(&status) {
            return Err(SinkError::Rejected { url, status, body }.into());
        }
        serde_json::from_str(&body).context("Failed to parse field list")
    }
}

impl RecordSink for QuickbaseSink {
    async fn submit(&self, record: &CanonicalRecord) -> Result<SinkResponse, SinkError> {
        let url = format!("{}/records", QUICKBASE_API);
        let payload = build_payload(&self.settings.table_id, &self.fields, record);
        debug!("Submitting '{}'", record.property);

        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&payload)
            .send()
            .await
            .map_err(|source| SinkError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|source| SinkError::Transport { url, source })?;
        Ok(SinkResponse { status, body })
    }
}

/// `{"to": table, "data": [{"<fid>": {"value": ...}, ...}]}`
pub fn build_payload(table_id: &str, fields: &FieldMap, record: &CanonicalRecord) -> Value {
    let mut row = Map::new();
    let mut put = |fid: u32, value: Value| {
        row.insert(fid.to_string(), json!({ "value": value }));
    };

    put(fields.association, json!(record.association.as_str()));
    put(fields.property, json!(record.property));
    put(fields.member_type, json!(record.member_type));
    put(fields.full_address, json!(record.full_address()));
    put(fields.city, json!(record.city));
    put(fields.state, json!(record.state));
    put(fields.zip, json!(record.zip));
    put(fields.phone, json!(record.phone));
    put(fields.email, json!(record.email));
    put(fields.company, json!(record.company));
    put(fields.units, json!(record.units));

    json!({ "to": table_id, "data": [Value::Object(row)] })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    pub id: u32,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub no_update: bool,
    #[serde(default)]
    pub mode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkPolicy {
    /// Record every failure and keep going.
    ContinueOnFailure,
    /// Stop at the first non-success response.
    HaltOnFailure,
}

/// One row of the import results file.
#[derive(Debug, Clone, Serialize)]
pub struct SinkOutcome {
    #[serde(rename = "Property")]
    pub property: String,
    /// Absent when the request never got a response.
    #[serde(rename = "Status")]
    pub status: Option<u16>,
    #[serde(rename = "Response")]
    pub response: String,
    #[serde(rename = "Submitted At")]
    pub submitted_at: DateTime<Utc>,
}

impl SinkOutcome {
    /// Only a plain 200 counts. Quickbase answers 207 when the record was
    /// rejected line by line.
    pub fn is_success(&self) -> bool {
        self.status == Some(200)
    }
}

/// Submit records in order, one outcome per attempted record.
pub async fn push_records<S: RecordSink>(
    sink: &S,
    records: &[CanonicalRecord],
    policy: SinkPolicy,
) -> Vec<SinkOutcome> {
    let mut outcomes = Vec::with_capacity(records.len());
    let pb = crate::progress_bar(records.len());

    for record in records {
        let result = sink.submit(record).await;
        pb.inc(1);

        let outcome = match result {
            Ok(resp) => SinkOutcome {
                property: record.property.clone(),
                status: Some(resp.status),
                response: resp.body,
                submitted_at: Utc::now(),
            },
            Err(e) => SinkOutcome {
                property: record.property.clone(),
                status: None,
                response: e.to_string(),
                submitted_at: Utc::now(),
            },
        };

        let failed = !outcome.is_success();
        if failed {
            warn!(
                "Import failed for '{}': {} {}",
                outcome.property,
                outcome
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".into()),
                outcome.response
            );
        }
        outcomes.push(outcome);

        if failed && policy == SinkPolicy::HaltOnFailure {
            warn!(
                "Halting import after {} of {} records",
                outcomes.len(),
                records.len()
            );
            break;
        }
    }

    pb.finish_and_clear();
    let ok = outcomes.iter().filter(|o| o.is_success()).count();
    info!(
        "Imported {} records ({} ok, {} failed)",
        outcomes.len(),
        ok,
        outcomes.len() - ok
    );
    outcomes
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::record::Association;

    struct FakeSink {
        statuses: Vec<u16>,
        seen: RefCell<Vec<String>>,
    }

    impl RecordSink for FakeSink {
        async fn submit(&self, record: &CanonicalRecord) -> Result<SinkResponse, SinkError> {
            let mut seen = self.seen.borrow_mut();
            let status = self.statuses[seen.len()];
            seen.push(record.property.clone());
            Ok(SinkResponse {
                status,
                body: format!("{{\"status\":{}}}", status),
            })
        }
    }

    fn record(property: &str) -> CanonicalRecord {
        CanonicalRecord {
            company: "Greystar".into(),
            property: property.into(),
            street: "4400 Post Oak Pkwy".into(),
            city: "Houston".into(),
            state: "TX".into(),
            zip: "77027".into(),
            phone: "713-555-0100".into(),
            email: "jane@greystar.com".into(),
            units: 1250,
            profile_url: String::new(),
            association: Association::new("HAA"),
            member_type: "Owner".into(),
        }
    }

    #[test]
    fn payload_uses_field_ids() {
        let payload = build_payload("bqx7abc", &FieldMap::default(), &record("Post Oak"));
        assert_eq!(payload["to"], "bqx7abc");
        let row = &payload["data"][0];
        assert_eq!(row["6"]["value"], "HAA");
        assert_eq!(row["7"]["value"], "Post Oak");
        assert_eq!(row["8"]["value"], "Owner");
        assert_eq!(row["9"]["value"], "4400 Post Oak Pkwy Houston TX 77027");
        assert_eq!(row["18"]["value"], "Greystar");
        assert_eq!(row["22"]["value"], 1250);
        assert_eq!(row.as_object().unwrap().len(), 11);
    }

    #[test]
    fn field_list_parses() {
        let body = r#"[
            {"id": 6, "label": "Association", "fieldType": "text", "required": true, "mode": ""},
            {"id": 22, "label": "Units", "fieldType": "numeric", "noUpdate": false}
        ]"#;
        let fields: Vec<FieldInfo> = serde_json::from_str(body).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].field_type, "text");
        assert!(fields[0].required);
        assert_eq!(fields[1].id, 22);
        assert!(!fields[1].required);
    }

    #[tokio::test]
    async fn continue_records_every_outcome() {
        let sink = FakeSink {
            statuses: vec![200, 400, 207],
            seen: RefCell::new(Vec::new()),
        };
        let records = vec![record("A"), record("B"), record("C")];
        let outcomes = push_records(&sink, &records, SinkPolicy::ContinueOnFailure).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_success());
        assert!(!outcomes[1].is_success());
        assert!(!outcomes[2].is_success());
        assert_eq!(*sink.seen.borrow(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn halt_stops_at_first_failure() {
        let sink = FakeSink {
            statuses: vec![200, 500, 200],
            seen: RefCell::new(Vec::new()),
        };
        let records = vec![record("A"), record("B"), record("C")];
        let outcomes = push_records(&sink, &records, SinkPolicy::HaltOnFailure).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].status, Some(500));
        assert_eq!(sink.seen.borrow().len(), 2);
    }

    #[tokio::test]
    async fn halt_on_multi_status() {
        let sink = FakeSink {
            statuses: vec![207, 200, 200],
            seen: RefCell::new(Vec::new()),
        };
        let records = vec![record("A"), record("B"), record("C")];
        let outcomes = push_records(&sink, &records, SinkPolicy::HaltOnFailure).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, Some(207));
        assert!(!outcomes[0].is_success());
        assert_eq!(*sink.seen.borrow(), vec!["A"]);
    }

    #[tokio::test]
    async fn empty_batch() {
        let sink = FakeSink {
            statuses: Vec::new(),
            seen: RefCell::new(Vec::new()),
        };
        assert!(push_records(&sink, &[], SinkPolicy::HaltOnFailure).await.is_empty());
    }
}

//! Contact ingestion from delimited uploads.
//!
//! Rows are consumed as a lazy stream, validated against the upload mode,
//! and upserted in fixed-size batches keyed by `(campaign, phone)`. Invalid
//! rows are counted and skipped. A failed batch write aborts the rest of the
//! stream; batches already written stay written.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::pin::pin;
use std::str::FromStr;

use database::{campaign, contact, Database, DatabaseError, NewContact};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::error::IngestError;

/// Default number of contacts per batch write.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default number of parsed rows buffered between the reader and the pipeline.
pub const DEFAULT_ROW_BUFFER: usize = 256;

/// Extra fields every simple-mode contact gets.
const SIMPLE_OPTIONAL_FIELDS: [&str; 4] = ["pin", "var1", "var2", "var3"];

/// A parsed row: column header to cell value.
pub type Row = BTreeMap<String, String>;

/// How uploaded columns map onto contacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Fixed columns: `name, phone, link` and optional `pin, var1, var2, var3`.
    Simple,
    /// `name, phone` plus any number of free-form columns.
    #[default]
    Advanced,
}

impl FromStr for UploadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(UploadMode::Simple),
            "advanced" => Ok(UploadMode::Advanced),
            other => Err(format!("unknown upload mode: {}", other)),
        }
    }
}

/// Why a row was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A required column is missing or blank.
    MissingField(&'static str),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingField(field) => write!(f, "missing required field '{}'", field),
        }
    }
}

/// A row-level problem reported by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    /// The record could not be decoded. Counted as rejected.
    Malformed { line: u64, reason: String },
    /// The upload itself could not be read. Aborts ingestion.
    Io(String),
}

/// Aggregate result of an ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Rows written to the contact store.
    pub imported: u64,
    /// Rows skipped as invalid.
    pub rejected: u64,
}

fn required(row: &Row, field: &'static str) -> Result<String, Rejection> {
    match row.get(field).map(|value| value.trim()) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(Rejection::MissingField(field)),
    }
}

/// Validate a row and shape it into a contact for the given mode.
pub fn validate_row(mode: UploadMode, row: &Row) -> Result<NewContact, Rejection> {
    let name = required(row, "name")?;
    let phone = required(row, "phone")?;

    let fields = match mode {
        UploadMode::Simple => {
            let mut fields = BTreeMap::new();
            fields.insert("link".to_string(), required(row, "link")?);
            for field in SIMPLE_OPTIONAL_FIELDS {
                let value = row.get(field).map(|v| v.trim()).unwrap_or_default();
                fields.insert(field.to_string(), value.to_string());
            }
            fields
        }
        UploadMode::Advanced => row
            .iter()
            .filter(|(key, _)| key.as_str() != "name" && key.as_str() != "phone")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    };

    Ok(NewContact {
        phone,
        name,
        fields,
    })
}

/// Parse CSV from a blocking reader into a stream of rows.
///
/// Parsing runs on the blocking pool and stays at most `buffer` rows ahead
/// of the consumer, so the upload is never held in memory as a whole.
pub fn csv_rows<R>(reader: R, buffer: usize) -> ReceiverStream<Result<Row, RowError>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));

    tokio::task::spawn_blocking(move || {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = match csv.headers() {
            Ok(headers) => headers.clone(),
            Err(e) => {
                let _ = tx.blocking_send(Err(RowError::Io(e.to_string())));
                return;
            }
        };

        for record in csv.records() {
            let item = match record {
                Ok(record) => Ok(headers
                    .iter()
                    .zip(record.iter())
                    .map(|(header, value)| (header.to_string(), value.to_string()))
                    .collect::<Row>()),
                Err(e) if e.is_io_error() => Err(RowError::Io(e.to_string())),
                Err(e) => Err(RowError::Malformed {
                    line: e.position().map_or(0, |p| p.line()),
                    reason: e.to_string(),
                }),
            };

            let fatal = matches!(item, Err(RowError::Io(_)));
            if tx.blocking_send(item).is_err() || fatal {
                // Receiver gone or upload unreadable.
                return;
            }
        }
    });

    ReceiverStream::new(rx)
}

/// Streams rows into the contact store.
#[derive(Debug, Clone)]
pub struct Ingestor {
    db: Database,
    batch_size: usize,
}

impl Ingestor {
    /// Create an ingestor with the default batch size.
    pub fn new(db: Database) -> Self {
        Self::with_batch_size(db, DEFAULT_BATCH_SIZE)
    }

    /// Create an ingestor with a custom batch size.
    pub fn with_batch_size(db: Database, batch_size: usize) -> Self {
        Self {
            db,
            batch_size: batch_size.max(1),
        }
    }

    /// Ingest a stream of rows into a campaign.
    pub async fn ingest<S>(
        &self,
        campaign_id: &str,
        mode: UploadMode,
        rows: S,
    ) -> Result<IngestSummary, IngestError>
    where
        S: Stream<Item = Result<Row, RowError>>,
    {
        match campaign::get_campaign(self.db.pool(), campaign_id).await {
            Ok(_) => {}
            Err(DatabaseError::NotFound { .. }) => {
                return Err(IngestError::CampaignNotFound(campaign_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        info!(campaign_id, ?mode, batch_size = self.batch_size, "Starting ingestion");

        let mut rows = pin!(rows);
        let mut summary = IngestSummary::default();
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut row_number: u64 = 0;

        while let Some(item) = rows.next().await {
            row_number += 1;
            match item {
                Ok(row) => match validate_row(mode, &row) {
                    Ok(contact) => batch.push(contact),
                    Err(rejection) => {
                        summary.rejected += 1;
                        warn!(campaign_id, row = row_number, reason = %rejection, "Skipping invalid contact");
                    }
                },
                Err(RowError::Malformed { line, reason }) => {
                    summary.rejected += 1;
                    warn!(campaign_id, row = row_number, line, reason = %reason, "Skipping unreadable row");
                }
                Err(RowError::Io(reason)) => {
                    warn!(campaign_id, imported = summary.imported, "Upload read failed, aborting");
                    return Err(IngestError::Read(reason));
                }
            }

            if batch.len() >= self.batch_size {
                summary.imported += self.flush(campaign_id, &mut batch).await?;
            }
        }

        if !batch.is_empty() {
            summary.imported += self.flush(campaign_id, &mut batch).await?;
        }

        info!(
            campaign_id,
            imported = summary.imported,
            rejected = summary.rejected,
            "Ingestion complete"
        );
        Ok(summary)
    }

    async fn flush(&self, campaign_id: &str, batch: &mut Vec<NewContact>) -> Result<u64, IngestError> {
        let count = batch.len() as u64;
        debug!(campaign_id, count, "Flushing contact batch");

        contact::upsert_contacts(self.db.pool(), campaign_id, batch)
            .await
            .inspect_err(|e| warn!(campaign_id, error = %e, "Batch write failed, aborting"))?;

        batch.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_simple_mode_builds_fixed_fields() {
        let contact = validate_row(
            UploadMode::Simple,
            &row(&[
                ("name", " Jane "),
                ("phone", " +15550001 "),
                ("link", " https://s/1 "),
                ("pin", "1234"),
                ("extra", "ignored"),
            ]),
        )
        .unwrap();

        assert_eq!(contact.name, "Jane");
        assert_eq!(contact.phone, "+15550001");
        let keys: Vec<&str> = contact.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["link", "pin", "var1", "var2", "var3"]);
        assert_eq!(contact.fields["link"], "https://s/1");
        assert_eq!(contact.fields["pin"], "1234");
        assert_eq!(contact.fields["var1"], "");
    }

    #[test]
    fn test_missing_link_depends_on_mode() {
        let input = row(&[("name", "Jane"), ("phone", "+15550001"), ("city", "Oslo")]);

        assert_eq!(
            validate_row(UploadMode::Simple, &input),
            Err(Rejection::MissingField("link"))
        );

        let contact = validate_row(UploadMode::Advanced, &input).unwrap();
        assert_eq!(contact.fields.len(), 1);
        assert_eq!(contact.fields["city"], "Oslo");
    }

    #[test]
    fn test_advanced_mode_keeps_extra_values_verbatim() {
        let contact = validate_row(
            UploadMode::Advanced,
            &row(&[("name", "Jane"), ("phone", "1"), ("note", "  spaced  ")]),
        )
        .unwrap();
        assert_eq!(contact.fields["note"], "  spaced  ");
    }

    #[test]
    fn test_blank_required_fields_are_rejected() {
        assert_eq!(
            validate_row(UploadMode::Advanced, &row(&[("name", "   "), ("phone", "1")])),
            Err(Rejection::MissingField("name"))
        );
        assert_eq!(
            validate_row(UploadMode::Advanced, &row(&[("name", "Jane")])),
            Err(Rejection::MissingField("phone"))
        );
    }

    #[test]
    fn test_upload_mode_parsing() {
        assert_eq!("simple".parse::<UploadMode>(), Ok(UploadMode::Simple));
        assert_eq!(" Advanced ".parse::<UploadMode>(), Ok(UploadMode::Advanced));
        assert!("fancy".parse::<UploadMode>().is_err());
        assert_eq!(UploadMode::default(), UploadMode::Advanced);
    }

    #[tokio::test]
    async fn test_csv_rows_reports_malformed_records_and_continues() {
        let data = "name,phone,link\nJane,+1,https://a\nbroken\nJohn,+2,https://b\n";
        let rows: Vec<_> = csv_rows(std::io::Cursor::new(data), 4).collect().await;

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].as_ref().unwrap()["name"], "Jane");
        assert!(matches!(rows[1], Err(RowError::Malformed { .. })));
        assert_eq!(rows[2].as_ref().unwrap()["phone"], "+2");
    }

    #[tokio::test]
    async fn test_csv_rows_trims_headers() {
        let data = " name , phone \nJane,+1\n";
        let rows: Vec<_> = csv_rows(std::io::Cursor::new(data), 4).collect().await;
        assert_eq!(rows[0].as_ref().unwrap()["phone"], "+1");
    }
}

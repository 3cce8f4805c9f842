//! Append-only, per-saga log of fulfillment progress.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::SagaId;
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

/// Position of a record within one saga's log, used for optimistic
/// concurrency control.
///
/// Versions start at 1 for the first record and increment by 1 for each
/// subsequent record of the same saga.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The version of a saga with no records yet.
    pub fn initial() -> Self {
        Self(0)
    }

    /// The version of the first record.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a saga's journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub saga_id: SagaId,
    pub version: Version,

    /// Discriminator of the payload, e.g. `"StockReserved"`.
    pub record_type: String,
    pub payload: serde_json::Value,

    /// Set on the record that closes the saga. A saga with a terminal record
    /// is never swept again.
    pub terminal: bool,
    pub recorded_at: DateTime<Utc>,
}

impl JournalRecord {
    /// Creates a new record builder.
    pub fn builder() -> JournalRecordBuilder {
        JournalRecordBuilder::default()
    }
}

/// Builder for journal records.
#[derive(Debug, Default)]
pub struct JournalRecordBuilder {
    saga_id: Option<SagaId>,
    version: Option<Version>,
    record_type: Option<String>,
    payload: Option<serde_json::Value>,
    terminal: bool,
    recorded_at: Option<DateTime<Utc>>,
}

impl JournalRecordBuilder {
    pub fn saga_id(mut self, saga_id: SagaId) -> Self {
        self.saga_id = Some(saga_id);
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn terminal(mut self, terminal: bool) -> Self {
        self.terminal = terminal;
        self
    }

    /// Sets the timestamp. If not set, the current time is used.
    pub fn recorded_at(mut self, at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(at);
        self
    }

    /// Builds the record, failing if saga id, version, type or payload is
    /// missing.
    pub fn build(self) -> Result<JournalRecord> {
        let missing = |field: &str| StoreError::InvalidRecord(format!("{field} is required"));
        Ok(JournalRecord {
            saga_id: self.saga_id.ok_or_else(|| missing("saga_id"))?,
            version: self.version.ok_or_else(|| missing("version"))?,
            record_type: self.record_type.ok_or_else(|| missing("record_type"))?,
            payload: self.payload.ok_or_else(|| missing("payload"))?,
            terminal: self.terminal,
            recorded_at: self.recorded_at.unwrap_or_else(Utc::now),
        })
    }
}

/// Durable saga log.
#[async_trait]
pub trait SagaJournal: Send + Sync {
    /// Appends records atomically.
    ///
    /// Fails with `ConcurrencyConflict` unless the saga's current version
    /// equals `expected`. Returns the version of the last appended record.
    async fn append(&self, records: Vec<JournalRecord>, expected: Version) -> Result<Version>;

    /// All records of a saga in version order. Empty if unknown.
    async fn load(&self, saga_id: SagaId) -> Result<Vec<JournalRecord>>;

    /// Sagas without a terminal record whose first record is older than
    /// `started_before`, oldest first.
    async fn open_sagas(&self, started_before: DateTime<Utc>) -> Result<Vec<SagaId>>;
}

#[async_trait]
impl<T: SagaJournal + ?Sized> SagaJournal for Arc<T> {
    async fn append(&self, records: Vec<JournalRecord>, expected: Version) -> Result<Version> {
        (**self).append(records, expected).await
    }

    async fn load(&self, saga_id: SagaId) -> Result<Vec<JournalRecord>> {
        (**self).load(saga_id).await
    }

    async fn open_sagas(&self, started_before: DateTime<Utc>) -> Result<Vec<SagaId>> {
        (**self).open_sagas(started_before).await
    }
}

/// Checks that a batch belongs to one saga and continues right after
/// `expected`.
pub(crate) fn validate_records_for_append(
    records: &[JournalRecord],
    expected: Version,
) -> Result<SagaId> {
    let first = records
        .first()
        .ok_or_else(|| StoreError::InvalidRecord("cannot append an empty batch".to_string()))?;

    let mut want = expected;
    for record in records {
        if record.saga_id != first.saga_id {
            return Err(StoreError::InvalidRecord(
                "all records must belong to the same saga".to_string(),
            ));
        }
        want = want.next();
        if record.version != want {
            return Err(StoreError::InvalidRecord(format!(
                "record versions must be sequential: expected {want}, got {}",
                record.version
            )));
        }
    }

    Ok(first.saga_id)
}

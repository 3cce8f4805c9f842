//! Writes saga events to the journal.

use std::time::Duration;

use common::SagaId;
use order_store::{JournalRecord, SagaJournal, StoreError, Version};

use crate::events::SagaEvent;

/// Append cursor for one saga's journal.
pub(crate) struct SagaLog<'a, J: ?Sized> {
    journal: &'a J,
    saga_id: SagaId,
    version: Version,
    timeout: Duration,
}

impl<'a, J: SagaJournal + ?Sized> SagaLog<'a, J> {
    /// Cursor for a new saga.
    pub(crate) fn start(journal: &'a J, saga_id: SagaId, timeout: Duration) -> Self {
        Self::resume(journal, saga_id, Version::initial(), timeout)
    }

    /// Cursor continuing after `version`.
    pub(crate) fn resume(
        journal: &'a J,
        saga_id: SagaId,
        version: Version,
        timeout: Duration,
    ) -> Self {
        Self {
            journal,
            saga_id,
            version,
            timeout,
        }
    }

    pub(crate) fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    pub(crate) async fn record(&mut self, event: &SagaEvent) -> Result<(), StoreError> {
        let record = JournalRecord::builder()
            .saga_id(self.saga_id)
            .version(self.version.next())
            .record_type(event.record_type())
            .payload(event)?
            .terminal(event.is_terminal())
            .build()?;

        let append = self.journal.append(vec![record], self.version);
        self.version = match tokio::time::timeout(self.timeout, append).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(StoreError::Unavailable(format!(
                    "journal append timed out after {:?}",
                    self.timeout
                )));
            }
        };
        Ok(())
    }

    /// Like [`record`](Self::record) but only logs a failure.
    pub(crate) async fn record_or_warn(&mut self, event: &SagaEvent) {
        if let Err(e) = self.record(event).await {
            tracing::warn!(
                saga_id = %self.saga_id,
                record_type = event.record_type(),
                error = %e,
                "could not write saga journal record"
            );
        }
    }
}

use crate::correlate::ResolutionEvent;
use crate::db::Database;
use crate::error::{AmputateError, Result};
use tracing::{debug, error};

/// Commits a completed [`ResolutionEvent`] as a single unit.
#[derive(Clone)]
pub struct PersistenceGate {
    db: Database,
}

impl PersistenceGate {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Write the event and its URL records.
    ///
    /// Succeeds only if exactly one event row and every URL record were
    /// written. Anything else means the event is not durably recorded.
    pub async fn commit(&self, event: &ResolutionEvent) -> Result<()> {
        let owned = event.clone();
        let write = self
            .db
            .run_blocking(move |db| db.insert_resolution_event(&owned))
            .await
            .map_err(|e| {
                error!("Failed to persist resolution event {}: {}", event.id, e);
                AmputateError::PersistenceFailed(e.to_string())
            })?;

        if !write.is_complete(event) {
            error!(
                "Unexpected rows affected persisting resolution event {}: {} event, {} url (expected 1, {})",
                event.id,
                write.event_rows,
                write.url_rows,
                event.record_count()
            );
            return Err(AmputateError::PersistenceFailed(format!(
                "unexpected number of rows affected inserting resolution event: {}",
                write.event_rows
            )));
        }

        debug!(
            "Persisted resolution event {} with {} request and {} response URL(s)",
            event.id,
            event.requests.len(),
            event.responses.len()
        );
        Ok(())
    }
}

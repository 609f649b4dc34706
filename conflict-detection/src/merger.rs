use crate::clock::Clock;
use crate::errors::ConflictDetectionError;
use crate::report::{
    UnregisteredClients, decode_report, load_unregistered_clients, merge_report,
    save_unregistered_clients,
};
use crate::window::DetectionWindow;
use options_store::{OptionsStore, StoreError};
use std::sync::Arc;
use tokio::sync::{AcquireError, Semaphore, SemaphorePermit};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The report was merged. `reported` is the number of clients in the
    /// report and `total` the size of the stored map afterwards.
    Merged { reported: usize, total: usize },
    /// Detection is disabled or expired; nothing was stored.
    WindowClosed,
}

/// Merges conflict reports into the persisted map of unregistered clients.
pub struct ConflictReportMerger {
    store: Arc<dyn OptionsStore>,
    clock: Arc<dyn Clock>,
    // Serializes the read-modify-write of the stored map within this process.
    // Writers in other processes sharing the store can still overwrite each other.
    update_lock: Semaphore,
}

impl ConflictReportMerger {
    pub fn new(store: Arc<dyn OptionsStore>, clock: Arc<dyn Clock>) -> Self {
        ConflictReportMerger {
            store,
            clock,
            update_lock: Semaphore::new(1),
        }
    }

    pub fn store(&self) -> &dyn OptionsStore {
        self.store.as_ref()
    }

    pub async fn detection_window(&self) -> Result<DetectionWindow, StoreError> {
        DetectionWindow::load(self.store.as_ref()).await
    }

    /// Whether reports are currently accepted. Evaluated against the clock on
    /// every call.
    pub async fn is_detecting(&self) -> Result<bool, StoreError> {
        let window = self.detection_window().await?;
        Ok(window.is_open_at(self.clock.now()))
    }

    /// Merges a raw JSON report into the stored map.
    ///
    /// Outside the detection window the body is not even decoded. A body
    /// that fails to decode leaves the stored map untouched, and the map is
    /// written back in a single `set`, so a failed write leaves the previous
    /// value in place.
    pub async fn report_conflicts(
        &self,
        raw_body: &[u8],
    ) -> Result<ReportOutcome, ConflictDetectionError> {
        if !self.is_detecting().await? {
            return Ok(ReportOutcome::WindowClosed);
        }

        let report = decode_report(raw_body)
            .map_err(|err| ConflictDetectionError::InvalidReport(err.to_string()))?;
        let reported = report.len();

        let _permit = self.get_permit().await?;

        let mut clients = load_unregistered_clients(self.store.as_ref()).await?;
        merge_report(&mut clients, report);
        save_unregistered_clients(self.store.as_ref(), &clients).await?;

        Ok(ReportOutcome::Merged {
            reported,
            total: clients.len(),
        })
    }

    /// The stored map, empty if nothing was ever reported.
    pub async fn unregistered_clients(
        &self,
    ) -> Result<UnregisteredClients, ConflictDetectionError> {
        load_unregistered_clients(self.store.as_ref()).await
    }

    async fn get_permit(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        self.update_lock.acquire().await
    }
}

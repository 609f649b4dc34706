//! Administrative actions on the detection window and the stored report.

use crate::clock::Clock;
use crate::errors::ConflictDetectionError;
use crate::report::UNREGISTERED_CLIENTS_KEY;
use crate::window::DetectionWindow;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use options_store::{OptionsStore, StoreError};

/// Longest detection window that can be opened at once.
pub const MAX_DETECTION_WINDOW_MINUTES: u32 = 24 * 60;

/// Opens the detection window from now until `now + duration` and returns the
/// expiry as stored, which is truncated to whole seconds.
pub async fn open_detection_window(
    store: &dyn OptionsStore,
    clock: &dyn Clock,
    duration: TimeDelta,
) -> Result<DateTime<Utc>, ConflictDetectionError> {
    let max = TimeDelta::minutes(MAX_DETECTION_WINDOW_MINUTES.into());
    if duration <= TimeDelta::zero() || duration > max {
        return Err(ConflictDetectionError::InvalidWindow(duration.num_minutes()));
    }

    let expires_at = (clock.now() + duration).trunc_subsecs(0);
    DetectionWindow::until(expires_at).save(store).await?;
    tracing::info!(%expires_at, "detecting conflicts");
    Ok(expires_at)
}

pub async fn close_detection_window(store: &dyn OptionsStore) -> Result<(), StoreError> {
    DetectionWindow::closed().save(store).await?;
    tracing::info!("stopped detecting conflicts");
    Ok(())
}

/// Forgets every reported client.
pub async fn clear_unregistered_clients(store: &dyn OptionsStore) -> Result<(), StoreError> {
    store.delete(UNREGISTERED_CLIENTS_KEY).await?;
    tracing::info!("cleared unregistered clients");
    Ok(())
}

use chrono::{NaiveDateTime, TimeDelta, Utc};
use std::time::Duration;
use tokio::time::interval;

use crate::error::ServiceResult;
use crate::services::device_registry;
use crate::store::RuleStore;

/// Periodically flags devices that stopped polling as inactive. Returns
/// immediately when no staleness threshold is configured.
pub async fn run(store: RuleStore, stale_after_secs: Option<u64>, sweep_interval_secs: u64) {
    let Some(stale_after) = stale_after_secs else {
        tracing::info!("Device liveness sweep disabled");
        return;
    };

    tracing::info!(
        "Device liveness sweep every {}s, stale after {}s",
        sweep_interval_secs,
        stale_after
    );

    let mut tick = interval(Duration::from_secs(sweep_interval_secs.max(1)));

    loop {
        tick.tick().await;

        if let Err(e) = sweep(&store, stale_after) {
            tracing::error!("Device liveness sweep failed: {}", e);
        }
    }
}

/// Check-in time before which a device counts as silent. `None` when the
/// threshold does not fit the calendar, in which case nothing is stale.
pub fn stale_threshold(now: NaiveDateTime, stale_after_secs: u64) -> Option<NaiveDateTime> {
    i64::try_from(stale_after_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|age| now.checked_sub_signed(age))
}

pub fn sweep(store: &RuleStore, stale_after_secs: u64) -> ServiceResult<usize> {
    let Some(threshold) = stale_threshold(Utc::now().naive_utc(), stale_after_secs) else {
        tracing::warn!(
            "Stale threshold of {}s is out of range, skipping sweep",
            stale_after_secs
        );
        return Ok(0);
    };

    let marked = device_registry::mark_stale(store, threshold)?;
    if marked > 0 {
        tracing::warn!("Marked {} silent devices as inactive", marked);
    }

    Ok(marked)
}

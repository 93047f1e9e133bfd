//! Persistent cluster identity.

use std::time::Duration;

use ephemeris_proto::ClusterId;
use ephemeris_state::TableStore;
use tracing::{info, warn};

use crate::error::{ControlError, ControlResult};
use crate::storage::{CLUSTER_ID_KEY, CLUSTER_TABLE};

/// Returns the cluster id stored in the table store, generating and storing
/// a fresh one on first start.
///
/// Storage errors are retried up to `attempts` times with `retry_delay`
/// between tries. Running out of attempts, or finding a stored value that is
/// not a cluster id, is a startup failure.
pub async fn get_or_create_cluster_id(
    store: &dyn TableStore,
    attempts: u32,
    retry_delay: Duration,
) -> ControlResult<ClusterId> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match try_get_or_create(store).await {
            Ok(id) => return Ok(id),
            Err(ControlError::Storage(e)) => {
                warn!(attempt, attempts, error = %e, "cluster id lookup failed");
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(retry_delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(ControlError::Startup(format!(
        "could not read or persist cluster id after {attempts} attempts: {}",
        last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string())
    )))
}

async fn try_get_or_create(store: &dyn TableStore) -> ControlResult<ClusterId> {
    if let Some(bytes) = store.get(CLUSTER_TABLE, CLUSTER_ID_KEY).await? {
        let id = ClusterId::from_slice(&bytes)
            .map_err(|e| ControlError::Startup(format!("stored cluster id is invalid: {e}")))?;
        info!(cluster_id = %id, "reusing persisted cluster id");
        return Ok(id);
    }

    let id = ClusterId::new();
    store.put(CLUSTER_TABLE, CLUSTER_ID_KEY, id.as_bytes()).await?;
    info!(cluster_id = %id, "generated new cluster id");
    Ok(id)
}

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;
use crate::error::StateError;
use crate::traits::TableStore;

#[cfg(feature = "memory")]
use crate::memory::MemoryTableStore;

#[cfg(feature = "valkey")]
use crate::valkey::ValkeyTableStore;

/// Opens the table store described by `config`.
///
/// This is the only place that inspects the backend kind. `default_namespace`
/// is used as the Valkey key prefix when the config leaves it unset.
pub async fn open_table_store(
    config: &StorageConfig,
    default_namespace: &str,
) -> Result<Arc<dyn TableStore>, StateError> {
    let store: Arc<dyn TableStore> = match config {
        #[cfg(feature = "memory")]
        StorageConfig::Memory => Arc::new(MemoryTableStore::new()),

        #[cfg(feature = "valkey")]
        StorageConfig::Valkey(valkey) => {
            let namespace = valkey
                .namespace
                .clone()
                .unwrap_or_else(|| default_namespace.to_string());
            if namespace.is_empty() {
                return Err(StateError::Configuration(
                    "valkey namespace must not be empty".to_string(),
                ));
            }
            valkey.url()?;
            let store = ValkeyTableStore::connect(valkey, namespace)
                .await
                .map_err(|e| StateError::Connection(e.to_string()))?;
            Arc::new(store)
        }

        #[allow(unreachable_patterns)]
        _ => {
            return Err(StateError::UnsupportedBackend(
                "No suitable table store backend enabled".to_string(),
            ))
        }
    };

    info!(backend = %store.backend(), "table store opened");
    Ok(store)
}

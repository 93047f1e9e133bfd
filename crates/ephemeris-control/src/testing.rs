//! Helpers shared by unit tests.

use std::sync::Arc;

use ephemeris_state::TableStore;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::handle::ControlHandle;
use crate::registry::{Registries, ResourceViewRegistry};
use crate::sequencer::Sequencer;
use crate::storage::TableStorage;

/// A sequencer running over `store`, without the rest of the server.
pub(crate) struct TestSequencer {
    pub handle: ControlHandle,
    pub cancel: CancellationToken,
    pub join: JoinHandle<()>,
}

impl TestSequencer {
    pub fn spawn(store: Arc<dyn TableStore>) -> Self {
        let registries = Registries::new(TableStorage::new(store), ResourceViewRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);
        let cancel = CancellationToken::new();
        let sequencer = Sequencer::new(registries, rx, events.clone(), cancel.clone());
        let join = tokio::spawn(sequencer.run());
        Self {
            handle: ControlHandle::new(tx, events),
            cancel,
            join,
        }
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        self.join.await.unwrap();
    }
}

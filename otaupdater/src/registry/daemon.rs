//! Message loop applying asynchronous results to the registry.
//!
//! Transfer threads, verification workers, the legacy installer and the
//! block engine callback never touch registry state directly. They post a
//! [`RegistryMessage`] and the daemon applies messages one at a time, in
//! the order they were sent.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::controller::UpdateRegistry;
use super::message::RegistryMessage;

/// Drives an [`UpdateRegistry`].
pub struct RegistryDaemon {
    registry: Arc<UpdateRegistry>,
    receiver: UnboundedReceiver<RegistryMessage>,
}

impl RegistryDaemon {
    pub(crate) fn new(
        registry: Arc<UpdateRegistry>,
        receiver: UnboundedReceiver<RegistryMessage>,
    ) -> Self {
        Self { registry, receiver }
    }

    /// Apply messages until `shutdown` is cancelled.
    ///
    /// Running transfers are paused on the way out.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Registry daemon starting");

        let Self {
            registry,
            mut receiver,
        } = self;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Registry daemon shutting down");
                    break;
                }

                message = receiver.recv() => {
                    match message {
                        Some(message) => registry.apply(message),
                        None => {
                            debug!("Registry message channel closed");
                            break;
                        }
                    }
                }
            }
        }

        registry.shutdown();
        info!("Registry daemon stopped");
    }
}

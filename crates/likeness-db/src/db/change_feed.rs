//! Identity change feed over Postgres LISTEN/NOTIFY.
//!
//! A trigger on `identities` publishes every row change on the `identity_changes` channel.
//! The feed forwards a bare wake-up signal; consumers re-read full snapshots instead of
//! applying payloads, so dropped or duplicated notifications are harmless.

use std::time::Duration;

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::mpsc;

use likeness_core::constants::IDENTITY_CHANGES_CHANNEL;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Spawns a listener task and returns the receiving end of its wake-up channel.
///
/// The task reconnects forever on failure and exits once the receiver is dropped.
pub fn spawn_identity_listener(pool: PgPool) -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel::<()>(16);

    tokio::spawn(async move {
        loop {
            match PgListener::connect_with(&pool).await {
                Ok(mut listener) => {
                    if let Err(e) = listener.listen(IDENTITY_CHANGES_CHANNEL).await {
                        tracing::warn!(error = %e, "LISTEN failed, will retry");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        continue;
                    }
                    tracing::info!(channel = IDENTITY_CHANGES_CHANNEL, "Listening for identity changes");
                    // Changes made while disconnected were never delivered.
                    if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(()) {
                        return;
                    }

                    loop {
                        match listener.recv().await {
                            Ok(notification) => {
                                tracing::trace!(payload = notification.payload(), "Identity change");
                                // A full channel already holds a pending wake-up.
                                if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(()) {
                                    return;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Identity listener dropped, reconnecting");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "PgListener connect failed, will retry");
                }
            }

            if tx.is_closed() {
                return;
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    });

    rx
}

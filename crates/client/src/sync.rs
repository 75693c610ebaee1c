// Drive loop: feeds live frames into a replica and releases held field
// events when their dedup window elapses.

use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use strata_common::protocol::live::Topic;
use strata_common::types::RootKey;

use crate::api::TreeApi;
use crate::error::ClientError;
use crate::live::{LiveChannel, LiveTransport};
use crate::reconcile::Notice;
use crate::replica::Replica;

/// Something the drive loop wants the caller to see.
#[derive(Debug)]
pub enum SyncUpdate {
    Notice(Notice),
    /// A remote change could not be applied; the last good state is kept.
    Failed(ClientError),
}

/// Push topic that carries changes for a root.
pub fn topic_for(root: &RootKey) -> Topic {
    match root {
        RootKey::Context(id) => Topic::Context(id.clone()),
        RootKey::Workspace(_) => Topic::AllContexts,
    }
}

/// Run until the channel closes for good. Each update is handed to
/// `on_update` as soon as it is produced.
pub async fn drive<A, T, F>(
    replica: &mut Replica<A>,
    channel: &mut LiveChannel<T>,
    mut on_update: F,
) where
    A: TreeApi,
    T: LiveTransport,
    F: FnMut(SyncUpdate),
{
    info!(root = %replica.root(), "sync loop started");
    loop {
        let deadline = replica.next_deadline();
        tokio::select! {
            frame = channel.next_event() => {
                let Some(frame) = frame else {
                    break;
                };
                match replica.handle_frame(&frame).await {
                    Ok(notices) => {
                        for notice in notices {
                            on_update(SyncUpdate::Notice(notice));
                        }
                    }
                    Err(error) => {
                        warn!(event = %frame.event, error = %error, "could not apply remote change");
                        on_update(SyncUpdate::Failed(error));
                    }
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                for notice in replica.apply_ready() {
                    on_update(SyncUpdate::Notice(notice));
                }
            }
        }
    }

    // Flush whatever is still held so nothing received is lost.
    let flush_at = Instant::now() + replica.reconciler.dedup_window();
    for notice in replica.apply_ready_at(flush_at) {
        on_update(SyncUpdate::Notice(notice));
    }
    info!(root = %replica.root(), "sync loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_roots_listen_to_every_context() {
        assert_eq!(topic_for(&RootKey::Workspace("w".into())), Topic::AllContexts);
        assert_eq!(topic_for(&RootKey::Context("c".into())), Topic::Context("c".into()));
    }
}

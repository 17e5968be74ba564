use super::queue::QueueReceiver;
use crate::mastodon::{ApiResult, MastodonApi};
use crate::models::NotificationId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Clears handled notifications from the remote inbox, at most once each
pub struct DismissalWorker {
    board: String,
    api: Arc<dyn MastodonApi>,
}

impl DismissalWorker {
    pub fn new(board: &str, api: Arc<dyn MastodonApi>) -> Self {
        Self {
            board: board.to_string(),
            api,
        }
    }

    pub async fn dismiss(&self, id: &NotificationId) -> ApiResult<()> {
        log::debug!("BoardBot:{} dismissing notification: {}", self.board, id);
        self.api.dismiss_notification(id).await
    }

    pub async fn run(self, mut dismissals: QueueReceiver<NotificationId>, shutdown: CancellationToken) {
        loop {
            let id = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = dismissals.pop() => match next {
                    Some(id) => id,
                    None => break,
                },
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.dismiss(&id) => {
                    if let Err(e) = result {
                        log::error!("BoardBot:{} notification_dismisser: {}: {}", self.board, id, e);
                    }
                }
            }
        }
        log::debug!("BoardBot:{} dismisser stopped", self.board);
    }
}

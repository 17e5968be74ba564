use super::queue::QueueSender;
use crate::mastodon::{ApiResult, MastodonApi};
use crate::models::{Notification, NotificationId};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Polls for notifications newer than the cursor.
///
/// The cursor only moves after a successful fetch, so a failed cycle simply
/// retries the same window on the next tick.
pub struct NotificationFetcher {
    board: String,
    api: Arc<dyn MastodonApi>,
    queue: QueueSender<Notification>,
    cursor: Option<NotificationId>,
    cooldown: Duration,
}

impl NotificationFetcher {
    pub fn new(
        board: &str,
        api: Arc<dyn MastodonApi>,
        queue: QueueSender<Notification>,
        cooldown: Duration,
    ) -> Self {
        Self {
            board: board.to_string(),
            api,
            queue,
            cursor: None,
            cooldown,
        }
    }

    #[cfg(test)]
    pub fn cursor(&self) -> Option<&NotificationId> {
        self.cursor.as_ref()
    }

    /// One fetch cycle. Returns how many notifications were queued, or None
    /// if the queue has been closed.
    pub async fn fetch_once(&mut self) -> ApiResult<Option<usize>> {
        log::debug!("BoardBot:{} fetching notifications", self.board);
        let notifications = self.api.notifications_since(self.cursor.as_ref()).await?;
        log::debug!("BoardBot:{} fetched {} notifications", self.board, notifications.len());

        let count = notifications.len();
        if let Some(last) = notifications.last() {
            self.cursor = Some(last.id.clone());
        }

        for notification in notifications {
            if self.queue.push(notification).await.is_err() {
                return Ok(None);
            }
        }

        Ok(Some(count))
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.fetch_once() => match result {
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(e) => log::error!("BoardBot:{} can't fetch notifications: {}", self.board, e),
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.cooldown) => {}
            }
        }
        log::debug!("BoardBot:{} fetcher stopped", self.board);
    }
}

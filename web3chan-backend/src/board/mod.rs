//! Per-board worker: the set of tasks serving one configured board.
//!
//! ```text
//! StreamListener ─┐
//!                 ├─> notifications ─> ReactionDispatcher ─> dismissals ─> DismissalWorker
//! Fetcher ────────┘
//! RelationshipTracker (shared sets read by the dispatcher)
//! ```

pub mod dismisser;
pub mod dispatcher;
pub mod fetcher;
pub mod queue;
pub mod relationships;
pub mod stream;

pub use dismisser::DismissalWorker;
pub use dispatcher::{ReactionDispatcher, ReactionPolicy};
pub use fetcher::NotificationFetcher;
pub use relationships::{RelationshipTracker, Relationships};
pub use stream::StreamListener;

use crate::config::Config;
use crate::mastodon::{ApiResult, InstanceInfo, MastodonApi};
use crate::models::Board;
use std::sync::Arc;
use std::time::Duration;
use strum::Display;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

const STREAM_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum WorkerState {
    Initializing,
    Running,
    Stopping,
    Stopped,
}

/// A running board. Dropping it without [`BoardWorker::stop`] leaves the
/// tasks running until the parent token is cancelled.
pub struct BoardWorker {
    name: String,
    state: WorkerState,
    #[cfg(test)]
    streaming: bool,
    #[cfg(test)]
    fetch_cooldown: Duration,
    #[cfg(test)]
    relationships: Arc<Relationships>,
    shutdown: CancellationToken,
    tasks: JoinSet<()>,
}

impl BoardWorker {
    /// Initialize and spawn the board's tasks. Fails without spawning
    /// anything if credentials, instance metadata or the first
    /// relationship refresh cannot be fetched.
    pub async fn start(
        board: &Board,
        api: Arc<dyn MastodonApi>,
        config: &Config,
        parent: &CancellationToken,
    ) -> ApiResult<Self> {
        let name = board.name.clone();
        log::debug!("BoardBot:{} state: {}", name, WorkerState::Initializing);

        let (account, instance) = tokio::try_join!(api.verify_credentials(), api.instance())?;
        log::info!(
            "BoardBot:{} logged in as {} on {} ({})",
            name,
            account.acct,
            board.instance.base_url,
            instance.version
        );

        let relationships = Arc::new(Relationships::new());
        let tracker = RelationshipTracker::new(
            &name,
            api.clone(),
            &account.id,
            relationships.clone(),
            config.relationships_cooldown,
        );
        tracker.refresh().await?;

        let stream_url = if board.streaming {
            Self::streaming_endpoint(&name, api.as_ref(), &instance).await
        } else {
            None
        };
        let streaming = stream_url.is_some();
        let fetch_cooldown = if streaming {
            config.fetcher_cooldown_with_streaming
        } else {
            config.fetcher_cooldown
        };

        let shutdown = parent.child_token();
        let (notifications_tx, notifications_rx) = queue::channel(config.queue_capacity);
        let (dismissals_tx, dismissals_rx) = queue::channel(config.queue_capacity);

        let policy = ReactionPolicy {
            autofollow: board.autofollow,
            replies: board.replies,
        };

        let mut tasks = JoinSet::new();
        tasks.spawn(tracker.run(shutdown.clone()));
        tasks.spawn(
            NotificationFetcher::new(&name, api.clone(), notifications_tx.clone(), fetch_cooldown).run(shutdown.clone()),
        );
        tasks.spawn(DismissalWorker::new(&name, api.clone()).run(dismissals_rx, shutdown.clone()));
        tasks.spawn(
            ReactionDispatcher::new(&name, api.clone(), relationships.clone(), policy, dismissals_tx)
                .run(notifications_rx, shutdown.clone()),
        );
        if let Some(url) = stream_url {
            tasks.spawn(StreamListener::new(&name, url, notifications_tx).run(shutdown.clone()));
        }

        log::info!(
            "BoardBot:{} state: {} ({}, fetch every {}s)",
            name,
            WorkerState::Running,
            if streaming { "streaming" } else { "polling" },
            fetch_cooldown.as_secs()
        );

        Ok(Self {
            name,
            state: WorkerState::Running,
            #[cfg(test)]
            streaming,
            #[cfg(test)]
            fetch_cooldown,
            #[cfg(test)]
            relationships,
            shutdown,
            tasks,
        })
    }

    /// Streaming URL if the instance offers one and it accepts a connection
    async fn streaming_endpoint(name: &str, api: &dyn MastodonApi, instance: &InstanceInfo) -> Option<Url> {
        if instance.is_mastodon_compatible_fork() {
            log::warn!(
                "BoardBot:{} instance version {} looks like Pleroma, notification streaming may be unreliable",
                name,
                instance.version
            );
        }

        let Some(endpoint) = instance.streaming_api() else {
            log::info!("BoardBot:{} instance has no streaming API, polling only", name);
            return None;
        };

        let url = match api.streaming_url(endpoint) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("BoardBot:{} bad streaming endpoint {}: {}", name, endpoint, e);
                return None;
            }
        };

        if stream::check_endpoint(&url, STREAM_CHECK_TIMEOUT).await {
            Some(url)
        } else {
            log::warn!("BoardBot:{} streaming API unreachable, polling only", name);
            None
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    #[cfg(test)]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    #[cfg(test)]
    pub fn fetch_cooldown(&self) -> Duration {
        self.fetch_cooldown
    }

    #[cfg(test)]
    pub fn relationships(&self) -> Arc<relationships::RelationshipSet> {
        self.relationships.snapshot()
    }

    /// Cancel every task and wait for all of them to exit
    pub async fn stop(mut self) -> WorkerState {
        self.state = WorkerState::Stopping;
        log::debug!("BoardBot:{} state: {}", self.name, self.state);

        self.shutdown.cancel();
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                log::error!("BoardBot:{} task ended abnormally: {}", self.name, e);
            }
        }

        self.state = WorkerState::Stopped;
        log::info!("BoardBot:{} state: {}", self.name, self.state);
        self.state
    }
}

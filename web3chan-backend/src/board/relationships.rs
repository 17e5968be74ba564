use crate::mastodon::{ApiResult, MastodonApi};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Who the board follows and who follows the board
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipSet {
    pub following: HashSet<String>,
    pub followers: HashSet<String>,
}

impl RelationshipSet {
    /// Followed by the board and following it back
    pub fn is_mutual(&self, account_id: &str) -> bool {
        self.followers.contains(account_id) && self.following.contains(account_id)
    }
}

/// Shared relationship view.
///
/// Readers take a snapshot; writers swap in a whole new set, so a reader
/// never sees `following` from one refresh and `followers` from another.
#[derive(Debug, Default)]
pub struct Relationships {
    current: RwLock<Arc<RelationshipSet>>,
}

impl Relationships {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<RelationshipSet> {
        self.current.read().clone()
    }

    pub fn replace(&self, set: RelationshipSet) {
        *self.current.write() = Arc::new(set);
    }

    /// Copy-on-write edit of the current set
    fn update(&self, edit: impl FnOnce(&mut RelationshipSet)) {
        let mut current = self.current.write();
        let mut next = RelationshipSet::clone(&current);
        edit(&mut next);
        *current = Arc::new(next);
    }

    pub fn record_follower(&self, account_id: &str) {
        self.update(|set| {
            set.followers.insert(account_id.to_string());
        });
    }

    pub fn record_following(&self, account_id: &str) {
        self.update(|set| {
            set.following.insert(account_id.to_string());
        });
    }
}

pub struct RelationshipTracker {
    board: String,
    api: Arc<dyn MastodonApi>,
    account_id: String,
    relationships: Arc<Relationships>,
    interval: Duration,
}

impl RelationshipTracker {
    pub fn new(
        board: &str,
        api: Arc<dyn MastodonApi>,
        account_id: &str,
        relationships: Arc<Relationships>,
        interval: Duration,
    ) -> Self {
        Self {
            board: board.to_string(),
            api,
            account_id: account_id.to_string(),
            relationships,
            interval,
        }
    }

    /// Fetch both full lists and replace the shared set
    pub async fn refresh(&self) -> ApiResult<()> {
        log::debug!("BoardBot:{} updating relationships", self.board);

        let (following, followers) = tokio::try_join!(
            self.api.following(&self.account_id),
            self.api.followers(&self.account_id),
        )?;

        let set = RelationshipSet {
            following: following.into_iter().map(|a| a.id).collect(),
            followers: followers.into_iter().map(|a| a.id).collect(),
        };

        log::debug!(
            "BoardBot:{} {} following, {} followers",
            self.board,
            set.following.len(),
            set.followers.len()
        );
        self.relationships.replace(set);
        Ok(())
    }

    /// Refresh every interval until cancelled. The first refresh happens at startup, not here.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.refresh() => {
                    if let Err(e) = result {
                        log::error!("BoardBot:{} relationships_syncer: {}", self.board, e);
                    }
                }
            }
        }
        log::debug!("BoardBot:{} relationships syncer stopped", self.board);
    }
}

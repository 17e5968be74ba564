use super::queue::{QueueReceiver, QueueSender};
use super::relationships::Relationships;
use crate::mastodon::MastodonApi;
use crate::models::{Account, Notification, NotificationId, NotificationKind, Status, Visibility};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How many handled ids are remembered for duplicate detection
const RECENTLY_SEEN: usize = 2048;

/// Board flags that shape the reaction policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionPolicy {
    pub autofollow: bool,
    pub replies: bool,
}

/// What the dispatcher did with a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    FollowedBack(String),
    FollowRecorded,
    Reblogged(String),
    Ignored,
    Failed,
}

/// Bounded memory of handled ids, oldest forgotten first
#[derive(Debug)]
struct RecentIds {
    order: VecDeque<NotificationId>,
    ids: HashSet<NotificationId>,
    capacity: usize,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Remember `id`, false if it is already remembered
    fn insert(&mut self, id: &NotificationId) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id.clone());
        self.ids.insert(id.clone());
        true
    }
}

/// Reacts to queued notifications. The stream and the poll can both deliver
/// the same notification, so ids already handled are skipped.
pub struct ReactionDispatcher {
    board: String,
    api: Arc<dyn MastodonApi>,
    relationships: Arc<Relationships>,
    policy: ReactionPolicy,
    dismissals: QueueSender<NotificationId>,
    seen: RecentIds,
}

impl ReactionDispatcher {
    pub fn new(
        board: &str,
        api: Arc<dyn MastodonApi>,
        relationships: Arc<Relationships>,
        policy: ReactionPolicy,
        dismissals: QueueSender<NotificationId>,
    ) -> Self {
        Self {
            board: board.to_string(),
            api,
            relationships,
            policy,
            dismissals,
            seen: RecentIds::new(RECENTLY_SEEN),
        }
    }

    /// React to one notification
    pub async fn react(&self, notification: &Notification) -> Reaction {
        log::debug!("BoardBot:{} handling notification: {}", self.board, notification.id);

        match &notification.kind {
            NotificationKind::Follow { account } => self.followed(account).await,
            NotificationKind::Mention { account, status } => self.mentioned(account, status).await,
            NotificationKind::Unhandled { kind } => {
                log::warn!(
                    "BoardBot:{} unhandled notification {} of type {}",
                    self.board,
                    notification.id,
                    kind
                );
                Reaction::Ignored
            }
        }
    }

    /// React, then hand the notification over for dismissal whatever the outcome.
    /// A duplicate gets neither. Returns false once the dismissal queue is closed.
    pub async fn process(&mut self, notification: Notification) -> bool {
        if !self.seen.insert(&notification.id) {
            log::debug!("BoardBot:{} skipping duplicate notification: {}", self.board, notification.id);
            return true;
        }
        self.react(&notification).await;
        self.dismissals.push(notification.id).await.is_ok()
    }

    async fn followed(&self, account: &Account) -> Reaction {
        log::debug!("BoardBot:{} followed by {}", self.board, account.acct);
        self.relationships.record_follower(&account.id);

        if !self.policy.autofollow || account.locked {
            return Reaction::FollowRecorded;
        }

        match self.api.follow(&account.id).await {
            Ok(relationship) if relationship.following => {
                self.relationships.record_following(&account.id);
                log::info!("BoardBot:{} followed {}", self.board, account.acct);
                Reaction::FollowedBack(account.id.clone())
            }
            Ok(_) => Reaction::FollowRecorded,
            Err(e) => {
                log::error!("BoardBot:{} can't follow {}: {}", self.board, account.acct, e);
                Reaction::Failed
            }
        }
    }

    async fn mentioned(&self, account: &Account, status: &Status) -> Reaction {
        log::debug!("BoardBot:{} mentioned by {}", self.board, account.acct);

        let mutual = self.relationships.snapshot().is_mutual(&account.id);
        if !mutual || status.visibility != Visibility::Public {
            return Reaction::Ignored;
        }

        let status_id = match (&status.in_reply_to_id, self.policy.replies) {
            (Some(parent), true) if !parent.is_empty() => parent.clone(),
            _ => status.id.clone(),
        };

        match self.api.reblog(&status_id).await {
            Ok(()) => {
                log::info!("BoardBot:{} reblogged {}/{}", self.board, account.acct, status_id);
                Reaction::Reblogged(status_id)
            }
            Err(e) => {
                log::error!(
                    "BoardBot:{} can't reblog {}/{}: {}",
                    self.board,
                    account.acct,
                    status_id,
                    e
                );
                Reaction::Failed
            }
        }
    }

    pub async fn run(mut self, mut notifications: QueueReceiver<Notification>, shutdown: CancellationToken) {
        loop {
            let notification = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = notifications.pop() => match next {
                    Some(n) => n,
                    None => break,
                },
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                forwarded = self.process(notification) => {
                    if !forwarded {
                        break;
                    }
                }
            }
        }
        log::debug!("BoardBot:{} notification handler stopped", self.board);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::queue::{self, QueueReceiver};
    use crate::mastodon::testing::{follow_notification, mention_notification, ApiCall, FakeApi};
    use std::sync::atomic::Ordering;

    fn dispatcher(
        api: Arc<FakeApi>,
        policy: ReactionPolicy,
    ) -> (ReactionDispatcher, Arc<Relationships>, QueueReceiver<NotificationId>) {
        let relationships = Arc::new(Relationships::new());
        let (tx, rx) = queue::channel(64);
        (
            ReactionDispatcher::new("test", api, relationships.clone(), policy, tx),
            relationships,
            rx,
        )
    }

    const ALL: ReactionPolicy = ReactionPolicy {
        autofollow: true,
        replies: true,
    };

    #[tokio::test]
    async fn test_follow_back_unlocked() {
        let api = Arc::new(FakeApi::new());
        let (dispatcher, relationships, _rx) = dispatcher(api.clone(), ALL);

        let reaction = dispatcher.react(&follow_notification("1", "42", false)).await;
        assert_eq!(reaction, Reaction::FollowedBack("42".to_string()));
        assert_eq!(api.mutations(), vec![ApiCall::Follow("42".to_string())]);

        let set = relationships.snapshot();
        assert!(set.followers.contains("42"));
        assert!(set.following.contains("42"));
    }

    #[tokio::test]
    async fn test_locked_follower_not_followed() {
        let api = Arc::new(FakeApi::new());
        let (dispatcher, relationships, _rx) = dispatcher(api.clone(), ALL);

        let reaction = dispatcher.react(&follow_notification("1", "42", true)).await;
        assert_eq!(reaction, Reaction::FollowRecorded);
        assert!(api.mutations().is_empty());
        assert!(relationships.snapshot().followers.contains("42"));
        assert!(!relationships.snapshot().following.contains("42"));
    }

    #[tokio::test]
    async fn test_autofollow_disabled() {
        let api = Arc::new(FakeApi::new());
        let policy = ReactionPolicy {
            autofollow: false,
            replies: true,
        };
        let (dispatcher, _relationships, _rx) = dispatcher(api.clone(), policy);

        dispatcher.react(&follow_notification("1", "42", false)).await;
        assert!(api.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_follow_failure_leaves_follower_only() {
        let api = Arc::new(FakeApi::new());
        api.fail_follow.store(true, Ordering::SeqCst);
        let (dispatcher, relationships, _rx) = dispatcher(api.clone(), ALL);

        let reaction = dispatcher.react(&follow_notification("1", "42", false)).await;
        assert_eq!(reaction, Reaction::Failed);
        assert_eq!(api.count(|c| matches!(c, ApiCall::Follow(_))), 1);
        let set = relationships.snapshot();
        assert!(set.followers.contains("42"));
        assert!(!set.following.contains("42"));
    }

    #[tokio::test]
    async fn test_mention_from_mutual_public_reblogged() {
        let api = Arc::new(FakeApi::new());
        let (dispatcher, relationships, _rx) = dispatcher(api.clone(), ALL);
        relationships.record_follower("7");
        relationships.record_following("7");

        let n = mention_notification("1", "7", "500", Visibility::Public, None);
        assert_eq!(dispatcher.react(&n).await, Reaction::Reblogged("500".to_string()));
        assert_eq!(api.mutations(), vec![ApiCall::Reblog("500".to_string())]);
    }

    #[tokio::test]
    async fn test_mention_reply_reblogs_parent() {
        let api = Arc::new(FakeApi::new());
        let (dispatcher, relationships, _rx) = dispatcher(api.clone(), ALL);
        relationships.record_follower("7");
        relationships.record_following("7");

        let n = mention_notification("1", "7", "500", Visibility::Public, Some("499"));
        dispatcher.react(&n).await;
        assert_eq!(api.mutations(), vec![ApiCall::Reblog("499".to_string())]);
    }

    #[tokio::test]
    async fn test_mention_reply_without_replies_flag() {
        let api = Arc::new(FakeApi::new());
        let policy = ReactionPolicy {
            autofollow: true,
            replies: false,
        };
        let (dispatcher, relationships, _rx) = dispatcher(api.clone(), policy);
        relationships.record_follower("7");
        relationships.record_following("7");

        let n = mention_notification("1", "7", "500", Visibility::Public, Some("499"));
        dispatcher.react(&n).await;
        assert_eq!(api.mutations(), vec![ApiCall::Reblog("500".to_string())]);
    }

    #[tokio::test]
    async fn test_mention_not_mutual_ignored() {
        let api = Arc::new(FakeApi::new());
        let (dispatcher, relationships, _rx) = dispatcher(api.clone(), ALL);

        // Follower only
        relationships.record_follower("7");
        let n = mention_notification("1", "7", "500", Visibility::Public, None);
        assert_eq!(dispatcher.react(&n).await, Reaction::Ignored);

        // Followed only
        relationships.record_following("8");
        let n = mention_notification("2", "8", "501", Visibility::Public, None);
        assert_eq!(dispatcher.react(&n).await, Reaction::Ignored);

        assert!(api.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_mention_not_public_ignored() {
        let api = Arc::new(FakeApi::new());
        let (dispatcher, relationships, _rx) = dispatcher(api.clone(), ALL);
        relationships.record_follower("7");
        relationships.record_following("7");

        for visibility in [Visibility::Unlisted, Visibility::Private, Visibility::Direct] {
            let n = mention_notification("1", "7", "500", visibility, None);
            assert_eq!(dispatcher.react(&n).await, Reaction::Ignored);
        }
        assert!(api.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_every_notification_forwarded_once() {
        let api = Arc::new(FakeApi::new());
        api.fail_follow.store(true, Ordering::SeqCst);
        let (mut dispatcher, relationships, mut rx) = dispatcher(api.clone(), ALL);
        relationships.record_follower("7");
        relationships.record_following("7");
        api.fail_reblog.store(true, Ordering::SeqCst);

        let unhandled = Notification {
            id: NotificationId::new("3"),
            kind: NotificationKind::Unhandled {
                kind: "favourite".to_string(),
            },
        };

        assert!(dispatcher.process(follow_notification("1", "42", false)).await);
        assert!(dispatcher.process(mention_notification("2", "7", "500", Visibility::Public, None)).await);
        assert!(dispatcher.process(unhandled).await);
        assert!(dispatcher.process(mention_notification("4", "9", "501", Visibility::Public, None)).await);

        let mut forwarded = Vec::new();
        while let Some(id) = rx.try_pop() {
            forwarded.push(id.to_string());
        }
        assert_eq!(forwarded, vec!["1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_duplicate_notification_handled_once() {
        let api = Arc::new(FakeApi::new());
        let (mut dispatcher, _relationships, mut rx) = dispatcher(api.clone(), ALL);

        assert!(dispatcher.process(follow_notification("5", "42", false)).await);
        assert!(dispatcher.process(follow_notification("5", "42", false)).await);
        assert!(dispatcher.process(follow_notification("6", "43", false)).await);

        assert_eq!(
            api.mutations(),
            vec![ApiCall::Follow("42".to_string()), ApiCall::Follow("43".to_string())]
        );
        assert_eq!(rx.try_pop().unwrap().to_string(), "5");
        assert_eq!(rx.try_pop().unwrap().to_string(), "6");
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn test_recent_ids_forget_oldest() {
        let mut seen = RecentIds::new(2);
        assert!(seen.insert(&NotificationId::new("1")));
        assert!(seen.insert(&NotificationId::new("2")));
        assert!(!seen.insert(&NotificationId::new("1")));

        assert!(seen.insert(&NotificationId::new("3")));
        assert_eq!(seen.ids.len(), 2);
        assert!(seen.insert(&NotificationId::new("1")));
        assert!(!seen.insert(&NotificationId::new("3")));
    }

    #[tokio::test]
    async fn test_run_consumes_in_arrival_order() {
        let api = Arc::new(FakeApi::new());
        let (dispatcher, _relationships, mut dismissed) = dispatcher(api.clone(), ALL);
        let (tx, rx) = queue::channel(16);
        let token = CancellationToken::new();
        let handle = tokio::spawn(dispatcher.run(rx, token.clone()));

        tx.push(follow_notification("20", "a", false)).await.unwrap();
        tx.push(follow_notification("10", "b", false)).await.unwrap();

        assert_eq!(dismissed.pop().await.unwrap().to_string(), "20");
        assert_eq!(dismissed.pop().await.unwrap().to_string(), "10");

        token.cancel();
        handle.await.unwrap();
        assert_eq!(
            api.mutations(),
            vec![ApiCall::Follow("a".to_string()), ApiCall::Follow("b".to_string())]
        );
    }
}

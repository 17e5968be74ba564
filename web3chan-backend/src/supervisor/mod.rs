//! Owns the running board workers and applies operator commands to them.

use crate::board::BoardWorker;
use crate::config::Config;
use crate::db::Database;
use crate::mastodon::{ApiError, ApiMethod, AppCredentials, MastodonConnector};
use crate::models::{BoardOption, BoardSummary, Instance, NewBoard};
use dashmap::{DashMap, DashSet};
use futures_util::future::join_all;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Board {0} already exists")]
    BoardExists(String),

    #[error("Board {0} not found")]
    BoardNotFound(String),

    #[error("Board {0} is already running")]
    AlreadyRunning(String),

    #[error("Board {0} is not running")]
    NotRunning(String),

    #[error("Unknown board option: {0}")]
    UnknownOption(String),

    #[error("Unknown API method: {0}")]
    UnknownApiMethod(String),

    #[error("Board {name} failed to start: {source}")]
    Startup { name: String, source: ApiError },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// One slot per board name; holding it serializes start and stop for that name
type Slot = Arc<Mutex<Option<BoardWorker>>>;

pub struct Supervisor {
    db: Arc<Database>,
    config: Arc<Config>,
    connector: Arc<dyn MastodonConnector>,
    shutdown: CancellationToken,
    slots: DashMap<String, Slot>,
    running: DashSet<String>,
}

impl Supervisor {
    pub fn new(
        db: Arc<Database>,
        config: Arc<Config>,
        connector: Arc<dyn MastodonConnector>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            db,
            config,
            connector,
            shutdown,
            slots: DashMap::new(),
            running: DashSet::new(),
        }
    }

    /// Lock the slot registered for `name`, creating it if needed. A slot
    /// dropped by `remove_board` while we waited is never handed out.
    async fn lock_slot(&self, name: &str) -> OwnedMutexGuard<Option<BoardWorker>> {
        loop {
            let slot: Slot = self.slots.entry(name.to_string()).or_default().clone();
            let guard = slot.clone().lock_owned().await;
            let current = self
                .slots
                .get(name)
                .is_some_and(|registered| Arc::ptr_eq(registered.value(), &slot));
            if current {
                return guard;
            }
        }
    }

    /// Check if a board currently has a worker
    pub fn is_running(&self, name: &str) -> bool {
        self.running.contains(name)
    }

    /// Names of boards with a worker
    pub fn running_boards(&self) -> Vec<String> {
        self.running.iter().map(|name| name.key().clone()).collect()
    }

    pub fn list_boards(&self) -> SupervisorResult<Vec<BoardSummary>> {
        Ok(self
            .db
            .list_boards()?
            .into_iter()
            .map(|board| BoardSummary {
                running: self.is_running(&board.name),
                name: board.name,
                enabled: board.enabled,
                streaming: board.streaming,
                autofollow: board.autofollow,
                replies: board.replies,
            })
            .collect())
    }

    pub async fn start_board(&self, name: &str) -> SupervisorResult<()> {
        if self.db.get_board(name)?.is_none() {
            return Err(SupervisorError::BoardNotFound(name.to_string()));
        }

        let mut worker = self.lock_slot(name).await;
        if worker.is_some() {
            return Err(SupervisorError::AlreadyRunning(name.to_string()));
        }

        // Removed while we waited for the slot
        let Some(board) = self.db.get_board(name)? else {
            self.slots.remove(name);
            return Err(SupervisorError::BoardNotFound(name.to_string()));
        };

        log::info!("Starting board {} on {}", board.name, board.instance.base_url);
        let api = self.connector.connect(&board.instance.base_url, &board.access_token);
        let started = BoardWorker::start(&board, api, &self.config, &self.shutdown)
            .await
            .map_err(|source| SupervisorError::Startup {
                name: name.to_string(),
                source,
            })?;

        *worker = Some(started);
        self.running.insert(name.to_string());
        Ok(())
    }

    /// Cancel the board's worker and wait until all its tasks have exited
    pub async fn stop_board(&self, name: &str) -> SupervisorResult<()> {
        let Some(slot) = self.slots.get(name).map(|slot| slot.value().clone()) else {
            return Err(SupervisorError::NotRunning(name.to_string()));
        };
        let mut worker = slot.lock().await;
        if self.stop_worker(name, &mut worker).await {
            Ok(())
        } else {
            Err(SupervisorError::NotRunning(name.to_string()))
        }
    }

    /// Stop the worker held in a locked slot; false if the slot was empty
    async fn stop_worker(&self, name: &str, worker: &mut Option<BoardWorker>) -> bool {
        let Some(running) = worker.take() else {
            return false;
        };

        log::info!("Stopping board {}", name);
        running.stop().await;
        self.running.remove(name);
        true
    }

    pub async fn restart_board(&self, name: &str) -> SupervisorResult<()> {
        match self.stop_board(name).await {
            Ok(()) | Err(SupervisorError::NotRunning(_)) => {}
            Err(e) => return Err(e),
        }
        self.start_board(name).await
    }

    /// Register a new board, provisioning the instance on first use
    pub async fn add_board(&self, name: &str, base_url: &str, email: &str, password: &str) -> SupervisorResult<()> {
        if self.db.get_board(name)?.is_some() {
            return Err(SupervisorError::BoardExists(name.to_string()));
        }

        let base_url = base_url.trim_end_matches('/');
        let instance = self.instance_for(base_url).await?;
        let app = AppCredentials {
            client_id: instance.client_id.clone(),
            client_secret: instance.client_secret.clone(),
        };
        let access_token = self.connector.log_in(base_url, &app, email, password).await?;

        let board = self.db.create_board(&NewBoard {
            name: name.to_string(),
            instance_id: instance.id,
            access_token,
            enabled: true,
            streaming: self.config.default_streaming,
            autofollow: self.config.default_autofollow,
            replies: self.config.default_replies,
        })?;

        log::info!("Added board {} on {}", board.name, board.instance.base_url);
        Ok(())
    }

    async fn instance_for(&self, base_url: &str) -> SupervisorResult<Instance> {
        if let Some(instance) = self.db.get_instance_by_url(base_url)? {
            return Ok(instance);
        }

        log::info!("Registering {} on {}", self.config.app_name, base_url);
        let app = self.connector.register_app(base_url, &self.config.app_name).await?;
        Ok(self.db.create_instance(base_url, &app.client_id, &app.client_secret)?)
    }

    /// Stop the board if it runs, then delete it. The slot stays locked
    /// until the row and the slot are both gone.
    pub async fn remove_board(&self, name: &str) -> SupervisorResult<()> {
        if self.db.get_board(name)?.is_none() {
            return Err(SupervisorError::BoardNotFound(name.to_string()));
        }

        let mut worker = self.lock_slot(name).await;
        self.stop_worker(name, &mut worker).await;
        let deleted = self.db.delete_board(name)?;
        self.slots.remove(name);
        drop(worker);

        if !deleted {
            return Err(SupervisorError::BoardNotFound(name.to_string()));
        }
        log::info!("Removed board {}", name);
        Ok(())
    }

    /// Flip a stored flag and return its new value. A running worker keeps
    /// its settings until restarted.
    pub fn toggle_board_option(&self, name: &str, field: &str) -> SupervisorResult<bool> {
        let option = BoardOption::from_str(field).map_err(|_| SupervisorError::UnknownOption(field.to_string()))?;
        let value = self
            .db
            .toggle_board_option(name, option)?
            .ok_or_else(|| SupervisorError::BoardNotFound(name.to_string()))?;

        log::info!("Board {} {} set to {}", name, option, value);
        Ok(value)
    }

    /// Raw API call with the board's credentials
    pub async fn mastoapi(
        &self,
        name: &str,
        method: &str,
        args: &[Value],
        kwargs: &Map<String, Value>,
    ) -> SupervisorResult<Value> {
        let board = self
            .db
            .get_board(name)?
            .ok_or_else(|| SupervisorError::BoardNotFound(name.to_string()))?;
        let method = ApiMethod::from_str(method).map_err(|_| SupervisorError::UnknownApiMethod(method.to_string()))?;

        let api = self.connector.connect(&board.instance.base_url, &board.access_token);
        Ok(api.call(method, args, kwargs).await?)
    }

    /// Start every enabled board concurrently; failures are logged
    pub async fn start_enabled_boards(&self) -> SupervisorResult<()> {
        let boards = self.db.list_enabled_boards()?;
        log::info!("Starting {} enabled boards", boards.len());

        let results = join_all(boards.iter().map(|board| self.start_board(&board.name))).await;
        for (board, result) in boards.iter().zip(results) {
            if let Err(e) = result {
                log::error!("Failed to start board {}: {}", board.name, e);
            }
        }
        Ok(())
    }

    /// Stop every running board and wait for all of them
    pub async fn stop_all(&self) {
        let names = self.running_boards();
        join_all(names.iter().map(|name| self.stop_board(name))).await;
    }
}

//! Control-plane commands and their argument binding

use super::protocol::RpcError;
use crate::supervisor::Supervisor;
use serde_json::{json, Map, Value};
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum RpcMethod {
    Help,
    Healthcheck,
    AddBoard,
    RemoveBoard,
    ListBoards,
    ToggleBoardOption,
    StartBoard,
    StopBoard,
    RestartBoard,
    Mastoapi,
}

impl RpcMethod {
    pub fn usage(&self) -> &'static str {
        match self {
            Self::Help => "help - returns this help message",
            Self::Healthcheck => "healthcheck - returns OK if daemon is running",
            Self::AddBoard => "add_board\n\narguments: name, base_url, email, password",
            Self::RemoveBoard => "remove_board\n\narguments: name",
            Self::ListBoards => "list_boards - returns [name, enabled, running, streaming, autofollow, replies] for every board",
            Self::ToggleBoardOption => "toggle_board_option\n\narguments: name, field (enabled, streaming, autofollow, replies)",
            Self::StartBoard => "start_board\n\narguments: name",
            Self::StopBoard => "stop_board\n\narguments: name",
            Self::RestartBoard => "restart_board\n\narguments: name",
            Self::Mastoapi => {
                "mastoapi - execute MastoAPI method with a board account, returns API response\n\narguments: name, method, *args, **kwargs"
            }
        }
    }
}

pub fn help_text() -> String {
    let names: Vec<String> = RpcMethod::iter().map(|m| m.as_ref().to_string()).collect();
    let mut text = format!("Available commands: {}", names.join(", "));
    for method in RpcMethod::iter() {
        text.push_str("\n\n");
        text.push_str(method.usage());
    }
    text
}

/// Arguments of one call. Positionals fill parameters in order, anything
/// left out is looked up by name.
#[derive(Debug, Default)]
pub struct Params {
    args: Vec<Value>,
    kwargs: Map<String, Value>,
}

impl Params {
    pub fn new(args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self { args, kwargs }
    }

    /// Bind the named leading parameters, leaving extra arguments in place
    fn take(&mut self, names: &[&str]) -> Result<Vec<String>, RpcError> {
        let positional: Vec<Value> = self.args.drain(..names.len().min(self.args.len())).collect();
        let mut bound = Vec::with_capacity(names.len());

        for (i, name) in names.iter().enumerate() {
            let named = self.kwargs.remove(*name);
            let value = match (positional.get(i), named) {
                (Some(_), Some(_)) => {
                    return Err(RpcError::internal_error(format!("got multiple values for argument '{}'", name)));
                }
                (Some(value), None) => value.clone(),
                (None, Some(value)) => value,
                (None, None) => {
                    return Err(RpcError::internal_error(format!("missing required argument '{}'", name)));
                }
            };
            match value {
                Value::String(s) => bound.push(s),
                other => {
                    return Err(RpcError::internal_error(format!(
                        "argument '{}' must be a string, got {}",
                        name, other
                    )));
                }
            }
        }
        Ok(bound)
    }

    /// Bind exactly these parameters, rejecting anything else
    fn exactly(mut self, names: &[&str]) -> Result<Vec<String>, RpcError> {
        let bound = self.take(names)?;
        if !self.args.is_empty() {
            return Err(RpcError::internal_error(format!(
                "takes {} arguments but {} were given",
                names.len(),
                names.len() + self.args.len()
            )));
        }
        if let Some(name) = self.kwargs.keys().next() {
            return Err(RpcError::internal_error(format!("unexpected argument '{}'", name)));
        }
        Ok(bound)
    }
}

fn ok() -> Value {
    json!("ok")
}

fn failed(e: impl std::fmt::Display) -> RpcError {
    let message = e.to_string();
    log::error!("RPC method failed: {}", message);
    RpcError::internal_error(message)
}

/// Run one command against the supervisor
pub async fn dispatch(supervisor: &Supervisor, method: RpcMethod, params: Params) -> Result<Value, RpcError> {
    match method {
        RpcMethod::Help => {
            params.exactly(&[])?;
            Ok(json!(help_text()))
        }
        RpcMethod::Healthcheck => {
            params.exactly(&[])?;
            Ok(ok())
        }
        RpcMethod::ListBoards => {
            params.exactly(&[])?;
            let boards = supervisor.list_boards().map_err(failed)?;
            Ok(Value::Array(boards.iter().map(|b| b.to_json()).collect()))
        }
        RpcMethod::AddBoard => {
            let [name, base_url, email, password] = bound::<4>(params.exactly(&["name", "base_url", "email", "password"])?)?;
            log::info!("adding board: {}, {}", name, base_url);
            supervisor
                .add_board(&name, &base_url, &email, &password)
                .await
                .map_err(failed)?;
            Ok(ok())
        }
        RpcMethod::RemoveBoard => {
            let [name] = bound::<1>(params.exactly(&["name"])?)?;
            supervisor.remove_board(&name).await.map_err(failed)?;
            Ok(ok())
        }
        RpcMethod::ToggleBoardOption => {
            let [name, field] = bound::<2>(params.exactly(&["name", "field"])?)?;
            supervisor.toggle_board_option(&name, &field).map_err(failed)?;
            Ok(ok())
        }
        RpcMethod::StartBoard => {
            let [name] = bound::<1>(params.exactly(&["name"])?)?;
            supervisor.start_board(&name).await.map_err(failed)?;
            Ok(ok())
        }
        RpcMethod::StopBoard => {
            let [name] = bound::<1>(params.exactly(&["name"])?)?;
            supervisor.stop_board(&name).await.map_err(failed)?;
            Ok(ok())
        }
        RpcMethod::RestartBoard => {
            let [name] = bound::<1>(params.exactly(&["name"])?)?;
            supervisor.restart_board(&name).await.map_err(failed)?;
            Ok(ok())
        }
        RpcMethod::Mastoapi => {
            let mut params = params;
            let [name, api_method] = bound::<2>(params.take(&["name", "method"])?)?;
            supervisor
                .mastoapi(&name, &api_method, &params.args, &params.kwargs)
                .await
                .map_err(failed)
        }
    }
}

fn bound<const N: usize>(values: Vec<String>) -> Result<[String; N], RpcError> {
    values
        .try_into()
        .map_err(|_| RpcError::internal_error("argument count mismatch"))
}

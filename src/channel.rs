use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::media::{MediaCommand, PositionUpdate};

pub const MEDIA_COMMAND_METHOD: &str = "onMediaCommand";

const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    pub fn arguments_map(&self) -> Result<&Map<String, Value>, ChannelError> {
        self.arguments.as_object().ok_or(ChannelError::ExpectedMap)
    }

    pub fn state_argument(&self) -> Result<&str, ChannelError> {
        match self.arguments_map()?.get("state") {
            None => Err(ChannelError::MissingState),
            Some(Value::String(state)) => Ok(state.as_str()),
            Some(_) => Err(ChannelError::StateNotString),
        }
    }

    pub fn position_arguments(&self) -> Result<PositionUpdate, ChannelError> {
        let arguments = self.arguments_map()?;
        let position = integer_argument(arguments, "position")?;
        let duration = integer_argument(arguments, "duration")?;

        if position.is_none() && duration.is_none() {
            return Err(ChannelError::MissingPosition);
        }

        Ok(PositionUpdate {
            position_ms: position,
            duration_ms: duration,
        })
    }
}

fn integer_argument(arguments: &Map<String, Value>, key: &str) -> Result<Option<i64>, ChannelError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or(ChannelError::PositionNotInteger),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MethodResponse {
    Success {
        result: Value,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    NotImplemented,
}

impl MethodResponse {
    pub fn success(result: impl Into<Value>) -> Self {
        Self::Success {
            result: result.into(),
        }
    }

    pub fn empty() -> Self {
        Self::Success { result: Value::Null }
    }
}

impl From<ChannelError> for MethodResponse {
    fn from(error: ChannelError) -> Self {
        Self::Error {
            code: error.code().to_string(),
            message: error.to_string(),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Expected map argument")]
    ExpectedMap,
    #[error("Missing state argument")]
    MissingState,
    #[error("State must be a string")]
    StateNotString,
    #[error("Missing position or duration argument")]
    MissingPosition,
    #[error("Position and duration must be integers")]
    PositionNotInteger,
}

impl ChannelError {
    pub fn code(self) -> &'static str {
        INVALID_ARGUMENT
    }
}

/// A call from the plugin to the application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundCall {
    pub channel: String,
    pub method: String,
    pub arguments: Value,
}

/// Forwards OS media commands to the application through the plugin's channel.
#[derive(Debug, Clone)]
pub struct CommandSink {
    channel: String,
    outbound: UnboundedSender<OutboundCall>,
}

impl CommandSink {
    pub fn new(channel: impl Into<String>, outbound: UnboundedSender<OutboundCall>) -> Self {
        Self {
            channel: channel.into(),
            outbound,
        }
    }

    pub fn send(&self, command: MediaCommand) {
        debug!("Forwarding {} to {}", command.name(), self.channel);

        let call = OutboundCall {
            channel: self.channel.clone(),
            method: MEDIA_COMMAND_METHOD.to_string(),
            arguments: command.arguments(),
        };
        if self.outbound.send(call).is_err() {
            warn!(
                "Host channel {} is closed, dropping {}",
                self.channel,
                command.name()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::{ChannelError, CommandSink, MethodCall, MethodResponse, OutboundCall};
    use crate::media::{MediaCommand, PositionUpdate};

    #[test]
    fn rejects_non_map_arguments() {
        let call = MethodCall::new("updatePlaybackState", json!("playing"));
        assert_eq!(call.state_argument(), Err(ChannelError::ExpectedMap));
        assert_eq!(call.position_arguments(), Err(ChannelError::ExpectedMap));
    }

    #[test]
    fn reads_state_argument() {
        let call = MethodCall::new("updatePlaybackState", json!({"state": "paused"}));
        assert_eq!(call.state_argument(), Ok("paused"));

        let missing = MethodCall::new("updatePlaybackState", json!({}));
        assert_eq!(missing.state_argument(), Err(ChannelError::MissingState));

        let wrong_type = MethodCall::new("updatePlaybackState", json!({"state": 1}));
        assert_eq!(wrong_type.state_argument(), Err(ChannelError::StateNotString));

        let null_state = MethodCall::new("updatePlaybackState", json!({"state": null}));
        assert_eq!(null_state.state_argument(), Err(ChannelError::StateNotString));
    }

    #[test]
    fn reads_position_arguments() {
        let both = MethodCall::new("setPlaybackPosition", json!({"position": 1000, "duration": 5000}));
        assert_eq!(
            both.position_arguments(),
            Ok(PositionUpdate {
                position_ms: Some(1000),
                duration_ms: Some(5000),
            })
        );

        let only_position = MethodCall::new("setPlaybackPosition", json!({"position": 7, "duration": null}));
        assert_eq!(
            only_position.position_arguments(),
            Ok(PositionUpdate {
                position_ms: Some(7),
                duration_ms: None,
            })
        );
    }

    #[test]
    fn rejects_bad_position_arguments() {
        let empty = MethodCall::new("setPlaybackPosition", json!({}));
        assert_eq!(empty.position_arguments(), Err(ChannelError::MissingPosition));

        let fractional = MethodCall::new("setPlaybackPosition", json!({"position": 1.5, "duration": 10}));
        assert_eq!(
            fractional.position_arguments(),
            Err(ChannelError::PositionNotInteger)
        );
    }

    #[test]
    fn channel_errors_become_invalid_argument_responses() {
        assert_eq!(
            MethodResponse::from(ChannelError::MissingState),
            MethodResponse::Error {
                code: "INVALID_ARGUMENT".to_string(),
                message: "Missing state argument".to_string(),
                details: None,
            }
        );
    }

    #[test]
    fn serializes_responses_with_status_tag() {
        assert_eq!(
            serde_json::to_value(MethodResponse::success(true)).unwrap(),
            json!({"status": "success", "result": true})
        );
        assert_eq!(
            serde_json::to_value(MethodResponse::NotImplemented).unwrap(),
            json!({"status": "notImplemented"})
        );
        assert_eq!(
            serde_json::to_value(MethodResponse::from(ChannelError::ExpectedMap)).unwrap(),
            json!({"status": "error", "code": "INVALID_ARGUMENT", "message": "Expected map argument"})
        );
    }

    #[test]
    fn command_sink_emits_on_media_command() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = CommandSink::new("app/mpris", tx);

        sink.send(MediaCommand::Previous);

        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundCall {
                channel: "app/mpris".to_string(),
                method: "onMediaCommand".to_string(),
                arguments: json!({"command": "previous"}),
            }
        );
    }

    #[test]
    fn command_sink_survives_closed_host() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        CommandSink::new("app/smtc", tx).send(MediaCommand::Stop);
    }
}

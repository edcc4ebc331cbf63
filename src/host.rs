use std::collections::HashMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::channel::{MethodCall, MethodResponse, OutboundCall};
use crate::plugin::MediaPlugin;

/// Routes host method calls to the plugin registered on their channel.
#[derive(Default)]
pub struct Messenger {
    plugins: HashMap<String, MediaPlugin>,
}

impl Messenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false, leaving the existing handler in place, if the channel is taken.
    pub fn register(&mut self, plugin: MediaPlugin) -> bool {
        if self.plugins.contains_key(plugin.channel()) {
            return false;
        }

        self.plugins.insert(plugin.channel().to_string(), plugin);
        true
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub async fn dispatch(&mut self, channel: &str, call: &MethodCall) -> MethodResponse {
        match self.plugins.get_mut(channel) {
            Some(plugin) => plugin.handle_method_call(call).await,
            None => {
                debug!("No handler on {channel} for {}", call.method);
                MethodResponse::NotImplemented
            }
        }
    }

    pub async fn shutdown(&mut self) {
        for plugin in self.plugins.values_mut() {
            plugin.shutdown().await;
        }
    }
}

/// A method call as framed on the host pipe.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub id: Option<u64>,
    pub channel: String,
    #[serde(flatten)]
    pub call: MethodCall,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub channel: String,
    #[serde(flatten)]
    pub response: MethodResponse,
}

pub fn decode_message(line: &str) -> anyhow::Result<InboundMessage> {
    Ok(serde_json::from_str(line)?)
}

pub fn encode_reply(message: &InboundMessage, response: MethodResponse) -> anyhow::Result<String> {
    let reply = Reply {
        id: message.id,
        channel: message.channel.clone(),
        response,
    };
    Ok(serde_json::to_string(&reply)?)
}

pub fn encode_outbound(call: &OutboundCall) -> anyhow::Result<String> {
    Ok(serde_json::to_string(call)?)
}

/// Dispatches one framed line and returns the framed reply.
pub async fn handle_line(messenger: &mut Messenger, line: &str) -> anyhow::Result<String> {
    let message = decode_message(line)?;
    let response = messenger.dispatch(&message.channel, &message.call).await;
    encode_reply(&message, response)
}

/// Like [`handle_line`] for a raw frame read off the pipe. Blank frames have no reply.
pub async fn handle_frame(messenger: &mut Messenger, frame: &[u8]) -> anyhow::Result<Option<String>> {
    let line = std::str::from_utf8(frame).context("Frame is not valid UTF-8")?;
    if line.trim().is_empty() {
        return Ok(None);
    }

    handle_line(messenger, line).await.map(Some)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use super::{decode_message, encode_outbound, handle_frame, handle_line, Messenger};
    use crate::channel::{MethodCall, OutboundCall};
    use crate::plugin::{tests::RecordingBackend, MediaPlugin};

    fn messenger_with_plugin() -> (Messenger, mpsc::UnboundedReceiver<OutboundCall>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (backend, _calls) = RecordingBackend::new();

        let mut messenger = Messenger::new();
        assert!(messenger.register(MediaPlugin::new("app/test".to_string(), Box::new(backend), tx)));
        (messenger, rx)
    }

    #[test]
    fn decodes_framed_method_calls() {
        let message = decode_message(
            r#"{"id":3,"channel":"app/mpris","method":"updatePlaybackState","arguments":{"state":"playing"}}"#,
        )
        .unwrap();

        assert_eq!(message.id, Some(3));
        assert_eq!(message.channel, "app/mpris");
        assert_eq!(
            message.call,
            MethodCall::new("updatePlaybackState", json!({"state": "playing"}))
        );
    }

    #[test]
    fn arguments_and_id_are_optional() {
        let message = decode_message(r#"{"channel":"app/smtc","method":"initialize"}"#).unwrap();
        assert_eq!(message.id, None);
        assert_eq!(message.call.arguments, Value::Null);
    }

    #[test]
    fn rejects_messages_without_channel() {
        assert!(decode_message(r#"{"method":"initialize"}"#).is_err());
        assert!(decode_message("not-json").is_err());
    }

    #[test]
    fn encodes_outbound_commands() {
        let call = OutboundCall {
            channel: "app/smtc".to_string(),
            method: "onMediaCommand".to_string(),
            arguments: json!({"command": "next"}),
        };

        let line: Value = serde_json::from_str(&encode_outbound(&call).unwrap()).unwrap();
        assert_eq!(
            line,
            json!({"channel": "app/smtc", "method": "onMediaCommand", "arguments": {"command": "next"}})
        );
    }

    #[test]
    fn refuses_duplicate_channels() {
        let (mut messenger, _rx) = messenger_with_plugin();
        let (tx, _other_rx) = mpsc::unbounded_channel();
        let (backend, _calls) = RecordingBackend::new();

        assert!(!messenger.register(MediaPlugin::new("app/test".to_string(), Box::new(backend), tx)));
        assert_eq!(messenger.channels().collect::<Vec<_>>(), vec!["app/test"]);
    }

    #[tokio::test]
    async fn routes_lines_to_registered_plugin() {
        let (mut messenger, mut outbound) = messenger_with_plugin();

        let reply = handle_line(&mut messenger, r#"{"id":1,"channel":"app/test","method":"initialize"}"#)
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(
            reply,
            json!({"id": 1, "channel": "app/test", "status": "success", "result": true})
        );
        assert_eq!(outbound.try_recv().unwrap().arguments, json!({"command": "play"}));

        let reply = handle_line(
            &mut messenger,
            r#"{"id":2,"channel":"app/test","method":"updatePlaybackState","arguments":{}}"#,
        )
        .await
        .unwrap();
        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(
            reply,
            json!({
                "id": 2,
                "channel": "app/test",
                "status": "error",
                "code": "INVALID_ARGUMENT",
                "message": "Missing state argument",
            })
        );
    }

    #[tokio::test]
    async fn unknown_channels_are_not_implemented() {
        let (mut messenger, _outbound) = messenger_with_plugin();

        let reply = handle_line(&mut messenger, r#"{"channel":"other/plugin","method":"initialize"}"#)
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply, json!({"channel": "other/plugin", "status": "notImplemented"}));
    }

    #[tokio::test]
    async fn invalid_utf8_frames_do_not_stop_later_calls() {
        let (mut messenger, _outbound) = messenger_with_plugin();

        assert!(handle_frame(&mut messenger, b"\xff\xfe").await.is_err());
        assert_eq!(handle_frame(&mut messenger, b"  \r").await.unwrap(), None);

        let reply = handle_frame(
            &mut messenger,
            br#"{"id":7,"channel":"nobody/x","method":"initialize"}"#,
        )
        .await
        .unwrap()
        .unwrap();
        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply, json!({"id": 7, "channel": "nobody/x", "status": "notImplemented"}));
    }
}

use tokio::sync::mpsc::UnboundedSender;

use crate::channel::{ChannelError, CommandSink, MethodCall, MethodResponse, OutboundCall};
use crate::config::Config;
use crate::host::Messenger;
use crate::media::{MediaSession, PlaybackState, TrackMetadata};
use crate::platform::{self, MediaBackend};

/// One native media surface exposed to the application on a single host channel.
pub struct MediaPlugin {
    channel: String,
    backend: Box<dyn MediaBackend>,
    outbound: UnboundedSender<OutboundCall>,
    session: MediaSession,
    initialized: bool,
}

impl MediaPlugin {
    pub fn new(
        channel: String,
        backend: Box<dyn MediaBackend>,
        outbound: UnboundedSender<OutboundCall>,
    ) -> Self {
        Self {
            channel,
            backend,
            outbound,
            session: MediaSession::default(),
            initialized: false,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn session(&self) -> &MediaSession {
        &self.session
    }

    pub async fn handle_method_call(&mut self, call: &MethodCall) -> MethodResponse {
        trace!("{} <- {} {}", self.channel, call.method, call.arguments);

        let result = match call.method.as_str() {
            "initialize" => return self.initialize().await,
            "updateMetadata" => self.update_metadata(call).await,
            "updatePlaybackState" => self.update_playback_state(call).await,
            "setPlaybackPosition" => self.set_playback_position(call).await,
            _ => return MethodResponse::NotImplemented,
        };

        match result {
            Ok(()) => MethodResponse::empty(),
            Err(error) => error.into(),
        }
    }

    async fn initialize(&mut self) -> MethodResponse {
        if self.initialized {
            return MethodResponse::success(true);
        }

        let commands = CommandSink::new(self.channel.clone(), self.outbound.clone());
        match self.backend.initialize(&self.session, commands).await {
            Ok(()) => {
                self.initialized = true;
                MethodResponse::success(true)
            }
            Err(error) => {
                warn!("{}: continuing without native media controls: {error:?}", self.channel);
                MethodResponse::success(false)
            }
        }
    }

    async fn update_metadata(&mut self, call: &MethodCall) -> Result<(), ChannelError> {
        self.session.metadata = TrackMetadata::from_arguments(call.arguments_map()?);

        if self.initialized {
            if let Err(error) = self.backend.update_metadata(&self.session).await {
                warn!("{}: failed to publish metadata: {error:?}", self.channel);
            }
        }
        Ok(())
    }

    async fn update_playback_state(&mut self, call: &MethodCall) -> Result<(), ChannelError> {
        self.session.state = PlaybackState::from_app(call.state_argument()?);

        if self.initialized {
            if let Err(error) = self.backend.update_playback_state(&self.session).await {
                warn!("{}: failed to publish playback state: {error:?}", self.channel);
            }
        }
        Ok(())
    }

    async fn set_playback_position(&mut self, call: &MethodCall) -> Result<(), ChannelError> {
        let duration_changed = self.session.apply_position(call.position_arguments()?);

        if self.initialized {
            if let Err(error) = self
                .backend
                .set_playback_position(&self.session, duration_changed)
                .await
            {
                warn!("{}: failed to publish position: {error:?}", self.channel);
            }
        }
        Ok(())
    }

    /// Detaches from the OS media surface. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if std::mem::take(&mut self.initialized) {
            self.backend.shutdown().await;
        }
    }
}

/// Creates the plugin for the current platform and attaches it to the messenger.
pub fn register_with_registrar(
    messenger: &mut Messenger,
    config: &Config,
    outbound: UnboundedSender<OutboundCall>,
) {
    let backend = platform::create_backend(config);
    let channel = config.channel_name(backend.channel_suffix());
    let plugin = MediaPlugin::new(channel.clone(), backend, outbound);

    if messenger.register(plugin) {
        info!("Registered media plugin on {channel}");
    } else {
        warn!("Channel {channel} already has a handler, media plugin not registered");
    }
}

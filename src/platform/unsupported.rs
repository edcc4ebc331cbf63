use async_trait::async_trait;

use super::MediaBackend;
use crate::channel::CommandSink;
use crate::config::Config;
use crate::media::MediaSession;

pub struct UnsupportedBackend;

impl UnsupportedBackend {
    pub fn new(_config: &Config) -> Self {
        Self
    }
}

#[async_trait]
impl MediaBackend for UnsupportedBackend {
    fn channel_suffix(&self) -> &'static str {
        "media_controls"
    }

    async fn initialize(&mut self, _session: &MediaSession, _commands: CommandSink) -> anyhow::Result<()> {
        anyhow::bail!("No native media controls are available on this platform")
    }

    async fn update_metadata(&mut self, _session: &MediaSession) -> anyhow::Result<()> {
        Ok(())
    }

    async fn update_playback_state(&mut self, _session: &MediaSession) -> anyhow::Result<()> {
        Ok(())
    }

    async fn set_playback_position(&mut self, _session: &MediaSession, _duration_changed: bool) -> anyhow::Result<()> {
        Ok(())
    }

    async fn shutdown(&mut self) {}
}

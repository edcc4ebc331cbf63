#[cfg(all(unix, not(target_os = "macos")))]
mod linux;
#[cfg(all(unix, not(target_os = "macos")))]
pub use linux::MprisBackend as PlatformBackend;

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
pub use windows::SmtcBackend as PlatformBackend;

#[cfg(not(any(target_os = "windows", all(unix, not(target_os = "macos")))))]
mod unsupported;
#[cfg(not(any(target_os = "windows", all(unix, not(target_os = "macos")))))]
pub use unsupported::UnsupportedBackend as PlatformBackend;

use async_trait::async_trait;

use crate::channel::CommandSink;
use crate::config::Config;
use crate::media::MediaSession;

/// A native media surface. Updates only reach a backend after `initialize` succeeded,
/// and always carry the whole session so a backend picks what its protocol needs.
#[async_trait]
pub trait MediaBackend: Send {
    /// Last segment of the host channel name.
    fn channel_suffix(&self) -> &'static str;

    async fn initialize(&mut self, session: &MediaSession, commands: CommandSink) -> anyhow::Result<()>;

    async fn update_metadata(&mut self, session: &MediaSession) -> anyhow::Result<()>;

    async fn update_playback_state(&mut self, session: &MediaSession) -> anyhow::Result<()>;

    async fn set_playback_position(&mut self, session: &MediaSession, duration_changed: bool) -> anyhow::Result<()>;

    async fn shutdown(&mut self);
}

pub fn create_backend(config: &Config) -> Box<dyn MediaBackend> {
    Box::new(PlatformBackend::new(config))
}

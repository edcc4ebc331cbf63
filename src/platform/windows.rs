use std::thread::{self, JoinHandle};

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    oneshot,
};
use windows::{
    core::HSTRING,
    Foundation::{TimeSpan, TypedEventHandler, Uri},
    Media::{
        MediaPlaybackStatus, MediaPlaybackType, Playback::MediaPlayer,
        PlaybackPositionChangeRequestedEventArgs, SystemMediaTransportControls,
        SystemMediaTransportControlsButton, SystemMediaTransportControlsButtonPressedEventArgs,
        SystemMediaTransportControlsTimelineProperties,
    },
    Storage::Streams::RandomAccessStreamReference,
};

use super::MediaBackend;
use crate::channel::CommandSink;
use crate::config::Config;
use crate::media::{
    ticks_to_millis, MediaCommand, MediaSession, PlaybackState, TimelineTicks, TrackMetadata,
    TransportButton, TransportStatus,
};

enum SmtcRequest {
    Metadata(TrackMetadata),
    PlaybackState(PlaybackState),
    Timeline { position_ms: i64, duration_ms: i64 },
    Shutdown,
}

pub struct SmtcBackend {
    can_seek: bool,
    requests: Option<UnboundedSender<SmtcRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl SmtcBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            can_seek: config.can_seek,
            requests: None,
            worker: None,
        }
    }

    fn send(&self, request: SmtcRequest) -> anyhow::Result<()> {
        let Some(requests) = &self.requests else {
            return Ok(());
        };

        requests
            .send(request)
            .map_err(|_| anyhow::anyhow!("SMTC worker is not running"))
    }
}

#[async_trait]
impl MediaBackend for SmtcBackend {
    fn channel_suffix(&self) -> &'static str {
        "smtc"
    }

    async fn initialize(&mut self, session: &MediaSession, commands: CommandSink) -> anyhow::Result<()> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let can_seek = self.can_seek;

        let worker = thread::Builder::new()
            .name("smtc".to_string())
            .spawn(move || run_worker(requests_rx, ready_tx, commands, can_seek))
            .context("Failed to spawn the SMTC worker")?;

        ready_rx
            .await
            .context("SMTC worker exited during initialization")??;

        info!("System media transport controls enabled");
        self.requests = Some(requests_tx);
        self.worker = Some(worker);

        self.send(SmtcRequest::Metadata(session.metadata.clone()))?;
        self.send(SmtcRequest::PlaybackState(session.state))?;
        self.send(SmtcRequest::Timeline {
            position_ms: session.position_ms,
            duration_ms: session.duration_ms,
        })
    }

    async fn update_metadata(&mut self, session: &MediaSession) -> anyhow::Result<()> {
        self.send(SmtcRequest::Metadata(session.metadata.clone()))
    }

    async fn update_playback_state(&mut self, session: &MediaSession) -> anyhow::Result<()> {
        self.send(SmtcRequest::PlaybackState(session.state))
    }

    async fn set_playback_position(&mut self, session: &MediaSession, _duration_changed: bool) -> anyhow::Result<()> {
        self.send(SmtcRequest::Timeline {
            position_ms: session.position_ms,
            duration_ms: session.duration_ms,
        })
    }

    async fn shutdown(&mut self) {
        if let Some(requests) = self.requests.take() {
            let _ = requests.send(SmtcRequest::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            if tokio::task::spawn_blocking(move || worker.join()).await.is_err() {
                warn!("SMTC worker did not stop cleanly");
            }
            info!("System media transport controls disabled");
        }
    }
}

fn run_worker(
    mut requests: UnboundedReceiver<SmtcRequest>,
    ready: oneshot::Sender<anyhow::Result<()>>,
    commands: CommandSink,
    can_seek: bool,
) {
    let controls = match TransportControls::new(commands, can_seek) {
        Ok(controls) => {
            let _ = ready.send(Ok(()));
            controls
        }
        Err(error) => {
            let _ = ready.send(Err(
                anyhow::Error::new(error).context("Failed to set up the transport controls")
            ));
            return;
        }
    };

    while let Some(request) = requests.blocking_recv() {
        let result = match request {
            SmtcRequest::Metadata(metadata) => controls.update_metadata(&metadata),
            SmtcRequest::PlaybackState(state) => controls.update_playback_state(state),
            SmtcRequest::Timeline {
                position_ms,
                duration_ms,
            } => controls.update_timeline(position_ms, duration_ms),
            SmtcRequest::Shutdown => break,
        };

        if let Err(error) = result {
            warn!("Failed to update the transport controls: {error}");
        }
    }
}

struct TransportControls {
    // Owns the controls; dropping it would detach them.
    _player: MediaPlayer,
    controls: SystemMediaTransportControls,
}

impl TransportControls {
    fn new(commands: CommandSink, can_seek: bool) -> windows::core::Result<Self> {
        let player = MediaPlayer::new()?;
        player.CommandManager()?.SetIsEnabled(false)?;

        let controls = player.SystemMediaTransportControls()?;
        controls.SetIsEnabled(true)?;
        controls.SetIsPlayEnabled(true)?;
        controls.SetIsPauseEnabled(true)?;
        controls.SetIsNextEnabled(true)?;
        controls.SetIsPreviousEnabled(true)?;
        controls.SetIsStopEnabled(true)?;
        controls.DisplayUpdater()?.SetType(MediaPlaybackType::Music)?;

        let button_commands = commands.clone();
        controls.ButtonPressed(&TypedEventHandler::<
            SystemMediaTransportControls,
            SystemMediaTransportControlsButtonPressedEventArgs,
        >::new(move |_, args| {
            if let Some(args) = args {
                let command = transport_button(args.Button()?)
                    .and_then(MediaCommand::from_transport_button);
                if let Some(command) = command {
                    button_commands.send(command);
                }
            }
            Ok(())
        }))?;

        if can_seek {
            controls.PlaybackPositionChangeRequested(&TypedEventHandler::<
                SystemMediaTransportControls,
                PlaybackPositionChangeRequestedEventArgs,
            >::new(move |_, args| {
                if let Some(args) = args {
                    let position = args.RequestedPlaybackPosition()?;
                    commands.send(MediaCommand::Seek {
                        position_ms: ticks_to_millis(position.Duration),
                    });
                }
                Ok(())
            }))?;
        }

        Ok(Self {
            _player: player,
            controls,
        })
    }

    fn update_metadata(&self, metadata: &TrackMetadata) -> windows::core::Result<()> {
        let updater = self.controls.DisplayUpdater()?;
        updater.ClearAll()?;
        updater.SetType(MediaPlaybackType::Music)?;

        let music = updater.MusicProperties()?;
        if let Some(title) = &metadata.title {
            music.SetTitle(&HSTRING::from(title.as_str()))?;
        }
        if let Some(artist) = &metadata.artist {
            music.SetArtist(&HSTRING::from(artist.as_str()))?;
        }
        if let Some(album) = &metadata.album {
            music.SetAlbumTitle(&HSTRING::from(album.as_str()))?;
        }

        if let Some(artwork_url) = &metadata.artwork_url {
            match thumbnail(artwork_url) {
                Ok(reference) => updater.SetThumbnail(&reference)?,
                Err(error) => debug!("Skipping artwork {artwork_url}: {error}"),
            }
        }

        updater.Update()
    }

    fn update_playback_state(&self, state: PlaybackState) -> windows::core::Result<()> {
        self.controls
            .SetPlaybackStatus(media_playback_status(state.transport_status()))
    }

    fn update_timeline(&self, position_ms: i64, duration_ms: i64) -> windows::core::Result<()> {
        let ticks = TimelineTicks::new(position_ms, duration_ms);
        let timeline = SystemMediaTransportControlsTimelineProperties::new()?;
        timeline.SetStartTime(TimeSpan { Duration: ticks.start })?;
        timeline.SetPosition(TimeSpan {
            Duration: ticks.position,
        })?;
        timeline.SetEndTime(TimeSpan { Duration: ticks.end })?;
        timeline.SetMinSeekTime(TimeSpan {
            Duration: ticks.min_seek,
        })?;
        timeline.SetMaxSeekTime(TimeSpan {
            Duration: ticks.max_seek,
        })?;

        self.controls.UpdateTimelineProperties(&timeline)
    }
}

impl Drop for TransportControls {
    fn drop(&mut self) {
        if let Err(error) = self.controls.SetIsEnabled(false) {
            debug!("Failed to disable the transport controls: {error}");
        }
    }
}

fn thumbnail(artwork_url: &str) -> windows::core::Result<RandomAccessStreamReference> {
    let uri = Uri::CreateUri(&HSTRING::from(artwork_url))?;
    RandomAccessStreamReference::CreateFromUri(&uri)
}

fn transport_button(button: SystemMediaTransportControlsButton) -> Option<TransportButton> {
    match button {
        SystemMediaTransportControlsButton::Play => Some(TransportButton::Play),
        SystemMediaTransportControlsButton::Pause => Some(TransportButton::Pause),
        SystemMediaTransportControlsButton::Stop => Some(TransportButton::Stop),
        SystemMediaTransportControlsButton::Record => Some(TransportButton::Record),
        SystemMediaTransportControlsButton::FastForward => Some(TransportButton::FastForward),
        SystemMediaTransportControlsButton::Rewind => Some(TransportButton::Rewind),
        SystemMediaTransportControlsButton::Next => Some(TransportButton::Next),
        SystemMediaTransportControlsButton::Previous => Some(TransportButton::Previous),
        SystemMediaTransportControlsButton::ChannelUp => Some(TransportButton::ChannelUp),
        SystemMediaTransportControlsButton::ChannelDown => Some(TransportButton::ChannelDown),
        _ => None,
    }
}

fn media_playback_status(status: TransportStatus) -> MediaPlaybackStatus {
    match status {
        TransportStatus::Closed => MediaPlaybackStatus::Closed,
        TransportStatus::Changing => MediaPlaybackStatus::Changing,
        TransportStatus::Stopped => MediaPlaybackStatus::Stopped,
        TransportStatus::Playing => MediaPlaybackStatus::Playing,
        TransportStatus::Paused => MediaPlaybackStatus::Paused,
    }
}

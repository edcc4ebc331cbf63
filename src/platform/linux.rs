use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use zbus::{
    connection, fdo, interface,
    object_server::SignalContext,
    zvariant::{ObjectPath, OwnedValue, Value},
    Connection,
};

use super::MediaBackend;
use crate::channel::CommandSink;
use crate::config::Config;
use crate::media::{MediaCommand, MediaSession, PlaybackState, TrackMetadata};

const OBJECT_PATH: &str = "/org/mpris/MediaPlayer2";
const TRACK_ID: &str = "/org/mpris/MediaPlayer2/Track/1";

fn millis_to_micros(millis: i64) -> i64 {
    millis.saturating_mul(1000)
}

fn micros_to_millis(micros: i64) -> i64 {
    micros / 1000
}

struct RootInterface {
    identity: String,
}

#[interface(name = "org.mpris.MediaPlayer2")]
impl RootInterface {
    fn raise(&self) {
        debug!("MPRIS Raise requested");
    }

    fn quit(&self) {
        debug!("MPRIS Quit requested");
    }

    #[zbus(property)]
    fn can_quit(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_raise(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn has_track_list(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn identity(&self) -> String {
        self.identity.clone()
    }

    #[zbus(property)]
    fn supported_uri_schemes(&self) -> Vec<String> {
        Vec::new()
    }

    #[zbus(property)]
    fn supported_mime_types(&self) -> Vec<String> {
        Vec::new()
    }
}

struct PlayerInterface {
    commands: CommandSink,
    can_seek: bool,
    session: MediaSession,
    seek_pending: bool,
}

impl PlayerInterface {
    fn send(&self, command: MediaCommand) {
        self.commands.send(command);
    }

    fn ensure_seekable(&self) -> fdo::Result<()> {
        if self.can_seek {
            Ok(())
        } else {
            Err(fdo::Error::NotSupported("Seeking is disabled".to_string()))
        }
    }

    fn request_seek(&mut self, position_ms: i64) {
        self.seek_pending = true;
        self.send(MediaCommand::Seek { position_ms });
    }

    fn apply_metadata(&mut self, metadata: TrackMetadata) -> Vec<PlayerChange> {
        self.session.metadata = metadata;
        vec![PlayerChange::Metadata]
    }

    /// Only a change of the reported MPRIS status is signalled.
    fn apply_state(&mut self, state: PlaybackState) -> Vec<PlayerChange> {
        let changed = self.session.state.mpris_status() != state.mpris_status();
        self.session.state = state;
        if changed {
            vec![PlayerChange::PlaybackStatus]
        } else {
            Vec::new()
        }
    }

    /// A new length is part of the metadata. The first report after a requested seek is `Seeked`.
    fn apply_position(&mut self, position_ms: i64, duration_ms: i64, duration_changed: bool) -> Vec<PlayerChange> {
        self.session.position_ms = position_ms;
        self.session.duration_ms = duration_ms;

        let mut changes = Vec::new();
        if duration_changed {
            changes.push(PlayerChange::Metadata);
        }
        if std::mem::take(&mut self.seek_pending) {
            changes.push(PlayerChange::Seeked(millis_to_micros(position_ms)));
        }
        changes
    }
}

#[interface(name = "org.mpris.MediaPlayer2.Player")]
impl PlayerInterface {
    fn next(&self) {
        self.send(MediaCommand::Next);
    }

    fn previous(&self) {
        self.send(MediaCommand::Previous);
    }

    fn pause(&self) {
        self.send(MediaCommand::Pause);
    }

    fn play_pause(&self) {
        self.send(toggle_command(self.session.state));
    }

    fn stop(&self) {
        self.send(MediaCommand::Stop);
    }

    fn play(&self) {
        self.send(MediaCommand::Play);
    }

    fn seek(&mut self, offset: i64) -> fdo::Result<()> {
        self.ensure_seekable()?;

        match relative_seek(&self.session, offset) {
            Some(position_ms) => self.request_seek(position_ms),
            None => self.send(MediaCommand::Next),
        }
        Ok(())
    }

    fn set_position(&mut self, track_id: ObjectPath<'_>, position: i64) -> fdo::Result<()> {
        self.ensure_seekable()?;

        if track_id.as_str() != TRACK_ID {
            debug!("Ignoring SetPosition for stale track {track_id}");
            return Ok(());
        }
        if let Some(position_ms) = absolute_seek(&self.session, position) {
            self.request_seek(position_ms);
        }
        Ok(())
    }

    #[zbus(signal)]
    async fn seeked(ctxt: &SignalContext<'_>, position: i64) -> zbus::Result<()>;

    #[zbus(property)]
    fn playback_status(&self) -> String {
        self.session.state.mpris_status().to_string()
    }

    #[zbus(property)]
    fn rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn set_rate(&mut self, rate: f64) {
        debug!("Ignoring MPRIS rate change to {rate}");
    }

    #[zbus(property)]
    fn metadata(&self) -> fdo::Result<HashMap<String, OwnedValue>> {
        metadata_dict(&self.session.metadata, self.session.duration())
            .map_err(|error| fdo::Error::Failed(error.to_string()))
    }

    #[zbus(property)]
    fn volume(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn set_volume(&mut self, volume: f64) {
        debug!("Ignoring MPRIS volume change to {volume}");
    }

    #[zbus(property(emits_changed_signal = "false"))]
    fn position(&self) -> i64 {
        millis_to_micros(self.session.position_ms)
    }

    #[zbus(property)]
    fn minimum_rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn maximum_rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn can_go_next(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_go_previous(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_play(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_pause(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_seek(&self) -> bool {
        self.can_seek
    }

    #[zbus(property(emits_changed_signal = "const"))]
    fn can_control(&self) -> bool {
        true
    }
}

fn toggle_command(state: PlaybackState) -> MediaCommand {
    if matches!(state, PlaybackState::Playing | PlaybackState::Buffering) {
        MediaCommand::Pause
    } else {
        MediaCommand::Play
    }
}

/// Target of a relative `Seek`, or `None` when it lands past the end of a track of known length.
fn relative_seek(session: &MediaSession, offset_us: i64) -> Option<i64> {
    let target = session
        .position_ms
        .saturating_add(micros_to_millis(offset_us))
        .max(0);

    match session.duration() {
        Some(duration) if target > duration => None,
        _ => Some(target),
    }
}

/// Target of `SetPosition`, or `None` when the position is out of range.
fn absolute_seek(session: &MediaSession, position_us: i64) -> Option<i64> {
    if position_us < 0 {
        return None;
    }

    let target = micros_to_millis(position_us);
    match session.duration() {
        Some(duration) if target > duration => None,
        _ => Some(target),
    }
}

fn metadata_dict(
    metadata: &TrackMetadata,
    duration_ms: Option<i64>,
) -> zbus::zvariant::Result<HashMap<String, OwnedValue>> {
    let mut dict = HashMap::new();

    dict.insert(
        "mpris:trackid".to_string(),
        OwnedValue::try_from(Value::from(ObjectPath::from_static_str_unchecked(TRACK_ID)))?,
    );
    if let Some(title) = &metadata.title {
        dict.insert(
            "xesam:title".to_string(),
            OwnedValue::try_from(Value::from(title.as_str()))?,
        );
    }
    if let Some(artist) = &metadata.artist {
        dict.insert(
            "xesam:artist".to_string(),
            OwnedValue::try_from(Value::from(vec![artist.clone()]))?,
        );
    }
    if let Some(album) = &metadata.album {
        dict.insert(
            "xesam:album".to_string(),
            OwnedValue::try_from(Value::from(album.as_str()))?,
        );
    }
    if let Some(art_url) = &metadata.artwork_url {
        dict.insert(
            "mpris:artUrl".to_string(),
            OwnedValue::try_from(Value::from(art_url.as_str()))?,
        );
    }
    if let Some(duration) = duration_ms {
        dict.insert(
            "mpris:length".to_string(),
            OwnedValue::try_from(Value::from(millis_to_micros(duration)))?,
        );
    }

    Ok(dict)
}

pub struct MprisBackend {
    bus_name: String,
    identity: String,
    can_seek: bool,
    connection: Option<Connection>,
}

impl MprisBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            bus_name: config.mpris_bus_name(),
            identity: config.identity.clone(),
            can_seek: config.can_seek,
            connection: None,
        }
    }

    async fn with_player<F>(&self, update: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut PlayerInterface) -> Vec<PlayerChange> + Send,
    {
        let Some(connection) = &self.connection else {
            return Ok(());
        };

        let player_ref = connection
            .object_server()
            .interface::<_, PlayerInterface>(OBJECT_PATH)
            .await
            .context("MPRIS player interface is not registered")?;
        let ctxt = player_ref.signal_context();
        let mut player = player_ref.get_mut().await;

        for change in update(&mut *player) {
            match change {
                PlayerChange::PlaybackStatus => player.playback_status_changed(ctxt).await,
                PlayerChange::Metadata => player.metadata_changed(ctxt).await,
                PlayerChange::Seeked(position) => PlayerInterface::seeked(ctxt, position).await,
            }
            .with_context(|| format!("Failed to emit {change:?} on {}", self.bus_name))?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayerChange {
    PlaybackStatus,
    Metadata,
    Seeked(i64),
}

#[async_trait]
impl MediaBackend for MprisBackend {
    fn channel_suffix(&self) -> &'static str {
        "mpris"
    }

    async fn initialize(&mut self, session: &MediaSession, commands: CommandSink) -> anyhow::Result<()> {
        let root = RootInterface {
            identity: self.identity.clone(),
        };
        let player = PlayerInterface {
            commands,
            can_seek: self.can_seek,
            session: session.clone(),
            seek_pending: false,
        };

        let connection = connection::Builder::session()?
            .name(self.bus_name.as_str())?
            .serve_at(OBJECT_PATH, root)?
            .serve_at(OBJECT_PATH, player)?
            .build()
            .await
            .with_context(|| format!("Failed to own {} on the session bus", self.bus_name))?;

        info!("Serving MPRIS as {}", self.bus_name);
        self.connection = Some(connection);
        Ok(())
    }

    async fn update_metadata(&mut self, session: &MediaSession) -> anyhow::Result<()> {
        let metadata = session.metadata.clone();
        self.with_player(move |player| player.apply_metadata(metadata))
            .await
    }

    async fn update_playback_state(&mut self, session: &MediaSession) -> anyhow::Result<()> {
        let state = session.state;
        self.with_player(move |player| player.apply_state(state)).await
    }

    async fn set_playback_position(&mut self, session: &MediaSession, duration_changed: bool) -> anyhow::Result<()> {
        let (position_ms, duration_ms) = (session.position_ms, session.duration_ms);
        self.with_player(move |player| {
            player.apply_position(position_ms, duration_ms, duration_changed)
        })
        .await
    }

    async fn shutdown(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(error) = connection.release_name(self.bus_name.as_str()).await {
                debug!("Failed to release {}: {error}", self.bus_name);
            }
            info!("Stopped serving MPRIS as {}", self.bus_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;
    use zbus::zvariant::{ObjectPath, Value};

    use super::{
        absolute_seek, metadata_dict, relative_seek, toggle_command, PlayerChange, PlayerInterface,
        TRACK_ID,
    };
    use crate::channel::{CommandSink, OutboundCall};
    use crate::media::{MediaCommand, MediaSession, PlaybackState, TrackMetadata};

    fn player() -> (PlayerInterface, mpsc::UnboundedReceiver<OutboundCall>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let player = PlayerInterface {
            commands: CommandSink::new("app/mpris", tx),
            can_seek: true,
            session: MediaSession::default(),
            seek_pending: false,
        };
        (player, rx)
    }

    fn session_at(position_ms: i64, duration_ms: i64) -> MediaSession {
        MediaSession {
            position_ms,
            duration_ms,
            ..MediaSession::default()
        }
    }

    #[test]
    fn builds_full_metadata_dictionary() {
        let metadata = TrackMetadata {
            title: Some("400 Lux".to_string()),
            artist: Some("Lorde".to_string()),
            album: Some("Pure Heroine".to_string()),
            artwork_url: Some("https://example.com/cover.jpg".to_string()),
        };

        let dict = metadata_dict(&metadata, Some(200_000)).unwrap();
        assert_eq!(dict.len(), 6);
        assert_eq!(
            *dict["mpris:trackid"],
            Value::from(ObjectPath::from_static_str_unchecked(TRACK_ID))
        );
        assert_eq!(*dict["xesam:title"], Value::from("400 Lux"));
        assert_eq!(*dict["xesam:artist"], Value::from(vec!["Lorde".to_string()]));
        assert_eq!(*dict["xesam:album"], Value::from("Pure Heroine"));
        assert_eq!(*dict["mpris:artUrl"], Value::from("https://example.com/cover.jpg"));
        assert_eq!(*dict["mpris:length"], Value::from(200_000_000_i64));
    }

    #[test]
    fn empty_metadata_still_carries_track_id() {
        let dict = metadata_dict(&TrackMetadata::default(), None).unwrap();
        assert_eq!(dict.len(), 1);
        assert!(dict.contains_key("mpris:trackid"));
    }

    #[test]
    fn play_pause_toggles_on_current_status() {
        assert_eq!(toggle_command(PlaybackState::Playing), MediaCommand::Pause);
        assert_eq!(toggle_command(PlaybackState::Buffering), MediaCommand::Pause);
        assert_eq!(toggle_command(PlaybackState::Paused), MediaCommand::Play);
        assert_eq!(toggle_command(PlaybackState::Stopped), MediaCommand::Play);
    }

    #[test]
    fn relative_seek_clamps_and_skips_past_the_end() {
        let session = session_at(10_000, 60_000);
        assert_eq!(relative_seek(&session, 5_000_000), Some(15_000));
        assert_eq!(relative_seek(&session, -20_000_000), Some(0));
        assert_eq!(relative_seek(&session, 55_000_000), None);

        let unknown_length = session_at(10_000, 0);
        assert_eq!(relative_seek(&unknown_length, 600_000_000), Some(610_000));
    }

    #[test]
    fn absolute_seek_ignores_out_of_range_positions() {
        let session = session_at(0, 60_000);
        assert_eq!(absolute_seek(&session, 30_000_000), Some(30_000));
        assert_eq!(absolute_seek(&session, -1), None);
        assert_eq!(absolute_seek(&session, 61_000_000), None);
    }

    #[test]
    fn playback_status_is_signalled_only_when_it_changes() {
        let (mut player, _commands) = player();

        assert_eq!(player.apply_state(PlaybackState::Playing), vec![PlayerChange::PlaybackStatus]);
        assert!(player.apply_state(PlaybackState::Buffering).is_empty());
        assert_eq!(player.session.state, PlaybackState::Buffering);
        assert_eq!(player.apply_state(PlaybackState::Paused), vec![PlayerChange::PlaybackStatus]);
        assert!(player.apply_state(PlaybackState::Paused).is_empty());
    }

    #[test]
    fn metadata_updates_are_always_signalled() {
        let (mut player, _commands) = player();
        let metadata = TrackMetadata {
            title: Some("Song".to_string()),
            ..TrackMetadata::default()
        };

        assert_eq!(player.apply_metadata(metadata.clone()), vec![PlayerChange::Metadata]);
        assert_eq!(player.session.metadata, metadata);
    }

    #[test]
    fn new_duration_is_signalled_as_metadata() {
        let (mut player, _commands) = player();

        assert_eq!(player.apply_position(0, 180_000, true), vec![PlayerChange::Metadata]);
        assert!(player.apply_position(1_000, 180_000, false).is_empty());
        assert_eq!(player.session.position_ms, 1_000);
        assert_eq!(player.session.duration(), Some(180_000));
    }

    #[test]
    fn seeked_follows_only_the_first_report_after_a_seek() {
        let (mut player, mut commands) = player();
        player.session.duration_ms = 60_000;

        player.seek(5_000_000).unwrap();
        assert!(player.seek_pending);
        assert_eq!(
            commands.try_recv().unwrap().arguments,
            json!({"command": "seek", "position": 5_000})
        );

        assert_eq!(
            player.apply_position(5_000, 60_000, false),
            vec![PlayerChange::Seeked(5_000_000)]
        );
        assert!(!player.seek_pending);
        assert!(player.apply_position(6_000, 60_000, false).is_empty());
    }

    #[test]
    fn seeking_is_refused_when_disabled() {
        let (mut player, mut commands) = player();
        player.can_seek = false;

        assert!(player.seek(1_000_000).is_err());
        assert!(player
            .set_position(ObjectPath::from_static_str_unchecked(TRACK_ID), 1_000_000)
            .is_err());
        assert!(!player.seek_pending);
        assert!(commands.try_recv().is_err());
    }
}

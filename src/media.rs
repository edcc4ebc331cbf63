use serde_json::{Map, Value};

/// A transport command coming from the OS media surface, addressed to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCommand {
    Play,
    Pause,
    Next,
    Previous,
    Stop,
    Seek { position_ms: i64 },
}

impl MediaCommand {
    pub fn name(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Next => "next",
            Self::Previous => "previous",
            Self::Stop => "stop",
            Self::Seek { .. } => "seek",
        }
    }

    pub fn arguments(self) -> Value {
        let mut arguments = Map::new();
        arguments.insert("command".to_string(), Value::String(self.name().to_string()));
        if let Self::Seek { position_ms } = self {
            arguments.insert("position".to_string(), Value::from(position_ms));
        }

        Value::Object(arguments)
    }

    pub fn from_transport_button(button: TransportButton) -> Option<Self> {
        match button {
            TransportButton::Play => Some(Self::Play),
            TransportButton::Pause => Some(Self::Pause),
            TransportButton::Next => Some(Self::Next),
            TransportButton::Previous => Some(Self::Previous),
            TransportButton::Stop => Some(Self::Stop),
            TransportButton::Record
            | TransportButton::FastForward
            | TransportButton::Rewind
            | TransportButton::ChannelUp
            | TransportButton::ChannelDown => None,
        }
    }
}

/// Buttons of the Windows transport controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportButton {
    Play,
    Pause,
    Stop,
    Record,
    FastForward,
    Rewind,
    Next,
    Previous,
    ChannelUp,
    ChannelDown,
}

/// Statuses of the Windows transport controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Closed,
    Changing,
    Stopped,
    Playing,
    Paused,
}

const TICKS_PER_MILLI: i64 = 10_000;

/// Windows timelines count in 100 ns ticks.
pub fn millis_to_ticks(millis: i64) -> i64 {
    millis.max(0).saturating_mul(TICKS_PER_MILLI)
}

pub fn ticks_to_millis(ticks: i64) -> i64 {
    ticks.max(0) / TICKS_PER_MILLI
}

/// Transport-control timeline, in 100 ns ticks. The seek range always spans the whole track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelineTicks {
    pub start: i64,
    pub position: i64,
    pub end: i64,
    pub min_seek: i64,
    pub max_seek: i64,
}

impl TimelineTicks {
    pub fn new(position_ms: i64, duration_ms: i64) -> Self {
        let end = millis_to_ticks(duration_ms);
        Self {
            start: 0,
            position: millis_to_ticks(position_ms),
            end,
            min_seek: 0,
            max_seek: end,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    #[default]
    Stopped,
    Buffering,
    Inactive,
}

impl PlaybackState {
    pub fn from_app(state: &str) -> Self {
        match state {
            "playing" => Self::Playing,
            "paused" => Self::Paused,
            "stopped" => Self::Stopped,
            "buffering" => Self::Buffering,
            _ => Self::Inactive,
        }
    }

    /// Value of the MPRIS `PlaybackStatus` property.
    pub fn mpris_status(self) -> &'static str {
        match self {
            Self::Playing | Self::Buffering => "Playing",
            Self::Paused => "Paused",
            Self::Stopped | Self::Inactive => "Stopped",
        }
    }

    pub fn transport_status(self) -> TransportStatus {
        match self {
            Self::Playing => TransportStatus::Playing,
            Self::Paused => TransportStatus::Paused,
            Self::Stopped => TransportStatus::Stopped,
            Self::Buffering => TransportStatus::Changing,
            Self::Inactive => TransportStatus::Closed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub artwork_url: Option<String>,
}

impl TrackMetadata {
    /// Reads the `updateMetadata` arguments. Fields with a non-string value are skipped,
    /// empty album and artwork values count as missing.
    pub fn from_arguments(arguments: &Map<String, Value>) -> Self {
        Self {
            title: string_field(arguments, "title").map(ToString::to_string),
            artist: string_field(arguments, "artist").map(ToString::to_string),
            album: non_empty_string_field(arguments, "album"),
            artwork_url: non_empty_string_field(arguments, "artworkUrl"),
        }
    }
}

fn string_field<'a>(arguments: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}

fn non_empty_string_field(arguments: &Map<String, Value>, key: &str) -> Option<String> {
    string_field(arguments, key)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// A `setPlaybackPosition` report, in milliseconds. Missing values keep the previous ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionUpdate {
    pub position_ms: Option<i64>,
    pub duration_ms: Option<i64>,
}

/// Everything the application told us so far. It survives independently of the OS integration,
/// so a late `initialize` can still publish the latest state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaSession {
    pub state: PlaybackState,
    pub metadata: TrackMetadata,
    pub position_ms: i64,
    /// Zero when unknown.
    pub duration_ms: i64,
}

impl MediaSession {
    /// Returns whether the duration changed.
    pub fn apply_position(&mut self, update: PositionUpdate) -> bool {
        if let Some(position) = update.position_ms {
            self.position_ms = position.max(0);
        }

        let previous_duration = self.duration_ms;
        if let Some(duration) = update.duration_ms {
            self.duration_ms = duration.max(0);
        }

        previous_duration != self.duration_ms
    }

    pub fn duration(&self) -> Option<i64> {
        (self.duration_ms > 0).then_some(self.duration_ms)
    }
}

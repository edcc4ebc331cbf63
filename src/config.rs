use clap::Parser;
use clap_verbosity_flag::Verbosity;
use serde::Deserialize;

const MPRIS_BUS_PREFIX: &str = "org.mpris.MediaPlayer2";

fn default_identity() -> String {
    String::from("YouTube Music Unbound")
}

fn default_bus_name() -> String {
    String::from("YouTubeMusicUnbound")
}

fn default_channel_prefix() -> String {
    String::from("youtube_music_unbound")
}

fn default_can_seek() -> bool {
    true
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(
        short,
        long,
        help = "Player name shown by the desktop. Defaults to \"YouTube Music Unbound\" if not specified."
    )]
    identity: Option<String>,

    #[clap(
        short,
        long,
        help = "MPRIS bus name suffix, appended to org.mpris.MediaPlayer2. Defaults to \"YouTubeMusicUnbound\"."
    )]
    bus_name: Option<String>,

    #[clap(
        short,
        long,
        help = "Prefix of the host channel names. Defaults to \"youtube_music_unbound\"."
    )]
    channel_prefix: Option<String>,

    #[clap(long, help = "Do not advertise seeking to the OS media controls.")]
    no_seek: bool,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

#[derive(Deserialize, Debug, PartialEq)]
struct Toml {
    #[serde(default = "default_identity")]
    identity: String,
    #[serde(default = "default_bus_name")]
    bus_name: String,
    #[serde(default = "default_channel_prefix")]
    channel_prefix: String,
    #[serde(default = "default_can_seek")]
    can_seek: bool,
}

impl Default for Toml {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            bus_name: default_bus_name(),
            channel_prefix: default_channel_prefix(),
            can_seek: default_can_seek(),
        }
    }
}

impl Toml {
    pub fn new() -> Self {
        let Some(config_dir) = dirs::config_local_dir() else {
            warn!("Impossible to find config directory, using default config");
            return Toml::default();
        };
        let file = config_dir.join(env!("CARGO_PKG_NAME").to_string() + ".toml");

        let content = std::fs::read_to_string(&file).unwrap_or_default();
        if let Ok(config) = toml::from_str(&content) {
            config
        } else {
            warn!(
                "Failed to parse config file {}, using defaults",
                file.display()
            );
            Toml::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub identity: String,
    pub bus_name: String,
    pub channel_prefix: String,
    pub can_seek: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(None, Toml::default())
    }
}

impl Config {
    pub fn new(cli: Cli) -> Self {
        Self::merge(Some(cli), Toml::new())
    }

    fn merge(cli: Option<Cli>, toml_data: Toml) -> Self {
        let (identity, bus_name, channel_prefix, no_seek) = match cli {
            Some(cli) => (cli.identity, cli.bus_name, cli.channel_prefix, cli.no_seek),
            None => (None, None, None, false),
        };

        let mut bus_name = bus_name.unwrap_or(toml_data.bus_name);
        if !is_valid_bus_name(&format!("{MPRIS_BUS_PREFIX}.{bus_name}")) {
            warn!(
                "\"{bus_name}\" does not form a valid D-Bus name, using \"{}\"",
                default_bus_name()
            );
            bus_name = default_bus_name();
        }

        Config {
            identity: identity.unwrap_or(toml_data.identity),
            bus_name,
            channel_prefix: channel_prefix.unwrap_or(toml_data.channel_prefix),
            can_seek: toml_data.can_seek && !no_seek,
        }
    }

    pub fn mpris_bus_name(&self) -> String {
        format!("{MPRIS_BUS_PREFIX}.{}", self.bus_name)
    }

    pub fn channel_name(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.channel_prefix)
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn is_valid_bus_name(name: &str) -> bool {
    zbus::names::WellKnownName::try_from(name).is_ok()
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn is_valid_bus_name(name: &str) -> bool {
    name.len() <= 255
        && name.split('.').all(|element| {
            let mut chars = element.chars();
            match chars.next() {
                Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '-' => {
                    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                }
                _ => false,
            }
        })
}

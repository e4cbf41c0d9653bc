use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::player::PlayerConfig;
use crate::audio::track::Track;
use crate::events::EventKind;
use crate::host::{AutoplayPolicy, HeadlessConfig};
use crate::session::LoopMode;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub player: PlayerSection,
    #[serde(default)]
    pub host: HostSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerSection {
    #[serde(default = "default_crossfade_ms")]
    pub crossfade_ms: u64,
    #[serde(default = "default_grace_ms")]
    pub finalize_grace_ms: u64,
    #[serde(default = "default_retry_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_volume")]
    pub volume: f32,
}
fn default_crossfade_ms() -> u64 {
    120
}
fn default_grace_ms() -> u64 {
    10
}
fn default_retry_ms() -> u64 {
    150
}
fn default_volume() -> f32 {
    0.7
}
impl Default for PlayerSection {
    fn default() -> Self {
        Self {
            crossfade_ms: default_crossfade_ms(),
            finalize_grace_ms: default_grace_ms(),
            retry_delay_ms: default_retry_ms(),
            volume: default_volume(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostSection {
    #[serde(default)]
    pub media_root: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub gain_graph: bool,
    #[serde(default)]
    pub autoplay: AutoplayPolicy,
    #[serde(default)]
    pub start_suspended: bool,
    #[serde(default = "default_time_update_ms")]
    pub time_update_ms: u64,
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,
}
fn default_true() -> bool {
    true
}
fn default_time_update_ms() -> u64 {
    250
}
fn default_stall_timeout_ms() -> u64 {
    3000
}
impl Default for HostSection {
    fn default() -> Self {
        Self {
            media_root: None,
            gain_graph: true,
            autoplay: AutoplayPolicy::default(),
            start_suspended: false,
            time_update_ms: default_time_update_ms(),
            stall_timeout_ms: default_stall_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default)]
    pub loop_mode: LoopMode,
    #[serde(default)]
    pub start_index: usize,
    #[serde(default = "default_true")]
    pub autoplay: bool,
}
impl Default for SessionSection {
    fn default() -> Self {
        Self { loop_mode: LoopMode::default(), start_index: 0, autoplay: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_true")]
    pub clean_log_on_start: bool,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Player events echoed to the log, by name. Unset logs all of them.
    #[serde(default)]
    pub events: Option<Vec<String>>,
}
impl Default for LoggingSection {
    fn default() -> Self {
        Self { clean_log_on_start: true, dir: None, events: None }
    }
}

#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub player: PlayerConfig,
    pub host: HeadlessConfig,
    pub media_root: Option<PathBuf>,
    pub loop_mode: LoopMode,
    pub start_index: usize,
    pub autoplay: bool,
    pub clean_log_on_start: bool,
    pub log_dir: PathBuf,
    pub log_events: Vec<EventKind>,
}

pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Tandem Configuration

[player]
# Length of the gain ramps when switching tracks, in milliseconds. Default: 120
crossfade_ms = 120
# Extra wait after the ramps before the switch is finalized. Default: 10
finalize_grace_ms = 10
# Wait before retrying a play request the host did not honour. Default: 150
retry_delay_ms = 150
# Initial volume in [0, 1]. Default: 0.7
volume = 0.7

[host]
# Directory that site-absolute track paths such as "/Lofi.mp3" resolve against.
# Default: unset (paths are used as-is)
# media_root = "public"
# Crossfade with gain ramps. When false, track switches are hard cuts. Default: true
gain_graph = true
# "allowed" or "requires_gesture". Default: "allowed"
autoplay = "allowed"
# Start with the audio context suspended until the first play. Default: false
start_suspended = false
# Interval between position updates, in milliseconds. Default: 250
time_update_ms = 250
# Loads slower than this report a stall, in milliseconds. Default: 3000
stall_timeout_ms = 3000

[session]
# "track" repeats the current track, "queue" cycles the playlist,
# "none" plays it once. Default: "track"
loop_mode = "track"
# Playlist index to start from. Default: 0
start_index = 0
# Start playing right away. Default: true
autoplay = true

[logging]
# Truncate latest.log on startup. Default: true
clean_log_on_start = true
# Log directory. Default: ".logs"
# dir = ".logs"
# Player events echoed to the log. Default: all of them
# events = ["timeupdate", "loadedmetadata", "waiting", "canplaythrough", "stalled", "ended", "trackchange", "error"]"#;

pub fn parse_config(contents: &str) -> Result<RawConfig> {
    toml::from_str(contents).context("invalid tandem config")
}

impl RawConfig {
    /// Folds the file config and environment overrides (looked up through
    /// `env`) into the settings the binary runs with.
    pub fn resolve(self, env: impl Fn(&str) -> Option<String>) -> EffectiveConfig {
        let crossfade_ms = env("TANDEM_CROSSFADE_MS").and_then(|s| s.parse().ok()).unwrap_or(self.player.crossfade_ms);
        let volume = env("TANDEM_VOLUME")
            .and_then(|s| s.parse::<f32>().ok())
            .filter(|v| !v.is_nan())
            .unwrap_or(self.player.volume);
        let log_dir = env("TANDEM_LOG_DIR")
            .map(PathBuf::from)
            .or(self.logging.dir)
            .unwrap_or_else(|| PathBuf::from(".logs"));
        let log_events = match self.logging.events {
            Some(names) => names
                .iter()
                .filter_map(|name| match name.parse::<EventKind>() {
                    Ok(kind) => Some(kind),
                    Err(e) => {
                        tracing::warn!(%e, "Ignoring logging.events entry");
                        None
                    }
                })
                .collect(),
            None => EventKind::ALL.to_vec(),
        };

        EffectiveConfig {
            player: PlayerConfig {
                crossfade: Duration::from_millis(crossfade_ms),
                finalize_grace: Duration::from_millis(self.player.finalize_grace_ms),
                retry_delay: Duration::from_millis(self.player.retry_delay_ms),
                initial_volume: volume.clamp(0.0, 1.0),
                ..PlayerConfig::default()
            },
            host: HeadlessConfig {
                gain_graph: self.host.gain_graph,
                autoplay: self.host.autoplay,
                start_suspended: self.host.start_suspended,
                time_update_interval: Duration::from_millis(self.host.time_update_ms.max(1)),
                stall_timeout: Duration::from_millis(self.host.stall_timeout_ms),
            },
            media_root: self.host.media_root,
            loop_mode: self.session.loop_mode,
            start_index: self.session.start_index,
            autoplay: self.session.autoplay,
            clean_log_on_start: self.logging.clean_log_on_start,
            log_dir,
            log_events,
        }
    }
}

pub fn load_config() -> EffectiveConfig {
    let _ = dotenvy::dotenv();

    let config_paths = ["tandem.toml", "Tandem.toml"];
    let config_exists = config_paths.iter().any(|path| Path::new(path).exists());

    if !config_exists {
        if let Err(e) = std::fs::write("tandem.toml", DEFAULT_CONFIG_TEMPLATE) {
            tracing::warn!(?e, "Failed to create default config file");
        } else {
            tracing::info!("Created default config file at tandem.toml");
        }
    }

    let mut raw = RawConfig::default();
    if let Ok(contents) =
        std::fs::read_to_string("tandem.toml").or_else(|_| std::fs::read_to_string("Tandem.toml"))
    {
        match parse_config(&contents) {
            Ok(parsed) => raw = parsed,
            Err(e) => tracing::warn!(?e, "Failed to parse tandem config; using defaults"),
        }
    }

    raw.resolve(|key| std::env::var(key).ok())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlaylistFile {
    Bare(Vec<Track>),
    Wrapped { tracks: Vec<Track> },
}

/// Reads a playlist from a `.json` file (array, or `{"tracks": [...]}`) or a
/// TOML file with `[[tracks]]` tables.
pub fn load_playlist(path: &Path) -> Result<Vec<Track>> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let is_json = path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let file: PlaylistFile = if is_json {
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?
    } else {
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?
    };
    Ok(match file {
        PlaylistFile::Bare(tracks) | PlaylistFile::Wrapped { tracks } => tracks,
    })
}

/// The focus-music rotation used when no playlist file is given.
pub fn default_playlist() -> Vec<Track> {
    [("Honey Jam", "/Lofi.mp3"), ("Peach Prosecco", "/Lofi1.mp3"), ("Aromatic", "/Lofi2.mp3"), ("Noon", "/Lofi3.mp3")]
        .into_iter()
        .enumerate()
        .map(|(i, (name, url))| Track::new(format!("lofi-{i}"), name, url))
        .collect()
}

/// Deck configuration
use crate::error::{DeckError, Result};
use serde::{Deserialize, Serialize};
use soon_audio_desktop::{decode_file, ClipInfo, Driver};
use soon_playback::{ClipSet, SequencerConfig};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "deck.toml";

/// Prefix of environment overrides (`SOON_HOST__POLL_HZ=30`)
pub const ENV_PREFIX: &str = "SOON";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeckConfig {
    #[serde(default = "default_assets")]
    pub assets: AssetSettings,

    #[serde(default)]
    pub sequencer: SequencerConfig,

    #[serde(default = "default_host")]
    pub host: HostSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssetSettings {
    #[serde(default = "default_asset_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_intro")]
    pub intro: String,

    #[serde(rename = "loop", default = "default_loop")]
    pub loop_clip: String,

    #[serde(default = "default_outro")]
    pub outro: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HostSettings {
    /// How often the host loop calls `poll()`
    #[serde(default = "default_poll_hz")]
    pub poll_hz: u32,

    /// Log the VU needle while playing
    #[serde(default)]
    pub meter: bool,

    #[serde(default)]
    pub driver: Driver,
}

impl AssetSettings {
    /// Full paths of the three clips
    pub fn clip_set(&self) -> ClipSet {
        ClipSet::new(
            self.dir.join(&self.intro),
            self.dir.join(&self.loop_clip),
            self.dir.join(&self.outro),
        )
    }

    /// Fail on the first clip that is not on disk
    pub fn check_present(&self) -> Result<ClipSet> {
        let clips = self.clip_set();
        for path in [&clips.intro, &clips.loop_clip, &clips.outro] {
            if !path.is_file() {
                return Err(DeckError::MissingClip(path.clone()));
            }
        }
        Ok(clips)
    }

    /// Decode the three clips, intro first, and report their formats
    pub fn inspect(&self) -> Result<Vec<ClipInfo>> {
        let clips = self.check_present()?;
        let mut infos = Vec::with_capacity(3);
        for path in [&clips.intro, &clips.loop_clip, &clips.outro] {
            infos.push(decode_file(path)?.info);
        }
        Ok(infos)
    }
}

impl HostSettings {
    /// Interval between host polls
    pub fn frame(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.poll_hz.max(1)))
    }
}

impl DeckConfig {
    /// Load from `path` (or `deck.toml` if present) and `SOON_` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, environment())
    }

    pub(crate) fn load_from(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(DeckError::Config(format!(
                        "config file {} not found",
                        path.display()
                    )));
                }
                settings = settings.add_source(config::File::from(path));
            }
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    settings = settings.add_source(config::File::from(default));
                }
            }
        }

        let config: DeckConfig = settings.add_source(env).build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.sequencer.validate()?;

        if self.host.poll_hz == 0 || self.host.poll_hz > 1000 {
            return Err(DeckError::Config(format!(
                "poll rate {} Hz is outside 1..=1000",
                self.host.poll_hz
            )));
        }

        for name in [&self.assets.intro, &self.assets.loop_clip, &self.assets.outro] {
            if name.is_empty() {
                return Err(DeckError::Config("clip file names must not be empty".to_string()));
            }
        }

        Ok(())
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

// Default values
fn default_assets() -> AssetSettings {
    AssetSettings {
        dir: default_asset_dir(),
        intro: default_intro(),
        loop_clip: default_loop(),
        outro: default_outro(),
    }
}

fn default_asset_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_intro() -> String {
    "intro.mp3".to_string()
}

fn default_loop() -> String {
    "loop.mp3".to_string()
}

fn default_outro() -> String {
    "outro.mp3".to_string()
}

fn default_host() -> HostSettings {
    HostSettings {
        poll_hz: default_poll_hz(),
        meter: false,
        driver: Driver::Default,
    }
}

fn default_poll_hz() -> u32 {
    60
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            assets: default_assets(),
            sequencer: SequencerConfig::default(),
            host: default_host(),
        }
    }
}

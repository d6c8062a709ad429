/// Deck error types
use soon_audio_desktop::AudioError;
use soon_playback::SequencerError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeckError>;

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing clip: {}", .0.display())]
    MissingClip(PathBuf),

    #[error(transparent)]
    Sequencer(#[from] SequencerError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),
}

impl From<config::ConfigError> for DeckError {
    fn from(err: config::ConfigError) -> Self {
        DeckError::Config(err.to_string())
    }
}

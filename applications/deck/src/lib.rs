//! So-On Deck Library
//!
//! Headless sleep sound player: configuration, and the host loop that drives
//! a `PlaybackSequencer` through one session.
//!
//! This library exposes the core components for testing purposes.

pub mod config;
pub mod error;
pub mod session;

pub use config::{AssetSettings, DeckConfig, HostSettings};
pub use error::{DeckError, Result};
pub use session::{run_session, SessionReport};

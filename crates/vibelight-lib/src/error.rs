//! Crate-wide error umbrella.

use std::fmt;

use crate::artwork::ArtworkError;
use crate::config::ConfigError;
use crate::spotify::SpotifyError;
use crate::transport::TransportError;

/// Any failure a vibelight operation can surface.
///
/// Only `Config` is fatal; everything else is recoverable and handled by
/// the sync loop's backoff.
#[derive(Debug)]
pub enum VibelightError {
    Transport(TransportError),
    Spotify(SpotifyError),
    Artwork(ArtworkError),
    Config(ConfigError),
}

impl fmt::Display for VibelightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VibelightError::Transport(e) => write!(f, "{e}"),
            VibelightError::Spotify(e) => write!(f, "{e}"),
            VibelightError::Artwork(e) => write!(f, "{e}"),
            VibelightError::Config(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for VibelightError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VibelightError::Transport(e) => Some(e),
            VibelightError::Spotify(e) => Some(e),
            VibelightError::Artwork(e) => Some(e),
            VibelightError::Config(e) => Some(e),
        }
    }
}

impl From<TransportError> for VibelightError {
    fn from(e: TransportError) -> Self {
        VibelightError::Transport(e)
    }
}

impl From<SpotifyError> for VibelightError {
    fn from(e: SpotifyError) -> Self {
        VibelightError::Spotify(e)
    }
}

impl From<ArtworkError> for VibelightError {
    fn from(e: ArtworkError) -> Self {
        VibelightError::Artwork(e)
    }
}

impl From<ConfigError> for VibelightError {
    fn from(e: ConfigError) -> Self {
        VibelightError::Config(e)
    }
}

pub type Result<T> = std::result::Result<T, VibelightError>;

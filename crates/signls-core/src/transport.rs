//! Transport state

use serde::{Deserialize, Serialize};

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Stopped => "■",
            Self::Playing => "▶",
        }
    }
}

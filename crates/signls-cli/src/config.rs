//! Config file and command-line options

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use signls_core::timing::DEFAULT_TEMPO;
use signls_core::{DEFAULT_DEVICE, DEFAULT_SIZE};

// ── Config file ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tempo: f64,
    pub width: usize,
    pub height: usize,
    pub device: String,
    pub send_clock: bool,
    pub send_transport: bool,
    pub wraparound: bool,
    /// How long to play before exiting.
    pub seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            width: DEFAULT_SIZE,
            height: DEFAULT_SIZE / 2,
            device: DEFAULT_DEVICE.to_string(),
            send_clock: false,
            send_transport: false,
            wraparound: false,
            seconds: 8,
        }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("signls")
        .join("config.toml")
}

/// Reads the config file. A missing or unreadable file gives the defaults.
pub fn load_config(path: &Path) -> Config {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| toml::from_str(&s).ok())
        .unwrap_or_default()
}

// ── Command line ────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "signls")]
#[command(author, version, about = "Generative MIDI grid sequencer", long_about = None)]
pub struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Grid snapshot (JSON) to play instead of the demo patch
    #[arg(short, long)]
    pub load: Option<PathBuf>,

    /// Tempo in BPM
    #[arg(short, long)]
    pub tempo: Option<f64>,

    /// Output device name
    #[arg(short, long)]
    pub device: Option<String>,

    /// Seconds to play
    #[arg(short, long)]
    pub seconds: Option<u64>,

    /// Send MIDI clock
    #[arg(long)]
    pub send_clock: bool,

    /// Send MIDI start/stop
    #[arg(long)]
    pub send_transport: bool,

    /// Signals leaving the grid re-enter on the opposite side
    #[arg(long)]
    pub wraparound: bool,

    /// Seed for note randomization
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the grid snapshot as JSON and exit
    #[arg(long)]
    pub dump: bool,

    /// Print the grid before and after playing
    #[arg(long)]
    pub show: bool,
}

impl Cli {
    /// Applies command-line overrides on top of `config`.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(tempo) = self.tempo {
            config.tempo = tempo;
        }
        if let Some(device) = &self.device {
            config.device = device.clone();
        }
        if let Some(seconds) = self.seconds {
            config.seconds = seconds;
        }
        config.send_clock |= self.send_clock;
        config.send_transport |= self.send_transport;
        config.wraparound |= self.wraparound;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("tempo = 95.0\nwraparound = true\n").unwrap();
        assert_eq!(config.tempo, 95.0);
        assert!(config.wraparound);
        assert_eq!(config.width, DEFAULT_SIZE);
        assert_eq!(config.device, DEFAULT_DEVICE);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load_config(Path::new("/nonexistent/signls/config.toml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_flags_override_file() {
        let cli = Cli::parse_from(["signls", "--tempo", "140", "--device", "synth", "--send-clock"]);
        let config = cli.apply(Config {
            tempo: 90.0,
            seconds: 3,
            ..Config::default()
        });
        assert_eq!(config.tempo, 140.0);
        assert_eq!(config.device, "synth");
        assert_eq!(config.seconds, 3);
        assert!(config.send_clock);
        assert!(!config.send_transport);
    }
}

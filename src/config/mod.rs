//! Engine limits and configuration-directory helpers.

pub mod providers;

pub use providers::{load_providers, Provider};

use std::path::PathBuf;

/// Tunable limits for the conversation engine. Zero values are normalized
/// to the defaults, so a partially-filled config behaves sensibly.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Retries per model turn beyond the first attempt.
    pub max_retries: u32,
    /// Iteration cap for autonomous mode.
    pub max_autonomous_iterations: u32,
    /// Character count above which compression is attempted.
    pub compress_threshold: usize,
    /// Hard context cap; compression targets half of this.
    pub max_context_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_autonomous_iterations: 20,
            compress_threshold: 80_000,
            max_context_chars: 100_000,
        }
    }
}

impl EngineConfig {
    /// Replace zero fields with their defaults.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            max_retries: if self.max_retries == 0 {
                defaults.max_retries
            } else {
                self.max_retries
            },
            max_autonomous_iterations: if self.max_autonomous_iterations == 0 {
                defaults.max_autonomous_iterations
            } else {
                self.max_autonomous_iterations
            },
            compress_threshold: if self.compress_threshold == 0 {
                defaults.compress_threshold
            } else {
                self.compress_threshold
            },
            max_context_chars: if self.max_context_chars == 0 {
                defaults.max_context_chars
            } else {
                self.max_context_chars
            },
        }
    }
}

/// Resolve the per-user configuration directory (e.g. `~/.config/tern`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tern").map(|dirs| dirs.config_dir().to_path_buf())
}

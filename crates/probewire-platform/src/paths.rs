use std::path::PathBuf;

use crate::error::PlatformError;

/// Standard directories used by probewire.
pub trait PlatformPaths: Send + Sync {
    /// Configuration directory (`~/.config/probewire`).
    fn config_dir(&self) -> PathBuf;
    /// Data directory (`~/.local/share/probewire`).
    fn data_dir(&self) -> PathBuf;
    /// Log directory (`<data_dir>/logs`).
    fn log_dir(&self) -> PathBuf;
}

/// Paths rooted at the user's home directory.
#[derive(Debug, Clone)]
pub struct DefaultPaths {
    home: PathBuf,
}

impl DefaultPaths {
    /// Resolve the home directory.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Path` if no home directory can be found.
    pub fn new() -> Result<Self, PlatformError> {
        let home = dirs::home_dir()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .ok_or_else(|| PlatformError::Path("could not determine home directory".into()))?;
        tracing::debug!(home = %home.display(), "resolved home directory");
        Ok(Self { home })
    }

    /// Paths rooted at an explicit directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl PlatformPaths for DefaultPaths {
    fn config_dir(&self) -> PathBuf {
        self.home.join(".config").join("probewire")
    }

    fn data_dir(&self) -> PathBuf {
        self.home.join(".local").join("share").join("probewire")
    }

    fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}

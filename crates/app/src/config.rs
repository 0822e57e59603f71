//! Configuration files and RAM images.

use std::path::Path;

use easyerr::{Error, ResultExt};
use serde::Deserialize;

use crate::cli;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Io { source: std::io::Error },
    #[error(transparent)]
    Config { source: ron::error::SpannedError },
}

/// Contents of a configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub system: pica64::Config,
    pub renderer: renderer::Config,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self, LoadError> {
        ron::from_str(text).context(LoadCtx::Config)
    }

    pub fn open(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).context(LoadCtx::Io)?;
        Self::parse(&text)
    }

    /// Applies the command line flags on top of the file.
    pub fn merge(&mut self, cfg: &cli::Config) {
        self.system.strict |= cfg.strict;
        if let Some(eviction) = cfg.eviction {
            self.renderer.eviction = eviction.into();
        }
    }
}

pub fn load_ram(path: &Path) -> Result<Vec<u8>, LoadError> {
    std::fs::read(path).context(LoadCtx::Io)
}

#[cfg(test)]
mod test {
    use renderer::EvictionKind;

    use super::*;

    #[test]
    fn partial_files() {
        let cfg = FileConfig::parse(
            "(system: (strict: true), renderer: (texture_pool: 64, eviction: lru))",
        )
        .unwrap();

        assert!(cfg.system.strict);
        assert!(cfg.system.aspect_fix);
        assert_eq!(cfg.renderer.texture_pool, 64);
        assert_eq!(cfg.renderer.eviction, EvictionKind::Lru);
        assert_eq!(cfg.renderer.combiner_pool, 64);

        let cfg = FileConfig::parse("()").unwrap();
        assert!(!cfg.system.strict);
        assert_eq!(cfg.renderer.eviction, EvictionKind::RoundRobin);
    }

    #[test]
    fn malformed_files() {
        assert!(matches!(
            FileConfig::parse("(renderer: (texture_pool: -1))"),
            Err(LoadError::Config { .. })
        ));
    }
}

//! # Configuration
//!
//! TOML configuration for the region server. Every field has a default, so
//! an empty file (or no file) is a valid configuration.
//!
//! ```toml
//! [world]
//! width = 400
//! depth = 400
//! block_size = 10
//! max_height = 16
//! seed = 7
//!
//! [interest]
//! recompute_threshold = 2.0
//!
//! [server]
//! bind = "0.0.0.0:7878"
//! idle_timeout_secs = 30
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use strata_world::{
    LevelStructure, SimplexHeightField, TerrainSeed, WorldResult, DEFAULT_BLOCK_SIZE,
    DEFAULT_MAX_HEIGHT,
};

use crate::error::ConfigError;
use crate::interest::InterestConfig;
use crate::{DEFAULT_MAX_SESSIONS, DEFAULT_PORT};

/// World generation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Plan extent along x.
    pub width: u32,
    /// Plan extent along y.
    pub depth: u32,
    /// Region side length.
    pub block_size: u32,
    /// Vertical extent of every region.
    pub max_height: u32,
    /// Terrain seed.
    pub seed: u64,
    /// Noise octaves.
    pub octaves: u32,
    /// Base noise frequency.
    pub frequency: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 400,
            depth: 400,
            block_size: DEFAULT_BLOCK_SIZE,
            max_height: DEFAULT_MAX_HEIGHT,
            seed: 0,
            octaves: 4,
            frequency: 0.01,
        }
    }
}

impl WorldConfig {
    /// Terrain source for this configuration.
    #[must_use]
    pub fn height_field(&self) -> SimplexHeightField {
        SimplexHeightField::new(TerrainSeed::new(self.seed), self.octaves, self.frequency)
    }

    /// Generates the world.
    ///
    /// # Errors
    ///
    /// Fails if any dimension is zero.
    pub fn generate(&self) -> WorldResult<LevelStructure> {
        LevelStructure::generate(
            self.width,
            self.depth,
            self.block_size,
            self.max_height,
            &self.height_field(),
        )
    }
}

/// Network settings for the server binary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// UDP listen address.
    pub bind: SocketAddr,
    /// Seconds of silence before a session is dropped.
    pub idle_timeout_secs: u64,
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            idle_timeout_secs: 30,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl ServerConfig {
    /// Idle timeout as a duration.
    #[inline]
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Complete configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// `[world]`
    pub world: WorldConfig,
    /// `[interest]`
    pub interest: InterestConfig,
    /// `[server]`
    pub server: ServerConfig,
}

impl SyncConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML or out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, or as [`Self::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Names the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_owned(),
            })
        };

        if self.world.width == 0 || self.world.depth == 0 {
            return invalid("world.width", "world extent must be positive");
        }
        if self.world.block_size == 0 {
            return invalid("world.block_size", "must be positive");
        }
        if self.world.max_height == 0 {
            return invalid("world.max_height", "must be positive");
        }
        if !(self.world.frequency.is_finite() && self.world.frequency > 0.0) {
            return invalid("world.frequency", "must be a positive number");
        }
        if !(self.interest.recompute_threshold.is_finite()
            && self.interest.recompute_threshold >= 0.0)
        {
            return invalid("interest.recompute_threshold", "must be a non-negative number");
        }
        if !(self.interest.max_radius.is_finite() && self.interest.max_radius >= 0.0) {
            return invalid("interest.max_radius", "must be a non-negative number");
        }
        if self.server.max_sessions == 0 {
            return invalid("server.max_sessions", "must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = SyncConfig::from_toml_str("").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let config = SyncConfig::from_toml_str(
            r#"
            [world]
            width = 40
            depth = 40

            [interest]
            recompute_threshold = 0.5

            [server]
            bind = "127.0.0.1:9000"
            idle_timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.world.width, 40);
        assert_eq!(config.world.block_size, DEFAULT_BLOCK_SIZE);
        assert!((config.interest.recompute_threshold - 0.5).abs() < f32::EPSILON);
        assert!((config.interest.max_radius - 256.0).abs() < f32::EPSILON);
        assert_eq!(config.server.bind, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.server.idle_timeout(), Duration::from_secs(5));
        assert_eq!(config.server.max_sessions, DEFAULT_MAX_SESSIONS);
    }

    #[test]
    fn test_rejects_zero_dimensions() {
        for (text, field) in [
            ("[world]\nblock_size = 0", "world.block_size"),
            ("[world]\nmax_height = 0", "world.max_height"),
            ("[world]\nwidth = 0", "world.width"),
            ("[server]\nmax_sessions = 0", "server.max_sessions"),
        ] {
            match SyncConfig::from_toml_str(text) {
                Err(ConfigError::Invalid { field: f, .. }) => assert_eq!(f, field),
                other => panic!("{text:?}: expected Invalid, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_rejects_bad_toml() {
        assert!(matches!(
            SyncConfig::from_toml_str("[world]\nwidth = \"wide\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            SyncConfig::from_toml_str("[server]\nbind = \"nowhere\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SyncConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("strata-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[world]\nwidth = 20\ndepth = 30\nseed = 9\n").unwrap();
        let config = SyncConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.world.seed, 9);
        let level = config.world.generate().unwrap();
        assert_eq!((level.blocks_x(), level.blocks_y()), (2, 3));
    }
}

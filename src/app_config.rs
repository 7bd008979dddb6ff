use crate::error::{Result, SncError};
use crate::snc::{ChunkConfig, ChunkDriver, DecoderOptions, EncoderOptions, SessionTemplate};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration structure parsed from a TOML file.
///
/// Every section and key is optional:
///
/// ```toml
/// [session]
/// code = "band"          # rand | band | windwrap
/// field = "gf256"        # binary | gf256
/// generation_size = 48
///
/// [decoder]
/// kind = "cbd"           # gg | oa | bd | cbd
///
/// [chunk]
/// segment_size = 5120000
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionTemplate,
    pub encoder: EncoderOptions,
    pub decoder: DecoderOptions,
    pub chunk: ChunkConfig,
}

impl AppConfig {
    /// Load configuration from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load configuration from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SncError::Config(e.to_string()))
    }

    /// Validate all sub-configurations.
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.encoder.validate().map_err(SncError::Config)?;
        self.chunk.validate().map_err(SncError::Config)?;
        Ok(())
    }

    pub fn driver(&self) -> ChunkDriver {
        ChunkDriver::new(
            self.session.clone(),
            self.encoder,
            self.decoder,
            self.chunk.clone(),
        )
    }
}

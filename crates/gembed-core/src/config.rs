//! Bridge configuration: output bounds and decoder sizing.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Hard ceiling on the textual batch encoding (1 MiB).
pub const DEFAULT_BATCH_OUTPUT_CEILING: usize = 1024 * 1024;
/// Advertised maximum length of a single binary vector result.
pub const DEFAULT_SINGLE_MAX_LENGTH: usize = 65_535;
/// Initial element capacity of the string-array decoder.
pub const DEFAULT_DECODER_CAPACITY: usize = 10;

/// Tunables for the SQL embedding functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum size in bytes of the `embed_texts` result.
    pub batch_output_ceiling: usize,
    /// Maximum result length advertised for `embed_text`.
    pub single_max_length: usize,
    /// Number of element slots the decoder allocates before its first doubling.
    pub decoder_initial_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            batch_output_ceiling: DEFAULT_BATCH_OUTPUT_CEILING,
            single_max_length: DEFAULT_SINGLE_MAX_LENGTH,
            decoder_initial_capacity: DEFAULT_DECODER_CAPACITY,
        }
    }
}

impl BridgeConfig {
    /// Create configuration from environment overrides and defaults.
    ///
    /// Recognised variables: `GEMBED_BATCH_OUTPUT_CEILING`,
    /// `GEMBED_SINGLE_MAX_LENGTH`, `GEMBED_DECODER_CAPACITY`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse a JSON object; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let read = |key: &str, default: usize| -> Result<usize> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| Error::Config(format!("{key} must be an integer, got '{raw}'"))),
                None => Ok(default),
            }
        };

        let config = Self {
            batch_output_ceiling: read(
                "GEMBED_BATCH_OUTPUT_CEILING",
                defaults.batch_output_ceiling,
            )?,
            single_max_length: read("GEMBED_SINGLE_MAX_LENGTH", defaults.single_max_length)?,
            decoder_initial_capacity: read(
                "GEMBED_DECODER_CAPACITY",
                defaults.decoder_initial_capacity,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every call fail.
    pub fn validate(&self) -> Result<()> {
        // "[]" is the smallest well-formed batch encoding
        if self.batch_output_ceiling < 2 {
            return Err(Error::Config(format!(
                "batch_output_ceiling must be at least 2, got {}",
                self.batch_output_ceiling
            )));
        }
        if self.single_max_length < 4 {
            return Err(Error::Config(format!(
                "single_max_length must be at least 4, got {}",
                self.single_max_length
            )));
        }
        if self.decoder_initial_capacity == 0 {
            return Err(Error::Config(
                "decoder_initial_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

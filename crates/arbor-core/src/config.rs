use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArborConfig {
    #[serde(default)]
    pub ordering: OrderingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Spacing rules for `display_order` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingConfig {
    /// Distance between neighbours after a renumber, and the increment used
    /// when appending to a sibling group.
    #[serde(default = "default_step")]
    pub step: i64,
    /// Order assigned to the first member of an empty sibling group.
    #[serde(default)]
    pub baseline: i64,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            step: default_step(),
            baseline: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Buffer size of the change-notification channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
        }
    }
}

const fn default_step() -> i64 {
    1000
}

const fn default_event_capacity() -> usize {
    256
}

impl ArborConfig {
    /// Parse a TOML document, filling absent fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails [`Self::validate`].
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("parse arbor config")?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if the step leaves no room for a midpoint or the
    /// event channel has no capacity.
    pub fn validate(&self) -> Result<()> {
        if self.ordering.step < 2 {
            bail!(
                "ordering.step must be >= 2 (got {}): a smaller step leaves no gap to insert into",
                self.ordering.step
            );
        }
        if self.store.event_capacity == 0 {
            bail!("store.event_capacity must be > 0");
        }
        Ok(())
    }
}

/// Load `<root>/.arbor/config.toml`, or defaults when the file is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(root: &Path) -> Result<ArborConfig> {
    let path = root.join(".arbor/config.toml");
    if !path.exists() {
        return Ok(ArborConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    ArborConfig::from_toml(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

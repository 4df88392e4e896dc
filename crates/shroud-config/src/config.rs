//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Disclosure and deferral parameters.
    pub protection: ProtectionConfig,
    /// Player-facing messages.
    pub messages: MessagesConfig,
    /// Logging settings.
    pub debug: DebugConfig,
}

/// Disclosure and deferral parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Master switch. Players joining while off are never filtered.
    pub enable_protection: bool,
    /// Disclosure radius in blocks.
    pub visibility_radius: f64,
    /// Blocks hidden or revealed per block task run.
    pub blocks_per_tick: usize,
    /// Interval between block task runs.
    pub block_tick_interval_ms: u64,
    /// Slot updates per item task run.
    pub items_per_tick: usize,
    /// Interval between item task runs.
    pub item_tick_interval_ms: u64,
    /// Defer filled shulker boxes in the player's own inventory.
    pub deferred_inventory_loading: bool,
    /// Defer filled shulker boxes in opened containers.
    pub deferred_container_loading: bool,
    /// Conceal protected blocks beyond the radius.
    pub deferred_block_loading: bool,
    /// Ticks to wait after a teleport or world change before revealing.
    pub settle_delay_ticks: u64,
    /// Ticks to wait after a region packet before revealing.
    pub region_settle_ticks: u64,
    /// Region scan threads (0 = pick from the CPU count).
    pub scan_workers: usize,
}

/// Player-facing message texts. `&` colour codes are accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MessagesConfig {
    /// Send messages at all.
    pub enable_messages: bool,
    /// Shown when an inventory action is refused while it loads.
    pub inventory_loading: String,
    /// Shown when a click into a loading container is refused.
    pub container_loading: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level filter (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Log every hide, reveal, and deferral.
    pub log_load_events: bool,
}

// --- Default implementations ---

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            enable_protection: true,
            visibility_radius: 16.0,
            blocks_per_tick: 50,
            block_tick_interval_ms: 50,
            items_per_tick: 3,
            item_tick_interval_ms: 150,
            deferred_inventory_loading: true,
            deferred_container_loading: true,
            deferred_block_loading: true,
            settle_delay_ticks: 1,
            region_settle_ticks: 2,
            scan_workers: 0,
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            enable_messages: true,
            inventory_loading: "&cInventory still loading, please wait...".to_string(),
            container_loading: "&cContainer still loading, please wait...".to_string(),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_load_events: false,
        }
    }
}

/// Replaces `&` colour and format codes with the `§` form clients render.
/// An `&` not followed by a code character is kept.
pub fn translate_color_codes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '&'
            && let Some(&next) = chars.peek()
            && "0123456789abcdefklmnorABCDEFKLMNOR".contains(next)
        {
            out.push('§');
            out.push(next.to_ascii_lowercase());
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

// --- Persistence ---

const FILE_NAME: &str = "config.ron";

impl Config {
    /// Checks ranges serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.protection;
        if !p.visibility_radius.is_finite() || p.visibility_radius < 0.0 {
            return Err(ConfigError::Invalid {
                field: "protection.visibility_radius",
                reason: "must be a finite, non-negative number of blocks",
            });
        }
        if p.block_tick_interval_ms == 0 || p.item_tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "protection.*_tick_interval_ms",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Reads and validates `config.ron` in `config_dir`.
    fn read(config_dir: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(config_dir.join(FILE_NAME))
            .map_err(ConfigError::ReadError)?;
        let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `config.ron`, writing the defaults first if it does not exist.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(FILE_NAME);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }
        let config = Self::read(config_dir)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Writes `config.ron`, creating `config_dir` if needed.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .enumerate_arrays(false);
        let text = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;
        let path = config_dir.join(FILE_NAME);
        std::fs::write(&path, text).map_err(ConfigError::WriteError)?;
        log::debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Re-reads `config.ron`. `Some` only when it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read(config_dir)?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("Config changed on disk");
        Ok(Some(fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(2))
                .unwrap();
        assert!(ron_str.contains("visibility_radius: 16.0"));
        assert!(ron_str.contains("items_per_tick: 3"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(protection: (visibility_radius: 24.0))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.protection.visibility_radius, 24.0);
        assert_eq!(config.protection.blocks_per_tick, 50);
        assert_eq!(config.messages, MessagesConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.protection.visibility_radius = 32.0;
        config.debug.log_load_events = true;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.protection.items_per_tick = 9;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().protection.items_per_tick, 9);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "{{not valid}}").unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_negative_radius_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.ron"),
            "(protection: (visibility_radius: -4.0))",
        )
        .unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::Invalid {
                field: "protection.visibility_radius",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.protection.item_tick_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_translate_color_codes() {
        assert_eq!(translate_color_codes("&cHello &lWorld"), "§cHello §lWorld");
        assert_eq!(translate_color_codes("&AUpper"), "§aUpper");
        assert_eq!(translate_color_codes("fish & chips"), "fish & chips");
        assert_eq!(translate_color_codes("trailing &"), "trailing &");
    }
}

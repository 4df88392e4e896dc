//! Translation of configuration into engine parameters.

use std::path::Path;

use shroud_config::{Config, ConfigError, translate_color_codes};
use shroud_disclosure::{DisclosureEngine, EngineSettings, MessageSettings, millis_to_ticks};

/// Engine parameters for `config`. Millisecond intervals become ticks and
/// message colour codes are translated.
pub fn engine_settings(config: &Config) -> EngineSettings {
    let protection = &config.protection;
    EngineSettings {
        enable_protection: protection.enable_protection,
        visibility_radius: protection.visibility_radius.max(0.0),
        blocks_per_tick: protection.blocks_per_tick.max(1),
        block_interval_ticks: millis_to_ticks(protection.block_tick_interval_ms),
        items_per_tick: protection.items_per_tick.max(1),
        item_interval_ticks: millis_to_ticks(protection.item_tick_interval_ms),
        deferred_inventory_loading: protection.deferred_inventory_loading,
        deferred_container_loading: protection.deferred_container_loading,
        deferred_block_loading: protection.deferred_block_loading,
        settle_delay_ticks: protection.settle_delay_ticks,
        region_settle_ticks: protection.region_settle_ticks,
        scan_workers: protection.scan_workers,
        messages: MessageSettings {
            enabled: config.messages.enable_messages,
            inventory_loading: translate_color_codes(&config.messages.inventory_loading),
            container_loading: translate_color_codes(&config.messages.container_loading),
        },
    }
}

/// Re-reads `config.ron` and, if it changed, swaps the engine's settings.
/// Returns the new config when something changed.
pub fn reload_engine(
    engine: &DisclosureEngine,
    current: &Config,
    config_dir: &Path,
) -> Result<Option<Config>, ConfigError> {
    let Some(new_config) = current.reload(config_dir)? else {
        return Ok(None);
    };
    engine.update_settings(engine_settings(&new_config));
    Ok(Some(new_config))
}

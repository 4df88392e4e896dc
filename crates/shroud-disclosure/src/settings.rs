//! Runtime parameters of the engine.

/// Length of one scheduler tick in milliseconds.
pub const TICK_MILLIS: u64 = 50;

/// Squared displacement a move must exceed before it triggers an immediate check.
pub const MOVE_THRESHOLD_SQ: f64 = 2.0;

/// Converts a millisecond interval to scheduler ticks, never less than one.
pub fn millis_to_ticks(millis: u64) -> u64 {
    (millis / TICK_MILLIS).max(1)
}

/// Player-facing message texts.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSettings {
    /// Whether messages are sent at all.
    pub enabled: bool,
    /// Sent when an inventory action is refused while the inventory loads.
    pub inventory_loading: String,
    /// Sent when a click into a still-loading container is refused.
    pub container_loading: String,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            inventory_loading: "§cInventory still loading, please wait...".to_string(),
            container_loading: "§cContainer still loading, please wait...".to_string(),
        }
    }
}

/// Numeric and boolean parameters. Swappable at runtime without touching
/// session state.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Master switch. Sessions opened while off are bypass sessions.
    pub enable_protection: bool,
    /// Disclosure radius in blocks.
    pub visibility_radius: f64,
    /// Hides plus reveals per block task run.
    pub blocks_per_tick: usize,
    /// Ticks between block task runs.
    pub block_interval_ticks: u64,
    /// Slot updates per item task run.
    pub items_per_tick: usize,
    /// Ticks between item task runs.
    pub item_interval_ticks: u64,
    /// Defer risky items in the player's own inventory.
    pub deferred_inventory_loading: bool,
    /// Defer risky items in opened containers.
    pub deferred_container_loading: bool,
    /// Conceal protected blocks beyond the radius.
    pub deferred_block_loading: bool,
    /// Ticks after a teleport or world change before the immediate check.
    pub settle_delay_ticks: u64,
    /// Ticks after a region packet before the immediate check.
    pub region_settle_ticks: u64,
    /// Region scan worker threads; 0 picks a count from the CPU.
    pub scan_workers: usize,
    /// Player-facing messages.
    pub messages: MessageSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enable_protection: true,
            visibility_radius: 16.0,
            blocks_per_tick: 50,
            block_interval_ticks: 1,
            items_per_tick: 3,
            item_interval_ticks: 3,
            deferred_inventory_loading: true,
            deferred_container_loading: true,
            deferred_block_loading: true,
            settle_delay_ticks: 1,
            region_settle_ticks: 2,
            scan_workers: 0,
            messages: MessageSettings::default(),
        }
    }
}

impl EngineSettings {
    /// Squared disclosure radius.
    pub fn radius_sq(&self) -> f64 {
        self.visibility_radius * self.visibility_radius
    }

    /// Squared immediate sub-radius (half the disclosure radius).
    pub fn immediate_radius_sq(&self) -> f64 {
        let half = self.visibility_radius / 2.0;
        half * half
    }

    /// Worker count with 0 resolved against the CPU count.
    pub fn resolved_scan_workers(&self) -> usize {
        if self.scan_workers > 0 {
            return self.scan_workers;
        }
        let cpus = num_cpus::get().max(2);
        (cpus - 2).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_to_ticks_rounds_down_with_floor_of_one() {
        assert_eq!(millis_to_ticks(0), 1);
        assert_eq!(millis_to_ticks(49), 1);
        assert_eq!(millis_to_ticks(50), 1);
        assert_eq!(millis_to_ticks(150), 3);
        assert_eq!(millis_to_ticks(175), 3);
    }

    #[test]
    fn test_radius_bands() {
        let settings = EngineSettings::default();
        assert_eq!(settings.radius_sq(), 256.0);
        assert_eq!(settings.immediate_radius_sq(), 64.0);
    }

    #[test]
    fn test_explicit_worker_count_wins() {
        let settings = EngineSettings {
            scan_workers: 3,
            ..Default::default()
        };
        assert_eq!(settings.resolved_scan_workers(), 3);
        assert!(EngineSettings::default().resolved_scan_workers() >= 1);
    }
}

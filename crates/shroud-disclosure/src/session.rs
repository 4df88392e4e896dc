//! Per-connection disclosure state.
//!
//! The [`SessionStore`] is the single owner of every per-connection structure:
//! hidden-object records and processed regions (per world), the window
//! binding, deferred item queues, and pending background hides. Other
//! components reach a session only through [`SessionStore::with_session`]
//! and the store-wide purge operations, and closing a session releases all of
//! it in one call.

use std::collections::VecDeque;

use dashmap::DashMap;
use glam::DVec3;
use rustc_hash::{FxHashMap, FxHashSet};
use shroud_protocol::{ConnectionId, WindowId};
use shroud_world::{BlockPos, ItemStack, Material, RegionPos, WorldId};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// The connection's open container window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBinding {
    /// Server-assigned window id.
    pub window: WindowId,
    /// `true` while deferred items for this window remain undelivered.
    pub loading: bool,
}

/// A real slot payload withheld behind a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredItem {
    /// Window the slot belongs to.
    pub window: WindowId,
    /// Slot index.
    pub slot: u16,
    /// The real item.
    pub item: ItemStack,
    /// Whether the item carries nested contents.
    pub risky: bool,
}

/// Result of recording a hide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideOutcome {
    /// A new record was created; the client must be sent the neutral form.
    Recorded,
    /// The position was already hidden; nothing to send.
    AlreadyHidden,
}

/// Hidden and processed state of one connection in one world.
#[derive(Debug, Default)]
struct WorldRecords {
    /// Position → material the client was not shown.
    hidden: FxHashMap<BlockPos, Material>,
    /// Regions already scanned.
    processed: FxHashSet<RegionPos>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Everything the engine knows about one connection.
#[derive(Debug)]
pub struct Session {
    connection: ConnectionId,
    world: WorldId,
    position: DVec3,
    /// Position at which the last immediate check ran.
    check_anchor: DVec3,
    bypass: bool,
    records: FxHashMap<WorldId, WorldRecords>,
    window: Option<WindowBinding>,
    deferred: FxHashMap<WindowId, VecDeque<DeferredItem>>,
    /// Protected objects found by background scans, waiting to be hidden.
    pending_hides: VecDeque<(WorldId, BlockPos, Material)>,
}

impl Session {
    fn new(connection: ConnectionId, world: WorldId, position: DVec3, bypass: bool) -> Self {
        Self {
            connection,
            world,
            position,
            check_anchor: position,
            bypass,
            records: FxHashMap::default(),
            window: None,
            deferred: FxHashMap::default(),
            pending_hides: VecDeque::new(),
        }
    }

    /// Connection this session belongs to.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Current world.
    pub fn world(&self) -> WorldId {
        self.world
    }

    /// Current position.
    pub fn position(&self) -> DVec3 {
        self.position
    }

    /// Whether every filter passes this connection's packets untouched.
    pub fn is_bypass(&self) -> bool {
        self.bypass
    }

    /// Squared distance from the connection to `pos` in `world`. Objects in
    /// another world are infinitely far away.
    pub fn distance_sq(&self, world: WorldId, pos: BlockPos) -> f64 {
        if world == self.world {
            pos.distance_sq(self.position)
        } else {
            f64::INFINITY
        }
    }

    /// Updates the position without touching the check anchor.
    pub fn set_position(&mut self, position: DVec3) {
        self.position = position;
    }

    /// Squared displacement since the last immediate check.
    pub fn displacement_since_check(&self) -> f64 {
        self.position.distance_squared(self.check_anchor)
    }

    /// Records that an immediate check ran at the current position.
    pub fn anchor_check(&mut self) {
        self.check_anchor = self.position;
    }

    // -- hidden records ----------------------------------------------------

    /// Records that the client was shown the neutral form at `pos`.
    pub fn hide(&mut self, world: WorldId, pos: BlockPos, material: Material) -> HideOutcome {
        let records = self.records.entry(world).or_default();
        if records.hidden.contains_key(&pos) {
            return HideOutcome::AlreadyHidden;
        }
        records.hidden.insert(pos, material);
        HideOutcome::Recorded
    }

    /// Returns `true` if `pos` is hidden from this client.
    pub fn is_hidden(&self, world: WorldId, pos: BlockPos) -> bool {
        self.records
            .get(&world)
            .is_some_and(|r| r.hidden.contains_key(&pos))
    }

    /// Removes and returns the record at `pos`.
    pub fn take_hidden(&mut self, world: WorldId, pos: BlockPos) -> Option<Material> {
        self.records.get_mut(&world)?.hidden.remove(&pos)
    }

    /// Hidden records in `world` as `(position, recorded material)`.
    pub fn hidden_in(&self, world: WorldId) -> Vec<(BlockPos, Material)> {
        self.records
            .get(&world)
            .map(|r| r.hidden.iter().map(|(p, m)| (*p, *m)).collect())
            .unwrap_or_default()
    }

    /// Total hidden records across worlds.
    pub fn hidden_count(&self) -> usize {
        self.records.values().map(|r| r.hidden.len()).sum()
    }

    /// Marks a region scanned. Returns `true` the first time.
    pub fn mark_processed(&mut self, world: WorldId, region: RegionPos) -> bool {
        self.records
            .entry(world)
            .or_default()
            .processed
            .insert(region)
    }

    /// Returns `true` if the region was already scanned.
    pub fn is_processed(&self, world: WorldId, region: RegionPos) -> bool {
        self.records
            .get(&world)
            .is_some_and(|r| r.processed.contains(&region))
    }

    /// Drops the record at `pos` and any pending hide for it.
    pub fn purge_position(&mut self, world: WorldId, pos: BlockPos) -> bool {
        self.pending_hides.retain(|(w, p, _)| !(*w == world && *p == pos));
        self.take_hidden(world, pos).is_some()
    }

    /// Drops every record, processed mark, and pending hide inside `region`.
    /// Returns the number of hidden records removed.
    pub fn purge_region(&mut self, world: WorldId, region: RegionPos) -> usize {
        self.pending_hides
            .retain(|(w, p, _)| !(*w == world && region.contains(*p)));
        let Some(records) = self.records.get_mut(&world) else {
            return 0;
        };
        records.processed.remove(&region);
        let before = records.hidden.len();
        records.hidden.retain(|pos, _| !region.contains(*pos));
        before - records.hidden.len()
    }

    /// Forgets every hidden record, processed region, and pending hide.
    pub fn clear_world_records(&mut self) {
        self.records.clear();
        self.pending_hides.clear();
    }

    /// Moves the session to another world. Hidden state and all deferred
    /// queues are discarded along with the window binding.
    pub fn change_world(&mut self, world: WorldId, position: DVec3) {
        self.clear_world_records();
        self.discard_all_deferred();
        self.window = None;
        self.world = world;
        self.position = position;
        self.check_anchor = position;
    }

    // -- pending hides -----------------------------------------------------

    /// Queues background-scan findings, keeping them ordered nearest first
    /// and, at equal distance, highest first.
    pub fn queue_hides(&mut self, found: impl IntoIterator<Item = (WorldId, BlockPos, Material)>) {
        self.pending_hides.extend(found);
        let world = self.world;
        let position = self.position;
        self.pending_hides
            .make_contiguous()
            .sort_by(|(wa, a, _), (wb, b, _)| {
                let da = if *wa == world { a.distance_sq(position) } else { f64::INFINITY };
                let db = if *wb == world { b.distance_sq(position) } else { f64::INFINITY };
                da.total_cmp(&db).then(b.y.cmp(&a.y))
            });
    }

    /// Takes up to `n` pending hides.
    pub fn take_pending_hides(&mut self, n: usize) -> Vec<(WorldId, BlockPos, Material)> {
        let n = n.min(self.pending_hides.len());
        self.pending_hides.drain(..n).collect()
    }

    /// Number of pending hides.
    pub fn pending_hide_count(&self) -> usize {
        self.pending_hides.len()
    }

    // -- windows -----------------------------------------------------------

    /// Binds `window` as the open container, replacing (and discarding the
    /// queue of) any previous binding. Binding the already-bound window
    /// keeps its queue and loading state.
    pub fn bind_window(&mut self, window: WindowId) {
        if self.is_bound(window) {
            return;
        }
        if let Some(previous) = self.window.take() {
            self.deferred.remove(&previous.window);
        }
        self.window = Some(WindowBinding {
            window,
            loading: true,
        });
    }

    /// The current binding.
    pub fn binding(&self) -> Option<WindowBinding> {
        self.window
    }

    /// Returns `true` if `window` is the bound container window.
    pub fn is_bound(&self, window: WindowId) -> bool {
        self.window.is_some_and(|b| b.window == window)
    }

    /// Removes the binding for `window` and discards its queue. Returns
    /// `false` if `window` was not bound.
    pub fn unbind_window(&mut self, window: WindowId) -> bool {
        if !self.is_bound(window) {
            return false;
        }
        self.window = None;
        self.deferred.remove(&window);
        true
    }

    // -- deferred items ----------------------------------------------------

    /// Replaces the queue of `window`. Loading flags follow the queue.
    pub fn replace_deferred(&mut self, window: WindowId, items: VecDeque<DeferredItem>) {
        if items.is_empty() {
            self.deferred.remove(&window);
        } else {
            self.deferred.insert(window, items);
        }
        self.sync_loading(window);
    }

    /// Appends one deferred item.
    pub fn push_deferred(&mut self, item: DeferredItem) {
        let window = item.window;
        self.deferred.entry(window).or_default().push_back(item);
        self.sync_loading(window);
    }

    /// Removes the deferred item for `(window, slot)`, if any.
    pub fn remove_deferred_slot(&mut self, window: WindowId, slot: u16) -> Option<DeferredItem> {
        let queue = self.deferred.get_mut(&window)?;
        let index = queue.iter().position(|d| d.slot == slot)?;
        let removed = queue.remove(index);
        if queue.is_empty() {
            self.deferred.remove(&window);
        }
        self.sync_loading(window);
        removed
    }

    /// Pops the next deferred item of `window`.
    pub fn pop_deferred(&mut self, window: WindowId) -> Option<DeferredItem> {
        let queue = self.deferred.get_mut(&window)?;
        let item = queue.pop_front();
        if queue.is_empty() {
            self.deferred.remove(&window);
        }
        self.sync_loading(window);
        item
    }

    /// Windows that currently have deferred items.
    pub fn deferred_windows(&self) -> Vec<WindowId> {
        let mut windows: Vec<_> = self.deferred.keys().copied().collect();
        windows.sort();
        windows
    }

    /// Deferred items waiting for `window`.
    pub fn deferred_len(&self, window: WindowId) -> usize {
        self.deferred.get(&window).map_or(0, VecDeque::len)
    }

    /// Total deferred items across windows.
    pub fn deferred_count(&self) -> usize {
        self.deferred.values().map(VecDeque::len).sum()
    }

    /// Drops every deferred queue.
    pub fn discard_all_deferred(&mut self) {
        self.deferred.clear();
        if let Some(binding) = self.window.as_mut() {
            binding.loading = false;
        }
    }

    /// Whether the player's own inventory is still loading.
    pub fn inventory_loading(&self) -> bool {
        self.deferred.contains_key(&WindowId::PLAYER_INVENTORY)
    }

    /// Whether `window` is the bound container and still loading.
    pub fn container_loading(&self, window: WindowId) -> bool {
        self.window
            .is_some_and(|b| b.window == window && b.loading)
    }

    /// Sets the bound window's loading flag from its queue.
    fn sync_loading(&mut self, window: WindowId) {
        let pending = self.deferred.contains_key(&window);
        if let Some(binding) = self.window.as_mut()
            && binding.window == window
        {
            binding.loading = pending;
        }
    }

    /// Returns `true` if the session holds no derived state.
    pub fn is_clean(&self) -> bool {
        self.hidden_count() == 0
            && self.deferred.is_empty()
            && self.window.is_none()
            && self.pending_hides.is_empty()
            && self.records.values().all(|r| r.processed.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Owns all sessions, keyed by connection.
pub struct SessionStore {
    sessions: DashMap<ConnectionId, Session>,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Allocates a session. Returns `false` if one already exists.
    pub fn open(
        &self,
        connection: ConnectionId,
        world: WorldId,
        position: DVec3,
        bypass: bool,
    ) -> bool {
        if self.sessions.contains_key(&connection) {
            return false;
        }
        self.sessions
            .insert(connection, Session::new(connection, world, position, bypass));
        true
    }

    /// Destroys a session and everything derived from it.
    pub fn close(&self, connection: ConnectionId) -> Option<Session> {
        self.sessions.remove(&connection).map(|(_, session)| session)
    }

    /// Returns `true` if the connection has a session.
    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.sessions.contains_key(&connection)
    }

    /// Runs `f` on the session, or returns `None` if it is gone.
    ///
    /// The session is locked for the duration of `f`; do not send packets or
    /// call back into the store from inside it.
    pub fn with_session<R>(
        &self,
        connection: ConnectionId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        self.sessions
            .get_mut(&connection)
            .map(|mut session| f(&mut session))
    }

    /// Drops the record at `pos` in every session. Returns how many were dropped.
    pub fn purge_position(&self, world: WorldId, pos: BlockPos) -> usize {
        self.sessions
            .iter_mut()
            .filter_map(|mut s| s.purge_position(world, pos).then_some(()))
            .count()
    }

    /// Drops records and processed marks inside `region` in every session.
    pub fn purge_region(&self, world: WorldId, region: RegionPos) -> usize {
        self.sessions
            .iter_mut()
            .map(|mut s| s.purge_region(world, region))
            .sum()
    }

    /// Connections with a session.
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.sessions.iter().map(|s| *s.key()).collect()
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Hidden records across all sessions.
    pub fn hidden_total(&self) -> usize {
        self.sessions.iter().map(|s| s.hidden_count()).sum()
    }

    /// Deferred items across all sessions.
    pub fn deferred_total(&self) -> usize {
        self.sessions.iter().map(|s| s.deferred_count()).sum()
    }

    /// Drops every session.
    pub fn clear(&self) {
        self.sessions.clear();
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const CONN: ConnectionId = ConnectionId(1);
    const W: WorldId = WorldId(0);
    const CHEST: Material = Material(5);

    fn store_with_session() -> SessionStore {
        let store = SessionStore::new();
        assert!(store.open(CONN, W, DVec3::ZERO, false));
        store
    }

    fn deferred(window: u8, slot: u16) -> DeferredItem {
        DeferredItem {
            window: WindowId(window),
            slot,
            item: ItemStack::new(Material(9), 1),
            risky: true,
        }
    }

    #[test]
    fn test_open_twice_is_refused() {
        let store = store_with_session();
        assert!(!store.open(CONN, W, DVec3::ONE, true));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_hide_is_idempotent() {
        let store = store_with_session();
        let pos = BlockPos::new(20, 64, 0);
        let first = store.with_session(CONN, |s| s.hide(W, pos, CHEST)).unwrap();
        let second = store.with_session(CONN, |s| s.hide(W, pos, CHEST)).unwrap();
        assert_eq!(first, HideOutcome::Recorded);
        assert_eq!(second, HideOutcome::AlreadyHidden);
        assert_eq!(store.hidden_total(), 1);
    }

    #[test]
    fn test_with_session_after_close_is_none() {
        let store = store_with_session();
        store.close(CONN);
        assert!(store.with_session(CONN, |s| s.hidden_count()).is_none());
    }

    #[test]
    fn test_purge_position_hits_every_session() {
        let store = store_with_session();
        let other = ConnectionId(2);
        store.open(other, W, DVec3::ZERO, false);
        let pos = BlockPos::new(30, 64, 30);
        for conn in [CONN, other] {
            store.with_session(conn, |s| s.hide(W, pos, CHEST));
        }
        assert_eq!(store.purge_position(W, pos), 2);
        assert_eq!(store.hidden_total(), 0);
    }

    #[test]
    fn test_purge_region_scopes_to_region_and_world() {
        let store = store_with_session();
        store.with_session(CONN, |s| {
            s.hide(W, BlockPos::new(1, 64, 1), CHEST);
            s.hide(W, BlockPos::new(17, 64, 1), CHEST);
            s.hide(WorldId(1), BlockPos::new(1, 64, 1), CHEST);
            s.mark_processed(W, RegionPos::new(0, 0));
        });

        assert_eq!(store.purge_region(W, RegionPos::new(0, 0)), 1);
        store.with_session(CONN, |s| {
            assert!(!s.is_processed(W, RegionPos::new(0, 0)));
            assert!(s.is_hidden(W, BlockPos::new(17, 64, 1)));
            assert!(s.is_hidden(WorldId(1), BlockPos::new(1, 64, 1)));
        });
    }

    #[test]
    fn test_mark_processed_reports_first_time() {
        let store = store_with_session();
        let region = RegionPos::new(2, -1);
        assert_eq!(store.with_session(CONN, |s| s.mark_processed(W, region)), Some(true));
        assert_eq!(store.with_session(CONN, |s| s.mark_processed(W, region)), Some(false));
    }

    #[test]
    fn test_loading_flag_follows_queue() {
        let store = store_with_session();
        store.with_session(CONN, |s| {
            s.bind_window(WindowId(3));
            s.replace_deferred(WindowId(3), VecDeque::from([deferred(3, 5), deferred(3, 7)]));
            assert!(s.container_loading(WindowId(3)));
            s.pop_deferred(WindowId(3));
            assert!(s.container_loading(WindowId(3)));
            s.pop_deferred(WindowId(3));
            assert!(!s.container_loading(WindowId(3)));
            assert_eq!(s.binding().map(|b| b.window), Some(WindowId(3)));
        });
    }

    #[test]
    fn test_empty_contents_clear_loading() {
        let store = store_with_session();
        store.with_session(CONN, |s| {
            s.bind_window(WindowId(2));
            s.replace_deferred(WindowId(2), VecDeque::new());
            assert!(!s.container_loading(WindowId(2)));
        });
    }

    #[test]
    fn test_rebinding_discards_previous_queue() {
        let store = store_with_session();
        store.with_session(CONN, |s| {
            s.bind_window(WindowId(1));
            s.push_deferred(deferred(1, 0));
            s.bind_window(WindowId(2));
            assert_eq!(s.deferred_len(WindowId(1)), 0);
            assert!(s.is_bound(WindowId(2)));
        });
    }

    #[test]
    fn test_rebinding_same_window_keeps_drained_state() {
        let store = store_with_session();
        store.with_session(CONN, |s| {
            s.bind_window(WindowId(5));
            s.replace_deferred(WindowId(5), VecDeque::new());
            s.bind_window(WindowId(5));
            assert!(!s.container_loading(WindowId(5)));

            s.push_deferred(deferred(5, 2));
            s.bind_window(WindowId(5));
            assert!(s.container_loading(WindowId(5)));
            assert_eq!(s.deferred_len(WindowId(5)), 1);
        });
    }

    #[test]
    fn test_unbind_wrong_window_is_noop() {
        let store = store_with_session();
        store.with_session(CONN, |s| {
            s.bind_window(WindowId(4));
            s.push_deferred(deferred(4, 1));
            assert!(!s.unbind_window(WindowId(5)));
            assert_eq!(s.deferred_len(WindowId(4)), 1);
            assert!(s.unbind_window(WindowId(4)));
            assert_eq!(s.deferred_count(), 0);
        });
    }

    #[test]
    fn test_remove_deferred_slot() {
        let store = store_with_session();
        store.with_session(CONN, |s| {
            s.push_deferred(deferred(0, 3));
            s.push_deferred(deferred(0, 4));
            assert!(s.inventory_loading());
            assert_eq!(s.remove_deferred_slot(WindowId(0), 3).map(|d| d.slot), Some(3));
            assert!(s.remove_deferred_slot(WindowId(0), 3).is_none());
            s.remove_deferred_slot(WindowId(0), 4);
            assert!(!s.inventory_loading());
        });
    }

    #[test]
    fn test_pending_hides_order_nearest_then_highest() {
        let store = store_with_session();
        store.with_session(CONN, |s| {
            s.queue_hides([
                (W, BlockPos::new(30, 0, 0), CHEST),
                (W, BlockPos::new(20, 5, 0), CHEST),
                (W, BlockPos::new(20, -5, 0), CHEST),
                (W, BlockPos::new(0, 20, 0), CHEST),
            ]);
            let order: Vec<_> = s.take_pending_hides(4).into_iter().map(|(_, p, _)| p).collect();
            assert_eq!(
                order,
                vec![
                    BlockPos::new(0, 20, 0),
                    BlockPos::new(20, 5, 0),
                    BlockPos::new(20, -5, 0),
                    BlockPos::new(30, 0, 0),
                ]
            );
        });
    }

    #[test]
    fn test_change_world_releases_everything() {
        let store = store_with_session();
        store.with_session(CONN, |s| {
            s.hide(W, BlockPos::new(40, 0, 0), CHEST);
            s.mark_processed(W, RegionPos::new(2, 0));
            s.bind_window(WindowId(1));
            s.push_deferred(deferred(1, 0));
            s.push_deferred(deferred(0, 0));
            s.queue_hides([(W, BlockPos::new(50, 0, 0), CHEST)]);

            s.change_world(WorldId(7), DVec3::new(1.0, 2.0, 3.0));
            assert!(s.is_clean());
            assert_eq!(s.world(), WorldId(7));
        });
    }

    #[test]
    fn test_other_world_is_infinitely_far() {
        let store = store_with_session();
        let d = store
            .with_session(CONN, |s| s.distance_sq(WorldId(9), BlockPos::new(0, 0, 0)))
            .unwrap();
        assert!(d.is_infinite());
    }
}

//! Material registry: maps compact [`Material`] ids to [`MaterialDef`] metadata
//! and carries the precomputed classification the engine consults on every
//! packet.
//!
//! The registry is built once at startup from the [`catalog`](crate::catalog)
//! and shared read-only afterwards. Air is always id 0 so that a zeroed block
//! id is the neutral appearance sent in place of a concealed block.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Compact material identifier carried in block and item packets (2 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Material(pub u16);

impl Material {
    /// The empty block. Also the neutral appearance of a concealed block.
    pub const AIR: Self = Self(0);

    /// Returns `true` if this is [`Material::AIR`].
    pub fn is_air(self) -> bool {
        self == Self::AIR
    }
}

/// Block state as the world holds it: material plus packed block properties
/// (facing, waterlogged, chest half, ...). Properties are opaque to the engine
/// and forwarded untouched on reveal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockState {
    /// Block material.
    pub material: Material,
    /// Packed property bits.
    pub properties: u32,
}

impl BlockState {
    /// The empty block state.
    pub const AIR: Self = Self {
        material: Material::AIR,
        properties: 0,
    };

    /// A state of `material` with default properties.
    pub const fn of(material: Material) -> Self {
        Self {
            material,
            properties: 0,
        }
    }
}

/// Classification flags for a material.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialTraits {
    /// Member of the protected type set: concealed beyond the visibility radius.
    pub protected: bool,
    /// Has a container or workstation UI.
    pub container: bool,
    /// Container that survives as an item with its contents (shulker boxes).
    pub portable_container: bool,
    /// Displays text lines.
    pub sign: bool,
    /// Can join a horizontally adjacent block of the same material into one
    /// double container.
    pub paired: bool,
    /// Carries a block entity record alongside its block state.
    pub block_entity: bool,
}

impl MaterialTraits {
    /// No classification.
    pub const PLAIN: Self = Self {
        protected: false,
        container: false,
        portable_container: false,
        sign: false,
        paired: false,
        block_entity: false,
    };

    /// Marks the material as protected.
    pub const fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Marks the material as a container.
    pub const fn container(mut self) -> Self {
        self.container = true;
        self
    }

    /// Marks the material as a portable container.
    pub const fn portable(mut self) -> Self {
        self.portable_container = true;
        self
    }

    /// Marks the material as a sign.
    pub const fn sign(mut self) -> Self {
        self.sign = true;
        self
    }

    /// Marks the material as pairable.
    pub const fn paired(mut self) -> Self {
        self.paired = true;
        self
    }

    /// Marks the material as carrying a block entity.
    pub const fn block_entity(mut self) -> Self {
        self.block_entity = true;
        self
    }
}

/// Full descriptor for a material.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaterialDef {
    /// Canonical lowercase name (e.g. "chest", "oak_wall_sign").
    pub name: String,
    /// Classification flags.
    pub traits: MaterialTraits,
}

/// Errors that can occur during material registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A material with the same name has already been registered.
    #[error("duplicate material name: {0}")]
    DuplicateName(String),
    /// All 65 535 non-air slots have been consumed.
    #[error("material registry is full (max 65536 materials)")]
    RegistryFull,
}

// ---------------------------------------------------------------------------
// Protected type set
// ---------------------------------------------------------------------------

/// Immutable set of materials whose placement and contents are concealed
/// beyond the visibility radius.
#[derive(Clone, Debug, Default)]
pub struct ProtectedTypeSet {
    members: FxHashSet<Material>,
}

impl ProtectedTypeSet {
    /// Returns `true` if `material` is protected.
    pub fn contains(&self, material: Material) -> bool {
        self.members.contains(&material)
    }

    /// Number of protected materials.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if nothing is protected.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterates the protected materials in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = Material> + '_ {
        self.members.iter().copied()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps [`Material`] → [`MaterialDef`] with O(1) lookup by id and by exact
/// name, plus the protected type set derived from the registered traits.
pub struct MaterialRegistry {
    /// Dense array where `index == Material.0`.
    defs: Vec<MaterialDef>,
    /// Reverse lookup: name → id.
    name_to_id: FxHashMap<String, Material>,
    /// Materials with [`MaterialTraits::protected`] set.
    protected: ProtectedTypeSet,
}

impl MaterialRegistry {
    /// Creates a registry with only Air registered, as id 0.
    pub fn new() -> Self {
        let air = MaterialDef {
            name: "air".to_string(),
            traits: MaterialTraits::PLAIN,
        };

        let mut name_to_id = FxHashMap::default();
        name_to_id.insert("air".to_string(), Material::AIR);

        Self {
            defs: vec![air],
            name_to_id,
            protected: ProtectedTypeSet::default(),
        }
    }

    /// Builds the registry from the full material catalog.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the catalog names a material twice.
    pub fn from_catalog() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for entry in catalog::entries() {
            registry.register(entry)?;
        }
        tracing::debug!(
            materials = registry.len(),
            protected = registry.protected.len(),
            "material registry built"
        );
        Ok(registry)
    }

    /// Registers a material and returns its assigned id.
    ///
    /// Ids are assigned sequentially starting from 1 (0 is Air).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if the name is taken, or
    /// [`RegistryError::RegistryFull`] if all 65 536 slots are consumed.
    pub fn register(&mut self, def: MaterialDef) -> Result<Material, RegistryError> {
        if self.name_to_id.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        if self.defs.len() > u16::MAX as usize {
            return Err(RegistryError::RegistryFull);
        }

        let id = Material(self.defs.len() as u16);
        if def.traits.protected {
            self.protected.members.insert(id);
        }
        self.name_to_id.insert(def.name.clone(), id);
        self.defs.push(def);
        Ok(id)
    }

    /// Returns the definition for `id`, or `None` for an id this registry
    /// never issued. Ids arrive from packets, so unknown ids are possible.
    pub fn get(&self, id: Material) -> Option<&MaterialDef> {
        self.defs.get(id.0 as usize)
    }

    /// Exact name lookup. No prefix or substring matching.
    pub fn lookup(&self, name: &str) -> Option<Material> {
        self.name_to_id.get(name).copied()
    }

    /// Name of `id`, or `"unknown"`.
    pub fn name(&self, id: Material) -> &str {
        self.get(id).map_or("unknown", |def| def.name.as_str())
    }

    /// Total number of registered materials (including Air).
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Returns `true` if only Air is registered.
    pub fn is_empty(&self) -> bool {
        self.defs.len() <= 1
    }

    /// Returns `true` if `id` is a known material id.
    pub fn is_known(&self, id: Material) -> bool {
        (id.0 as usize) < self.defs.len()
    }

    /// The protected type set.
    pub fn protected_types(&self) -> &ProtectedTypeSet {
        &self.protected
    }

    /// Classification of `id`; unknown ids classify as plain.
    pub fn traits(&self, id: Material) -> MaterialTraits {
        self.get(id).map_or(MaterialTraits::PLAIN, |def| def.traits)
    }

    /// Returns `true` if `id` is in the protected type set.
    pub fn is_protected(&self, id: Material) -> bool {
        self.protected.contains(id)
    }

    /// Returns `true` if `id` has a container or workstation UI.
    pub fn is_container(&self, id: Material) -> bool {
        self.traits(id).container
    }

    /// Returns `true` if `id` is a sign.
    pub fn is_sign(&self, id: Material) -> bool {
        self.traits(id).sign
    }

    /// Returns `true` if `id` can join a neighbour into a double container.
    pub fn is_paired(&self, id: Material) -> bool {
        self.traits(id).paired
    }

    /// Returns `true` if `id` carries a block entity.
    pub fn has_block_entity(&self, id: Material) -> bool {
        self.traits(id).block_entity
    }

    /// Returns `true` if items of `id` can carry nested contents.
    pub fn is_portable_container(&self, id: Material) -> bool {
        self.traits(id).portable_container
    }
}

impl Default for MaterialRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! `Class` definitions and the inheritance graph for the `formclass` runtime.
//!
//! This module implements the class registry with:
//! - `ClassDef` construction (slots, parents, prototype, validity)
//! - Multiple inheritance with cycle detection
//! - Shortest-distance tables over the inheritance DAG
//! - Replace-in-place redefinition with version numbers
//!
//! # Architecture
//!
//! Classes live in an index arena: each name maps to a stable `ClassId`
//! that survives redefinition. Every entry keeps its own ancestor table
//! (ancestor id -> number of parent edges), so `distance(from, to)` is a
//! single hash lookup. When a class is (re)defined, the tables of that class
//! and of all its descendants are recomputed, parents before children.
//!
//! # Built-in classes
//!
//! Each registry starts with the primitive kinds from
//! [`builtin`](crate::runtime::value::builtin), all sealed. `integer`
//! extends `numeric`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use fxhash::{FxHashMap, FxHashSet};
use indexmap::IndexMap;
use tracing::debug;

use crate::error::DefinitionError;
use crate::runtime::value::builtin;
use crate::runtime::{ANY, Instance, MISSING, Value};

/// Validity function: inspects an instance and reports problems.
///
/// An empty vector means the instance is valid. Each string is one message
/// and all of them are kept in the resulting
/// [`ValidityFailure`](crate::error::ConstructionError::ValidityFailure).
pub type Validity = Arc<dyn Fn(&Instance) -> Vec<String> + Send + Sync>;

/// Stable index of a class inside one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct ClassId(u32);

impl ClassId {
    #[allow(clippy::cast_possible_truncation)]
    fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Returns the arena index.
    #[must_use]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A named, typed slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpec {
    /// Slot name.
    pub name: String,
    /// Declared type: a class name, a primitive kind, or `ANY`.
    pub type_name: String,
}

impl SlotSpec {
    /// Creates a slot specification.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A class definition, built with chained setters and installed with
/// [`Runtime::define_class`](crate::Runtime::define_class).
///
/// # Example
///
/// ```rust
/// use formclass::{ClassDef, Runtime, Value};
///
/// let runtime = Runtime::new();
/// runtime
///     .define_class(
///         ClassDef::new("Person")
///             .slot("name", "character")
///             .slot("age", "numeric")
///             .prototype("age", Value::numeric(0.0)),
///     )
///     .unwrap();
///
/// runtime
///     .define_class(ClassDef::new("Employee").contains("Person").slot("boss", "Person"))
///     .unwrap();
///
/// assert_eq!(runtime.distance("Employee", "Person"), Some(1));
/// ```
#[derive(Clone)]
pub struct ClassDef {
    name: String,
    slots: Vec<SlotSpec>,
    parents: Vec<String>,
    prototype: IndexMap<String, Value>,
    validity: Option<Validity>,
    sealed: bool,
    is_virtual: bool,
}

impl ClassDef {
    /// Starts a definition with no slots and no parents.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Vec::new(),
            parents: Vec::new(),
            prototype: IndexMap::new(),
            validity: None,
            sealed: false,
            is_virtual: false,
        }
    }

    /// Virtual class standing in for a host type.
    ///
    /// Values created with [`Value::foreign`] whose
    /// [`class_tag`](crate::runtime::ForeignObject::class_tag) matches `name`
    /// dispatch as this class.
    pub fn foreign(name: impl Into<String>) -> Self {
        Self::new(name).virtual_class()
    }

    /// Adds a slot.
    #[must_use]
    pub fn slot(
        mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        self.slots.push(SlotSpec::new(name, type_name));
        self
    }

    /// Adds a parent class.
    #[must_use]
    pub fn contains(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    /// Sets the default value of a slot.
    #[must_use]
    pub fn prototype(mut self, slot: impl Into<String>, value: Value) -> Self {
        self.prototype.insert(slot.into(), value);
        self
    }

    /// Sets the validity function.
    #[must_use]
    pub fn validity<F>(mut self, check: F) -> Self
    where
        F: Fn(&Instance) -> Vec<String> + Send + Sync + 'static,
    {
        self.validity = Some(Arc::new(check));
        self
    }

    /// Forbids later redefinition.
    #[must_use]
    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    /// Marks the class as not instantiable.
    #[must_use]
    pub fn virtual_class(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// Class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slots declared directly on this class.
    #[must_use]
    pub fn own_slots(&self) -> &[SlotSpec] {
        &self.slots
    }

    /// Direct parents, in declared order.
    #[must_use]
    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    /// Default slot values declared on this class.
    #[must_use]
    pub fn prototype_values(&self) -> &IndexMap<String, Value> {
        &self.prototype
    }

    pub(crate) fn validity_fn(&self) -> Option<&Validity> {
        self.validity.as_ref()
    }

    /// Returns `true` if redefinition is forbidden.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Returns `true` if the class cannot be instantiated.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("slots", &self.slots)
            .field("parents", &self.parents)
            .field("prototype", &self.prototype)
            .field("validity", &self.validity.is_some())
            .field("sealed", &self.sealed)
            .field("virtual", &self.is_virtual)
            .finish()
    }
}

/// Registry entry: the current definition plus derived tables.
pub(crate) struct ClassEntry {
    pub(crate) def: Arc<ClassDef>,
    pub(crate) version: u32,
    /// Ancestor id -> shortest number of parent edges. Contains self at 0.
    ancestors: FxHashMap<ClassId, u32>,
    /// Self first, then ancestors by distance; ties keep declared parent order.
    linearization: Vec<ClassId>,
    /// Own slots followed by inherited ones, first declaration wins.
    slots: Arc<[SlotSpec]>,
}

/// What a successful definition changed, for cache invalidation.
#[derive(Debug)]
pub(crate) struct ClassChange {
    /// The defined class and every class whose ancestor table was rebuilt.
    pub(crate) affected: FxHashSet<ClassId>,
    /// The `ANY` sentinel distance moved.
    pub(crate) depth_changed: bool,
}

/// Class arena and inheritance graph.
pub(crate) struct ClassRegistry {
    entries: Vec<ClassEntry>,
    by_name: FxHashMap<String, ClassId>,
    /// Longest finite distance in the graph.
    max_depth: u32,
}

impl ClassRegistry {
    /// Creates a registry holding the built-in primitive classes.
    pub(crate) fn new() -> Self {
        let mut registry = Self {
            entries: Vec::with_capacity(64),
            by_name: FxHashMap::default(),
            max_depth: 0,
        };
        for kind in builtin::ALL {
            let mut def = ClassDef::new(kind).sealed();
            if kind == builtin::INTEGER {
                def = def.contains(builtin::NUMERIC);
            }
            registry.install(def);
        }
        registry
    }

    /// Validates and installs a class definition.
    ///
    /// Nothing is modified unless every check passes.
    pub(crate) fn define(
        &mut self,
        def: ClassDef,
    ) -> Result<ClassChange, DefinitionError> {
        if let Some(error) = DefinitionError::collect(self.check(&def)) {
            return Err(error);
        }
        Ok(self.install(def))
    }

    /// Collects every violation in `def` against the current graph.
    fn check(&self, def: &ClassDef) -> Vec<DefinitionError> {
        let name = def.name();
        let mut errors = Vec::new();

        if name == ANY || name == MISSING {
            errors.push(DefinitionError::ReservedClassName {
                class: name.to_string(),
            });
        }

        let existing = self.lookup(name);
        if let Some(id) = existing {
            if self.entry(id).def.is_sealed() {
                errors.push(DefinitionError::DuplicateSealedClass {
                    class: name.to_string(),
                });
            }
        }

        let mut parent_ids = Vec::with_capacity(def.parents().len());
        for parent in def.parents() {
            let Some(parent_id) = self.lookup(parent) else {
                errors.push(DefinitionError::UnknownParentClass {
                    class: name.to_string(),
                    parent: parent.clone(),
                });
                continue;
            };
            // With the old edges still in place, the new edge closes a cycle
            // exactly when the class is already an ancestor of the parent.
            if let Some(id) = existing {
                if self.entry(parent_id).ancestors.contains_key(&id) {
                    errors.push(DefinitionError::CyclicInheritance {
                        class: name.to_string(),
                        parent: parent.clone(),
                    });
                    continue;
                }
            }
            parent_ids.push(parent_id);
        }

        let mut seen = FxHashSet::default();
        for slot in def.own_slots() {
            if !seen.insert(slot.name.as_str()) {
                errors.push(DefinitionError::DuplicateSlot {
                    class: name.to_string(),
                    slot: slot.name.clone(),
                });
            }
            if slot.type_name != ANY && self.lookup(&slot.type_name).is_none() {
                errors.push(DefinitionError::UnknownSlotType {
                    class: name.to_string(),
                    slot: slot.name.clone(),
                    type_name: slot.type_name.clone(),
                });
            }
        }

        for key in def.prototype_values().keys() {
            let inherited = parent_ids
                .iter()
                .any(|&p| self.slots(p).iter().any(|s| &s.name == key));
            if !seen.contains(key.as_str()) && !inherited {
                errors.push(DefinitionError::UnknownPrototypeSlot {
                    class: name.to_string(),
                    slot: key.clone(),
                });
            }
        }

        errors
    }

    /// Installs a definition that already passed [`check`](Self::check).
    fn install(&mut self, def: ClassDef) -> ClassChange {
        let name = def.name().to_string();
        let def = Arc::new(def);

        let mut affected = FxHashSet::default();
        let id = if let Some(id) = self.lookup(&name) {
            // Descendants are found through the old tables; their own parent
            // edges do not change.
            affected.extend(
                self.entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.ancestors.contains_key(&id))
                    .map(|(i, _)| ClassId::from_index(i)),
            );
            let entry = &mut self.entries[id.index()];
            entry.def = def;
            entry.version += 1;
            id
        } else {
            let id = ClassId::from_index(self.entries.len());
            self.entries.push(ClassEntry {
                def,
                version: 1,
                ancestors: FxHashMap::default(),
                linearization: Vec::new(),
                slots: Arc::from(Vec::new()),
            });
            self.by_name.insert(name.clone(), id);
            id
        };
        affected.insert(id);

        self.recompute(&affected);

        let old_depth = self.max_depth;
        self.max_depth = self
            .entries
            .iter()
            .flat_map(|e| e.ancestors.values().copied())
            .max()
            .unwrap_or(0);

        let entry = self.entry(id);
        debug!(
            class = %name,
            version = entry.version,
            affected = affected.len(),
            depth = self.max_depth,
            "class defined"
        );

        ClassChange {
            affected,
            depth_changed: old_depth != self.max_depth,
        }
    }

    /// Rebuilds the derived tables of `affected`, parents before children.
    fn recompute(&mut self, affected: &FxHashSet<ClassId>) {
        let mut roots: Vec<ClassId> = affected.iter().copied().collect();
        roots.sort_unstable();

        let mut done = FxHashSet::default();
        let mut order = Vec::with_capacity(roots.len());
        for id in roots {
            self.visit(id, affected, &mut done, &mut order);
        }

        for id in order {
            let ancestors = self.compute_ancestors(id);
            let linearization = self.compute_linearization(id, &ancestors);
            let slots = self.compute_slots(&linearization);
            let entry = &mut self.entries[id.index()];
            entry.ancestors = ancestors;
            entry.linearization = linearization;
            entry.slots = slots;
        }
    }

    fn visit(
        &self,
        id: ClassId,
        affected: &FxHashSet<ClassId>,
        done: &mut FxHashSet<ClassId>,
        order: &mut Vec<ClassId>,
    ) {
        if !affected.contains(&id) || !done.insert(id) {
            return;
        }
        for parent in self.parent_ids(id) {
            self.visit(parent, affected, done, order);
        }
        order.push(id);
    }

    fn parent_ids(&self, id: ClassId) -> Vec<ClassId> {
        self.entry(id)
            .def
            .parents()
            .iter()
            .filter_map(|p| self.lookup(p))
            .collect()
    }

    fn compute_ancestors(&self, id: ClassId) -> FxHashMap<ClassId, u32> {
        let mut ancestors = FxHashMap::default();
        ancestors.insert(id, 0);
        for parent in self.parent_ids(id) {
            for (&ancestor, &distance) in &self.entry(parent).ancestors {
                let candidate = distance + 1;
                ancestors
                    .entry(ancestor)
                    .and_modify(|d: &mut u32| *d = (*d).min(candidate))
                    .or_insert(candidate);
            }
        }
        ancestors
    }

    /// Breadth-first walk over parent edges in declared order.
    fn compute_linearization(
        &self,
        id: ClassId,
        ancestors: &FxHashMap<ClassId, u32>,
    ) -> Vec<ClassId> {
        let mut order = Vec::with_capacity(ancestors.len());
        let mut seen = FxHashSet::default();
        let mut queue = VecDeque::from([id]);
        seen.insert(id);

        while let Some(current) = queue.pop_front() {
            order.push(current);
            for parent in self.parent_ids(current) {
                if seen.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        // BFS already yields shortest-distance order; the stable sort keeps
        // discovery order among equals.
        order.sort_by_key(|c| ancestors.get(c).copied().unwrap_or(u32::MAX));
        order
    }

    fn compute_slots(&self, linearization: &[ClassId]) -> Arc<[SlotSpec]> {
        let mut slots: Vec<SlotSpec> = Vec::new();
        for &class in linearization {
            for slot in self.entry(class).def.own_slots() {
                if !slots.iter().any(|s| s.name == slot.name) {
                    slots.push(slot.clone());
                }
            }
        }
        Arc::from(slots)
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn entry(&self, id: ClassId) -> &ClassEntry {
        &self.entries[id.index()]
    }

    pub(crate) fn name(&self, id: ClassId) -> &str {
        self.entry(id).def.name()
    }

    /// Effective slots: own slots followed by inherited ones.
    pub(crate) fn slots(&self, id: ClassId) -> &Arc<[SlotSpec]> {
        &self.entry(id).slots
    }

    /// Self first, then ancestors from nearest to farthest.
    pub(crate) fn linearization(&self, id: ClassId) -> &[ClassId] {
        &self.entry(id).linearization
    }

    /// Shortest number of parent edges from `from` up to `to`.
    pub(crate) fn distance_ids(&self, from: ClassId, to: ClassId) -> Option<u32> {
        self.entry(from).ancestors.get(&to).copied()
    }

    /// Distance assigned to an `ANY` matcher: always beyond any real path.
    pub(crate) fn any_distance(&self) -> u32 {
        self.max_depth + 1
    }

    /// Returns `true` if a value of class `class` may be stored where
    /// `type_name` is expected.
    pub(crate) fn reaches(&self, class: &str, type_name: &str) -> bool {
        if type_name == ANY {
            return true;
        }
        match (self.lookup(class), self.lookup(type_name)) {
            (Some(from), Some(to)) => self.distance_ids(from, to).is_some(),
            _ => false,
        }
    }

    /// Prototype values merged most-ancestral first, nearer classes winning.
    pub(crate) fn effective_prototype(&self, id: ClassId) -> IndexMap<String, Value> {
        let mut merged = IndexMap::new();
        for &class in self.linearization(id).iter().rev() {
            for (slot, value) in self.entry(class).def.prototype_values() {
                merged.insert(slot.clone(), value.clone());
            }
        }
        merged
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.def.name())
    }
}

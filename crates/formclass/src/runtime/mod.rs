//! Class graph, instances, generics and dispatch.
//!
//! All state lives in a [`Runtime`]. There is no global registry: create a
//! runtime, define classes and generics on it, then construct instances and
//! call generics through it. A runtime is `Send + Sync` and may be shared
//! across threads behind an `Arc`.
//!
//! # Modules
//!
//! - [`class`]: class definitions and the inheritance graph
//! - `object`: instance construction and validity checking
//! - [`generic`]: generic declarations, signatures and method tables
//! - [`dispatch`]: resolution, caching and next-method calls
//! - [`config`]: dispatch policy
//! - [`value`]: the dynamic value model
//! - `introspection`: queries over the class graph
//!
//! # Example
//!
//! ```rust
//! use formclass::{Arguments, ClassDef, GenericDef, Runtime, Value};
//!
//! let runtime = Runtime::new();
//! runtime
//!     .define_class(ClassDef::new("Shape").slot("name", "character"))
//!     .unwrap();
//! runtime
//!     .define_class(ClassDef::new("Circle").contains("Shape").slot("r", "numeric"))
//!     .unwrap();
//! runtime.declare_generic(GenericDef::new("area").formals(["shape"])).unwrap();
//! runtime
//!     .register_method("area", ["Circle"], |call| {
//!         let shape = call.arg("shape").and_then(Value::as_instance).unwrap();
//!         let r = shape.slot("r")?.as_f64().unwrap_or(0.0);
//!         Ok(Value::numeric(std::f64::consts::PI * r * r))
//!     })
//!     .unwrap();
//!
//! let c = runtime.construct("Circle", [("r", Value::numeric(1.0))]).unwrap();
//! let area = runtime.dispatch("area", &Arguments::new().with(c)).unwrap();
//! assert!((area.as_f64().unwrap() - std::f64::consts::PI).abs() < 1e-12);
//! ```

pub mod class;
pub mod config;
pub mod dispatch;
pub mod generic;
mod introspection;
mod object;
pub mod value;

pub use class::{ClassDef, SlotSpec, Validity};
pub use config::{AmbiguityPolicy, RuntimeConfig, TieBreak};
pub use dispatch::{Arguments, MethodCall};
pub use generic::{GenericDef, Matcher, MethodBody, MethodDef, Signature};
pub use object::Instance;
pub use value::{ForeignObject, ForeignRef, Value, builtin};

use std::fmt;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{ConstructionError, DispatchWarning, Result};
use class::ClassRegistry;
use dispatch::DispatchCache;
use generic::GenericRegistry;

/// Matcher name that accepts any argument, including an absent one.
pub const ANY: &str = "ANY";

/// Matcher name that accepts only an absent argument.
pub const MISSING: &str = "MISSING";

/// An isolated class system with its generics and dispatch cache.
///
/// # Thread Safety
///
/// Each registry sits behind its own `parking_lot` lock. Writers take them in
/// the order classes, generics, cache; readers never hold a lock while user
/// code (method bodies, validity functions) runs.
pub struct Runtime {
    config: RuntimeConfig,
    pub(crate) classes: RwLock<ClassRegistry>,
    pub(crate) generics: RwLock<GenericRegistry>,
    pub(crate) cache: RwLock<DispatchCache>,
    pub(crate) warnings: Mutex<Vec<DispatchWarning>>,
}

impl Runtime {
    /// Creates a runtime with the default dispatch policy and the built-in
    /// primitive classes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates a runtime with an explicit dispatch policy.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        debug!(?config, "runtime created");
        Self {
            config,
            classes: RwLock::new(ClassRegistry::new()),
            generics: RwLock::new(GenericRegistry::default()),
            cache: RwLock::new(DispatchCache::default()),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// The dispatch policy this runtime was created with.
    #[must_use]
    pub fn config(&self) -> RuntimeConfig {
        self.config
    }

    /// Defines a class, or redefines a non-sealed one.
    ///
    /// Redefinition keeps the class identity, bumps its version and rebuilds
    /// the tables of every descendant. Cached resolutions that could have
    /// changed are dropped before this returns.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`](crate::error::DefinitionError) listing
    /// every problem with `def`; the graph is left unchanged.
    pub fn define_class(&self, def: ClassDef) -> Result<()> {
        let mut classes = self.classes.write();
        let change = classes.define(def)?;
        self.cache.write().invalidate_classes(&change);
        Ok(())
    }

    /// Shortest inheritance distance from `from` to `to`.
    ///
    /// `to` may be `ANY`, which every class reaches at one more than the
    /// deepest path in the graph. Returns `None` if either class is unknown
    /// or `from` does not extend `to`.
    #[must_use]
    pub fn distance(&self, from: &str, to: &str) -> Option<u32> {
        let classes = self.classes.read();
        let from = classes.lookup(from)?;
        match to {
            ANY => Some(classes.any_distance()),
            MISSING => None,
            _ => classes.distance_ids(from, classes.lookup(to)?),
        }
    }

    /// Returns `true` if `class` is `ancestor` or inherits from it.
    #[must_use]
    pub fn extends(&self, class: &str, ancestor: &str) -> bool {
        self.classes.read().reaches(class, ancestor)
    }

    /// Returns `true` if `value` is of class `class` or a descendant.
    #[must_use]
    pub fn is(&self, value: &Value, class: &str) -> bool {
        self.extends(value.class_name(), class)
    }

    /// Effective slots of `class`: own slots first, then inherited ones.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::UnknownClass`] if `class` is not defined.
    pub fn slots(&self, class: &str) -> Result<Vec<SlotSpec>> {
        let classes = self.classes.read();
        let id = classes
            .lookup(class)
            .ok_or_else(|| ConstructionError::UnknownClass {
                class: class.to_string(),
            })?;
        Ok(classes.slots(id).to_vec())
    }

    /// Drains the ambiguity warnings recorded since the last call.
    ///
    /// A warning is recorded when an ambiguous resolution is computed, not on
    /// later cache hits, and any thread may drain it. Callers that need the
    /// note for their own call use
    /// [`dispatch_with_diagnostics`](Self::dispatch_with_diagnostics).
    pub fn take_warnings(&self) -> Vec<DispatchWarning> {
        std::mem::take(&mut *self.warnings.lock())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let classes = self.classes.read();
        let generics = self.generics.read();
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("classes", &classes.names().count())
            .field("generics", &generics.names().count())
            .field("cached", &self.cache.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_runtime_is_send_sync() {
        assert_send_sync::<Runtime>();
    }

    #[test]
    fn test_distance_queries() {
        let runtime = Runtime::new();
        runtime.define_class(ClassDef::new("A")).unwrap();
        runtime.define_class(ClassDef::new("B").contains("A")).unwrap();

        assert_eq!(runtime.distance("B", "A"), Some(1));
        assert_eq!(runtime.distance("A", "B"), None);
        assert_eq!(runtime.distance("B", "Nope"), None);
        assert_eq!(runtime.distance("B", ANY), Some(2));
        assert_eq!(runtime.distance("B", MISSING), None);
        assert!(runtime.extends("B", "A"));
        assert!(runtime.extends("B", ANY));
    }

    #[test]
    fn test_is_value() {
        let runtime = Runtime::new();
        assert!(runtime.is(&Value::integer(1), "numeric"));
        assert!(!runtime.is(&Value::numeric(1.0), "integer"));
        assert!(runtime.is(&Value::Null, "NULL"));
    }

    #[test]
    fn test_slots_lists_inherited() {
        let runtime = Runtime::new();
        runtime
            .define_class(ClassDef::new("P").slot("a", "numeric"))
            .unwrap();
        runtime
            .define_class(ClassDef::new("Q").contains("P").slot("b", "character"))
            .unwrap();

        let names: Vec<_> = runtime
            .slots("Q")
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["b", "a"]);
        assert!(runtime.slots("Nope").is_err());
    }

    #[test]
    fn test_take_warnings_drains() {
        let runtime = Runtime::new();
        assert!(runtime.take_warnings().is_empty());
    }
}

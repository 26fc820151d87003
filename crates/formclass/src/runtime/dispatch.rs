//! Method resolution and invocation.
//!
//! A call to a generic is resolved in three steps:
//!
//! 1. The dispatch arguments are mapped to a concrete class tuple, with
//!    absent arguments as `MISSING`.
//! 2. The per-generic cache is consulted with that tuple.
//! 3. On a miss every registered method is scored: the sum over positions of
//!    the inheritance distance from the argument class to the matcher class.
//!    `ANY` scores one more than the deepest path in the graph, so it only
//!    wins when nothing specific applies. The candidates are sorted by score
//!    and the sorted list is cached; its head is the method to run and its
//!    tail is the next-method chain.
//!
//! # Locking
//!
//! Lookup holds the class and generic read locks while it scores and inserts
//! into the cache, so a resolution computed against one graph can never be
//! cached after a concurrent definition has invalidated it. Method bodies run
//! with no lock held and may define classes or register methods.

use std::cell::Cell;
use std::sync::Arc;

use fxhash::FxHashMap;
use tracing::{trace, warn};

use crate::error::{DefinitionError, DispatchError, DispatchWarning, Result};
use crate::runtime::class::{ClassChange, ClassId, ClassRegistry};
use crate::runtime::generic::{GenericDef, GenericEntry, Matcher, MethodDef};
use crate::runtime::{AmbiguityPolicy, MISSING, Runtime, RuntimeConfig, Signature, TieBreak, Value};

/// Actual arguments of a generic call, by formal position.
///
/// Positions beyond the supplied values, and positions explicitly pushed as
/// missing, are absent.
///
/// # Example
///
/// ```rust
/// use formclass::{Arguments, Value};
///
/// let args = Arguments::new().with(1.5).missing().with("label");
/// assert_eq!(args.len(), 3);
/// assert!(args.is_missing(1));
/// assert!(args.is_missing(7));
/// assert_eq!(args.get(2), Some(&Value::character("label")));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Vec<Option<Value>>,
}

impl Arguments {
    /// No arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a supplied argument.
    #[must_use]
    pub fn with(mut self, value: impl Into<Value>) -> Self {
        self.values.push(Some(value.into()));
        self
    }

    /// Appends an absent argument.
    #[must_use]
    pub fn missing(mut self) -> Self {
        self.values.push(None);
        self
    }

    /// Appends a possibly absent argument.
    pub fn push(&mut self, value: Option<Value>) {
        self.values.push(value);
    }

    /// Argument at `index`, `None` if absent.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Returns `true` if the argument at `index` is absent.
    #[must_use]
    pub fn is_missing(&self, index: usize) -> bool {
        self.get(index).is_none()
    }

    /// Number of positions, including explicitly absent ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no position was pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<const N: usize> From<[Value; N]> for Arguments {
    fn from(values: [Value; N]) -> Self {
        values.into_iter().collect()
    }
}

impl From<Vec<Value>> for Arguments {
    fn from(values: Vec<Value>) -> Self {
        values.into_iter().collect()
    }
}

impl FromIterator<Value> for Arguments {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(Some).collect(),
        }
    }
}

impl FromIterator<Option<Value>> for Arguments {
    fn from_iter<I: IntoIterator<Item = Option<Value>>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// One position of a concrete class tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Concrete {
    Class(ClassId),
    Missing,
}

/// A cached resolution: the selected method followed by its fallbacks.
#[derive(Debug)]
pub(crate) struct Resolution {
    pub(crate) generic: Arc<GenericDef>,
    pub(crate) method: Arc<MethodDef>,
    /// Remaining applicable methods, nearest first.
    pub(crate) next: Vec<Arc<MethodDef>>,
    pub(crate) ambiguity: Option<DispatchWarning>,
}

/// Resolutions keyed by generic, then by concrete class tuple.
#[derive(Debug, Default)]
pub(crate) struct DispatchCache {
    entries: FxHashMap<String, FxHashMap<Vec<Concrete>, Arc<Resolution>>>,
}

impl DispatchCache {
    fn get(&self, generic: &str, key: &[Concrete]) -> Option<Arc<Resolution>> {
        self.entries.get(generic)?.get(key).cloned()
    }

    fn insert(&mut self, generic: &str, key: Vec<Concrete>, resolution: Arc<Resolution>) {
        self.entries
            .entry(generic.to_string())
            .or_default()
            .insert(key, resolution);
    }

    /// Drops every resolution of `generic`.
    pub(crate) fn invalidate_generic(&mut self, generic: &str) {
        if let Some(dropped) = self.entries.remove(generic) {
            trace!(generic, dropped = dropped.len(), "dispatch cache invalidated");
        }
    }

    /// Drops the resolutions a class definition may have changed.
    ///
    /// A moved `ANY` distance changes every score that used it, so the whole
    /// cache goes. Otherwise only tuples naming an affected class are stale.
    pub(crate) fn invalidate_classes(&mut self, change: &ClassChange) {
        if change.depth_changed {
            trace!("inheritance depth changed, dispatch cache cleared");
            self.entries.clear();
            return;
        }
        for resolutions in self.entries.values_mut() {
            resolutions.retain(|key, _| {
                !key.iter().any(|c| match c {
                    Concrete::Class(id) => change.affected.contains(id),
                    Concrete::Missing => false,
                })
            });
        }
        self.entries.retain(|_, resolutions| !resolutions.is_empty());
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.values().map(FxHashMap::len).sum()
    }
}

/// The frame a method body runs in.
///
/// Gives access to the arguments and to the next method in the resolution
/// order. All frames of one top-level call share a cursor into that order, so
/// each fallback runs at most once per call.
pub struct MethodCall<'a> {
    runtime: &'a Runtime,
    resolution: &'a Resolution,
    method: &'a MethodDef,
    args: &'a Arguments,
    cursor: &'a Cell<usize>,
    depth: usize,
}

impl MethodCall<'_> {
    /// The runtime the call was made on.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        self.runtime
    }

    /// Name of the called generic.
    #[must_use]
    pub fn generic(&self) -> &str {
        self.resolution.generic.name()
    }

    /// Signature of the method running in this frame.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.method.signature
    }

    /// All arguments of this frame.
    #[must_use]
    pub fn args(&self) -> &Arguments {
        self.args
    }

    /// Argument bound to the formal parameter `name`.
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&Value> {
        let index = self
            .resolution
            .generic
            .formal_params()
            .iter()
            .position(|f| f == name)?;
        self.args.get(index)
    }

    /// Argument at formal position `index`.
    #[must_use]
    pub fn arg_at(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Number of `call_next` hops between the selected method and this one.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns `true` if `call_next` has a method left to run.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.cursor.get() < self.resolution.next.len()
    }

    /// Runs the next method with this frame's arguments.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoNextMethod`] once every fallback has run,
    /// or whatever the next method returns.
    pub fn call_next(&self) -> Result<Value> {
        self.call_next_with(self.args)
    }

    /// Runs the next method with replacement arguments.
    ///
    /// The method is the one the original call resolved to; the new arguments
    /// are not dispatched on again.
    ///
    /// # Errors
    ///
    /// Same as [`call_next`](Self::call_next).
    pub fn call_next_with(&self, args: &Arguments) -> Result<Value> {
        let index = self.cursor.get();
        let Some(next) = self.resolution.next.get(index) else {
            return Err(DispatchError::NoNextMethod {
                generic: self.generic().to_string(),
                signature: self.method.signature.clone(),
            }
            .into());
        };
        self.cursor.set(index + 1);

        trace!(
            generic = self.generic(),
            from = %self.method.signature,
            to = %next.signature,
            "calling next method"
        );
        let frame = MethodCall {
            runtime: self.runtime,
            resolution: self.resolution,
            method: next,
            args,
            cursor: self.cursor,
            depth: self.depth + 1,
        };
        (next.body)(&frame)
    }
}

impl Runtime {
    /// Calls `generic` with `args`.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError::UnknownGeneric`] if `generic` is not declared
    /// - [`DispatchError::ArgumentCountMismatch`] for more arguments than
    ///   formals
    /// - [`DispatchError::UnknownArgumentClass`] for an argument whose class
    ///   is not defined
    /// - [`DispatchError::NoApplicableMethod`] if nothing matches
    /// - [`DispatchError::AmbiguousDispatch`] under
    ///   [`AmbiguityPolicy::Error`]
    /// - [`DispatchError::InvalidReturnType`] if the result does not reach
    ///   the declared return class
    /// - any error returned by the method body
    ///
    /// # Example
    ///
    /// ```rust
    /// use formclass::{Arguments, ClassDef, GenericDef, Runtime, Value};
    ///
    /// let runtime = Runtime::new();
    /// runtime.define_class(ClassDef::new("Animal")).unwrap();
    /// runtime.define_class(ClassDef::new("Dog").contains("Animal")).unwrap();
    /// runtime.declare_generic(GenericDef::new("speak").formals(["x"])).unwrap();
    /// runtime
    ///     .register_method("speak", ["Animal"], |_| Ok(Value::character("...")))
    ///     .unwrap();
    ///
    /// let dog = runtime.construct_default("Dog").unwrap();
    /// let said = runtime.dispatch("speak", &Arguments::new().with(dog)).unwrap();
    /// assert_eq!(said.as_str(), Some("..."));
    /// ```
    pub fn dispatch(&self, generic: &str, args: &Arguments) -> Result<Value> {
        self.dispatch_with_diagnostics(generic, args).map(|(value, _)| value)
    }

    /// Like [`dispatch`](Self::dispatch), but also returns the ambiguity
    /// note for this call's class tuple.
    ///
    /// The note is returned on every call that resolves to a tied method,
    /// cache hits included, so each caller sees its own diagnostic whatever
    /// other threads do with [`take_warnings`](Self::take_warnings).
    ///
    /// # Errors
    ///
    /// Same as [`dispatch`](Self::dispatch).
    pub fn dispatch_with_diagnostics(
        &self,
        generic: &str,
        args: &Arguments,
    ) -> Result<(Value, Option<DispatchWarning>)> {
        let resolution = self.resolve(generic, |classes, entry| {
            if args.len() > entry.def.formal_params().len() {
                return Err(DispatchError::ArgumentCountMismatch {
                    generic: generic.to_string(),
                    expected: entry.def.formal_params().len(),
                    got: args.len(),
                });
            }
            entry
                .dispatch
                .iter()
                .map(|&i| match args.get(i) {
                    Some(value) => concrete(classes, generic, value.class_name()),
                    None => Ok(Concrete::Missing),
                })
                .collect()
        })?;

        let cursor = Cell::new(0);
        let call = MethodCall {
            runtime: self,
            resolution: &resolution,
            method: &resolution.method,
            args,
            cursor: &cursor,
            depth: 0,
        };
        let value = (resolution.method.body)(&call)?;
        self.check_return(&resolution.generic, &value)?;
        Ok((value, resolution.ambiguity.clone()))
    }

    /// Signature of the method a call with these classes would run.
    ///
    /// `classes` has one entry per dispatch parameter; `MISSING` stands for
    /// an absent argument. The resolution is cached like a real call.
    ///
    /// # Errors
    ///
    /// Same resolution errors as [`dispatch`](Self::dispatch);
    /// [`DispatchError::ArgumentCountMismatch`] if the tuple length differs
    /// from the number of dispatch parameters.
    pub fn select_method(&self, generic: &str, classes: &[&str]) -> Result<Signature> {
        let resolution = self.resolve(generic, |registry, entry| {
            if classes.len() != entry.dispatch.len() {
                return Err(DispatchError::ArgumentCountMismatch {
                    generic: generic.to_string(),
                    expected: entry.dispatch.len(),
                    got: classes.len(),
                });
            }
            classes
                .iter()
                .map(|&class| {
                    if class == MISSING {
                        Ok(Concrete::Missing)
                    } else {
                        concrete(registry, generic, class)
                    }
                })
                .collect()
        })?;
        Ok(resolution.method.signature.clone())
    }

    /// Number of cached resolutions across all generics.
    #[must_use]
    pub fn cached_resolutions(&self) -> usize {
        self.cache.read().len()
    }

    /// Returns the cached resolution for the tuple `key` builds, computing
    /// and caching it on a miss.
    fn resolve<F>(&self, generic: &str, key: F) -> Result<Arc<Resolution>>
    where
        F: FnOnce(&ClassRegistry, &GenericEntry) -> Result<Vec<Concrete>, DispatchError>,
    {
        let classes = self.classes.read();
        let generics = self.generics.read();
        let entry = generics
            .get(generic)
            .ok_or_else(|| DefinitionError::UnknownGeneric {
                generic: generic.to_string(),
            })?;
        let key = key(&classes, entry)?;

        let cached = self.cache.read().get(generic, &key);
        if let Some(resolution) = cached {
            trace!(generic, method = %resolution.method.signature, "dispatch cache hit");
            return Ok(resolution);
        }

        let resolution = score(&classes, entry, &key, self.config)?;
        if let Some(ambiguity) = &resolution.ambiguity {
            if self.config.ambiguity == AmbiguityPolicy::Error {
                return Err(DispatchError::AmbiguousDispatch(ambiguity.clone()).into());
            }
            warn!(generic, "{ambiguity}");
            self.warnings.lock().push(ambiguity.clone());
        }

        trace!(generic, method = %resolution.method.signature, "dispatch resolved");
        let resolution = Arc::new(resolution);
        self.cache
            .write()
            .insert(generic, key, Arc::clone(&resolution));
        Ok(resolution)
    }

    fn check_return(&self, def: &GenericDef, value: &Value) -> Result<()> {
        let Some(expected) = def.return_class() else {
            return Ok(());
        };
        if self.classes.read().reaches(value.class_name(), expected) {
            Ok(())
        } else {
            Err(DispatchError::InvalidReturnType {
                generic: def.name().to_string(),
                expected: expected.to_string(),
                got: value.class_name().to_string(),
            }
            .into())
        }
    }
}

fn concrete(classes: &ClassRegistry, generic: &str, class: &str) -> Result<Concrete, DispatchError> {
    classes
        .lookup(class)
        .map(Concrete::Class)
        .ok_or_else(|| DispatchError::UnknownArgumentClass {
            generic: generic.to_string(),
            class: class.to_string(),
        })
}

fn key_names(classes: &ClassRegistry, key: &[Concrete]) -> Vec<String> {
    key.iter()
        .map(|c| match c {
            Concrete::Class(id) => classes.name(*id).to_string(),
            Concrete::Missing => MISSING.to_string(),
        })
        .collect()
}

/// Distance from one concrete position to one matcher, `None` if it does not
/// apply.
fn position_distance(
    classes: &ClassRegistry,
    concrete: Concrete,
    matcher: &Matcher,
) -> Option<u32> {
    match (matcher, concrete) {
        (Matcher::Any, _) => Some(classes.any_distance()),
        (Matcher::Missing, Concrete::Missing) => Some(0),
        (Matcher::Missing, Concrete::Class(_)) | (Matcher::Class(_), Concrete::Missing) => None,
        (Matcher::Class(name), Concrete::Class(id)) => {
            classes.distance_ids(id, classes.lookup(name)?)
        }
    }
}

/// Ranks every applicable method of `entry` for `key`.
fn score(
    classes: &ClassRegistry,
    entry: &GenericEntry,
    key: &[Concrete],
    config: RuntimeConfig,
) -> Result<Resolution, DispatchError> {
    let mut applicable: Vec<(u32, usize, &Arc<MethodDef>)> = Vec::new();
    'methods: for (index, method) in entry.methods.iter().enumerate() {
        let mut total = 0;
        for (matcher, &position) in method.signature.matchers().iter().zip(key) {
            match position_distance(classes, position, matcher) {
                Some(distance) => total += distance,
                None => continue 'methods,
            }
        }
        applicable.push((total, index, method));
    }

    applicable.sort_by(|a, b| {
        a.0.cmp(&b.0).then_with(|| match config.tie_break {
            TieBreak::Lexicographic => a
                .2
                .signature
                .lexical_cmp(&b.2.signature)
                .then(a.1.cmp(&b.1)),
            TieBreak::Registration => a.1.cmp(&b.1),
        })
    });

    let Some(((best, _, method), rest)) = applicable.split_first() else {
        return Err(DispatchError::NoApplicableMethod {
            generic: entry.def.name().to_string(),
            classes: key_names(classes, key),
        });
    };

    let tied: Vec<Signature> = rest
        .iter()
        .take_while(|(total, _, _)| total == best)
        .map(|(_, _, m)| m.signature.clone())
        .collect();
    let ambiguity = (!tied.is_empty()).then(|| DispatchWarning::AmbiguousDispatch {
        generic: entry.def.name().to_string(),
        classes: key_names(classes, key),
        chosen: method.signature.clone(),
        tied,
    });

    Ok(Resolution {
        generic: Arc::clone(&entry.def),
        method: Arc::clone(method),
        next: rest.iter().map(|(_, _, m)| Arc::clone(m)).collect(),
        ambiguity,
    })
}

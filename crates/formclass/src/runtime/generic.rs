//! Generic functions and their method tables.
//!
//! A generic is declared once with its formal parameters and the subset of
//! them that take part in dispatch. Methods are registered against a
//! [`Signature`]: one [`Matcher`] per dispatch parameter.
//!
//! Every change to a generic (redeclaration, method registration or removal)
//! drops the cached resolutions of that generic before the call returns.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use fxhash::FxHashMap;
use tracing::debug;

use crate::error::{DefinitionError, Result};
use crate::runtime::dispatch::MethodCall;
use crate::runtime::{ANY, MISSING, Runtime, Value};

/// Method implementation: an opaque callable receiving the call frame.
pub type MethodBody = Arc<dyn Fn(&MethodCall<'_>) -> Result<Value> + Send + Sync>;

/// One position of a [`Signature`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Matcher {
    /// Matches the class and its descendants.
    Class(String),
    /// Matches anything, including an absent argument, at the lowest
    /// precedence.
    Any,
    /// Matches only an absent argument.
    Missing,
}

impl Matcher {
    /// Name as written in signatures: the class name, `ANY`, or `MISSING`.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Matcher::Class(name) => name,
            Matcher::Any => ANY,
            Matcher::Missing => MISSING,
        }
    }
}

impl From<&str> for Matcher {
    fn from(name: &str) -> Self {
        match name {
            ANY => Matcher::Any,
            MISSING => Matcher::Missing,
            _ => Matcher::Class(name.to_string()),
        }
    }
}

impl From<String> for Matcher {
    fn from(name: String) -> Self {
        match name.as_str() {
            ANY => Matcher::Any,
            MISSING => Matcher::Missing,
            _ => Matcher::Class(name),
        }
    }
}

/// Ordered tuple of matchers, one per dispatch parameter.
///
/// # Example
///
/// ```rust
/// use formclass::{Matcher, Signature};
///
/// let sig = Signature::from(["Circle", "ANY"]);
/// assert_eq!(sig.matchers()[1], Matcher::Any);
/// assert_eq!(sig.to_string(), "(Circle, ANY)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(Vec<Matcher>);

impl Signature {
    /// Builds a signature from anything convertible to matchers.
    pub fn new<I, M>(matchers: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Matcher>,
    {
        Self(matchers.into_iter().map(Into::into).collect())
    }

    /// The matchers in dispatch-parameter order.
    #[must_use]
    pub fn matchers(&self) -> &[Matcher] {
        &self.0
    }

    /// Number of positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for the zero-length signature.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compares matcher names position by position.
    ///
    /// This is the deterministic tie-break between signatures at the same
    /// total distance.
    #[must_use]
    pub fn lexical_cmp(&self, other: &Self) -> Ordering {
        self.0
            .iter()
            .map(Matcher::name)
            .cmp(other.0.iter().map(Matcher::name))
    }
}

impl<M: Into<Matcher>, const N: usize> From<[M; N]> for Signature {
    fn from(matchers: [M; N]) -> Self {
        Self::new(matchers)
    }
}

impl<M: Into<Matcher>> From<Vec<M>> for Signature {
    fn from(matchers: Vec<M>) -> Self {
        Self::new(matchers)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, matcher) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(matcher.name())?;
        }
        f.write_str(")")
    }
}

/// Declaration of a generic function.
///
/// Dispatch parameters default to all formals when none are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericDef {
    name: String,
    formals: Vec<String>,
    dispatch: Vec<String>,
    value_class: Option<String>,
}

impl GenericDef {
    /// Starts a declaration with no formals.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            formals: Vec::new(),
            dispatch: Vec::new(),
            value_class: None,
        }
    }

    /// Sets the ordered formal parameters.
    #[must_use]
    pub fn formals<I, S>(mut self, formals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.formals = formals.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts dispatch to the named formals, in this order.
    #[must_use]
    pub fn dispatch_on<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dispatch = params.into_iter().map(Into::into).collect();
        self
    }

    /// Declares the class every result must reach.
    #[must_use]
    pub fn returns(mut self, class: impl Into<String>) -> Self {
        self.value_class = Some(class.into());
        self
    }

    /// Generic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Formal parameters, in call order.
    #[must_use]
    pub fn formal_params(&self) -> &[String] {
        &self.formals
    }

    /// Dispatch parameters, in signature order.
    #[must_use]
    pub fn dispatch_params(&self) -> &[String] {
        if self.dispatch.is_empty() {
            &self.formals
        } else {
            &self.dispatch
        }
    }

    /// Declared return class, if any.
    #[must_use]
    pub fn return_class(&self) -> Option<&str> {
        self.value_class.as_deref()
    }
}

/// A method registered under a generic.
pub struct MethodDef {
    pub(crate) generic: String,
    pub(crate) signature: Signature,
    pub(crate) body: MethodBody,
}

impl MethodDef {
    /// The generic this method belongs to.
    #[must_use]
    pub fn generic(&self) -> &str {
        &self.generic
    }

    /// The signature it was registered under.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("generic", &self.generic)
            .field("signature", &self.signature.to_string())
            .finish_non_exhaustive()
    }
}

/// Methods of one generic in registration order.
#[derive(Debug, Default)]
pub(crate) struct MethodTable {
    methods: Vec<Arc<MethodDef>>,
}

impl MethodTable {
    /// Adds a method, replacing in place one with an identical signature.
    ///
    /// Returns `true` if an existing method was replaced.
    fn insert(&mut self, method: MethodDef) -> bool {
        let method = Arc::new(method);
        if let Some(slot) = self
            .methods
            .iter_mut()
            .find(|m| m.signature == method.signature)
        {
            *slot = method;
            true
        } else {
            self.methods.push(method);
            false
        }
    }

    fn remove(&mut self, signature: &Signature) -> bool {
        let before = self.methods.len();
        self.methods.retain(|m| &m.signature != signature);
        before != self.methods.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<MethodDef>> {
        self.methods.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.methods.len()
    }
}

/// A declared generic and its methods.
#[derive(Debug)]
pub(crate) struct GenericEntry {
    pub(crate) def: Arc<GenericDef>,
    /// Positions of the dispatch parameters among the formals.
    pub(crate) dispatch: Vec<usize>,
    pub(crate) methods: MethodTable,
}

/// All generics of one runtime.
#[derive(Debug, Default)]
pub(crate) struct GenericRegistry {
    generics: FxHashMap<String, GenericEntry>,
}

impl GenericRegistry {
    pub(crate) fn get(&self, name: &str) -> Option<&GenericEntry> {
        self.generics.get(name)
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.generics.keys().map(String::as_str)
    }
}

fn unknown_generic(generic: &str) -> DefinitionError {
    DefinitionError::UnknownGeneric {
        generic: generic.to_string(),
    }
}

impl Runtime {
    /// Declares (or redeclares) a generic function.
    ///
    /// Existing methods survive a redeclaration only when the dispatch
    /// parameter list is unchanged. Cached resolutions for the generic are
    /// dropped either way.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError::UnknownDispatchParameter`] for a dispatch
    ///   parameter that is not a formal
    /// - [`DefinitionError::UnknownReturnClass`] for an undefined return class
    pub fn declare_generic(&self, def: GenericDef) -> Result<()> {
        let classes = self.classes.read();

        let mut errors = Vec::new();
        let mut dispatch = Vec::with_capacity(def.dispatch_params().len());
        for param in def.dispatch_params() {
            match def.formal_params().iter().position(|f| f == param) {
                Some(index) => dispatch.push(index),
                None => errors.push(DefinitionError::UnknownDispatchParameter {
                    generic: def.name().to_string(),
                    parameter: param.clone(),
                }),
            }
        }
        if let Some(class) = def.return_class() {
            if class != ANY && classes.lookup(class).is_none() {
                errors.push(DefinitionError::UnknownReturnClass {
                    generic: def.name().to_string(),
                    class: class.to_string(),
                });
            }
        }
        if let Some(error) = DefinitionError::collect(errors) {
            return Err(error.into());
        }

        let name = def.name().to_string();
        let mut generics = self.generics.write();
        let methods = match generics.generics.remove(&name) {
            Some(old) if old.def.dispatch_params() == def.dispatch_params() => {
                old.methods
            }
            Some(old) => {
                debug!(
                    generic = %name,
                    dropped = old.methods.len(),
                    "dispatch parameters changed, methods dropped"
                );
                MethodTable::default()
            }
            None => MethodTable::default(),
        };
        generics.generics.insert(
            name.clone(),
            GenericEntry {
                def: Arc::new(def),
                dispatch,
                methods,
            },
        );
        self.cache.write().invalidate_generic(&name);

        debug!(generic = %name, "generic declared");
        Ok(())
    }

    /// Registers a method for `generic` under `signature`.
    ///
    /// An existing method with an identical signature is replaced.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError::UnknownGeneric`] if `generic` is not declared
    /// - [`DefinitionError::SignatureArityMismatch`] if the signature length
    ///   differs from the number of dispatch parameters
    /// - [`DefinitionError::UnknownSignatureClass`] for each undefined class
    ///
    /// # Example
    ///
    /// ```rust
    /// use formclass::{ClassDef, GenericDef, Runtime, Value};
    ///
    /// let runtime = Runtime::new();
    /// runtime.define_class(ClassDef::new("Dog")).unwrap();
    /// runtime
    ///     .declare_generic(GenericDef::new("speak").formals(["x"]))
    ///     .unwrap();
    /// runtime
    ///     .register_method("speak", ["Dog"], |_| Ok(Value::character("woof")))
    ///     .unwrap();
    ///
    /// assert_eq!(runtime.list_methods("speak").unwrap().len(), 1);
    /// ```
    pub fn register_method<S, F>(&self, generic: &str, signature: S, body: F) -> Result<()>
    where
        S: Into<Signature>,
        F: Fn(&MethodCall<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        let signature = signature.into();
        let classes = self.classes.read();
        let mut generics = self.generics.write();
        let entry = generics
            .generics
            .get_mut(generic)
            .ok_or_else(|| unknown_generic(generic))?;

        let mut errors = Vec::new();
        if signature.len() != entry.dispatch.len() {
            errors.push(DefinitionError::SignatureArityMismatch {
                generic: generic.to_string(),
                expected: entry.dispatch.len(),
                got: signature.len(),
            });
        }
        for matcher in signature.matchers() {
            if let Matcher::Class(class) = matcher {
                if classes.lookup(class).is_none() {
                    errors.push(DefinitionError::UnknownSignatureClass {
                        generic: generic.to_string(),
                        class: class.clone(),
                    });
                }
            }
        }
        if let Some(error) = DefinitionError::collect(errors) {
            return Err(error.into());
        }

        debug!(generic, signature = %signature, "method registered");
        let replaced = entry.methods.insert(MethodDef {
            generic: generic.to_string(),
            signature,
            body: Arc::new(body),
        });
        self.cache.write().invalidate_generic(generic);
        if replaced {
            debug!(generic, "previous method with this signature replaced");
        }
        Ok(())
    }

    /// Removes the method registered under exactly `signature`.
    ///
    /// Returns `false` if there was none.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::UnknownGeneric`] if `generic` is not
    /// declared.
    pub fn remove_method(&self, generic: &str, signature: impl Into<Signature>) -> Result<bool> {
        let signature = signature.into();
        let mut generics = self.generics.write();
        let entry = generics
            .generics
            .get_mut(generic)
            .ok_or_else(|| unknown_generic(generic))?;

        let removed = entry.methods.remove(&signature);
        if removed {
            self.cache.write().invalidate_generic(generic);
            debug!(generic, signature = %signature, "method removed");
        }
        Ok(removed)
    }

    /// Signatures registered for `generic`, in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::UnknownGeneric`] if `generic` is not
    /// declared.
    pub fn list_methods(&self, generic: &str) -> Result<Vec<Signature>> {
        let generics = self.generics.read();
        let entry = generics
            .get(generic)
            .ok_or_else(|| unknown_generic(generic))?;
        Ok(entry.methods.iter().map(|m| m.signature.clone()).collect())
    }

    /// Returns `true` if a method is registered under exactly `signature`.
    pub fn exists_method(&self, generic: &str, signature: impl Into<Signature>) -> bool {
        let signature = signature.into();
        self.generics
            .read()
            .get(generic)
            .is_some_and(|e| e.methods.iter().any(|m| m.signature == signature))
    }

    /// Returns `true` if `name` is a declared generic.
    #[must_use]
    pub fn is_generic(&self, name: &str) -> bool {
        self.generics.read().get(name).is_some()
    }

    /// Current declaration of `name`.
    #[must_use]
    pub fn generic_def(&self, name: &str) -> Option<GenericDef> {
        self.generics.read().get(name).map(|e| e.def.as_ref().clone())
    }
}

//! Error types for the `formclass` runtime.
//!
//! Errors are grouped the way callers react to them:
//!
//! - [`DefinitionError`]: defining classes, declaring generics, registering
//!   methods. The registries are left untouched.
//! - [`ConstructionError`]: building, validating, or assigning into instances.
//! - [`DispatchError`]: resolving or invoking a generic call.
//!
//! [`DispatchWarning`] is not a failure. It travels on the runtime's warning
//! channel and is returned by `Runtime::dispatch_with_diagnostics`; the call
//! that produced it still returns a value.

use std::fmt;

use thiserror::Error;

use crate::runtime::Signature;

/// Errors that can occur in the `formclass` runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A class, generic, or method definition was rejected.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// An instance could not be built, validated, or assigned into.
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    /// A generic call could not be resolved or completed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Failure raised by a user-supplied method body.
    #[error("{0}")]
    Method(String),
}

impl Error {
    /// Builds an [`Error::Method`] from any displayable message.
    ///
    /// Method bodies use this to fail a call with their own diagnostics.
    pub fn method(message: impl fmt::Display) -> Self {
        Error::Method(message.to_string())
    }
}

/// Errors raised while changing the class, generic, or method registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// A parent named in a class definition is not registered.
    #[error("class '{class}': parent class '{parent}' is not defined")]
    UnknownParentClass {
        /// The class being defined.
        class: String,
        /// The missing parent.
        parent: String,
    },

    /// The class exists and was sealed, so it cannot be redefined.
    #[error("class '{class}' is sealed and cannot be redefined")]
    DuplicateSealedClass {
        /// The sealed class.
        class: String,
    },

    /// Adding the parent would make the class its own ancestor.
    #[error("class '{class}': inheriting from '{parent}' creates a cycle")]
    CyclicInheritance {
        /// The class being defined.
        class: String,
        /// The parent closing the cycle.
        parent: String,
    },

    /// A slot's declared type is neither a primitive kind, `ANY`, nor a class.
    #[error("class '{class}': slot '{slot}' has undefined type '{type_name}'")]
    UnknownSlotType {
        /// The class being defined.
        class: String,
        /// The offending slot.
        slot: String,
        /// The declared type that could not be found.
        type_name: String,
    },

    /// `ANY` and `MISSING` are sentinels, not definable classes.
    #[error("'{class}' is a reserved name and cannot be defined as a class")]
    ReservedClassName {
        /// The rejected name.
        class: String,
    },

    /// The same slot name appears twice in one definition.
    #[error("class '{class}': slot '{slot}' is declared more than once")]
    DuplicateSlot {
        /// The class being defined.
        class: String,
        /// The repeated slot.
        slot: String,
    },

    /// A prototype default names a slot the class does not have.
    #[error("class '{class}': prototype sets '{slot}', which is not a slot")]
    UnknownPrototypeSlot {
        /// The class being defined.
        class: String,
        /// The unknown slot.
        slot: String,
    },

    /// The generic has not been declared.
    #[error("no generic function named '{generic}'")]
    UnknownGeneric {
        /// The requested generic.
        generic: String,
    },

    /// A dispatch parameter is not one of the generic's formals.
    #[error("generic '{generic}': '{parameter}' is not a formal parameter")]
    UnknownDispatchParameter {
        /// The generic being declared.
        generic: String,
        /// The parameter that was not found.
        parameter: String,
    },

    /// The declared return class is not registered.
    #[error("generic '{generic}': return class '{class}' is not defined")]
    UnknownReturnClass {
        /// The generic being declared.
        generic: String,
        /// The missing class.
        class: String,
    },

    /// A signature has a different length than the dispatch parameter list.
    #[error(
        "generic '{generic}': signature has {got} entries, expected {expected}"
    )]
    SignatureArityMismatch {
        /// The target generic.
        generic: String,
        /// Number of dispatch parameters.
        expected: usize,
        /// Length of the provided signature.
        got: usize,
    },

    /// A signature names a class that is not registered.
    #[error("generic '{generic}': signature class '{class}' is not defined")]
    UnknownSignatureClass {
        /// The target generic.
        generic: String,
        /// The missing class.
        class: String,
    },

    /// Several violations found by a single definition attempt.
    #[error("{}", join_all(.0))]
    Multiple(Vec<DefinitionError>),
}

impl DefinitionError {
    /// Collapses a list of violations into one error.
    ///
    /// Returns `None` for an empty list and the violation itself when there
    /// is exactly one.
    pub(crate) fn collect(mut errors: Vec<DefinitionError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(DefinitionError::Multiple(errors)),
        }
    }

    /// Iterates over the individual violations.
    ///
    /// A non-aggregate error yields only itself.
    pub fn violations(&self) -> impl Iterator<Item = &DefinitionError> {
        let slice: &[DefinitionError] = match self {
            DefinitionError::Multiple(all) => all,
            single => std::slice::from_ref(single),
        };
        slice.iter()
    }
}

/// Errors raised while building or mutating instances.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstructionError {
    /// The class is not registered.
    #[error("class '{class}' is not defined")]
    UnknownClass {
        /// The requested class.
        class: String,
    },

    /// Virtual classes exist only as parents and cannot be instantiated.
    #[error("cannot construct an instance of virtual class '{class}'")]
    VirtualClass {
        /// The requested class.
        class: String,
    },

    /// The instance has no slot of that name.
    #[error("no slot '{slot}' in an object of class '{class}'")]
    NoSuchSlot {
        /// The instance's class.
        class: String,
        /// The requested slot.
        slot: String,
    },

    /// A checked assignment supplied a value of the wrong class.
    #[error(
        "slot '{slot}' of class '{class}' requires '{expected}', got '{got}'"
    )]
    SlotTypeMismatch {
        /// The instance's class.
        class: String,
        /// The slot being assigned.
        slot: String,
        /// The declared slot type.
        expected: String,
        /// The class of the supplied value.
        got: String,
    },

    /// Every type and validity violation found for an instance.
    #[error("invalid '{class}' object: {}", join_all(.violations))]
    ValidityFailure {
        /// The instance's class.
        class: String,
        /// All violations, in the order they were found.
        violations: Vec<Violation>,
    },
}

/// One problem found while validating an instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    /// A provided value names a slot the class does not have.
    #[error("invalid name for slot: '{slot}'")]
    UnknownSlot {
        /// The unknown slot.
        slot: String,
    },
    /// A slot value does not reach the declared slot type.
    #[error(
        "invalid object for slot '{slot}': got class '{got}', should be or extend class '{expected}'"
    )]
    SlotTypeMismatch {
        /// The slot.
        slot: String,
        /// Declared type.
        expected: String,
        /// Class of the value found.
        got: String,
    },
    /// The class declares a slot that the instance lacks.
    #[error("missing slot '{slot}'")]
    MissingSlot {
        /// The absent slot.
        slot: String,
    },
    /// A message reported by the validity function of `class`.
    #[error("{message}")]
    Message {
        /// The class whose validity function reported the problem.
        class: String,
        /// The reported text.
        message: String,
    },
}

impl ConstructionError {
    /// Returns the violation list of a [`ConstructionError::ValidityFailure`].
    ///
    /// Other variants have no violation list and yield an empty slice.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            ConstructionError::ValidityFailure { violations, .. } => violations,
            _ => &[],
        }
    }

    /// Renders every violation as one message string each.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.violations().iter().map(ToString::to_string).collect()
    }
}

/// Errors raised by a generic call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// No registered signature accepts the concrete argument classes.
    #[error(
        "unable to find an inherited method for '{generic}' for signature ({})",
        .classes.join(", ")
    )]
    NoApplicableMethod {
        /// The called generic.
        generic: String,
        /// The concrete class tuple, `MISSING` for absent arguments.
        classes: Vec<String>,
    },

    /// `call_next` was invoked after every candidate was used.
    #[error("no next method available for '{generic}' from method {signature}")]
    NoNextMethod {
        /// The called generic.
        generic: String,
        /// The method that asked for a next method.
        signature: Signature,
    },

    /// The result does not reach the generic's declared return class.
    #[error(
        "'{generic}' must return an object of class '{expected}', got '{got}'"
    )]
    InvalidReturnType {
        /// The called generic.
        generic: String,
        /// The declared return class.
        expected: String,
        /// Class of the returned value.
        got: String,
    },

    /// More arguments were supplied than the generic has formals.
    #[error("'{generic}' takes {expected} arguments, got {got}")]
    ArgumentCountMismatch {
        /// The called generic.
        generic: String,
        /// Number of formal parameters.
        expected: usize,
        /// Number of supplied arguments.
        got: usize,
    },

    /// An argument's class is not registered in this runtime.
    #[error("'{generic}': argument class '{class}' is not defined")]
    UnknownArgumentClass {
        /// The called generic.
        generic: String,
        /// The unregistered class.
        class: String,
    },

    /// An ambiguous resolution escalated by [`AmbiguityPolicy::Error`].
    ///
    /// [`AmbiguityPolicy::Error`]: crate::runtime::AmbiguityPolicy::Error
    #[error("{0}")]
    AmbiguousDispatch(DispatchWarning),
}

/// Non-fatal diagnostics produced while resolving a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchWarning {
    /// Two or more signatures tied for the minimum total distance.
    #[error(
        "note: method with signature {chosen} chosen for '{generic}', target signature ({}): {} would also be valid",
        .classes.join(", "),
        join_with(.tied, ", ")
    )]
    AmbiguousDispatch {
        /// The called generic.
        generic: String,
        /// The concrete class tuple.
        classes: Vec<String>,
        /// The signature that was selected.
        chosen: Signature,
        /// The other signatures at the same distance.
        tied: Vec<Signature>,
    },
}

fn join_all<T: fmt::Display>(items: &[T]) -> String {
    join_with(items, "; ")
}

fn join_with<T: fmt::Display>(items: &[T], separator: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Result type for `formclass` runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

//! `formclass`: formal classes and multiple dispatch for Rust hosts
//!
//! `formclass` is a dynamic class system with typed slots and generic
//! functions that dispatch on the classes of several arguments at once. It
//! provides:
//!
//! - **Formal classes** with typed slots, prototypes, validity functions and
//!   multiple inheritance
//! - **Checked instances** built from prototype defaults and validated
//!   against the whole ancestor chain
//! - **Multiple dispatch** by summed inheritance distance, with `ANY` and
//!   `MISSING` matchers and next-method chaining
//! - **Resolution caching** invalidated precisely on class and method changes
//! - **Introspection** over classes, slots, generics and methods
//!
//! # Architecture
//!
//! Everything hangs off a [`Runtime`]:
//!
//! - **Class registry**: an arena of class entries with precomputed ancestor
//!   distances
//! - **Generic registry**: generic declarations and their method tables
//! - **Dispatch cache**: resolutions keyed by concrete class tuple
//!
//! Diagnostics are emitted through [`tracing`]; install any subscriber to see
//! them.
//!
//! # Example
//!
//! ```rust
//! use formclass::{Arguments, ClassDef, GenericDef, Runtime, Value};
//!
//! let runtime = Runtime::new();
//! runtime.define_class(ClassDef::new("Animal").slot("name", "character")).unwrap();
//! runtime.define_class(ClassDef::new("Dog").contains("Animal")).unwrap();
//! runtime.declare_generic(GenericDef::new("greet").formals(["a", "b"])).unwrap();
//! runtime
//!     .register_method("greet", ["Dog", "Dog"], |_| Ok(Value::character("sniff")))
//!     .unwrap();
//! runtime
//!     .register_method("greet", ["Animal", "ANY"], |_| Ok(Value::character("nod")))
//!     .unwrap();
//!
//! let rex = runtime.construct("Dog", [("name", Value::character("Rex"))]).unwrap();
//! let fido = runtime.construct("Dog", [("name", Value::character("Fido"))]).unwrap();
//!
//! let both = Arguments::new().with(rex.clone()).with(fido);
//! assert_eq!(runtime.dispatch("greet", &both).unwrap().as_str(), Some("sniff"));
//!
//! let alone = Arguments::new().with(rex);
//! assert_eq!(runtime.dispatch("greet", &alone).unwrap().as_str(), Some("nod"));
//! ```

pub mod error;
pub mod runtime;

// Re-export commonly used types
pub use error::{
    ConstructionError, DefinitionError, DispatchError, DispatchWarning, Error, Result,
    Violation,
};
pub use runtime::{
    ANY, AmbiguityPolicy, Arguments, ClassDef, ForeignObject, ForeignRef,
    GenericDef, Instance, MISSING, Matcher, MethodCall, Runtime, RuntimeConfig, Signature,
    SlotSpec, TieBreak, Value,
};

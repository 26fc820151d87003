//! Integration tests for multiple dispatch.
//!
//! Covers distance scoring, `ANY` and `MISSING` precedence, ambiguity
//! handling, cache invalidation and next-method chains.
//!
//! Run with: `cargo test --test dispatch_test`

mod common;

use common::{chained, define_diamond, label, runtime};
use formclass::{
    AmbiguityPolicy, Arguments, ClassDef, DispatchError, DispatchWarning, Error, GenericDef,
    Runtime, RuntimeConfig, Signature, TieBreak, Value,
};

fn object(runtime: &Runtime, class: &str) -> Value {
    runtime.construct_default(class).unwrap().into()
}

fn call2(runtime: &Runtime, generic: &str, a: &str, b: &str) -> formclass::Result<Value> {
    let args = Arguments::new()
        .with(object(runtime, a))
        .with(object(runtime, b));
    runtime.dispatch(generic, &args)
}

fn text(value: formclass::Result<Value>) -> String {
    value.unwrap().as_str().unwrap_or_default().to_string()
}

// ============================================================================
// Distances
// ============================================================================

#[test]
fn test_distance_to_self_is_zero() {
    let runtime = runtime();
    define_diamond(&runtime);

    for class in runtime.class_names() {
        assert_eq!(runtime.distance(&class, &class), Some(0), "{class}");
    }
}

#[test]
fn test_diamond_distances() {
    let runtime = runtime();
    define_diamond(&runtime);

    assert_eq!(runtime.distance("BC", "B"), Some(1));
    assert_eq!(runtime.distance("BC", "C"), Some(1));
    assert_eq!(runtime.distance("BC", "A"), Some(2));
    assert_eq!(runtime.distance("B", "C"), None);
}

#[test]
fn test_any_distance_tracks_graph_depth() {
    let runtime = runtime();
    define_diamond(&runtime);
    assert_eq!(runtime.distance("A", "ANY"), Some(3));

    runtime.define_class(ClassDef::new("Deep").contains("BC")).unwrap();
    assert_eq!(runtime.distance("A", "ANY"), Some(4));
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_exact_match_beats_ancestor() {
    let runtime = runtime();
    runtime.define_class(ClassDef::new("Base")).unwrap();
    runtime.define_class(ClassDef::new("Derived").contains("Base")).unwrap();
    runtime
        .declare_generic(GenericDef::new("meet").formals(["x", "y"]))
        .unwrap();
    runtime.register_method("meet", ["Base", "Base"], label("base")).unwrap();
    runtime
        .register_method("meet", ["Derived", "Derived"], label("derived"))
        .unwrap();

    assert_eq!(text(call2(&runtime, "meet", "Derived", "Derived")), "derived");
    assert_eq!(text(call2(&runtime, "meet", "Derived", "Base")), "base");
    assert!(runtime.take_warnings().is_empty());
}

#[test]
fn test_diamond_dispatch_prefers_nearer_parent() {
    let runtime = runtime();
    define_diamond(&runtime);
    runtime.declare_generic(GenericDef::new("f").formals(["x"])).unwrap();
    runtime.register_method("f", ["A"], label("A")).unwrap();
    runtime.register_method("f", ["C"], label("C")).unwrap();

    let args = Arguments::new().with(object(&runtime, "BC"));
    assert_eq!(text(runtime.dispatch("f", &args)), "C");
}

#[test]
fn test_tie_resolves_lexically_and_cache_is_refreshed() {
    let runtime = runtime();
    runtime.define_class(ClassDef::new("A1")).unwrap();
    runtime.define_class(ClassDef::new("A2").contains("A1")).unwrap();
    runtime
        .declare_generic(GenericDef::new("pair").formals(["x", "y"]))
        .unwrap();
    runtime.register_method("pair", ["A2", "A1"], label("A2,A1")).unwrap();
    runtime.register_method("pair", ["A1", "A2"], label("A1,A2")).unwrap();

    assert_eq!(text(call2(&runtime, "pair", "A2", "A2")), "A1,A2");
    let warnings = runtime.take_warnings();
    assert_eq!(warnings.len(), 1);
    let DispatchWarning::AmbiguousDispatch { chosen, tied, .. } = &warnings[0];
    assert_eq!(chosen, &Signature::from(["A1", "A2"]));
    assert_eq!(tied, &[Signature::from(["A2", "A1"])]);

    // Cache hits do not repeat the warning.
    assert_eq!(text(call2(&runtime, "pair", "A2", "A2")), "A1,A2");
    assert!(runtime.take_warnings().is_empty());

    runtime.register_method("pair", ["A2", "A2"], label("A2,A2")).unwrap();
    assert_eq!(text(call2(&runtime, "pair", "A2", "A2")), "A2,A2");
    assert!(runtime.take_warnings().is_empty());
}

#[test]
fn test_every_ambiguous_call_reports_its_note() {
    let runtime = runtime();
    runtime.define_class(ClassDef::new("A1")).unwrap();
    runtime.define_class(ClassDef::new("A2").contains("A1")).unwrap();
    runtime
        .declare_generic(GenericDef::new("pair").formals(["x", "y"]))
        .unwrap();
    runtime.register_method("pair", ["A2", "A1"], label("A2,A1")).unwrap();
    runtime.register_method("pair", ["A1", "A2"], label("A1,A2")).unwrap();

    let args = Arguments::new()
        .with(object(&runtime, "A2"))
        .with(object(&runtime, "A2"));
    let (first, first_note) = runtime.dispatch_with_diagnostics("pair", &args).unwrap();
    // Another caller drains the shared channel in between.
    assert_eq!(runtime.take_warnings().len(), 1);
    let (second, second_note) = runtime.dispatch_with_diagnostics("pair", &args).unwrap();

    assert_eq!(first.as_str(), Some("A1,A2"));
    assert_eq!(second.as_str(), Some("A1,A2"));
    assert_eq!(runtime.cached_resolutions(), 1);
    let first_note = first_note.unwrap();
    assert_eq!(Some(first_note.clone()), second_note);
    let DispatchWarning::AmbiguousDispatch { chosen, classes, .. } = first_note;
    assert_eq!(chosen, Signature::from(["A1", "A2"]));
    assert_eq!(classes, ["A2", "A2"]);

    let plain = Arguments::new()
        .with(object(&runtime, "A1"))
        .with(object(&runtime, "A2"));
    let (value, note) = runtime.dispatch_with_diagnostics("pair", &plain).unwrap();
    assert_eq!(value.as_str(), Some("A1,A2"));
    assert!(note.is_none());
}

#[test]
fn test_registration_tie_break() {
    let config = RuntimeConfig::default().tie_break(TieBreak::Registration);
    let runtime = Runtime::with_config(config);
    runtime.define_class(ClassDef::new("A1")).unwrap();
    runtime.define_class(ClassDef::new("A2").contains("A1")).unwrap();
    runtime
        .declare_generic(GenericDef::new("pair").formals(["x", "y"]))
        .unwrap();
    runtime.register_method("pair", ["A2", "A1"], label("A2,A1")).unwrap();
    runtime.register_method("pair", ["A1", "A2"], label("A1,A2")).unwrap();

    assert_eq!(text(call2(&runtime, "pair", "A2", "A2")), "A2,A1");
    assert_eq!(runtime.take_warnings().len(), 1);
}

#[test]
fn test_ambiguity_policy_error() {
    let config = RuntimeConfig::default().ambiguity(AmbiguityPolicy::Error);
    let runtime = Runtime::with_config(config);
    runtime.define_class(ClassDef::new("A1")).unwrap();
    runtime.define_class(ClassDef::new("A2").contains("A1")).unwrap();
    runtime
        .declare_generic(GenericDef::new("pair").formals(["x", "y"]))
        .unwrap();
    runtime.register_method("pair", ["A2", "A1"], label("A2,A1")).unwrap();
    runtime.register_method("pair", ["A1", "A2"], label("A1,A2")).unwrap();

    let err = call2(&runtime, "pair", "A2", "A2").unwrap_err();
    assert!(matches!(
        err,
        Error::Dispatch(DispatchError::AmbiguousDispatch(_))
    ));
    assert_eq!(runtime.cached_resolutions(), 0);
    assert!(runtime.take_warnings().is_empty());
}

#[test]
fn test_missing_beats_any_for_absent_argument() {
    let runtime = runtime();
    runtime.define_class(ClassDef::new("C")).unwrap();
    runtime
        .declare_generic(GenericDef::new("g").formals(["x", "y"]))
        .unwrap();
    runtime.register_method("g", ["C", "ANY"], label("any")).unwrap();
    runtime.register_method("g", ["C", "MISSING"], label("missing")).unwrap();

    let one = Arguments::new().with(object(&runtime, "C"));
    assert_eq!(text(runtime.dispatch("g", &one)), "missing");

    let explicit = Arguments::new().with(object(&runtime, "C")).missing();
    assert_eq!(text(runtime.dispatch("g", &explicit)), "missing");

    let two = Arguments::new()
        .with(object(&runtime, "C"))
        .with(Value::numeric(1.0));
    assert_eq!(text(runtime.dispatch("g", &two)), "any");
    assert!(runtime.take_warnings().is_empty());
}

#[test]
fn test_dispatch_on_subset_of_formals() {
    let runtime = runtime();
    runtime.define_class(ClassDef::new("C")).unwrap();
    runtime
        .declare_generic(
            GenericDef::new("scale")
                .formals(["x", "factor", "verbose"])
                .dispatch_on(["factor"]),
        )
        .unwrap();
    runtime
        .register_method("scale", ["numeric"], |call| {
            let factor = call.arg("factor").and_then(Value::as_f64).unwrap_or(1.0);
            Ok(Value::numeric(factor * 2.0))
        })
        .unwrap();

    let args = Arguments::new()
        .with(object(&runtime, "C"))
        .with(Value::integer(4));
    assert_eq!(runtime.dispatch("scale", &args).unwrap(), Value::numeric(8.0));
}

#[test]
fn test_unknown_argument_class() {
    #[derive(Debug)]
    struct Stranger;

    impl formclass::ForeignObject for Stranger {
        fn class_tag(&self) -> &str {
            "Unregistered"
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    let runtime = runtime();
    runtime.declare_generic(GenericDef::new("f").formals(["x"])).unwrap();
    runtime.register_method("f", ["ANY"], label("any")).unwrap();

    let err = runtime
        .dispatch("f", &Arguments::new().with(Value::foreign(Stranger)))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Dispatch(DispatchError::UnknownArgumentClass { .. })
    ));
}

#[test]
fn test_foreign_objects_dispatch_through_virtual_class() {
    #[derive(Debug)]
    struct Socket;

    impl formclass::ForeignObject for Socket {
        fn class_tag(&self) -> &str {
            "Socket"
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    let runtime = runtime();
    runtime.define_class(ClassDef::foreign("Stream")).unwrap();
    runtime
        .define_class(ClassDef::foreign("Socket").contains("Stream"))
        .unwrap();
    runtime.declare_generic(GenericDef::new("close").formals(["x"])).unwrap();
    runtime.register_method("close", ["Stream"], label("stream")).unwrap();

    let args = Arguments::new().with(Value::foreign(Socket));
    assert_eq!(text(runtime.dispatch("close", &args)), "stream");
    assert!(runtime.construct_default("Socket").is_err());
}

// ============================================================================
// Cache invalidation
// ============================================================================

#[test]
fn test_class_redefinition_invalidates_resolution() {
    let runtime = runtime();
    runtime.define_class(ClassDef::new("Root")).unwrap();
    runtime.define_class(ClassDef::new("Other")).unwrap();
    runtime.define_class(ClassDef::new("Mid").contains("Root")).unwrap();
    runtime.define_class(ClassDef::new("Leaf").contains("Mid")).unwrap();
    runtime.declare_generic(GenericDef::new("f").formals(["x"])).unwrap();
    runtime.register_method("f", ["Root"], label("root")).unwrap();
    runtime.register_method("f", ["Other"], label("other")).unwrap();

    let leaf = Arguments::new().with(object(&runtime, "Leaf"));
    assert_eq!(text(runtime.dispatch("f", &leaf)), "root");

    runtime.define_class(ClassDef::new("Mid").contains("Other")).unwrap();
    assert_eq!(text(runtime.dispatch("f", &leaf)), "other");
}

#[test]
fn test_method_removal_invalidates_resolution() {
    let runtime = runtime();
    define_diamond(&runtime);
    runtime.declare_generic(GenericDef::new("f").formals(["x"])).unwrap();
    runtime.register_method("f", ["A"], label("A")).unwrap();
    runtime.register_method("f", ["B"], label("B")).unwrap();

    let args = Arguments::new().with(object(&runtime, "BC"));
    assert_eq!(text(runtime.dispatch("f", &args)), "B");

    assert!(runtime.remove_method("f", ["B"]).unwrap());
    assert_eq!(text(runtime.dispatch("f", &args)), "A");
}

// ============================================================================
// Next-method chains
// ============================================================================

#[test]
fn test_next_method_chain_terminates() {
    let runtime = runtime();
    runtime.define_class(ClassDef::new("C")).unwrap();
    runtime.define_class(ClassDef::new("B").contains("C")).unwrap();
    runtime.define_class(ClassDef::new("A").contains("B")).unwrap();
    runtime.declare_generic(GenericDef::new("walk").formals(["x"])).unwrap();
    runtime.register_method("walk", ["A"], chained("A")).unwrap();
    runtime.register_method("walk", ["B"], chained("B")).unwrap();
    runtime
        .register_method("walk", ["C"], |call| {
            assert_eq!(call.depth(), 2);
            assert_eq!(call.signature(), &Signature::from(["C"]));
            call.call_next()
        })
        .unwrap();

    let args = Arguments::new().with(object(&runtime, "A"));
    let err = runtime.dispatch("walk", &args).unwrap_err();
    let Error::Dispatch(DispatchError::NoNextMethod { signature, .. }) = err else {
        panic!("expected NoNextMethod, got {err:?}");
    };
    assert_eq!(signature, Signature::from(["C"]));
}

#[test]
fn test_next_method_reaches_root() {
    let runtime = runtime();
    runtime.define_class(ClassDef::new("C")).unwrap();
    runtime.define_class(ClassDef::new("B").contains("C")).unwrap();
    runtime.define_class(ClassDef::new("A").contains("B")).unwrap();
    runtime.declare_generic(GenericDef::new("walk").formals(["x"])).unwrap();
    runtime.register_method("walk", ["A"], chained("A")).unwrap();
    runtime.register_method("walk", ["B"], chained("B")).unwrap();
    runtime.register_method("walk", ["C"], label("C")).unwrap();

    let args = Arguments::new().with(object(&runtime, "A"));
    assert_eq!(text(runtime.dispatch("walk", &args)), "A>B>C");
}

#[test]
fn test_next_method_with_new_arguments() {
    let runtime = runtime();
    runtime.define_class(ClassDef::new("Base")).unwrap();
    runtime.define_class(ClassDef::new("Derived").contains("Base")).unwrap();
    runtime
        .declare_generic(GenericDef::new("show").formals(["x", "note"]).dispatch_on(["x"]))
        .unwrap();
    runtime
        .register_method("show", ["Base"], |call| {
            Ok(call.arg("note").cloned().unwrap_or_default())
        })
        .unwrap();
    runtime
        .register_method("show", ["Derived"], |call| {
            let args = Arguments::new()
                .with(call.arg_at(0).cloned().unwrap_or_default())
                .with("from derived");
            call.call_next_with(&args)
        })
        .unwrap();

    let args = Arguments::new()
        .with(object(&runtime, "Derived"))
        .with("original");
    assert_eq!(text(runtime.dispatch("show", &args)), "from derived");
}

#[test]
fn test_method_body_may_dispatch_recursively() {
    let runtime = runtime();
    runtime.declare_generic(GenericDef::new("count").formals(["n"])).unwrap();
    runtime
        .register_method("count", ["integer"], |call| {
            let n = call.arg("n").and_then(Value::as_f64).unwrap_or(0.0);
            if n <= 0.0 {
                return Ok(Value::integer(0));
            }
            #[allow(clippy::cast_possible_truncation)]
            let next = Arguments::new().with(Value::integer(n as i64 - 1));
            let rest = call.runtime().dispatch("count", &next)?;
            Ok(Value::numeric(rest.as_f64().unwrap_or(0.0) + 1.0))
        })
        .unwrap();
    runtime
        .register_method("count", ["numeric"], |call| {
            Ok(call.arg("n").cloned().unwrap_or_default())
        })
        .unwrap();

    let out = runtime
        .dispatch("count", &Arguments::new().with(Value::integer(3)))
        .unwrap();
    assert_eq!(out.as_f64(), Some(3.0));
}

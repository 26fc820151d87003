//! Stress tests for concurrent use of one runtime.
//!
//! These tests validate behavior under load:
//! - Many threads dispatching through a shared cache
//! - Definitions and registrations racing with dispatch
//! - Long next-method chains over deep hierarchies
//!
//! Run with: `cargo test --test stress_test -- --nocapture`

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use common::{chained, label, runtime};
use formclass::{Arguments, ClassDef, GenericDef, Runtime, Value};

fn chain(runtime: &Runtime, depth: usize) {
    runtime.define_class(ClassDef::new("L0")).unwrap();
    for i in 1..depth {
        runtime
            .define_class(ClassDef::new(format!("L{i}")).contains(format!("L{}", i - 1)))
            .unwrap();
    }
}

// ============================================================================
// Concurrent dispatch
// ============================================================================

#[test]
fn test_concurrent_dispatch_shares_cache() {
    let runtime = Arc::new(runtime());
    chain(&runtime, 8);
    runtime.declare_generic(GenericDef::new("f").formals(["x"])).unwrap();
    runtime.register_method("f", ["L0"], label("root")).unwrap();

    let start = Instant::now();
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || {
                let object = runtime.construct_default(&format!("L{t}")).unwrap();
                let args = Arguments::new().with(object);
                for _ in 0..1_000 {
                    let out = runtime.dispatch("f", &args).unwrap();
                    assert_eq!(out.as_str(), Some("root"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    println!("8 threads x 1000 dispatches: {:?}", start.elapsed());
    assert_eq!(runtime.cached_resolutions(), 8);
}

#[test]
fn test_registration_races_with_dispatch() {
    let runtime = Arc::new(runtime());
    chain(&runtime, 4);
    runtime.declare_generic(GenericDef::new("f").formals(["x"])).unwrap();
    runtime.register_method("f", ["L0"], label("old")).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let runtime = Arc::clone(&runtime);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let object = runtime.construct_default("L3").unwrap();
                let args = Arguments::new().with(object);
                while !done.load(Ordering::Acquire) {
                    let out = runtime.dispatch("f", &args).unwrap();
                    let text = out.as_str().unwrap_or_default().to_string();
                    assert!(text == "old" || text.starts_with("new"), "{text}");
                }
            })
        })
        .collect();

    for round in 0..50 {
        let tag = format!("new{round}");
        runtime
            .register_method("f", ["L3"], move |_| Ok(Value::character(tag.clone())))
            .unwrap();
        runtime
            .define_class(ClassDef::new(format!("Noise{round}")).contains("L1"))
            .unwrap();
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }

    // No stale resolution survives the last registration.
    let object = runtime.construct_default("L3").unwrap();
    let out = runtime.dispatch("f", &Arguments::new().with(object)).unwrap();
    assert_eq!(out.as_str(), Some("new49"));
}

#[test]
fn test_redefinition_races_with_dispatch() {
    let runtime = Arc::new(runtime());
    runtime.define_class(ClassDef::new("Left")).unwrap();
    runtime.define_class(ClassDef::new("Right")).unwrap();
    runtime.define_class(ClassDef::new("Child").contains("Left")).unwrap();
    runtime.declare_generic(GenericDef::new("side").formals(["x"])).unwrap();
    runtime.register_method("side", ["Left"], label("left")).unwrap();
    runtime.register_method("side", ["Right"], label("right")).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let runtime = Arc::clone(&runtime);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let object = runtime.construct_default("Child").unwrap();
                    let out = runtime.dispatch("side", &Arguments::new().with(object));
                    let out = out.unwrap();
                    assert!(matches!(out.as_str(), Some("left" | "right")));
                }
            })
        })
        .collect();

    for round in 0..100 {
        let parent = if round % 2 == 0 { "Right" } else { "Left" };
        runtime
            .define_class(ClassDef::new("Child").contains(parent))
            .unwrap();
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }

    // The last definition made Child extend Left.
    let object = runtime.construct_default("Child").unwrap();
    let out = runtime.dispatch("side", &Arguments::new().with(object)).unwrap();
    assert_eq!(out.as_str(), Some("left"));
    assert_eq!(runtime.class_version("Child"), Some(101));
}

// ============================================================================
// Deep hierarchies
// ============================================================================

#[test]
fn test_deep_next_method_chain_100() {
    let runtime = runtime();
    chain(&runtime, 100);
    runtime.declare_generic(GenericDef::new("walk").formals(["x"])).unwrap();
    runtime.register_method("walk", ["L0"], label("end")).unwrap();
    for i in 1..100 {
        runtime
            .register_method("walk", [format!("L{i}")], chained("x"))
            .unwrap();
    }

    let object = runtime.construct_default("L99").unwrap();
    let out = runtime.dispatch("walk", &Arguments::new().with(object)).unwrap();
    let text = out.as_str().unwrap();
    assert_eq!(text.matches("x>").count(), 99);
    assert!(text.ends_with("end"));
    assert_eq!(runtime.distance("L99", "ANY"), Some(100));
}

#[test]
fn test_many_runtimes_are_isolated() {
    let handles: Vec<_> = (0..8)
        .map(|t| {
            thread::spawn(move || {
                let runtime = Runtime::new();
                runtime.define_class(ClassDef::new("Local")).unwrap();
                runtime.declare_generic(GenericDef::new("id").formals(["x"])).unwrap();
                runtime
                    .register_method("id", ["Local"], move |_| Ok(Value::integer(t)))
                    .unwrap();
                let object = runtime.construct_default("Local").unwrap();
                runtime.dispatch("id", &Arguments::new().with(object)).unwrap()
            })
        })
        .collect();

    for (t, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), Value::integer(t as i64));
    }
}

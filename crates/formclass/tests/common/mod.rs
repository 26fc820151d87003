// Common test utilities for integration tests
//
// Shared fixtures: a tracing subscriber, small method bodies and the class
// hierarchies several test files build on.

#![allow(dead_code)]

use std::sync::Once;

use formclass::{ClassDef, MethodCall, Result, Runtime, Value};

static TRACING: Once = Once::new();

/// Installs a test-writer subscriber honouring `RUST_LOG`, once per binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Runtime with tracing enabled.
pub fn runtime() -> Runtime {
    init_tracing();
    Runtime::new()
}

/// Method body returning its label as a character value.
pub fn label(text: &'static str) -> impl Fn(&MethodCall<'_>) -> Result<Value> + Send + Sync {
    move |_| Ok(Value::character(text))
}

/// Method body returning its label prefixed to the next method's result.
pub fn chained(text: &'static str) -> impl Fn(&MethodCall<'_>) -> Result<Value> + Send + Sync {
    move |call| {
        let rest = call.call_next()?;
        Ok(Value::character(format!(
            "{text}>{}",
            rest.as_str().unwrap_or_default()
        )))
    }
}

/// Defines the diamond `A <- B, A <- C, B + C <- BC`.
pub fn define_diamond(runtime: &Runtime) {
    runtime.define_class(ClassDef::new("A")).unwrap();
    runtime.define_class(ClassDef::new("B").contains("A")).unwrap();
    runtime.define_class(ClassDef::new("C").contains("A")).unwrap();
    runtime
        .define_class(ClassDef::new("BC").contains("B").contains("C"))
        .unwrap();
}

/// Defines `Person(name: character, age: numeric) <- Employee(boss: Person)`.
pub fn define_people(runtime: &Runtime) {
    runtime
        .define_class(
            ClassDef::new("Person")
                .slot("name", "character")
                .slot("age", "numeric"),
        )
        .unwrap();
    runtime
        .define_class(
            ClassDef::new("Employee")
                .contains("Person")
                .slot("boss", "Person"),
        )
        .unwrap();
}

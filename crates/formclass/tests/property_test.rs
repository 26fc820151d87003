//! Property-based tests over randomly generated class graphs.
//!
//! Each case builds a random DAG (every class may only inherit from classes
//! defined before it) and checks the runtime's distances and dispatch choices
//! against a straightforward breadth-first reference.
//!
//! Run with: `cargo test --test property_test`

mod common;

use std::collections::VecDeque;

use common::runtime;
use formclass::{Arguments, ClassDef, GenericDef, Runtime, Value};
use proptest::prelude::*;
use proptest::sample::Index;

/// Parent lists by class index; parents always have a smaller index.
fn dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(any::<Index>(), 0..3), 1..12).prop_map(
        |raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, picks)| {
                    if i == 0 {
                        return Vec::new();
                    }
                    let mut parents: Vec<usize> = picks.iter().map(|p| p.index(i)).collect();
                    parents.sort_unstable();
                    parents.dedup();
                    parents
                })
                .collect()
        },
    )
}

fn name(i: usize) -> String {
    format!("K{i}")
}

fn build(parents: &[Vec<usize>]) -> Runtime {
    let runtime = runtime();
    for (i, ps) in parents.iter().enumerate() {
        let def = ps
            .iter()
            .fold(ClassDef::new(name(i)), |def, &p| def.contains(name(p)));
        runtime.define_class(def).unwrap();
    }
    runtime
}

/// Breadth-first shortest distance from `from` up to `to`.
fn reference_distance(parents: &[Vec<usize>], from: usize, to: usize) -> Option<u32> {
    let mut seen = vec![false; parents.len()];
    let mut queue = VecDeque::from([(from, 0)]);
    seen[from] = true;
    while let Some((class, d)) = queue.pop_front() {
        if class == to {
            return Some(d);
        }
        for &p in &parents[class] {
            if !seen[p] {
                seen[p] = true;
                queue.push_back((p, d + 1));
            }
        }
    }
    None
}

proptest! {
    #[test]
    fn prop_distances_match_reference(parents in dag()) {
        let runtime = build(&parents);
        let n = parents.len();
        for from in 0..n {
            for to in 0..n {
                prop_assert_eq!(
                    runtime.distance(&name(from), &name(to)),
                    reference_distance(&parents, from, to),
                    "distance({}, {})", from, to
                );
            }
        }
    }

    #[test]
    fn prop_any_is_farther_than_every_path(parents in dag()) {
        let runtime = build(&parents);
        let n = parents.len();
        for from in 0..n {
            let any = runtime.distance(&name(from), "ANY").unwrap();
            for to in 0..n {
                if let Some(d) = runtime.distance(&name(from), &name(to)) {
                    prop_assert!(d < any);
                }
            }
        }
    }

    #[test]
    fn prop_superclasses_sorted_by_distance(parents in dag()) {
        let runtime = build(&parents);
        for i in 0..parents.len() {
            let supers = runtime.superclasses(&name(i)).unwrap();
            let distances: Vec<u32> = supers
                .iter()
                .map(|s| runtime.distance(&name(i), s).unwrap())
                .collect();
            prop_assert!(distances.windows(2).all(|w| w[0] <= w[1]));
            prop_assert!(distances.iter().all(|&d| d >= 1));
        }
    }

    #[test]
    fn prop_dispatch_picks_nearest_method(
        parents in dag(),
        picks in prop::collection::vec(any::<Index>(), 1..5),
    ) {
        let runtime = build(&parents);
        let n = parents.len();
        let mut with_method: Vec<usize> = picks.iter().map(|p| p.index(n)).collect();
        with_method.sort_unstable();
        with_method.dedup();

        runtime.declare_generic(GenericDef::new("f").formals(["x"])).unwrap();
        for &m in &with_method {
            let label = name(m);
            runtime
                .register_method("f", [name(m)], move |_| Ok(Value::character(label.clone())))
                .unwrap();
        }

        for class in 0..n {
            let best = with_method
                .iter()
                .filter_map(|&m| reference_distance(&parents, class, m).map(|d| (d, name(m))))
                .min();
            let object = runtime.construct_default(&name(class)).unwrap();
            let result = runtime.dispatch("f", &Arguments::new().with(object));
            match best {
                Some((_, expected)) => {
                    let got = result.unwrap();
                    prop_assert_eq!(got.as_str(), Some(expected.as_str()));
                }
                None => prop_assert!(result.is_err()),
            }
        }
    }
}

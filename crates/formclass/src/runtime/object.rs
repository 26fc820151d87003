//! Instance construction and validation for the `formclass` runtime.
//!
//! This module implements the instance model with:
//! - Construction from provided values merged over prototype defaults
//! - Slot type checks against the class graph
//! - Validity functions run along the ancestor chain, most-ancestral first
//! - Explicit revalidation after direct slot writes
//!
//! # Validity guarantee
//!
//! An [`Instance`] is known to be valid only at the moment it was built or
//! last passed [`Runtime::revalidate`]. [`Instance::set_slot`] writes without
//! any check, and a class may be redefined with a different validity function
//! after the instance was built. Holders that need the invariant again call
//! `revalidate`.
//!
//! # Locking
//!
//! Type checks run under the class registry read lock. Validity functions are
//! user code and run after the lock has been released.

use indexmap::IndexMap;

use crate::error::{ConstructionError, Result, Violation};
use crate::runtime::class::{ClassId, ClassRegistry, Validity};
use crate::runtime::{Runtime, Value};

/// A value conforming to a class: its class name plus one value per slot.
///
/// # Example
///
/// ```rust
/// use formclass::{ClassDef, Runtime, Value};
///
/// let runtime = Runtime::new();
/// runtime
///     .define_class(ClassDef::new("Point").slot("x", "numeric").slot("y", "numeric"))
///     .unwrap();
///
/// let mut p = runtime
///     .construct("Point", [("x", Value::numeric(1.0))])
///     .unwrap();
///
/// assert_eq!(p.slot("x").unwrap(), &Value::numeric(1.0));
/// assert!(p.slot("y").unwrap().is_empty());
///
/// p.set_slot("y", Value::numeric(2.0)).unwrap();
/// assert!(p.set_slot("z", Value::Null).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    class: String,
    slots: IndexMap<String, Value>,
}

impl Instance {
    /// Name of the class this instance was built from.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// Reads a slot.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::NoSuchSlot`] if the instance has no slot
    /// of that name.
    pub fn slot(&self, name: &str) -> Result<&Value> {
        self.slots.get(name).ok_or_else(|| self.no_such_slot(name).into())
    }

    /// Reads a slot, `None` if absent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(name)
    }

    /// Overwrites a slot without type or validity checks.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::NoSuchSlot`] if the instance has no slot
    /// of that name.
    pub fn set_slot(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        match self.slots.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(self.no_such_slot(name).into()),
        }
    }

    /// Slot names and values in declaration order.
    pub fn slots(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn no_such_slot(&self, name: &str) -> ConstructionError {
        ConstructionError::NoSuchSlot {
            class: self.class.clone(),
            slot: name.to_string(),
        }
    }
}

impl Runtime {
    /// Builds and validates an instance of `class`.
    ///
    /// Provided values win over prototype defaults; remaining slots get the
    /// declared type's default. Every slot is type checked and the validity
    /// functions of all ancestors run, most-ancestral first, then the class's
    /// own.
    ///
    /// # Errors
    ///
    /// - [`ConstructionError::UnknownClass`] if `class` is not defined
    /// - [`ConstructionError::VirtualClass`] if `class` is virtual
    /// - [`ConstructionError::ValidityFailure`] with every unknown slot, type
    ///   mismatch, and validity message found
    pub fn construct<I, K>(&self, class: &str, values: I) -> Result<Instance>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let (instance, checks, mut violations) = {
            let classes = self.classes.read();
            let id = lookup_class(&classes, class)?;
            if classes.entry(id).def.is_virtual() {
                return Err(ConstructionError::VirtualClass {
                    class: class.to_string(),
                }
                .into());
            }

            let mut provided: IndexMap<String, Value> =
                values.into_iter().map(|(k, v)| (k.into(), v)).collect();
            let prototype = classes.effective_prototype(id);

            let mut slots = IndexMap::with_capacity(classes.slots(id).len());
            for spec in classes.slots(id).iter() {
                let value = match provided.shift_remove(&spec.name) {
                    Some(value) => value,
                    None => match prototype.get(&spec.name) {
                        Some(value) => value.clone(),
                        None => default_value(&classes, &spec.type_name, &mut vec![id]),
                    },
                };
                slots.insert(spec.name.clone(), value);
            }

            let mut violations: Vec<Violation> = provided
                .into_keys()
                .map(|slot| Violation::UnknownSlot { slot })
                .collect();
            violations.extend(type_violations(&classes, id, &slots));

            let instance = Instance {
                class: classes.name(id).to_string(),
                slots,
            };
            (instance, validity_chain(&classes, id), violations)
        };

        run_validity(&instance, &checks, &mut violations);
        if violations.is_empty() {
            Ok(instance)
        } else {
            Err(ConstructionError::ValidityFailure {
                class: instance.class,
                violations,
            }
            .into())
        }
    }

    /// Builds an instance from prototype and type defaults only.
    ///
    /// # Errors
    ///
    /// Same as [`construct`](Self::construct).
    pub fn construct_default(&self, class: &str) -> Result<Instance> {
        self.construct(class, std::iter::empty::<(String, Value)>())
    }

    /// Re-runs type checks and validity functions on current slot values.
    ///
    /// The check uses the class definition current at call time. Slots the
    /// class declares but the instance lacks, and slots the instance carries
    /// but the class no longer declares, are reported too.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::UnknownClass`] if the instance's class is
    /// not defined in this runtime, or [`ConstructionError::ValidityFailure`]
    /// listing every current violation.
    pub fn revalidate(&self, instance: &Instance) -> Result<()> {
        let (checks, mut violations) = {
            let classes = self.classes.read();
            let id = lookup_class(&classes, instance.class_name())?;
            let declared = classes.slots(id);

            let mut violations: Vec<Violation> = instance
                .slots
                .keys()
                .filter(|name| !declared.iter().any(|s| &s.name == *name))
                .map(|slot| Violation::UnknownSlot { slot: slot.clone() })
                .collect();
            violations.extend(type_violations(&classes, id, &instance.slots));
            (validity_chain(&classes, id), violations)
        };

        run_validity(instance, &checks, &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConstructionError::ValidityFailure {
                class: instance.class.clone(),
                violations,
            }
            .into())
        }
    }

    /// Overwrites a slot after checking the value against the declared type.
    ///
    /// Validity functions are not run; call [`revalidate`](Self::revalidate)
    /// for that.
    ///
    /// # Errors
    ///
    /// - [`ConstructionError::UnknownClass`] if the class is not defined
    /// - [`ConstructionError::NoSuchSlot`] if the class has no such slot
    /// - [`ConstructionError::SlotTypeMismatch`] if the value's class does not
    ///   reach the slot type
    pub fn assign_slot(
        &self,
        instance: &mut Instance,
        slot: &str,
        value: Value,
    ) -> Result<()> {
        {
            let classes = self.classes.read();
            let id = lookup_class(&classes, instance.class_name())?;
            let Some(spec) = classes.slots(id).iter().find(|s| s.name == slot) else {
                return Err(instance.no_such_slot(slot).into());
            };
            if !classes.reaches(value.class_name(), &spec.type_name) {
                return Err(ConstructionError::SlotTypeMismatch {
                    class: instance.class.clone(),
                    slot: slot.to_string(),
                    expected: spec.type_name.clone(),
                    got: value.class_name().to_string(),
                }
                .into());
            }
        }
        instance.slots.insert(slot.to_string(), value);
        Ok(())
    }
}

fn lookup_class(classes: &ClassRegistry, class: &str) -> Result<ClassId> {
    classes.lookup(class).ok_or_else(|| {
        ConstructionError::UnknownClass {
            class: class.to_string(),
        }
        .into()
    })
}

/// Default for a slot with neither a provided nor a prototype value.
///
/// Primitive kinds get an empty vector, `ANY` and virtual classes get `NULL`,
/// and other classes get their prototype instance. A class already being
/// built further up (`visiting`) also gets `NULL`.
fn default_value(
    classes: &ClassRegistry,
    type_name: &str,
    visiting: &mut Vec<ClassId>,
) -> Value {
    if let Some(empty) = Value::empty_of(type_name) {
        return empty;
    }
    let Some(id) = classes.lookup(type_name) else {
        return Value::Null;
    };
    if classes.entry(id).def.is_virtual() || visiting.contains(&id) {
        return Value::Null;
    }

    visiting.push(id);
    let prototype = classes.effective_prototype(id);
    let mut slots = IndexMap::with_capacity(classes.slots(id).len());
    for spec in classes.slots(id).iter() {
        let value = match prototype.get(&spec.name) {
            Some(value) => value.clone(),
            None => default_value(classes, &spec.type_name, visiting),
        };
        slots.insert(spec.name.clone(), value);
    }
    visiting.pop();

    Value::Object(Instance {
        class: classes.name(id).to_string(),
        slots,
    })
}

fn type_violations(
    classes: &ClassRegistry,
    id: ClassId,
    slots: &IndexMap<String, Value>,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    for spec in classes.slots(id).iter() {
        match slots.get(&spec.name) {
            Some(value) if !classes.reaches(value.class_name(), &spec.type_name) => {
                violations.push(Violation::SlotTypeMismatch {
                    slot: spec.name.clone(),
                    expected: spec.type_name.clone(),
                    got: value.class_name().to_string(),
                });
            }
            Some(_) => {}
            None => violations.push(Violation::MissingSlot {
                slot: spec.name.clone(),
            }),
        }
    }
    violations
}

/// Validity functions of `id` and its ancestors, most-ancestral first.
fn validity_chain(classes: &ClassRegistry, id: ClassId) -> Vec<(String, Validity)> {
    classes
        .linearization(id)
        .iter()
        .rev()
        .filter_map(|&class| {
            let def = &classes.entry(class).def;
            def.validity_fn().map(|f| (def.name().to_string(), f.clone()))
        })
        .collect()
}

fn run_validity(
    instance: &Instance,
    checks: &[(String, Validity)],
    violations: &mut Vec<Violation>,
) {
    for (class, check) in checks {
        violations.extend(check(instance).into_iter().map(|message| {
            Violation::Message {
                class: class.clone(),
                message,
            }
        }));
    }
}

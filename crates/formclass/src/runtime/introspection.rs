//! Read-only queries over the class graph and the generic table.
//!
//! - **Class enumeration**: list defined classes, check a name
//! - **Inheritance**: ancestors ordered by distance
//! - **Definitions**: the current [`ClassDef`] and its version
//! - **Generics**: list declared generic names

use crate::runtime::{ClassDef, Runtime};

impl Runtime {
    /// Every defined class, built-ins first, then in definition order.
    ///
    /// A redefined class keeps the position of its first definition.
    #[must_use]
    pub fn class_names(&self) -> Vec<String> {
        self.classes.read().names().map(str::to_string).collect()
    }

    /// Returns `true` if `name` is a defined class.
    #[must_use]
    pub fn is_class(&self, name: &str) -> bool {
        self.classes.read().lookup(name).is_some()
    }

    /// Returns `true` if `name` is a defined virtual class.
    #[must_use]
    pub fn is_virtual_class(&self, name: &str) -> bool {
        let classes = self.classes.read();
        classes
            .lookup(name)
            .is_some_and(|id| classes.entry(id).def.is_virtual())
    }

    /// Number of times `name` has been defined, starting at 1.
    #[must_use]
    pub fn class_version(&self, name: &str) -> Option<u32> {
        let classes = self.classes.read();
        classes.lookup(name).map(|id| classes.entry(id).version)
    }

    /// Current definition of `name`.
    #[must_use]
    pub fn class_def(&self, name: &str) -> Option<ClassDef> {
        let classes = self.classes.read();
        classes
            .lookup(name)
            .map(|id| classes.entry(id).def.as_ref().clone())
    }

    /// Proper ancestors of `name`, nearest first.
    ///
    /// Ancestors at the same distance keep the order in which parents were
    /// declared. Returns `None` if `name` is not defined.
    ///
    /// # Example
    ///
    /// ```rust
    /// use formclass::{ClassDef, Runtime};
    ///
    /// let runtime = Runtime::new();
    /// runtime.define_class(ClassDef::new("Base")).unwrap();
    /// runtime.define_class(ClassDef::new("Left").contains("Base")).unwrap();
    /// runtime.define_class(ClassDef::new("Right").contains("Base")).unwrap();
    /// runtime
    ///     .define_class(ClassDef::new("Both").contains("Left").contains("Right"))
    ///     .unwrap();
    ///
    /// assert_eq!(
    ///     runtime.superclasses("Both").unwrap(),
    ///     ["Left", "Right", "Base"]
    /// );
    /// ```
    #[must_use]
    pub fn superclasses(&self, name: &str) -> Option<Vec<String>> {
        let classes = self.classes.read();
        let id = classes.lookup(name)?;
        Some(
            classes
                .linearization(id)
                .iter()
                .skip(1)
                .map(|&ancestor| classes.name(ancestor).to_string())
                .collect(),
        )
    }

    /// Names of every declared generic, sorted.
    #[must_use]
    pub fn generic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .generics
            .read()
            .names()
            .map(str::to_string)
            .collect();
        names.sort_unstable();
        names
    }
}

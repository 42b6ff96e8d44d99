use std::borrow::Cow;
use std::collections::HashSet;

use log::trace;

use crate::class_info::{ClassInfo, ClassResolver};
use crate::error::{Error, Result};

/// Root of every superclass chain.
pub const OBJECT: &str = "java/lang/Object";

/// Longest superclass chain walked before giving up.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Assignability queries over classes served by a [`ClassResolver`].
///
/// Only the interfaces each class declares directly are compared; the
/// super-interfaces of those interfaces are not walked.
pub struct Hierarchy<'r, 'h> {
    resolver: &'r ClassResolver<'h>,
    max_depth: usize,
}

impl<'r, 'h> Hierarchy<'r, 'h> {
    pub fn new(resolver: &'r ClassResolver<'h>) -> Self {
        Self {
            resolver,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolve both classes by runtime name, then check assignability.
    pub fn is_assignable(&self, parent: &str, child: &str) -> Result<bool> {
        let parent = self.resolver.resolve(parent)?;
        let child = self.resolver.resolve(child)?;
        self.is_assignable_from(&parent, &child)
    }

    /// Whether a value of type `child` can be stored in a `parent` slot.
    ///
    /// Fails with `ClassNotFound` when a class on the superclass chain
    /// cannot be resolved, and with `CycleDetected` or `HierarchyTooDeep`
    /// when the chain does not end.
    pub fn is_assignable_from(&self, parent: &ClassInfo, child: &ClassInfo) -> Result<bool> {
        let target = parent.internal_name();
        let mut current = Cow::Borrowed(child);
        let mut visited = HashSet::new();
        loop {
            let name = current.internal_name();
            if !visited.insert(name.to_string()) {
                return Err(Error::CycleDetected {
                    class: name.to_string(),
                });
            }
            if visited.len() > self.max_depth {
                return Err(Error::HierarchyTooDeep {
                    class: child.internal_name().to_string(),
                    limit: self.max_depth,
                });
            }
            if name == target {
                trace!("{target} is {name}");
                return Ok(true);
            }
            let super_name = current.super_name();
            if super_name == Some(target) {
                trace!("{target} is the superclass of {name}");
                return Ok(true);
            }
            if current.interfaces().contains(&target) {
                trace!("{target} is an interface of {name}");
                return Ok(true);
            }
            match super_name {
                Some(super_name) if super_name != OBJECT => {
                    let next = self.resolver.resolve(super_name)?;
                    current = Cow::Owned(next);
                }
                _ => return Ok(false),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::class_info::{LoadedClass, ResidentClasses};
    use crate::ir::{AccessFlags, ClassRecord};
    use crate::loader::MemoryLoader;
    use crate::mapping::Remapper;

    fn store(loader: &mut MemoryLoader, name: &str, super_name: &str, interfaces: &[&str]) {
        let mut class = ClassRecord::new(name, Some(super_name));
        class.interfaces = interfaces.iter().map(|name| name.to_string()).collect();
        if name.ends_with("Animal") || name.ends_with("Pet") {
            class.access = AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT;
        }
        loader.insert_record(&class).expect("store class");
    }

    fn zoo() -> MemoryLoader {
        let mut loader = MemoryLoader::new();
        store(&mut loader, "zoo/Animal", OBJECT, &[]);
        store(&mut loader, "zoo/Pet", OBJECT, &["zoo/Animal"]);
        store(&mut loader, "zoo/Dog", OBJECT, &["zoo/Animal"]);
        store(&mut loader, "zoo/Puppy", "zoo/Dog", &[]);
        store(&mut loader, "zoo/Cat", OBJECT, &["zoo/Pet"]);
        store(&mut loader, "chain/A", OBJECT, &[]);
        store(&mut loader, "chain/B", "chain/A", &[]);
        store(&mut loader, "chain/C", "chain/B", &[]);
        store(&mut loader, "chain/D", "chain/C", &[]);
        loader
    }

    #[test]
    fn every_class_is_assignable_to_itself() {
        let loader = zoo();
        let remapper = Remapper::identity();
        let resolver = ClassResolver::new(&loader, &remapper);
        let hierarchy = Hierarchy::new(&resolver);

        for name in ["zoo/Animal", "zoo/Dog", "chain/C"] {
            assert!(hierarchy.is_assignable(name, name).expect("check"), "{name}");
        }
    }

    #[test]
    fn declared_interface_is_assignable_one_way() {
        let loader = zoo();
        let remapper = Remapper::identity();
        let resolver = ClassResolver::new(&loader, &remapper);
        let hierarchy = Hierarchy::new(&resolver);

        assert!(hierarchy.is_assignable("zoo/Animal", "zoo/Dog").expect("check"));
        assert!(!hierarchy.is_assignable("zoo/Dog", "zoo/Animal").expect("check"));
    }

    #[test]
    fn superclass_chain_is_walked() {
        let loader = zoo();
        let remapper = Remapper::identity();
        let resolver = ClassResolver::new(&loader, &remapper);
        let hierarchy = Hierarchy::new(&resolver);

        assert!(hierarchy.is_assignable("chain/A", "chain/C").expect("check"));
        assert!(hierarchy.is_assignable("chain/A", "chain/D").expect("check"));
        assert!(!hierarchy.is_assignable("chain/C", "chain/A").expect("check"));
        assert!(hierarchy.is_assignable("zoo/Animal", "zoo/Puppy").expect("check"));
    }

    #[test]
    fn super_interfaces_are_not_walked() {
        let loader = zoo();
        let remapper = Remapper::identity();
        let resolver = ClassResolver::new(&loader, &remapper);
        let hierarchy = Hierarchy::new(&resolver);

        assert!(hierarchy.is_assignable("zoo/Pet", "zoo/Cat").expect("check"));
        assert!(!hierarchy.is_assignable("zoo/Animal", "zoo/Cat").expect("check"));
    }

    #[test]
    fn live_and_parsed_classes_mix() {
        let loader = zoo();
        let mut table = ResidentClasses::new();
        let object = table.insert(LoadedClass::new(OBJECT, AccessFlags::PUBLIC, None, Vec::new()));
        table.insert(LoadedClass::new(
            "chain/B",
            AccessFlags::PUBLIC,
            Some(Arc::new(LoadedClass::new(
                "chain/A",
                AccessFlags::PUBLIC,
                Some(object),
                Vec::new(),
            ))),
            Vec::new(),
        ));
        let remapper = Remapper::identity();
        let resolver = ClassResolver::new(&loader, &remapper).with_table(&table);
        let hierarchy = Hierarchy::new(&resolver);

        assert!(matches!(resolver.resolve("chain/B").expect("resolve"), ClassInfo::Live(_)));
        assert!(hierarchy.is_assignable("chain/A", "chain/D").expect("check"));
    }

    #[test]
    fn unresolvable_superclass_propagates_class_not_found() {
        let mut loader = zoo();
        store(&mut loader, "gap/Child", "gap/Missing", &[]);
        let remapper = Remapper::identity();
        let resolver = ClassResolver::new(&loader, &remapper);
        let hierarchy = Hierarchy::new(&resolver);

        let err = hierarchy
            .is_assignable("chain/A", "gap/Child")
            .expect_err("missing superclass");

        assert!(matches!(err, Error::ClassNotFound { ref class, .. } if class == "gap/Missing"));
    }

    #[test]
    fn superclass_cycle_is_reported() {
        let mut loader = zoo();
        store(&mut loader, "loop/X", "loop/Y", &[]);
        store(&mut loader, "loop/Y", "loop/X", &[]);
        let remapper = Remapper::identity();
        let resolver = ClassResolver::new(&loader, &remapper);
        let hierarchy = Hierarchy::new(&resolver);

        let err = hierarchy
            .is_assignable("chain/A", "loop/X")
            .expect_err("cycle");

        assert!(matches!(err, Error::CycleDetected { ref class } if class == "loop/X"));
    }

    #[test]
    fn depth_limit_stops_long_chains() {
        let loader = zoo();
        let remapper = Remapper::identity();
        let resolver = ClassResolver::new(&loader, &remapper);
        let hierarchy = Hierarchy::new(&resolver).with_max_depth(2);

        let err = hierarchy
            .is_assignable("zoo/Animal", "chain/D")
            .expect_err("too deep");

        assert!(matches!(err, Error::HierarchyTooDeep { limit: 2, .. }));
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use log::trace;

use crate::descriptor::internal_name;
use crate::error::{BoxError, Error, Result};
use crate::hierarchy::OBJECT;
use crate::ir::{AccessFlags, ClassRecord};
use crate::mapping::Remapper;
use crate::reader::parse;

/// A class the host runtime has already loaded.
///
/// Superclass and interfaces link to other loaded classes, the way a
/// runtime class handle does.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedClass {
    /// Internal name in the runtime scheme.
    pub name: String,
    pub access: AccessFlags,
    /// `None` for `java/lang/Object` and for interfaces.
    pub superclass: Option<Arc<LoadedClass>>,
    pub interfaces: Vec<Arc<LoadedClass>>,
}

impl LoadedClass {
    pub fn new(
        name: impl Into<String>,
        access: AccessFlags,
        superclass: Option<Arc<LoadedClass>>,
        interfaces: Vec<Arc<LoadedClass>>,
    ) -> Self {
        Self {
            name: internal_name(&name.into()),
            access,
            superclass,
            interfaces,
        }
    }
}

/// Host table of classes that are already loaded.
pub trait ClassTable {
    fn loaded_class(&self, name: &str) -> Option<Arc<LoadedClass>>;
}

/// Host service returning raw class file bytes for a runtime internal name.
pub trait ClassBytesLoader {
    fn load_class_bytes(&self, name: &str) -> std::result::Result<Vec<u8>, BoxError>;
}

/// Simple [`ClassTable`] keyed by internal name.
#[derive(Clone, Debug, Default)]
pub struct ResidentClasses {
    classes: HashMap<String, Arc<LoadedClass>>,
}

impl ResidentClasses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class and return the shared handle for linking subclasses.
    pub fn insert(&mut self, class: LoadedClass) -> Arc<LoadedClass> {
        let class = Arc::new(class);
        self.classes.insert(class.name.clone(), Arc::clone(&class));
        class
    }
}

impl ClassTable for ResidentClasses {
    fn loaded_class(&self, name: &str) -> Option<Arc<LoadedClass>> {
        self.classes.get(name).cloned()
    }
}

/// Structural view of a class, backed either by a loaded class or by a
/// parsed record. Both variants answer the same four questions the same way.
#[derive(Clone, Debug)]
pub enum ClassInfo {
    Live(Arc<LoadedClass>),
    Parsed(ClassRecord),
}

impl ClassInfo {
    pub fn internal_name(&self) -> &str {
        match self {
            ClassInfo::Live(class) => class.name.as_str(),
            ClassInfo::Parsed(record) => &record.name,
        }
    }

    /// Declared superclass. Interfaces report `java/lang/Object` in both
    /// variants, as the class file format records it.
    pub fn super_name(&self) -> Option<&str> {
        match self {
            ClassInfo::Live(class) => match &class.superclass {
                Some(superclass) => Some(superclass.name.as_str()),
                None if self.is_interface() => Some(OBJECT),
                None => None,
            },
            ClassInfo::Parsed(record) => record.super_name.as_deref(),
        }
    }

    /// Directly declared interfaces, in declaration order.
    pub fn interfaces(&self) -> Vec<&str> {
        match self {
            ClassInfo::Live(class) => class
                .interfaces
                .iter()
                .map(|interface| interface.name.as_str())
                .collect(),
            ClassInfo::Parsed(record) => record.interfaces.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_interface(&self) -> bool {
        match self {
            ClassInfo::Live(class) => class.access.contains(AccessFlags::INTERFACE),
            ClassInfo::Parsed(record) => record.is_interface(),
        }
    }

    /// The parsed record, when this view has one.
    pub fn record(&self) -> Option<&ClassRecord> {
        match self {
            ClassInfo::Live(_) => None,
            ClassInfo::Parsed(record) => Some(record),
        }
    }
}

/// Builds [`ClassInfo`] views from the host's class table and bytes loader.
pub struct ClassResolver<'h> {
    table: Option<&'h dyn ClassTable>,
    loader: &'h dyn ClassBytesLoader,
    remapper: &'h Remapper,
}

impl<'h> ClassResolver<'h> {
    pub fn new(loader: &'h dyn ClassBytesLoader, remapper: &'h Remapper) -> Self {
        Self {
            table: None,
            loader,
            remapper,
        }
    }

    /// Prefer already loaded classes from `table` over loading bytes.
    pub fn with_table(mut self, table: &'h dyn ClassTable) -> Self {
        self.table = Some(table);
        self
    }

    pub fn remapper(&self) -> &Remapper {
        self.remapper
    }

    /// Resolve a class by its runtime name.
    pub fn resolve(&self, name: &str) -> Result<ClassInfo> {
        let name = internal_name(name);
        if let Some(class) = self.table.and_then(|table| table.loaded_class(&name)) {
            trace!("resolved {name} from the loaded class table");
            return Ok(ClassInfo::Live(class));
        }
        trace!("resolving {name} from class bytes");
        Ok(ClassInfo::Parsed(self.load_record(&name)?))
    }

    /// Resolve a class by its canonical name.
    pub fn resolve_canonical(&self, name: &str) -> Result<ClassInfo> {
        let runtime = self.remapper.to_runtime_name(name)?;
        self.resolve(&runtime)
    }

    /// Load and parse a class through the bytes loader only.
    pub fn load_record(&self, name: &str) -> Result<ClassRecord> {
        let name = internal_name(name);
        let bytes = self
            .loader
            .load_class_bytes(&name)
            .map_err(|source| Error::ClassNotFound {
                class: name.clone(),
                source,
            })?;
        let record = parse(&bytes).map_err(|err| err.in_class(&name))?;
        if record.name != name {
            return Err(Error::MalformedInput {
                class: Some(name),
                reason: format!("class data declares {}", record.name),
            });
        }
        Ok(record)
    }
}

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::descriptor::internal_name;
use crate::error::{BoxError, Error, Result};

/// Which naming scheme the classes being inspected were compiled against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NamingMode {
    /// Runtime names equal canonical names; every translation is the identity.
    #[default]
    Canonical,
    /// Runtime names are obfuscated and must go through the oracle.
    Obfuscated,
}

/// Host-provided translation between canonical and runtime names.
///
/// Class names are internal names. Method and field lookups take the owner,
/// name and descriptor in the scheme being translated from.
pub trait NameOracle: Send + Sync {
    fn runtime_class(&self, canonical: &str) -> std::result::Result<String, BoxError>;
    fn canonical_class(&self, runtime: &str) -> std::result::Result<String, BoxError>;
    fn runtime_method(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> std::result::Result<String, BoxError>;
    fn canonical_method(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> std::result::Result<String, BoxError>;
    fn runtime_field(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> std::result::Result<String, BoxError>;
    fn canonical_field(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> std::result::Result<String, BoxError>;
}

/// Serialized form of a [`NameTable`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MappingEntries {
    /// Canonical internal name to runtime internal name.
    #[serde(default)]
    pub classes: BTreeMap<String, String>,
    #[serde(default)]
    pub methods: Vec<MethodMapping>,
    #[serde(default)]
    pub fields: Vec<FieldMapping>,
}

/// Method keyed by its canonical owner, name and descriptor.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MethodMapping {
    pub owner: String,
    pub name: String,
    pub desc: String,
    pub runtime: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FieldMapping {
    pub owner: String,
    pub name: String,
    pub runtime: String,
}

type MethodKey = (String, String, String);
type FieldKey = (String, String);

/// In-memory name table with forward and reverse indices.
///
/// Symbols missing from the table keep their name, so a partial table only
/// renames what it lists.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(from = "MappingEntries")]
pub struct NameTable {
    classes: HashMap<String, String>,
    classes_rev: HashMap<String, String>,
    methods: HashMap<MethodKey, String>,
    methods_rev: HashMap<MethodKey, String>,
    fields: HashMap<FieldKey, String>,
    fields_rev: HashMap<FieldKey, String>,
}

impl From<MappingEntries> for NameTable {
    fn from(entries: MappingEntries) -> Self {
        let mut table = NameTable::default();
        for (canonical, runtime) in entries.classes {
            let canonical = internal_name(&canonical);
            let runtime = internal_name(&runtime);
            table.classes_rev.insert(runtime.clone(), canonical.clone());
            table.classes.insert(canonical, runtime);
        }
        for method in entries.methods {
            let owner = internal_name(&method.owner);
            let runtime_owner = table.class_to_runtime(&owner);
            let runtime_desc = map_descriptor(&method.desc, |name| {
                Ok::<_, BoxError>(table.class_to_runtime(name))
            })
            .unwrap_or_else(|_| method.desc.clone());
            table.methods_rev.insert(
                (runtime_owner, method.runtime.clone(), runtime_desc),
                method.name.clone(),
            );
            table
                .methods
                .insert((owner, method.name, method.desc), method.runtime);
        }
        for field in entries.fields {
            let owner = internal_name(&field.owner);
            let runtime_owner = table.class_to_runtime(&owner);
            table
                .fields_rev
                .insert((runtime_owner, field.runtime.clone()), field.name.clone());
            table.fields.insert((owner, field.name), field.runtime);
        }
        table
    }
}

impl NameTable {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.methods.is_empty() && self.fields.is_empty()
    }

    fn class_to_runtime(&self, canonical: &str) -> String {
        self.classes
            .get(canonical)
            .cloned()
            .unwrap_or_else(|| canonical.to_string())
    }
}

fn key(owner: &str, name: &str, descriptor: &str) -> MethodKey {
    (owner.to_string(), name.to_string(), descriptor.to_string())
}

impl NameOracle for NameTable {
    fn runtime_class(&self, canonical: &str) -> std::result::Result<String, BoxError> {
        Ok(self.class_to_runtime(canonical))
    }

    fn canonical_class(&self, runtime: &str) -> std::result::Result<String, BoxError> {
        Ok(self
            .classes_rev
            .get(runtime)
            .cloned()
            .unwrap_or_else(|| runtime.to_string()))
    }

    fn runtime_method(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> std::result::Result<String, BoxError> {
        Ok(self
            .methods
            .get(&key(owner, name, descriptor))
            .cloned()
            .unwrap_or_else(|| name.to_string()))
    }

    fn canonical_method(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> std::result::Result<String, BoxError> {
        Ok(self
            .methods_rev
            .get(&key(owner, name, descriptor))
            .cloned()
            .unwrap_or_else(|| name.to_string()))
    }

    fn runtime_field(
        &self,
        owner: &str,
        name: &str,
        _descriptor: &str,
    ) -> std::result::Result<String, BoxError> {
        Ok(self
            .fields
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_else(|| name.to_string()))
    }

    fn canonical_field(
        &self,
        owner: &str,
        name: &str,
        _descriptor: &str,
    ) -> std::result::Result<String, BoxError> {
        Ok(self
            .fields_rev
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_else(|| name.to_string()))
    }
}

/// Owner, name and descriptor of a field or method in one naming scheme.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberName {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

/// Name Resolution Layer: translates symbols between the canonical scheme
/// callers use and the runtime scheme found in loaded bytecode.
#[derive(Clone)]
pub struct Remapper {
    mode: NamingMode,
    oracle: Arc<dyn NameOracle>,
}

impl fmt::Debug for Remapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remapper").field("mode", &self.mode).finish()
    }
}

impl Default for Remapper {
    fn default() -> Self {
        Self::identity()
    }
}

impl Remapper {
    pub fn new(mode: NamingMode, oracle: Arc<dyn NameOracle>) -> Self {
        Self { mode, oracle }
    }

    /// Remapper for an environment where no renaming is in effect.
    pub fn identity() -> Self {
        Self::new(NamingMode::Canonical, Arc::new(NameTable::default()))
    }

    pub fn mode(&self) -> NamingMode {
        self.mode
    }

    fn is_identity(&self) -> bool {
        self.mode == NamingMode::Canonical
    }

    pub fn to_runtime_name(&self, canonical: &str) -> Result<String> {
        let canonical = internal_name(canonical);
        if self.is_identity() {
            return Ok(canonical);
        }
        self.oracle
            .runtime_class(&canonical)
            .map(|name| internal_name(&name))
            .map_err(|source| unknown(canonical, source))
    }

    pub fn to_canonical_name(&self, runtime: &str) -> Result<String> {
        let runtime = internal_name(runtime);
        if self.is_identity() {
            return Ok(runtime);
        }
        self.oracle
            .canonical_class(&runtime)
            .map(|name| internal_name(&name))
            .map_err(|source| unknown(runtime, source))
    }

    /// Map every class named in a field or method descriptor to the runtime scheme.
    pub fn runtime_descriptor(&self, descriptor: &str) -> Result<String> {
        if self.is_identity() {
            return Ok(descriptor.to_string());
        }
        map_descriptor(descriptor, |name| self.to_runtime_name(name))
    }

    pub fn canonical_descriptor(&self, descriptor: &str) -> Result<String> {
        if self.is_identity() {
            return Ok(descriptor.to_string());
        }
        map_descriptor(descriptor, |name| self.to_canonical_name(name))
    }

    /// Runtime owner, name and descriptor of a canonically named method.
    pub fn to_runtime_method(&self, owner: &str, name: &str, descriptor: &str) -> Result<MemberName> {
        let owner_canonical = internal_name(owner);
        if self.is_identity() {
            return Ok(member(owner_canonical, name, descriptor));
        }
        let runtime_name = self
            .oracle
            .runtime_method(&owner_canonical, name, descriptor)
            .map_err(|source| unknown(format!("{owner_canonical}.{name}{descriptor}"), source))?;
        Ok(MemberName {
            owner: self.to_runtime_name(&owner_canonical)?,
            name: runtime_name,
            descriptor: self.runtime_descriptor(descriptor)?,
        })
    }

    pub fn to_runtime_field(&self, owner: &str, name: &str, descriptor: &str) -> Result<MemberName> {
        let owner_canonical = internal_name(owner);
        if self.is_identity() {
            return Ok(member(owner_canonical, name, descriptor));
        }
        let runtime_name = self
            .oracle
            .runtime_field(&owner_canonical, name, descriptor)
            .map_err(|source| unknown(format!("{owner_canonical}.{name}:{descriptor}"), source))?;
        Ok(MemberName {
            owner: self.to_runtime_name(&owner_canonical)?,
            name: runtime_name,
            descriptor: self.runtime_descriptor(descriptor)?,
        })
    }

    /// Canonical owner, name and descriptor of a method named in runtime terms.
    pub fn to_canonical_method(&self, owner: &str, name: &str, descriptor: &str) -> Result<MemberName> {
        let owner_runtime = internal_name(owner);
        if self.is_identity() {
            return Ok(member(owner_runtime, name, descriptor));
        }
        let canonical_name = self
            .oracle
            .canonical_method(&owner_runtime, name, descriptor)
            .map_err(|source| unknown(format!("{owner_runtime}.{name}{descriptor}"), source))?;
        Ok(MemberName {
            owner: self.to_canonical_name(&owner_runtime)?,
            name: canonical_name,
            descriptor: self.canonical_descriptor(descriptor)?,
        })
    }

    pub fn to_canonical_field(&self, owner: &str, name: &str, descriptor: &str) -> Result<MemberName> {
        let owner_runtime = internal_name(owner);
        if self.is_identity() {
            return Ok(member(owner_runtime, name, descriptor));
        }
        let canonical_name = self
            .oracle
            .canonical_field(&owner_runtime, name, descriptor)
            .map_err(|source| unknown(format!("{owner_runtime}.{name}:{descriptor}"), source))?;
        Ok(MemberName {
            owner: self.to_canonical_name(&owner_runtime)?,
            name: canonical_name,
            descriptor: self.canonical_descriptor(descriptor)?,
        })
    }
}

fn member(owner: String, name: &str, descriptor: &str) -> MemberName {
    MemberName {
        owner,
        name: name.to_string(),
        descriptor: descriptor.to_string(),
    }
}

fn unknown(symbol: impl Into<String>, source: BoxError) -> Error {
    Error::UnknownMapping {
        symbol: symbol.into(),
        source,
    }
}

/// Rewrite the class names inside `L...;` segments of a descriptor.
fn map_descriptor<E>(
    descriptor: &str,
    mut map: impl FnMut(&str) -> std::result::Result<String, E>,
) -> std::result::Result<String, E> {
    let mut out = String::with_capacity(descriptor.len());
    let mut rest = descriptor;
    while let Some(start) = rest.find('L') {
        out.push_str(&rest[..=start]);
        let tail = &rest[start + 1..];
        match tail.find(';') {
            Some(end) => {
                out.push_str(&map(&tail[..end])?);
                out.push(';');
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

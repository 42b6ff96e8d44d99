use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result as AnyResult};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::class_info::ClassBytesLoader;
use crate::descriptor::internal_name;
use crate::error::{BoxError, Result};
use crate::ir::ClassRecord;
use crate::writer::serialize;

/// Class bytes held in memory, keyed by internal name.
#[derive(Clone, Debug, Default)]
pub struct MemoryLoader {
    classes: HashMap<String, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, bytes: Vec<u8>) {
        self.classes.insert(internal_name(name), bytes);
    }

    /// Serialize a record and store it under its own name.
    pub fn insert_record(&mut self, class: &ClassRecord) -> Result<()> {
        let bytes = serialize(class)?;
        self.classes.insert(class.name.clone(), bytes);
        Ok(())
    }
}

impl ClassBytesLoader for MemoryLoader {
    fn load_class_bytes(&self, name: &str) -> std::result::Result<Vec<u8>, BoxError> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| format!("{name} is not loaded").into())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ClassPathEntry {
    Dir(PathBuf),
    Jar(PathBuf),
}

/// Directories and JAR files searched in order for `<name>.class`.
#[derive(Clone, Debug, Default)]
pub struct ClassPath {
    entries: Vec<ClassPathEntry>,
}

impl ClassPath {
    pub fn new(paths: &[PathBuf]) -> AnyResult<Self> {
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            if path.is_dir() {
                entries.push(ClassPathEntry::Dir(path.clone()));
                continue;
            }
            if !path.exists() {
                anyhow::bail!("classpath entry not found: {}", path.display());
            }
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("jar") | Some("zip") => entries.push(ClassPathEntry::Jar(path.clone())),
                _ => anyhow::bail!("unsupported classpath entry: {}", path.display()),
            }
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Internal names of every class on the path, sorted and deduplicated.
    pub fn class_names(&self) -> AnyResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in &self.entries {
            match entry {
                ClassPathEntry::Dir(root) => collect_dir(root, root, &mut names)?,
                ClassPathEntry::Jar(path) => collect_jar(path, &mut names)?,
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn find(&self, name: &str) -> AnyResult<Option<Vec<u8>>> {
        let entry_name = format!("{name}.class");
        for entry in &self.entries {
            let found = match entry {
                ClassPathEntry::Dir(root) => read_from_dir(root, &entry_name)?,
                ClassPathEntry::Jar(path) => read_from_jar(path, &entry_name)?,
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }
}

impl ClassBytesLoader for ClassPath {
    fn load_class_bytes(&self, name: &str) -> std::result::Result<Vec<u8>, BoxError> {
        match self.find(&internal_name(name))? {
            Some(bytes) => Ok(bytes),
            None => Err(format!("{name} is not on the class path").into()),
        }
    }
}

fn read_from_dir(root: &Path, entry_name: &str) -> AnyResult<Option<Vec<u8>>> {
    let path = root.join(entry_name);
    if !path.is_file() {
        return Ok(None);
    }
    let data = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Some(data))
}

fn read_from_jar(path: &Path, entry_name: &str) -> AnyResult<Option<Vec<u8>>> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;
    let mut entry = match archive.by_name(entry_name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}:{}", path.display(), entry_name));
        }
    };
    let mut data = Vec::new();
    entry
        .read_to_end(&mut data)
        .with_context(|| format!("failed to read {}:{}", path.display(), entry_name))?;
    Ok(Some(data))
}

fn collect_dir(root: &Path, dir: &Path, names: &mut Vec<String>) -> AnyResult<()> {
    let mut entries = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read entry under {}", dir.display()))?;
        entries.push(entry.path());
    }
    entries.sort();

    for entry in entries {
        if entry.is_dir() {
            collect_dir(root, &entry, names)?;
        } else if let Some(name) = class_name_of(root, &entry) {
            names.push(name);
        }
    }
    Ok(())
}

fn class_name_of(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let relative = relative.to_str()?.replace(std::path::MAIN_SEPARATOR, "/");
    let name = relative.strip_suffix(".class")?;
    (name != "module-info").then(|| name.to_string())
}

fn collect_jar(path: &Path, names: &mut Vec<String>) -> AnyResult<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name();
        if let Some(class) = name.strip_suffix(".class") {
            if !class.ends_with("module-info") {
                names.push(class.to_string());
            }
        }
    }
    Ok(())
}

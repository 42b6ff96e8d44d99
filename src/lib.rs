//! Read, search and synthesize JVM class structures, with symbol lookups
//! that work the same against canonical and obfuscated names.

pub mod class_info;
mod constant_pool;
pub mod descriptor;
pub mod error;
pub mod hierarchy;
pub mod ir;
pub mod loader;
pub mod mapping;
pub mod members;
pub mod opcodes;
mod reader;
pub mod search;
pub mod synth;
mod writer;

pub use class_info::{
    ClassBytesLoader, ClassInfo, ClassResolver, ClassTable, LoadedClass, ResidentClasses,
};
pub use error::{BoxError, Error, Result};
pub use hierarchy::{Hierarchy, OBJECT};
pub use ir::{
    AccessFlags, Annotation, ClassRecord, Code, Constant, ElementValue, FieldRecord, Instruction,
    Label, MethodRecord, RawAttribute, TryCatch,
};
pub use loader::{ClassPath, MemoryLoader};
pub use mapping::{MemberName, NameOracle, NameTable, NamingMode, Remapper};
pub use reader::parse;
pub use search::{Match, find_last_call, find_last_literal, find_last_opcode, find_last_return};
pub use synth::{generate_getter, generate_setter};
pub use writer::serialize;

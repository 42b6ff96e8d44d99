use std::collections::HashMap;

use anyhow::{Context, Result as AnyResult};

use crate::error::{Error, Result};
use crate::reader::{read_bytes, read_u8, read_u16, read_u32};

/// Constant pool entry as stored in the class file, with indices unresolved.
///
/// Floating point values are kept as raw bits so every entry can be hashed
/// and NaN payloads survive a round trip.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum PoolEntry {
    Utf8(String),
    /// Utf8 entry whose UTF-16 units are not valid Unicode (lone surrogates).
    Utf16(Vec<u16>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl PoolEntry {
    fn is_wide(&self) -> bool {
        matches!(self, PoolEntry::Long(_) | PoolEntry::Double(_))
    }
}

/// Resolved `Fieldref`, `Methodref` or `InterfaceMethodref`.
pub(crate) struct MemberRef {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) interface: bool,
}

/// Constant pool of a class, indexed from 1.
///
/// Slot 0 and the slot after each long or double are unusable and hold `None`.
/// New entries are only ever appended, so existing indices stay valid.
#[derive(Clone, Debug, Default)]
pub(crate) struct ConstantPool {
    entries: Vec<Option<PoolEntry>>,
    lookup: HashMap<PoolEntry, u16>,
}

impl PartialEq for ConstantPool {
    fn eq(&self, other: &Self) -> bool {
        self.entries().iter().skip(1).eq(other.entries().iter().skip(1))
    }
}

impl ConstantPool {
    pub(crate) fn read(data: &[u8], offset: &mut usize) -> AnyResult<Self> {
        let count = read_u16(data, offset)?;
        let mut pool = ConstantPool::default();
        pool.entries.push(None);
        let mut index = 1u16;
        while index < count {
            let tag = read_u8(data, offset)?;
            let entry = match tag {
                1 => {
                    let len = read_u16(data, offset)? as usize;
                    let bytes = read_bytes(data, offset, len)?;
                    let units = decode_modified_utf8(bytes)
                        .with_context(|| format!("constant pool entry {index}"))?;
                    match String::from_utf16(&units) {
                        Ok(value) => PoolEntry::Utf8(value),
                        Err(_) => PoolEntry::Utf16(units),
                    }
                }
                3 => PoolEntry::Integer(read_u32(data, offset)? as i32),
                4 => PoolEntry::Float(read_u32(data, offset)?),
                5 => {
                    let high = read_u32(data, offset)? as u64;
                    let low = read_u32(data, offset)? as u64;
                    PoolEntry::Long(((high << 32) | low) as i64)
                }
                6 => {
                    let high = read_u32(data, offset)? as u64;
                    let low = read_u32(data, offset)? as u64;
                    PoolEntry::Double((high << 32) | low)
                }
                7 => PoolEntry::Class(read_u16(data, offset)?),
                8 => PoolEntry::String(read_u16(data, offset)?),
                9 | 10 | 11 => {
                    let class = read_u16(data, offset)?;
                    let name_and_type = read_u16(data, offset)?;
                    match tag {
                        9 => PoolEntry::FieldRef { class, name_and_type },
                        10 => PoolEntry::MethodRef { class, name_and_type },
                        _ => PoolEntry::InterfaceMethodRef { class, name_and_type },
                    }
                }
                12 => PoolEntry::NameAndType {
                    name: read_u16(data, offset)?,
                    descriptor: read_u16(data, offset)?,
                },
                15 => PoolEntry::MethodHandle {
                    kind: read_u8(data, offset)?,
                    reference: read_u16(data, offset)?,
                },
                16 => PoolEntry::MethodType(read_u16(data, offset)?),
                17 | 18 => {
                    let bootstrap = read_u16(data, offset)?;
                    let name_and_type = read_u16(data, offset)?;
                    if tag == 17 {
                        PoolEntry::Dynamic { bootstrap, name_and_type }
                    } else {
                        PoolEntry::InvokeDynamic { bootstrap, name_and_type }
                    }
                }
                19 => PoolEntry::Module(read_u16(data, offset)?),
                20 => PoolEntry::Package(read_u16(data, offset)?),
                _ => anyhow::bail!("unsupported constant pool tag {tag} at entry {index}"),
            };
            let wide = entry.is_wide();
            pool.insert(entry);
            index += if wide { 2 } else { 1 };
        }
        if pool.entries.len() != count as usize {
            anyhow::bail!("constant pool overruns its declared count {count}");
        }
        Ok(pool)
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        let count = self.entries().len().max(1) as u16;
        out.extend_from_slice(&count.to_be_bytes());
        for entry in self.entries.iter().flatten() {
            match entry {
                PoolEntry::Utf8(value) => push_utf8_entry(out, &encode_modified_utf8(value)),
                PoolEntry::Utf16(units) => {
                    push_utf8_entry(out, &encode_utf16_units(units.iter().copied()))
                }
                PoolEntry::Integer(value) => {
                    out.push(3);
                    out.extend_from_slice(&value.to_be_bytes());
                }
                PoolEntry::Float(bits) => {
                    out.push(4);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                PoolEntry::Long(value) => {
                    out.push(5);
                    out.extend_from_slice(&value.to_be_bytes());
                }
                PoolEntry::Double(bits) => {
                    out.push(6);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                PoolEntry::Class(name) => push_u16_entry(out, 7, *name),
                PoolEntry::String(value) => push_u16_entry(out, 8, *value),
                PoolEntry::FieldRef { class, name_and_type } => {
                    push_pair_entry(out, 9, *class, *name_and_type)
                }
                PoolEntry::MethodRef { class, name_and_type } => {
                    push_pair_entry(out, 10, *class, *name_and_type)
                }
                PoolEntry::InterfaceMethodRef { class, name_and_type } => {
                    push_pair_entry(out, 11, *class, *name_and_type)
                }
                PoolEntry::NameAndType { name, descriptor } => {
                    push_pair_entry(out, 12, *name, *descriptor)
                }
                PoolEntry::MethodHandle { kind, reference } => {
                    out.push(15);
                    out.push(*kind);
                    out.extend_from_slice(&reference.to_be_bytes());
                }
                PoolEntry::MethodType(descriptor) => push_u16_entry(out, 16, *descriptor),
                PoolEntry::Dynamic { bootstrap, name_and_type } => {
                    push_pair_entry(out, 17, *bootstrap, *name_and_type)
                }
                PoolEntry::InvokeDynamic { bootstrap, name_and_type } => {
                    push_pair_entry(out, 18, *bootstrap, *name_and_type)
                }
                PoolEntry::Module(name) => push_u16_entry(out, 19, *name),
                PoolEntry::Package(name) => push_u16_entry(out, 20, *name),
            }
        }
    }

    /// Entries including the unusable slot 0.
    fn entries(&self) -> &[Option<PoolEntry>] {
        &self.entries
    }

    fn insert(&mut self, entry: PoolEntry) -> usize {
        if self.entries.is_empty() {
            self.entries.push(None);
        }
        let index = self.entries.len();
        let wide = entry.is_wide();
        // Duplicates keep the first index; javac never emits them but obfuscators do.
        self.lookup.entry(entry.clone()).or_insert(index as u16);
        self.entries.push(Some(entry));
        if wide {
            self.entries.push(None);
        }
        index
    }

    pub(crate) fn get(&self, index: u16) -> AnyResult<&PoolEntry> {
        self.entries
            .get(index as usize)
            .and_then(Option::as_ref)
            .with_context(|| format!("invalid constant pool index {index}"))
    }

    pub(crate) fn utf8(&self, index: u16) -> AnyResult<&str> {
        match self.get(index)? {
            PoolEntry::Utf8(value) => Ok(value),
            PoolEntry::Utf16(_) => {
                anyhow::bail!("constant pool entry {index} is not valid unicode")
            }
            _ => anyhow::bail!("constant pool entry {index} is not utf8"),
        }
    }

    pub(crate) fn class_name(&self, index: u16) -> AnyResult<&str> {
        match self.get(index)? {
            PoolEntry::Class(name) => self.utf8(*name),
            _ => anyhow::bail!("constant pool entry {index} is not a class"),
        }
    }

    pub(crate) fn name_and_type(&self, index: u16) -> AnyResult<(&str, &str)> {
        match self.get(index)? {
            PoolEntry::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => anyhow::bail!("constant pool entry {index} is not a name and type"),
        }
    }

    pub(crate) fn member_ref(&self, index: u16) -> AnyResult<MemberRef> {
        let (class, name_and_type, interface) = match self.get(index)? {
            PoolEntry::FieldRef { class, name_and_type }
            | PoolEntry::MethodRef { class, name_and_type } => (*class, *name_and_type, false),
            PoolEntry::InterfaceMethodRef { class, name_and_type } => {
                (*class, *name_and_type, true)
            }
            _ => anyhow::bail!("constant pool entry {index} is not a member reference"),
        };
        let owner = self.class_name(class).context("member owner")?;
        let (name, descriptor) = self
            .name_and_type(name_and_type)
            .context("member name and type")?;
        Ok(MemberRef {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface,
        })
    }

    /// Index of an existing equal entry, or of the newly appended one.
    pub(crate) fn intern(&mut self, entry: PoolEntry) -> Result<u16> {
        if let Some(index) = self.lookup.get(&entry) {
            return Ok(*index);
        }
        let needed = if entry.is_wide() { 2 } else { 1 };
        if self.entries.len().max(1) + needed > u16::MAX as usize {
            return Err(Error::unencodable("constant pool exceeds 65535 entries"));
        }
        Ok(self.insert(entry) as u16)
    }

    pub(crate) fn intern_utf8(&mut self, value: &str) -> Result<u16> {
        if encode_modified_utf8(value).len() > u16::MAX as usize {
            return Err(Error::unencodable(format!(
                "string constant of {} bytes is too long",
                value.len()
            )));
        }
        self.intern(PoolEntry::Utf8(value.to_string()))
    }

    /// Intern a string constant given as raw UTF-16 units.
    pub(crate) fn intern_utf16(&mut self, units: &[u16]) -> Result<u16> {
        if let Ok(value) = String::from_utf16(units) {
            return self.intern_utf8(&value);
        }
        if encode_utf16_units(units.iter().copied()).len() > u16::MAX as usize {
            return Err(Error::unencodable(format!(
                "string constant of {} units is too long",
                units.len()
            )));
        }
        self.intern(PoolEntry::Utf16(units.to_vec()))
    }

    pub(crate) fn intern_class(&mut self, name: &str) -> Result<u16> {
        let name = self.intern_utf8(name)?;
        self.intern(PoolEntry::Class(name))
    }

    pub(crate) fn intern_string(&mut self, value: &str) -> Result<u16> {
        let value = self.intern_utf8(value)?;
        self.intern(PoolEntry::String(value))
    }

    pub(crate) fn intern_string_units(&mut self, units: &[u16]) -> Result<u16> {
        let value = self.intern_utf16(units)?;
        self.intern(PoolEntry::String(value))
    }

    pub(crate) fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.intern_utf8(name)?;
        let descriptor = self.intern_utf8(descriptor)?;
        self.intern(PoolEntry::NameAndType { name, descriptor })
    }

    pub(crate) fn intern_field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class = self.intern_class(owner)?;
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        self.intern(PoolEntry::FieldRef { class, name_and_type })
    }

    pub(crate) fn intern_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> Result<u16> {
        let class = self.intern_class(owner)?;
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        if interface {
            self.intern(PoolEntry::InterfaceMethodRef { class, name_and_type })
        } else {
            self.intern(PoolEntry::MethodRef { class, name_and_type })
        }
    }

    pub(crate) fn intern_invoke_dynamic(
        &mut self,
        bootstrap: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        self.intern(PoolEntry::InvokeDynamic { bootstrap, name_and_type })
    }
}

fn push_utf8_entry(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(1);
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn push_u16_entry(out: &mut Vec<u8>, tag: u8, value: u16) {
    out.push(tag);
    out.extend_from_slice(&value.to_be_bytes());
}

fn push_pair_entry(out: &mut Vec<u8>, tag: u8, first: u16, second: u16) {
    out.push(tag);
    out.extend_from_slice(&first.to_be_bytes());
    out.extend_from_slice(&second.to_be_bytes());
}

/// Decode the JVM's modified UTF-8 (two-byte NUL, surrogate pairs as two
/// three-byte sequences) into UTF-16 units. Unpaired surrogates are kept.
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> AnyResult<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i];
        if byte & 0x80 == 0 {
            units.push(byte as u16);
            i += 1;
        } else if byte & 0xe0 == 0xc0 {
            let next = *bytes.get(i + 1).context("truncated two-byte sequence")?;
            if next & 0xc0 != 0x80 {
                anyhow::bail!("invalid two-byte sequence");
            }
            units.push((((byte & 0x1f) as u16) << 6) | (next & 0x3f) as u16);
            i += 2;
        } else if byte & 0xf0 == 0xe0 {
            let tail = bytes
                .get(i + 1..i + 3)
                .context("truncated three-byte sequence")?;
            if tail[0] & 0xc0 != 0x80 || tail[1] & 0xc0 != 0x80 {
                anyhow::bail!("invalid three-byte sequence");
            }
            units.push(
                (((byte & 0x0f) as u16) << 12)
                    | (((tail[0] & 0x3f) as u16) << 6)
                    | (tail[1] & 0x3f) as u16,
            );
            i += 3;
        } else {
            anyhow::bail!("invalid modified utf8 lead byte 0x{byte:02x}");
        }
    }
    Ok(units)
}

pub(crate) fn encode_modified_utf8(value: &str) -> Vec<u8> {
    encode_utf16_units(value.encode_utf16())
}

fn encode_utf16_units(units: impl IntoIterator<Item = u16>) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modified_utf8_encodes_nul_and_supplementary_characters() {
        let value = "a\0\u{1F600}é";
        let encoded = encode_modified_utf8(value);

        assert_eq!(&encoded[..3], &[b'a', 0xc0, 0x80]);
        assert!(!encoded.contains(&0));
        let units = decode_modified_utf8(&encoded).expect("decode");
        assert_eq!(String::from_utf16(&units).expect("valid utf-16"), value);
    }

    #[test]
    fn lone_surrogate_survives_read_and_write() {
        // "a" followed by an unpaired high surrogate
        let entry = [1, 0x00, 0x04, b'a', 0xed, 0xa0, 0x80];
        let mut bytes = vec![0x00, 0x02];
        bytes.extend_from_slice(&entry);
        let mut offset = 0;

        let pool = ConstantPool::read(&bytes, &mut offset).expect("read pool");

        assert_eq!(
            pool.get(1).expect("entry"),
            &PoolEntry::Utf16(vec![u16::from(b'a'), 0xd800])
        );
        assert!(pool.utf8(1).is_err());
        let mut written = Vec::new();
        pool.write(&mut written);
        assert_eq!(written, bytes);
    }

    #[test]
    fn interning_units_reuses_the_read_entry() {
        let mut bytes = vec![0x00, 0x02];
        bytes.extend_from_slice(&[1, 0x00, 0x03, 0xed, 0xb0, 0x80]);
        let mut offset = 0;
        let mut pool = ConstantPool::read(&bytes, &mut offset).expect("read pool");

        assert_eq!(pool.intern_utf16(&[0xdc00]).expect("intern"), 1);
        let valid = pool.intern_utf16(&[u16::from(b'o'), u16::from(b'k')]).expect("intern");
        assert_eq!(pool.utf8(valid).expect("utf8"), "ok");
    }

    #[test]
    fn intern_reuses_existing_entries() {
        let mut pool = ConstantPool::default();
        let first = pool.intern_class("a/Foo").expect("intern");
        let second = pool.intern_class("a/Foo").expect("intern");
        let other = pool.intern_class("a/Bar").expect("intern");

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(pool.class_name(first).expect("class"), "a/Foo");
    }

    #[test]
    fn wide_entries_take_two_slots() {
        let mut pool = ConstantPool::default();
        let long = pool.intern(PoolEntry::Long(7)).expect("long");
        let next = pool.intern_utf8("x").expect("utf8");

        assert_eq!(long, 1);
        assert_eq!(next, 3);
        assert!(pool.get(2).is_err());
    }

    #[test]
    fn written_pool_reads_back_identically() {
        let mut pool = ConstantPool::default();
        pool.intern_method_ref("a/Foo", "run", "()V", true)
            .expect("method ref");
        pool.intern(PoolEntry::Double(f64::NAN.to_bits()))
            .expect("double");
        pool.intern_string("hello").expect("string");

        let mut bytes = Vec::new();
        pool.write(&mut bytes);
        let mut offset = 0;
        let read = ConstantPool::read(&bytes, &mut offset).expect("read pool");

        assert_eq!(offset, bytes.len());
        assert_eq!(read, pool);
    }

    #[test]
    fn read_rejects_unknown_tag() {
        let bytes = [0x00, 0x02, 0x02, 0x00, 0x00];
        let mut offset = 0;

        assert!(ConstantPool::read(&bytes, &mut offset).is_err());
    }
}

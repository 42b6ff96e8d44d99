use std::collections::{HashMap, HashSet};

use log::warn;

use crate::constant_pool::{ConstantPool, PoolEntry};
use crate::descriptor::argument_slots;
use crate::error::{Error, Result};
use crate::ir::{
    Annotation, ClassRecord, Code, Constant, ElementValue, FieldRecord, Instruction, Label,
    MethodRecord, RawAttribute,
};
use crate::opcodes;
use crate::reader::{MAGIC, padding};

/// Encode a [`ClassRecord`] as class file bytes.
///
/// Symbols are interned into a copy of the record's constant pool, so a
/// record read by [`crate::parse`] and written back unchanged produces the
/// same bytes on every later cycle.
pub fn serialize(class: &ClassRecord) -> Result<Vec<u8>> {
    write_class(class).map_err(|err| err.in_class(&class.name))
}

fn write_class(class: &ClassRecord) -> Result<Vec<u8>> {
    let mut pool = class.constant_pool.clone();
    let mut body = Vec::new();

    push_u16(&mut body, class.access.bits());
    push_u16(&mut body, pool.intern_class(&class.name)?);
    let super_index = match &class.super_name {
        Some(name) => pool.intern_class(name)?,
        None => 0,
    };
    push_u16(&mut body, super_index);
    push_u16(&mut body, count(class.interfaces.len(), "interfaces")?);
    for interface in &class.interfaces {
        push_u16(&mut body, pool.intern_class(interface)?);
    }

    push_u16(&mut body, count(class.fields.len(), "fields")?);
    for field in &class.fields {
        write_field(&mut pool, &mut body, field)?;
    }
    push_u16(&mut body, count(class.methods.len(), "methods")?);
    for method in &class.methods {
        write_method(&mut pool, &mut body, method)?;
    }
    write_attributes(
        &mut pool,
        &mut body,
        &class.attributes,
        &class.annotations,
        Vec::new(),
        &class.attribute_order,
    )?;

    let mut out = Vec::with_capacity(body.len() + 1024);
    out.extend_from_slice(&MAGIC.to_be_bytes());
    push_u16(&mut out, class.minor_version);
    push_u16(&mut out, class.major_version);
    pool.write(&mut out);
    out.extend_from_slice(&body);
    Ok(out)
}

fn write_field(pool: &mut ConstantPool, out: &mut Vec<u8>, field: &FieldRecord) -> Result<()> {
    push_u16(out, field.access.bits());
    push_u16(out, pool.intern_utf8(&field.name)?);
    push_u16(out, pool.intern_utf8(&field.descriptor)?);
    write_attributes(
        pool,
        out,
        &field.attributes,
        &field.annotations,
        Vec::new(),
        &field.attribute_order,
    )
}

fn write_method(pool: &mut ConstantPool, out: &mut Vec<u8>, method: &MethodRecord) -> Result<()> {
    push_u16(out, method.access.bits());
    push_u16(out, pool.intern_utf8(&method.name)?);
    push_u16(out, pool.intern_utf8(&method.descriptor)?);

    let mut modelled = Vec::new();
    if let Some(code) = &method.code {
        let signature = format!("{}{}", method.name, method.descriptor);
        let data = write_code(pool, &signature, code)?;
        modelled.push(("Code", data));
    }
    if !method.exceptions.is_empty() {
        let mut data = Vec::new();
        push_u16(&mut data, count(method.exceptions.len(), "exceptions")?);
        for exception in &method.exceptions {
            push_u16(&mut data, pool.intern_class(exception)?);
        }
        modelled.push(("Exceptions", data));
    }
    write_attributes(
        pool,
        out,
        &method.attributes,
        &method.annotations,
        modelled,
        &method.attribute_order,
    )
}

/// Write an attribute table in the recorded `order`. Attributes missing from
/// it go last: modelled ones first, then verbatim ones, then annotations
/// grouped by retention.
fn write_attributes<'a>(
    pool: &mut ConstantPool,
    out: &mut Vec<u8>,
    raw: &'a [RawAttribute],
    annotations: &[Annotation],
    modelled: Vec<(&'a str, Vec<u8>)>,
    order: &[String],
) -> Result<()> {
    let mut attributes = modelled;
    attributes.extend(
        raw.iter()
            .map(|attribute| (attribute.name.as_str(), attribute.data.clone())),
    );
    for (name, visible) in [
        ("RuntimeVisibleAnnotations", true),
        ("RuntimeInvisibleAnnotations", false),
    ] {
        let group: Vec<&Annotation> = annotations
            .iter()
            .filter(|annotation| annotation.visible == visible)
            .collect();
        if group.is_empty() {
            continue;
        }
        let mut data = Vec::new();
        push_u16(&mut data, count(group.len(), "annotations")?);
        for annotation in group {
            write_annotation(pool, &mut data, annotation)?;
        }
        attributes.push((name, data));
    }
    let attributes = restore_order(attributes, order);

    push_u16(out, count(attributes.len(), "attributes")?);
    for (name, data) in attributes {
        push_u16(out, pool.intern_utf8(name)?);
        let length = u32::try_from(data.len())
            .map_err(|_| Error::unencodable(format!("attribute {name} is too long")))?;
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&data);
    }
    Ok(())
}

/// Sort attributes by where their name appeared when read. The n-th
/// attribute of a name takes the n-th recorded position of that name.
fn restore_order<'a>(
    attributes: Vec<(&'a str, Vec<u8>)>,
    order: &[String],
) -> Vec<(&'a str, Vec<u8>)> {
    if order.is_empty() {
        return attributes;
    }
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut keyed: Vec<(usize, (&'a str, Vec<u8>))> = attributes
        .into_iter()
        .map(|attribute| {
            let occurrence = seen.entry(attribute.0).or_default();
            let position = order
                .iter()
                .enumerate()
                .filter(|(_, name)| name.as_str() == attribute.0)
                .nth(*occurrence)
                .map_or(usize::MAX, |(position, _)| position);
            *occurrence += 1;
            (position, attribute)
        })
        .collect();
    keyed.sort_by_key(|(position, _)| *position);
    keyed.into_iter().map(|(_, attribute)| attribute).collect()
}

fn write_annotation(pool: &mut ConstantPool, out: &mut Vec<u8>, annotation: &Annotation) -> Result<()> {
    push_u16(out, pool.intern_utf8(&annotation.descriptor)?);
    push_u16(out, count(annotation.elements.len(), "annotation elements")?);
    for (name, value) in &annotation.elements {
        push_u16(out, pool.intern_utf8(name)?);
        write_element_value(pool, out, value)?;
    }
    Ok(())
}

fn write_element_value(pool: &mut ConstantPool, out: &mut Vec<u8>, value: &ElementValue) -> Result<()> {
    match value {
        ElementValue::Const { tag, value } => {
            let index = match (*tag, value) {
                (b's', Constant::String(value)) => pool.intern_utf8(value)?,
                (b's', Constant::Utf16(units)) => pool.intern_utf16(units)?,
                (b'B' | b'C' | b'I' | b'S' | b'Z', Constant::Int(value)) => {
                    pool.intern(PoolEntry::Integer(*value))?
                }
                (b'J', Constant::Long(value)) => pool.intern(PoolEntry::Long(*value))?,
                (b'F', Constant::Float(value)) => pool.intern(PoolEntry::Float(value.to_bits()))?,
                (b'D', Constant::Double(value)) => {
                    pool.intern(PoolEntry::Double(value.to_bits()))?
                }
                _ => {
                    return Err(Error::unencodable(format!(
                        "element tag {} does not match {value:?}",
                        *tag as char
                    )));
                }
            };
            out.push(*tag);
            push_u16(out, index);
        }
        ElementValue::Enum { descriptor, name } => {
            out.push(b'e');
            push_u16(out, pool.intern_utf8(descriptor)?);
            push_u16(out, pool.intern_utf8(name)?);
        }
        ElementValue::Class(descriptor) => {
            out.push(b'c');
            push_u16(out, pool.intern_utf8(descriptor)?);
        }
        ElementValue::Annotation(annotation) => {
            out.push(b'@');
            write_annotation(pool, out, annotation)?;
        }
        ElementValue::Array(values) => {
            out.push(b'[');
            push_u16(out, count(values.len(), "array elements")?);
            for value in values {
                write_element_value(pool, out, value)?;
            }
        }
    }
    Ok(())
}

fn write_code(pool: &mut ConstantPool, method: &str, code: &Code) -> Result<Vec<u8>> {
    // Operands are interned up front so `ldc` sizes are known before layout.
    let operands = code
        .instructions
        .iter()
        .map(|insn| {
            check_opcode(insn)?;
            intern_operand(pool, insn)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut labels = HashMap::new();
    let mut boundaries = HashSet::new();
    let mut offset = 0usize;
    for (insn, operand) in code.instructions.iter().zip(&operands) {
        match insn {
            Instruction::Label(label) => {
                labels.insert(*label, offset);
            }
            _ => {
                boundaries.insert(offset);
            }
        }
        offset += encoded_size(insn, *operand, offset);
    }
    if offset > u16::MAX as usize {
        return Err(Error::unencodable(format!(
            "method code is {offset} bytes long"
        )));
    }
    if offset == 0 {
        return Err(Error::unencodable("method code is empty"));
    }
    if has_stale_offsets(&code.attributes, &boundaries) {
        warn!("{method}: code attributes refer to offsets that are no longer instruction boundaries");
    }

    let mut bytecode = Vec::with_capacity(offset);
    for (insn, operand) in code.instructions.iter().zip(&operands) {
        encode(&mut bytecode, insn, *operand, &labels)?;
    }

    let mut out = Vec::with_capacity(bytecode.len() + 32);
    push_u16(&mut out, code.max_stack);
    push_u16(&mut out, code.max_locals);
    out.extend_from_slice(&(bytecode.len() as u32).to_be_bytes());
    out.extend_from_slice(&bytecode);
    push_u16(&mut out, count(code.try_catch.len(), "exception handlers")?);
    for block in &code.try_catch {
        push_u16(&mut out, label_offset(&labels, block.start)? as u16);
        push_u16(&mut out, label_offset(&labels, block.end)? as u16);
        push_u16(&mut out, label_offset(&labels, block.handler)? as u16);
        let catch_type = match &block.catch_type {
            Some(name) => pool.intern_class(name)?,
            None => 0,
        };
        push_u16(&mut out, catch_type);
    }
    write_attributes(
        pool,
        &mut out,
        &code.attributes,
        &[],
        Vec::new(),
        &code.attribute_order,
    )?;
    Ok(out)
}

/// Nested attributes whose entries start with a `u16` bytecode offset, and
/// the size of each entry.
const OFFSET_TABLES: [(&str, usize); 3] = [
    ("LineNumberTable", 4),
    ("LocalVariableTable", 10),
    ("LocalVariableTypeTable", 10),
];

fn has_stale_offsets(attributes: &[RawAttribute], boundaries: &HashSet<usize>) -> bool {
    attributes.iter().any(|attribute| {
        let Some((_, stride)) = OFFSET_TABLES
            .iter()
            .find(|(name, _)| *name == attribute.name)
        else {
            return false;
        };
        attribute.data.get(2..).is_some_and(|entries| {
            entries.chunks_exact(*stride).any(|entry| {
                !boundaries.contains(&(u16::from_be_bytes([entry[0], entry[1]]) as usize))
            })
        })
    })
}

/// Reject an opcode that does not belong to the instruction shape carrying it.
fn check_opcode(insn: &Instruction) -> Result<()> {
    let valid = match insn {
        Instruction::Insn(opcode) => matches!(
            *opcode,
            opcodes::NOP..=opcodes::DCONST_1
                | opcodes::IALOAD..=opcodes::SALOAD
                | opcodes::IASTORE..=opcodes::LXOR
                | opcodes::I2L..=opcodes::DCMPG
                | opcodes::IRETURN..=opcodes::RETURN
                | opcodes::ARRAYLENGTH
                | opcodes::ATHROW
                | opcodes::MONITORENTER
                | opcodes::MONITOREXIT
        ),
        Instruction::Int { opcode, .. } => {
            matches!(*opcode, opcodes::BIPUSH | opcodes::SIPUSH | opcodes::NEWARRAY)
        }
        Instruction::Var { opcode, .. } => matches!(
            *opcode,
            opcodes::ILOAD..=opcodes::ALOAD | opcodes::ISTORE..=opcodes::ASTORE | opcodes::RET
        ),
        Instruction::Jump { opcode, .. } => matches!(
            *opcode,
            opcodes::IFEQ..=opcodes::JSR
                | opcodes::IFNULL
                | opcodes::IFNONNULL
                | opcodes::GOTO_W
                | opcodes::JSR_W
        ),
        Instruction::Type { opcode, .. } => matches!(
            *opcode,
            opcodes::NEW | opcodes::ANEWARRAY | opcodes::CHECKCAST | opcodes::INSTANCEOF
        ),
        Instruction::Field { opcode, .. } => {
            matches!(*opcode, opcodes::GETSTATIC..=opcodes::PUTFIELD)
        }
        Instruction::Method { opcode, .. } => {
            matches!(*opcode, opcodes::INVOKEVIRTUAL..=opcodes::INVOKEINTERFACE)
        }
        _ => true,
    };
    if valid {
        return Ok(());
    }
    Err(Error::unencodable(format!(
        "opcode 0x{:02x} does not fit {insn:?}",
        insn.opcode().unwrap_or_default()
    )))
}

fn intern_operand(pool: &mut ConstantPool, insn: &Instruction) -> Result<u16> {
    let index = match insn {
        Instruction::Type { class, .. } | Instruction::MultiANewArray { class, .. } => {
            pool.intern_class(class)?
        }
        Instruction::Field {
            owner,
            name,
            descriptor,
            ..
        } => pool.intern_field_ref(owner, name, descriptor)?,
        Instruction::Method {
            owner,
            name,
            descriptor,
            interface,
            ..
        } => pool.intern_method_ref(owner, name, descriptor, *interface)?,
        Instruction::InvokeDynamic {
            bootstrap,
            name,
            descriptor,
        } => pool.intern_invoke_dynamic(*bootstrap, name, descriptor)?,
        Instruction::Ldc(constant) => match constant {
            Constant::Int(value) => pool.intern(PoolEntry::Integer(*value))?,
            Constant::Float(value) => pool.intern(PoolEntry::Float(value.to_bits()))?,
            Constant::Long(value) => pool.intern(PoolEntry::Long(*value))?,
            Constant::Double(value) => pool.intern(PoolEntry::Double(value.to_bits()))?,
            Constant::String(value) => pool.intern_string(value)?,
            Constant::Utf16(units) => pool.intern_string_units(units)?,
            Constant::Class(name) => pool.intern_class(name)?,
            Constant::MethodType(descriptor) => {
                let descriptor = pool.intern_utf8(descriptor)?;
                pool.intern(PoolEntry::MethodType(descriptor))?
            }
            Constant::Pooled(index) => *index,
        },
        _ => 0,
    };
    Ok(index)
}

fn is_wide_constant(constant: &Constant) -> bool {
    matches!(constant, Constant::Long(_) | Constant::Double(_))
}

fn encoded_size(insn: &Instruction, operand: u16, offset: usize) -> usize {
    match insn {
        Instruction::Label(_) => 0,
        Instruction::Insn(_) => 1,
        Instruction::Int { opcode, .. } => {
            if *opcode == opcodes::SIPUSH {
                3
            } else {
                2
            }
        }
        Instruction::Var { opcode, index } => {
            if *index <= 3 && *opcode != opcodes::RET {
                1
            } else if *index <= u8::MAX as u16 {
                2
            } else {
                4
            }
        }
        Instruction::Iinc { index, delta } => {
            if *index <= u8::MAX as u16 && i8::try_from(*delta).is_ok() {
                3
            } else {
                6
            }
        }
        Instruction::Type { .. } | Instruction::Field { .. } => 3,
        Instruction::Method { opcode, .. } => {
            if *opcode == opcodes::INVOKEINTERFACE {
                5
            } else {
                3
            }
        }
        Instruction::InvokeDynamic { .. } => 5,
        Instruction::Ldc(constant) => {
            if is_wide_constant(constant) || operand > u8::MAX as u16 {
                3
            } else {
                2
            }
        }
        Instruction::Jump { opcode, .. } => {
            if *opcode == opcodes::GOTO_W || *opcode == opcodes::JSR_W {
                5
            } else {
                3
            }
        }
        Instruction::TableSwitch { targets, .. } => 1 + padding(offset) + 12 + 4 * targets.len(),
        Instruction::LookupSwitch { pairs, .. } => 1 + padding(offset) + 8 + 8 * pairs.len(),
        Instruction::MultiANewArray { .. } => 4,
    }
}

fn encode(
    out: &mut Vec<u8>,
    insn: &Instruction,
    operand: u16,
    labels: &HashMap<Label, usize>,
) -> Result<()> {
    let start = out.len();
    let relative = |label: Label| -> Result<i32> {
        let target = label_offset(labels, label)?;
        Ok(target as i32 - start as i32)
    };
    match insn {
        Instruction::Label(_) => {}
        Instruction::Insn(opcode) => out.push(*opcode),
        Instruction::Int { opcode, operand } => {
            out.push(*opcode);
            if *opcode == opcodes::SIPUSH {
                let value = i16::try_from(*operand)
                    .map_err(|_| Error::unencodable(format!("sipush operand {operand}")))?;
                out.extend_from_slice(&value.to_be_bytes());
            } else {
                let value = if *opcode == opcodes::NEWARRAY {
                    u8::try_from(*operand).map(|value| value as i8).ok()
                } else {
                    i8::try_from(*operand).ok()
                };
                let value = value.ok_or_else(|| {
                    Error::unencodable(format!("operand {operand} of opcode 0x{opcode:02x}"))
                })?;
                out.push(value as u8);
            }
        }
        Instruction::Var { opcode, index } => {
            if *index <= 3 && *opcode != opcodes::RET {
                let base = if *opcode >= opcodes::ISTORE {
                    opcodes::ISTORE_0 + (*opcode - opcodes::ISTORE) * 4
                } else {
                    opcodes::ILOAD_0 + (*opcode - opcodes::ILOAD) * 4
                };
                out.push(base + *index as u8);
            } else if *index <= u8::MAX as u16 {
                out.push(*opcode);
                out.push(*index as u8);
            } else {
                out.push(opcodes::WIDE);
                out.push(*opcode);
                push_u16(out, *index);
            }
        }
        Instruction::Iinc { index, delta } => {
            match (u8::try_from(*index), i8::try_from(*delta)) {
                (Ok(index), Ok(delta)) => {
                    out.extend_from_slice(&[opcodes::IINC, index, delta as u8]);
                }
                _ => {
                    out.extend_from_slice(&[opcodes::WIDE, opcodes::IINC]);
                    push_u16(out, *index);
                    out.extend_from_slice(&delta.to_be_bytes());
                }
            }
        }
        Instruction::Type { opcode, .. } | Instruction::Field { opcode, .. } => {
            out.push(*opcode);
            push_u16(out, operand);
        }
        Instruction::Method {
            opcode, descriptor, ..
        } => {
            out.push(*opcode);
            push_u16(out, operand);
            if *opcode == opcodes::INVOKEINTERFACE {
                let slots = argument_slots(descriptor)? + 1;
                out.push(u8::try_from(slots).map_err(|_| {
                    Error::unencodable(format!("too many arguments in {descriptor}"))
                })?);
                out.push(0);
            }
        }
        Instruction::InvokeDynamic { .. } => {
            out.push(opcodes::INVOKEDYNAMIC);
            push_u16(out, operand);
            push_u16(out, 0);
        }
        Instruction::Ldc(constant) => {
            if is_wide_constant(constant) {
                out.push(opcodes::LDC2_W);
                push_u16(out, operand);
            } else if let Ok(index) = u8::try_from(operand) {
                out.extend_from_slice(&[opcodes::LDC, index]);
            } else {
                out.push(opcodes::LDC_W);
                push_u16(out, operand);
            }
        }
        Instruction::Jump { opcode, target } => {
            let delta = relative(*target)?;
            out.push(*opcode);
            if *opcode == opcodes::GOTO_W || *opcode == opcodes::JSR_W {
                out.extend_from_slice(&delta.to_be_bytes());
            } else {
                let delta = i16::try_from(delta).map_err(|_| {
                    Error::unencodable(format!("branch offset {delta} does not fit 16 bits"))
                })?;
                out.extend_from_slice(&delta.to_be_bytes());
            }
        }
        Instruction::TableSwitch {
            low,
            high,
            default,
            targets,
        } => {
            if *high < *low || (*high as i64 - *low as i64 + 1) as usize != targets.len() {
                return Err(Error::unencodable(format!(
                    "tableswitch {low}..{high} has {} targets",
                    targets.len()
                )));
            }
            out.push(opcodes::TABLESWITCH);
            out.resize(out.len() + padding(start), 0);
            out.extend_from_slice(&relative(*default)?.to_be_bytes());
            out.extend_from_slice(&low.to_be_bytes());
            out.extend_from_slice(&high.to_be_bytes());
            for target in targets {
                out.extend_from_slice(&relative(*target)?.to_be_bytes());
            }
        }
        Instruction::LookupSwitch { default, pairs } => {
            out.push(opcodes::LOOKUPSWITCH);
            out.resize(out.len() + padding(start), 0);
            out.extend_from_slice(&relative(*default)?.to_be_bytes());
            out.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
            for (key, target) in pairs {
                out.extend_from_slice(&key.to_be_bytes());
                out.extend_from_slice(&relative(*target)?.to_be_bytes());
            }
        }
        Instruction::MultiANewArray { dimensions, .. } => {
            out.push(opcodes::MULTIANEWARRAY);
            push_u16(out, operand);
            out.push(*dimensions);
        }
    }
    Ok(())
}

fn label_offset(labels: &HashMap<Label, usize>, label: Label) -> Result<usize> {
    labels
        .get(&label)
        .copied()
        .ok_or_else(|| Error::unencodable(format!("label {} is never placed", label.0)))
}

fn count(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::unencodable(format!("too many {what}: {len}")))
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use jclassfile::class_file;

    use super::*;
    use crate::ir::{AccessFlags, FieldRecord, TryCatch};
    use crate::reader::parse;
    use crate::reader::tests::counter_class_bytes;

    fn branching_class() -> ClassRecord {
        let mut class = ClassRecord::new("demo/Branches", Some("java/lang/Object"));
        class.interfaces.push("java/lang/Runnable".to_string());
        class
            .fields
            .push(FieldRecord::new(AccessFlags::PRIVATE, "total", "J"));

        let mut method = MethodRecord::new(AccessFlags::PUBLIC | AccessFlags::STATIC, "pick", "(I)I");
        method.exceptions.push("java/io/IOException".to_string());
        let mut deprecated = Annotation::new("Ljava/lang/Deprecated;", true);
        deprecated.elements.push((
            "since".to_string(),
            ElementValue::Const {
                tag: b's',
                value: Constant::from("1.2"),
            },
        ));
        method.annotations.push(deprecated);
        method.code = Some(Code {
            max_stack: 2,
            max_locals: 300,
            instructions: vec![
                Instruction::Label(Label(0)),
                Instruction::Var {
                    opcode: opcodes::ILOAD,
                    index: 0,
                },
                Instruction::TableSwitch {
                    low: 1,
                    high: 2,
                    default: Label(3),
                    targets: vec![Label(1), Label(2)],
                },
                Instruction::Label(Label(1)),
                Instruction::Ldc(Constant::Long(1 << 40)),
                Instruction::Insn(opcodes::L2I),
                Instruction::Insn(opcodes::IRETURN),
                Instruction::Label(Label(2)),
                Instruction::Iinc {
                    index: 299,
                    delta: 1000,
                },
                Instruction::Var {
                    opcode: opcodes::ILOAD,
                    index: 299,
                },
                Instruction::Insn(opcodes::IRETURN),
                Instruction::Label(Label(3)),
                Instruction::Ldc(Constant::from("fallback")),
                Instruction::Method {
                    opcode: opcodes::INVOKEVIRTUAL,
                    owner: "java/lang/String".to_string(),
                    name: "length".to_string(),
                    descriptor: "()I".to_string(),
                    interface: false,
                },
                Instruction::Label(Label(4)),
                Instruction::Insn(opcodes::IRETURN),
                Instruction::Label(Label(5)),
                Instruction::Insn(opcodes::ICONST_M1),
                Instruction::Insn(opcodes::IRETURN),
            ],
            try_catch: vec![TryCatch {
                start: Label(0),
                end: Label(4),
                handler: Label(5),
                catch_type: Some("java/lang/RuntimeException".to_string()),
            }],
            ..Code::default()
        });
        class.methods.push(method);
        class
    }

    #[test]
    fn serialize_reproduces_parsed_bytes_exactly() {
        let bytes = counter_class_bytes();
        let class = parse(&bytes).expect("parse fixture");

        assert_eq!(serialize(&class).expect("serialize"), bytes);
    }

    #[test]
    fn serialized_class_is_stable_across_parse_cycles() {
        let class = branching_class();
        let first = serialize(&class).expect("serialize");
        let reparsed = parse(&first).expect("parse serialized class");
        let second = serialize(&reparsed).expect("serialize again");

        assert_eq!(first, second);
        assert_eq!(reparsed.methods[0].instructions(), class.methods[0].instructions());
        assert_eq!(reparsed.methods[0].exceptions, class.methods[0].exceptions);
        assert_eq!(reparsed.methods[0].annotations, class.methods[0].annotations);
        assert_eq!(
            reparsed.methods[0].code.as_ref().expect("code").try_catch,
            class.methods[0].code.as_ref().expect("code").try_catch
        );
    }

    #[test]
    fn serialized_class_is_accepted_by_independent_parser() {
        let bytes = serialize(&branching_class()).expect("serialize");

        assert!(class_file::parse(&bytes).is_ok());
    }

    #[test]
    fn short_and_wide_forms_are_chosen_by_operand() {
        let mut class = ClassRecord::new("demo/Forms", Some("java/lang/Object"));
        let mut method = MethodRecord::new(AccessFlags::STATIC, "run", "()V");
        method.code = Some(Code {
            max_stack: 1,
            max_locals: 300,
            instructions: vec![
                Instruction::Var {
                    opcode: opcodes::ASTORE,
                    index: 2,
                },
                Instruction::Var {
                    opcode: opcodes::ASTORE,
                    index: 7,
                },
                Instruction::Var {
                    opcode: opcodes::ASTORE,
                    index: 299,
                },
                Instruction::Insn(opcodes::RETURN),
            ],
            ..Code::default()
        });
        class.methods.push(method);

        let bytes = serialize(&class).expect("serialize");
        let expected = [
            opcodes::ASTORE_2,
            opcodes::ASTORE,
            7,
            opcodes::WIDE,
            opcodes::ASTORE,
            0x01,
            0x2b,
            opcodes::RETURN,
        ];
        assert!(bytes.windows(expected.len()).any(|window| window == expected));
    }

    #[test]
    fn unplaced_label_is_unencodable() {
        let mut class = ClassRecord::new("demo/Broken", Some("java/lang/Object"));
        let mut method = MethodRecord::new(AccessFlags::STATIC, "run", "()V");
        method.code = Some(Code {
            instructions: vec![Instruction::Jump {
                opcode: opcodes::GOTO,
                target: Label(9),
            }],
            ..Code::default()
        });
        class.methods.push(method);

        let err = serialize(&class).expect_err("dangling label");

        assert!(matches!(err, Error::Unencodable { .. }));
    }

    fn single_method_class(name: &str, instructions: Vec<Instruction>) -> ClassRecord {
        let mut class = ClassRecord::new(name, Some("java/lang/Object"));
        let mut method = MethodRecord::new(AccessFlags::STATIC, "run", "()Ljava/lang/String;");
        method.code = Some(Code {
            max_stack: 2,
            max_locals: 2,
            instructions,
            ..Code::default()
        });
        class.methods.push(method);
        class
    }

    #[test]
    fn lone_surrogate_literal_round_trips_byte_for_byte() {
        let units = vec![u16::from(b'b'), 0xd800, u16::from(b'x')];
        let class = single_method_class(
            "demo/Scrambled",
            vec![
                Instruction::Ldc(Constant::Utf16(units.clone())),
                Instruction::Insn(opcodes::ARETURN),
            ],
        );

        let bytes = serialize(&class).expect("serialize");
        let encoded = [b'b', 0xed, 0xa0, 0x80, b'x'];
        assert!(bytes.windows(encoded.len()).any(|window| window == encoded));

        let parsed = parse(&bytes).expect("parse lone surrogate");
        assert_eq!(
            parsed.methods[0].instructions()[0],
            Instruction::Ldc(Constant::Utf16(units))
        );
        assert_eq!(serialize(&parsed).expect("serialize again"), bytes);
    }

    #[test]
    fn opcode_outside_its_instruction_shape_is_unencodable() {
        let misplaced = [
            Instruction::Var {
                opcode: opcodes::NOP,
                index: 0,
            },
            Instruction::Var {
                opcode: opcodes::IADD,
                index: 1,
            },
            Instruction::Insn(opcodes::BIPUSH),
            Instruction::Int {
                opcode: opcodes::ILOAD,
                operand: 1,
            },
            Instruction::Jump {
                opcode: opcodes::IADD,
                target: Label(0),
            },
        ];
        for insn in misplaced {
            let class = single_method_class(
                "demo/Misplaced",
                vec![
                    Instruction::Label(Label(0)),
                    insn.clone(),
                    Instruction::Insn(opcodes::ACONST_NULL),
                    Instruction::Insn(opcodes::ARETURN),
                ],
            );

            let err = serialize(&class).expect_err("opcode does not fit");

            assert!(matches!(err, Error::Unencodable { .. }), "{insn:?}");
        }
    }

    #[test]
    fn attributes_keep_their_recorded_order() {
        let mut class = ClassRecord::new("demo/Ordered", Some("java/lang/Object"));
        class
            .annotations
            .push(Annotation::new("Ljava/lang/Deprecated;", true));
        class.attributes.push(RawAttribute {
            name: "demo.Marker".to_string(),
            data: vec![1, 2, 3],
        });
        class.attribute_order = vec![
            "RuntimeVisibleAnnotations".to_string(),
            "demo.Marker".to_string(),
        ];

        let bytes = serialize(&class).expect("serialize");
        let reparsed = parse(&bytes).expect("parse");

        assert_eq!(reparsed.attribute_order, class.attribute_order);
        assert_eq!(serialize(&reparsed).expect("serialize again"), bytes);

        class.attribute_order.clear();
        let unordered = parse(&serialize(&class).expect("serialize")).expect("parse");
        assert_eq!(
            unordered.attribute_order,
            vec!["demo.Marker", "RuntimeVisibleAnnotations"]
        );
    }
}

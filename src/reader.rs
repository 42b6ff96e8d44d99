use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result as AnyResult};

use crate::constant_pool::{ConstantPool, PoolEntry};
use crate::error::{Error, Result};
use crate::ir::{
    AccessFlags, Annotation, ClassRecord, Code, Constant, ElementValue, FieldRecord, Instruction,
    Label, MethodRecord, RawAttribute, TryCatch,
};
use crate::opcodes;

pub(crate) const MAGIC: u32 = 0xCAFEBABE;
pub(crate) const MIN_MAJOR_VERSION: u16 = 45;
/// Java 25.
pub(crate) const MAX_MAJOR_VERSION: u16 = 69;

/// Parse class file bytes into a [`ClassRecord`].
pub fn parse(data: &[u8]) -> Result<ClassRecord> {
    parse_class(data).map_err(|err| Error::malformed(format!("{err:#}")))
}

fn parse_class(data: &[u8]) -> AnyResult<ClassRecord> {
    let mut offset = 0usize;
    let magic = read_u32(data, &mut offset).context("read magic")?;
    if magic != MAGIC {
        anyhow::bail!("invalid class file magic 0x{magic:08x}");
    }
    let minor_version = read_u16(data, &mut offset)?;
    let major_version = read_u16(data, &mut offset)?;
    if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major_version) {
        anyhow::bail!("unsupported class file version {major_version}.{minor_version}");
    }
    let constant_pool = ConstantPool::read(data, &mut offset).context("read constant pool")?;
    let access = AccessFlags::from_bits_retain(read_u16(data, &mut offset)?);
    let this_class = read_u16(data, &mut offset)?;
    let name = constant_pool
        .class_name(this_class)
        .context("resolve class name")?
        .to_string();
    let super_class = read_u16(data, &mut offset)?;
    let super_name = if super_class == 0 {
        None
    } else {
        Some(
            constant_pool
                .class_name(super_class)
                .context("resolve super class name")?
                .to_string(),
        )
    };

    let interface_count = read_u16(data, &mut offset)?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        let index = read_u16(data, &mut offset)?;
        interfaces.push(
            constant_pool
                .class_name(index)
                .context("resolve interface name")?
                .to_string(),
        );
    }

    let field_count = read_u16(data, &mut offset)?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(parse_field(data, &mut offset, &constant_pool).context("parse field")?);
    }

    let method_count = read_u16(data, &mut offset)?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        let method = parse_method(data, &mut offset, &constant_pool)?;
        methods.push(method);
    }

    let table = parse_attributes(data, &mut offset, &constant_pool, |_, _| Ok(false))
        .context("parse class attributes")?;
    if offset != data.len() {
        anyhow::bail!("{} trailing bytes after class file", data.len() - offset);
    }

    Ok(ClassRecord {
        minor_version,
        major_version,
        access,
        name,
        super_name,
        interfaces,
        fields,
        methods,
        annotations: table.annotations,
        attributes: table.raw,
        attribute_order: table.order,
        constant_pool,
    })
}

fn parse_field(data: &[u8], offset: &mut usize, pool: &ConstantPool) -> AnyResult<FieldRecord> {
    let access = AccessFlags::from_bits_retain(read_u16(data, offset)?);
    let name = pool.utf8(read_u16(data, offset)?).context("field name")?;
    let descriptor = pool.utf8(read_u16(data, offset)?).context("field descriptor")?;
    let table = parse_attributes(data, offset, pool, |_, _| Ok(false))
        .with_context(|| format!("attributes of field {name}"))?;
    Ok(FieldRecord {
        access,
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        annotations: table.annotations,
        attributes: table.raw,
        attribute_order: table.order,
    })
}

fn parse_method(data: &[u8], offset: &mut usize, pool: &ConstantPool) -> AnyResult<MethodRecord> {
    let access = AccessFlags::from_bits_retain(read_u16(data, offset)?);
    let name = pool.utf8(read_u16(data, offset)?).context("method name")?;
    let descriptor = pool
        .utf8(read_u16(data, offset)?)
        .context("method descriptor")?;
    let mut code = None;
    let mut exceptions = Vec::new();
    let table = parse_attributes(data, offset, pool, |attr_name, body| {
        match attr_name {
            "Code" => {
                code = Some(parse_code(body, pool)?);
                Ok(true)
            }
            "Exceptions" => {
                let mut cursor = 0;
                let count = read_u16(body, &mut cursor)?;
                for _ in 0..count {
                    let index = read_u16(body, &mut cursor)?;
                    exceptions.push(pool.class_name(index)?.to_string());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    })
    .with_context(|| format!("parse method {name}{descriptor}"))?;
    Ok(MethodRecord {
        access,
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        exceptions,
        annotations: table.annotations,
        code,
        attributes: table.raw,
        attribute_order: table.order,
    })
}

/// Attribute table split into decoded annotations and verbatim attributes.
struct AttributeTable {
    annotations: Vec<Annotation>,
    raw: Vec<RawAttribute>,
    /// Every attribute name in file order, claimed ones included.
    order: Vec<String>,
}

/// Read an attribute table. Annotations are decoded, `handler` may claim
/// other attributes by returning `true`, and the rest are kept raw.
fn parse_attributes(
    data: &[u8],
    offset: &mut usize,
    pool: &ConstantPool,
    mut handler: impl FnMut(&str, &[u8]) -> AnyResult<bool>,
) -> AnyResult<AttributeTable> {
    let count = read_u16(data, offset)?;
    let mut annotations = Vec::new();
    let mut raw = Vec::new();
    let mut order = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = pool
            .utf8(read_u16(data, offset)?)
            .context("attribute name")?;
        order.push(name.to_string());
        let length = read_u32(data, offset)? as usize;
        let body = read_bytes(data, offset, length).with_context(|| format!("attribute {name}"))?;
        match name {
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                let visible = name == "RuntimeVisibleAnnotations";
                let mut cursor = 0;
                let count = read_u16(body, &mut cursor)?;
                for _ in 0..count {
                    annotations.push(
                        parse_annotation(body, &mut cursor, pool, visible)
                            .with_context(|| format!("attribute {name}"))?,
                    );
                }
            }
            _ => {
                if !handler(name, body).with_context(|| format!("attribute {name}"))? {
                    raw.push(RawAttribute {
                        name: name.to_string(),
                        data: body.to_vec(),
                    });
                }
            }
        }
    }
    Ok(AttributeTable {
        annotations,
        raw,
        order,
    })
}

fn parse_annotation(
    data: &[u8],
    offset: &mut usize,
    pool: &ConstantPool,
    visible: bool,
) -> AnyResult<Annotation> {
    let descriptor = pool.utf8(read_u16(data, offset)?).context("annotation type")?;
    let pair_count = read_u16(data, offset)?;
    let mut elements = Vec::with_capacity(pair_count as usize);
    for _ in 0..pair_count {
        let name = pool.utf8(read_u16(data, offset)?).context("element name")?;
        let value = parse_element_value(data, offset, pool, visible)?;
        elements.push((name.to_string(), value));
    }
    Ok(Annotation {
        descriptor: descriptor.to_string(),
        visible,
        elements,
    })
}

fn parse_element_value(
    data: &[u8],
    offset: &mut usize,
    pool: &ConstantPool,
    visible: bool,
) -> AnyResult<ElementValue> {
    let tag = read_u8(data, offset)?;
    let value = match tag {
        b'B' | b'C' | b'I' | b'S' | b'Z' | b'D' | b'F' | b'J' | b's' => {
            let index = read_u16(data, offset)?;
            let value = match (tag, pool.get(index)?) {
                (b's', PoolEntry::Utf8(value)) => Constant::String(value.clone()),
                (b's', PoolEntry::Utf16(units)) => Constant::Utf16(units.clone()),
                (b'D', PoolEntry::Double(bits)) => Constant::Double(f64::from_bits(*bits)),
                (b'F', PoolEntry::Float(bits)) => Constant::Float(f32::from_bits(*bits)),
                (b'J', PoolEntry::Long(value)) => Constant::Long(*value),
                (b'B' | b'C' | b'I' | b'S' | b'Z', PoolEntry::Integer(value)) => {
                    Constant::Int(*value)
                }
                _ => anyhow::bail!("element value tag {} does not match entry {index}", tag as char),
            };
            ElementValue::Const { tag, value }
        }
        b'e' => ElementValue::Enum {
            descriptor: pool.utf8(read_u16(data, offset)?)?.to_string(),
            name: pool.utf8(read_u16(data, offset)?)?.to_string(),
        },
        b'c' => ElementValue::Class(pool.utf8(read_u16(data, offset)?)?.to_string()),
        b'@' => ElementValue::Annotation(Box::new(parse_annotation(data, offset, pool, visible)?)),
        b'[' => {
            let count = read_u16(data, offset)?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(parse_element_value(data, offset, pool, visible)?);
            }
            ElementValue::Array(values)
        }
        _ => anyhow::bail!("unknown element value tag 0x{tag:02x}"),
    };
    Ok(value)
}

fn parse_code(data: &[u8], pool: &ConstantPool) -> AnyResult<Code> {
    let mut offset = 0usize;
    let max_stack = read_u16(data, &mut offset)?;
    let max_locals = read_u16(data, &mut offset)?;
    let code_length = read_u32(data, &mut offset)? as usize;
    let code = read_bytes(data, &mut offset, code_length).context("bytecode")?;

    let handler_count = read_u16(data, &mut offset)?;
    let mut handlers = Vec::with_capacity(handler_count as usize);
    for _ in 0..handler_count {
        let start = read_u16(data, &mut offset)? as u32;
        let end = read_u16(data, &mut offset)? as u32;
        let handler = read_u16(data, &mut offset)? as u32;
        let catch_index = read_u16(data, &mut offset)?;
        let catch_type = if catch_index == 0 {
            None
        } else {
            Some(pool.class_name(catch_index).context("catch type")?.to_string())
        };
        handlers.push((start, end, handler, catch_type));
    }
    let table =
        parse_attributes(data, &mut offset, pool, |_, _| Ok(false)).context("code attributes")?;

    let decoded = decode_instructions(code, pool)?;

    let mut targets = BTreeSet::new();
    for (_, insn) in &decoded {
        collect_targets(insn, &mut targets);
    }
    for (start, end, handler, _) in &handlers {
        targets.extend([*start, *end, *handler]);
    }
    let labels: BTreeMap<u32, Label> = targets
        .iter()
        .enumerate()
        .map(|(id, offset)| (*offset, Label(id as u32)))
        .collect();

    let mut instructions = Vec::with_capacity(decoded.len() + labels.len());
    let mut pending = labels.iter().peekable();
    for (insn_offset, insn) in decoded {
        while let Some((label_offset, label)) = pending.peek() {
            if **label_offset > insn_offset {
                break;
            }
            if **label_offset < insn_offset {
                anyhow::bail!("branch target {label_offset} is inside an instruction");
            }
            instructions.push(Instruction::Label(**label));
            pending.next();
        }
        instructions.push(relabel(insn, &labels)?);
    }
    for (label_offset, label) in pending {
        if *label_offset as usize != code.len() {
            anyhow::bail!("branch target {label_offset} is outside the code");
        }
        instructions.push(Instruction::Label(*label));
    }

    let mut try_catch = Vec::with_capacity(handlers.len());
    let label_at = |offset: u32| -> AnyResult<Label> {
        labels
            .get(&offset)
            .copied()
            .with_context(|| format!("no label for handler offset {offset}"))
    };
    for (start, end, handler, catch_type) in handlers {
        try_catch.push(TryCatch {
            start: label_at(start)?,
            end: label_at(end)?,
            handler: label_at(handler)?,
            catch_type,
        });
    }

    Ok(Code {
        max_stack,
        max_locals,
        instructions,
        try_catch,
        attributes: table.raw,
        attribute_order: table.order,
    })
}

/// Instruction decoded with branch targets still as absolute offsets
/// (carried in `Label` values until [`relabel`] maps them).
type Decoded = (u32, Instruction);

fn decode_instructions(code: &[u8], pool: &ConstantPool) -> AnyResult<Vec<Decoded>> {
    let mut decoded = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let start = offset;
        let insn = decode_instruction(code, &mut offset, pool)
            .with_context(|| format!("instruction at offset {start}"))?;
        decoded.push((start as u32, insn));
    }
    Ok(decoded)
}

fn decode_instruction(code: &[u8], offset: &mut usize, pool: &ConstantPool) -> AnyResult<Instruction> {
    let start = *offset;
    let opcode = read_u8(code, offset)?;
    let branch = |delta: i32| -> AnyResult<Label> {
        let target = start as i64 + delta as i64;
        if target < 0 {
            anyhow::bail!("negative branch target");
        }
        Ok(Label(target as u32))
    };
    let insn = match opcode {
        opcodes::NOP..=opcodes::DCONST_1 => Instruction::Insn(opcode),
        opcodes::BIPUSH => Instruction::Int {
            opcode,
            operand: read_u8(code, offset)? as i8 as i32,
        },
        opcodes::SIPUSH => Instruction::Int {
            opcode,
            operand: read_u16(code, offset)? as i16 as i32,
        },
        opcodes::LDC => {
            let index = read_u8(code, offset)? as u16;
            Instruction::Ldc(ldc_constant(pool, index)?)
        }
        opcodes::LDC_W | opcodes::LDC2_W => {
            let index = read_u16(code, offset)?;
            Instruction::Ldc(ldc_constant(pool, index)?)
        }
        opcodes::ILOAD..=opcodes::ALOAD
        | opcodes::ISTORE..=opcodes::ASTORE
        | opcodes::RET => Instruction::Var {
            opcode,
            index: read_u8(code, offset)? as u16,
        },
        opcodes::ILOAD_0..=opcodes::ALOAD_3 => {
            let relative = opcode - opcodes::ILOAD_0;
            Instruction::Var {
                opcode: opcodes::ILOAD + relative / 4,
                index: (relative % 4) as u16,
            }
        }
        opcodes::ISTORE_0..=opcodes::ASTORE_3 => {
            let relative = opcode - opcodes::ISTORE_0;
            Instruction::Var {
                opcode: opcodes::ISTORE + relative / 4,
                index: (relative % 4) as u16,
            }
        }
        opcodes::IINC => Instruction::Iinc {
            index: read_u8(code, offset)? as u16,
            delta: read_u8(code, offset)? as i8 as i16,
        },
        opcodes::IFEQ..=opcodes::JSR | opcodes::IFNULL | opcodes::IFNONNULL => {
            let delta = read_u16(code, offset)? as i16 as i32;
            Instruction::Jump {
                opcode,
                target: branch(delta)?,
            }
        }
        opcodes::GOTO_W | opcodes::JSR_W => {
            let delta = read_u32(code, offset)? as i32;
            Instruction::Jump {
                opcode,
                target: branch(delta)?,
            }
        }
        opcodes::TABLESWITCH => {
            *offset += padding(start);
            let default = branch(read_u32(code, offset)? as i32)?;
            let low = read_u32(code, offset)? as i32;
            let high = read_u32(code, offset)? as i32;
            if high < low {
                anyhow::bail!("invalid tableswitch range {low}..{high}");
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            let mut targets = Vec::with_capacity(count.min(code.len()));
            for _ in 0..count {
                targets.push(branch(read_u32(code, offset)? as i32)?);
            }
            Instruction::TableSwitch {
                low,
                high,
                default,
                targets,
            }
        }
        opcodes::LOOKUPSWITCH => {
            *offset += padding(start);
            let default = branch(read_u32(code, offset)? as i32)?;
            let npairs = read_u32(code, offset)? as i32;
            if npairs < 0 {
                anyhow::bail!("invalid lookupswitch pair count {npairs}");
            }
            let mut pairs = Vec::with_capacity((npairs as usize).min(code.len()));
            for _ in 0..npairs {
                let key = read_u32(code, offset)? as i32;
                pairs.push((key, branch(read_u32(code, offset)? as i32)?));
            }
            Instruction::LookupSwitch { default, pairs }
        }
        opcodes::GETSTATIC..=opcodes::PUTFIELD => {
            let member = pool.member_ref(read_u16(code, offset)?)?;
            Instruction::Field {
                opcode,
                owner: member.owner,
                name: member.name,
                descriptor: member.descriptor,
            }
        }
        opcodes::INVOKEVIRTUAL..=opcodes::INVOKEINTERFACE => {
            let member = pool.member_ref(read_u16(code, offset)?)?;
            if opcode == opcodes::INVOKEINTERFACE {
                // count and the reserved zero byte are recomputed on write
                read_bytes(code, offset, 2)?;
            }
            Instruction::Method {
                opcode,
                owner: member.owner,
                name: member.name,
                descriptor: member.descriptor,
                interface: member.interface,
            }
        }
        opcodes::INVOKEDYNAMIC => {
            let index = read_u16(code, offset)?;
            read_bytes(code, offset, 2)?;
            let PoolEntry::InvokeDynamic {
                bootstrap,
                name_and_type,
            } = pool.get(index)?
            else {
                anyhow::bail!("invokedynamic operand {index} is not an invokedynamic entry");
            };
            let (name, descriptor) = pool.name_and_type(*name_and_type)?;
            Instruction::InvokeDynamic {
                bootstrap: *bootstrap,
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            }
        }
        opcodes::NEW | opcodes::ANEWARRAY | opcodes::CHECKCAST | opcodes::INSTANCEOF => {
            Instruction::Type {
                opcode,
                class: pool.class_name(read_u16(code, offset)?)?.to_string(),
            }
        }
        opcodes::NEWARRAY => Instruction::Int {
            opcode,
            operand: read_u8(code, offset)? as i32,
        },
        opcodes::MULTIANEWARRAY => Instruction::MultiANewArray {
            class: pool.class_name(read_u16(code, offset)?)?.to_string(),
            dimensions: read_u8(code, offset)?,
        },
        opcodes::WIDE => {
            let inner = read_u8(code, offset)?;
            match inner {
                opcodes::IINC => Instruction::Iinc {
                    index: read_u16(code, offset)?,
                    delta: read_u16(code, offset)? as i16,
                },
                opcodes::ILOAD..=opcodes::ALOAD
                | opcodes::ISTORE..=opcodes::ASTORE
                | opcodes::RET => Instruction::Var {
                    opcode: inner,
                    index: read_u16(code, offset)?,
                },
                _ => anyhow::bail!("invalid wide opcode 0x{inner:02x}"),
            }
        }
        opcodes::IALOAD..=opcodes::SALOAD
        | opcodes::IASTORE..=opcodes::LXOR
        | opcodes::I2L..=opcodes::DCMPG
        | opcodes::IRETURN..=opcodes::RETURN
        | opcodes::ARRAYLENGTH
        | opcodes::ATHROW
        | opcodes::MONITORENTER
        | opcodes::MONITOREXIT => Instruction::Insn(opcode),
        _ => anyhow::bail!("unsupported opcode 0x{opcode:02x}"),
    };
    Ok(insn)
}

fn ldc_constant(pool: &ConstantPool, index: u16) -> AnyResult<Constant> {
    let constant = match pool.get(index)? {
        PoolEntry::Integer(value) => Constant::Int(*value),
        PoolEntry::Float(bits) => Constant::Float(f32::from_bits(*bits)),
        PoolEntry::Long(value) => Constant::Long(*value),
        PoolEntry::Double(bits) => Constant::Double(f64::from_bits(*bits)),
        PoolEntry::String(value) => match pool.get(*value)? {
            PoolEntry::Utf16(units) => Constant::Utf16(units.clone()),
            _ => Constant::String(pool.utf8(*value)?.to_string()),
        },
        PoolEntry::Class(name) => Constant::Class(pool.utf8(*name)?.to_string()),
        PoolEntry::MethodType(descriptor) => Constant::MethodType(pool.utf8(*descriptor)?.to_string()),
        PoolEntry::MethodHandle { .. } | PoolEntry::Dynamic { .. } => Constant::Pooled(index),
        _ => anyhow::bail!("constant pool entry {index} cannot be loaded by ldc"),
    };
    Ok(constant)
}

fn collect_targets(insn: &Instruction, targets: &mut BTreeSet<u32>) {
    match insn {
        Instruction::Jump { target, .. } => {
            targets.insert(target.0);
        }
        Instruction::TableSwitch {
            default, targets: labels, ..
        } => {
            targets.insert(default.0);
            targets.extend(labels.iter().map(|label| label.0));
        }
        Instruction::LookupSwitch { default, pairs } => {
            targets.insert(default.0);
            targets.extend(pairs.iter().map(|(_, label)| label.0));
        }
        _ => {}
    }
}

/// Replace offset-valued labels produced by the decoder with label ids.
fn relabel(insn: Instruction, labels: &BTreeMap<u32, Label>) -> AnyResult<Instruction> {
    let map = |label: Label| -> AnyResult<Label> {
        labels
            .get(&label.0)
            .copied()
            .with_context(|| format!("no label for offset {}", label.0))
    };
    let insn = match insn {
        Instruction::Jump { opcode, target } => Instruction::Jump {
            opcode,
            target: map(target)?,
        },
        Instruction::TableSwitch {
            low,
            high,
            default,
            targets,
        } => Instruction::TableSwitch {
            low,
            high,
            default: map(default)?,
            targets: targets.into_iter().map(map).collect::<AnyResult<_>>()?,
        },
        Instruction::LookupSwitch { default, pairs } => Instruction::LookupSwitch {
            default: map(default)?,
            pairs: pairs
                .into_iter()
                .map(|(key, label)| Ok((key, map(label)?)))
                .collect::<AnyResult<_>>()?,
        },
        other => other,
    };
    Ok(insn)
}

/// Alignment bytes after a switch opcode at `offset`.
pub(crate) fn padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

pub(crate) fn read_u8(data: &[u8], offset: &mut usize) -> AnyResult<u8> {
    let byte = *data.get(*offset).context("class file out of bounds")?;
    *offset += 1;
    Ok(byte)
}

pub(crate) fn read_u16(data: &[u8], offset: &mut usize) -> AnyResult<u16> {
    let bytes = read_bytes(data, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u32(data: &[u8], offset: &mut usize) -> AnyResult<u32> {
    let bytes = read_bytes(data, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn read_bytes<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> AnyResult<&'a [u8]> {
    let start = *offset;
    let end = start.checked_add(len).context("class file out of bounds")?;
    let slice = data.get(start..end).context("class file out of bounds")?;
    *offset = end;
    Ok(slice)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// `public class demo/Counter extends java/lang/Object implements java/lang/Runnable`
    /// with `int count` and `public int getCount() { return count; }`, assembled by hand.
    pub(crate) fn counter_class_bytes() -> Vec<u8> {
        let mut bytes = vec![0xca, 0xfe, 0xba, 0xbe, 0x00, 0x00, 0x00, 0x34];
        let pool: &[&[u8]] = &[
            &[0x01, 0x00, 0x0c], b"demo/Counter", // #1
            &[0x07, 0x00, 0x01],                  // #2 class demo/Counter
            &[0x01, 0x00, 0x10], b"java/lang/Object", // #3
            &[0x07, 0x00, 0x03],                  // #4 class java/lang/Object
            &[0x01, 0x00, 0x12], b"java/lang/Runnable", // #5
            &[0x07, 0x00, 0x05],                  // #6 class java/lang/Runnable
            &[0x01, 0x00, 0x05], b"count",        // #7
            &[0x01, 0x00, 0x01], b"I",            // #8
            &[0x0c, 0x00, 0x07, 0x00, 0x08],      // #9 count:I
            &[0x09, 0x00, 0x02, 0x00, 0x09],      // #10 Counter.count:I
            &[0x01, 0x00, 0x08], b"getCount",     // #11
            &[0x01, 0x00, 0x03], b"()I",          // #12
            &[0x01, 0x00, 0x04], b"Code",         // #13
        ];
        bytes.extend_from_slice(&[0x00, 0x0e]);
        for part in pool {
            bytes.extend_from_slice(part);
        }
        bytes.extend_from_slice(&[0x00, 0x21]); // public super
        bytes.extend_from_slice(&[0x00, 0x02, 0x00, 0x04]); // this, super
        bytes.extend_from_slice(&[0x00, 0x01, 0x00, 0x06]); // interfaces
        // fields: private int count
        bytes.extend_from_slice(&[0x00, 0x01, 0x00, 0x02, 0x00, 0x07, 0x00, 0x08, 0x00, 0x00]);
        // methods: public int getCount()
        bytes.extend_from_slice(&[0x00, 0x01, 0x00, 0x01, 0x00, 0x0b, 0x00, 0x0c, 0x00, 0x01]);
        bytes.extend_from_slice(&[0x00, 0x0d, 0x00, 0x00, 0x00, 0x11]);
        bytes.extend_from_slice(&[0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x05]);
        bytes.extend_from_slice(&[0x2a, 0xb4, 0x00, 0x0a, 0xac]);
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        // class attributes
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes
    }

    #[test]
    fn parse_reads_hand_assembled_class() {
        let class = parse(&counter_class_bytes()).expect("parse class");

        assert_eq!(class.name, "demo/Counter");
        assert_eq!(class.super_name.as_deref(), Some("java/lang/Object"));
        assert_eq!(class.interfaces, vec!["java/lang/Runnable".to_string()]);
        assert!(!class.is_interface());
        assert_eq!(class.field_descriptor("count"), Some("I"));

        let method = class.method("getCount", "()I").expect("getCount");
        assert_eq!(
            method.instructions(),
            &[
                Instruction::Var {
                    opcode: opcodes::ALOAD,
                    index: 0
                },
                Instruction::Field {
                    opcode: opcodes::GETFIELD,
                    owner: "demo/Counter".to_string(),
                    name: "count".to_string(),
                    descriptor: "I".to_string(),
                },
                Instruction::Insn(opcodes::IRETURN),
            ]
        );
        let code = method.code.as_ref().expect("code");
        assert_eq!((code.max_stack, code.max_locals), (1, 1));
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let mut bytes = counter_class_bytes();
        bytes[0] = 0x00;

        let err = parse(&bytes).expect_err("bad magic");

        assert!(matches!(err, Error::MalformedInput { .. }));
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn parse_rejects_unsupported_version() {
        let mut bytes = counter_class_bytes();
        bytes[6] = 0x00;
        bytes[7] = 0x64;

        let err = parse(&bytes).expect_err("future version");

        assert!(err.to_string().contains("unsupported class file version 100"));
    }

    #[test]
    fn parse_rejects_truncated_input() {
        let bytes = counter_class_bytes();

        assert!(parse(&bytes[..bytes.len() - 3]).is_err());
        assert!(parse(b"nope").is_err());
    }

    #[test]
    fn branch_targets_become_labels() {
        let mut pool = ConstantPool::default();
        pool.intern_utf8("unused").expect("utf8");
        // iload_1; ifeq +5; iconst_1; ireturn; iconst_0; ireturn
        let code = [0x1b, 0x99, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac];
        let mut attr = vec![0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, code.len() as u8];
        attr.extend_from_slice(&code);
        attr.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let parsed = parse_code(&attr, &pool).expect("parse code");

        assert_eq!(
            parsed.instructions,
            vec![
                Instruction::Var {
                    opcode: opcodes::ILOAD,
                    index: 1
                },
                Instruction::Jump {
                    opcode: opcodes::IFEQ,
                    target: Label(0)
                },
                Instruction::Insn(opcodes::ICONST_1),
                Instruction::Insn(opcodes::IRETURN),
                Instruction::Label(Label(0)),
                Instruction::Insn(opcodes::ICONST_0),
                Instruction::Insn(opcodes::IRETURN),
            ]
        );
    }
}

use std::str::FromStr;

use jdescriptor::{MethodDescriptor, TypeDescriptor};

use crate::error::{Error, Result};
use crate::opcodes;

/// Computational category of a value on the operand stack, which decides
/// the opcode family (`iload`/`aload`, `ireturn`/`areturn`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    /// `boolean`, `byte`, `char`, `short` and `int`.
    Int,
    Long,
    Float,
    Double,
    /// Objects and arrays.
    Reference,
    Void,
}

impl ValueKind {
    /// Kind of a field descriptor such as `I` or `Ljava/lang/String;`.
    pub fn of_field(descriptor: &str) -> Result<Self> {
        let parsed = parse_method(&format!("({descriptor})V"))
            .map_err(|err| relabel(err, descriptor))?;
        if parsed.parameter_types().len() != 1 {
            return Err(malformed(descriptor, "expected exactly one field type"));
        }
        match Self::from_validated(descriptor) {
            ValueKind::Void => Err(malformed(descriptor, "void is not a field type")),
            kind => Ok(kind),
        }
    }

    /// Kind of the value returned by a method descriptor.
    pub fn of_return(method_descriptor: &str) -> Result<Self> {
        let parsed = parse_method(method_descriptor)?;
        if is_reference(parsed.return_type()) {
            return Ok(ValueKind::Reference);
        }
        Ok(Self::from_validated(return_part(method_descriptor)))
    }

    fn from_validated(descriptor: &str) -> Self {
        match descriptor.as_bytes().first() {
            Some(b'J') => ValueKind::Long,
            Some(b'F') => ValueKind::Float,
            Some(b'D') => ValueKind::Double,
            Some(b'V') => ValueKind::Void,
            Some(b'L' | b'[') => ValueKind::Reference,
            _ => ValueKind::Int,
        }
    }

    /// `xload` opcode; `None` for void.
    pub fn load_opcode(self) -> Option<u8> {
        self.offset().map(|offset| opcodes::ILOAD + offset)
    }

    /// `xstore` opcode; `None` for void.
    pub fn store_opcode(self) -> Option<u8> {
        self.offset().map(|offset| opcodes::ISTORE + offset)
    }

    /// `xreturn` opcode, `return` for void.
    pub fn return_opcode(self) -> u8 {
        self.offset()
            .map(|offset| opcodes::IRETURN + offset)
            .unwrap_or(opcodes::RETURN)
    }

    /// Local variable and operand stack slots taken by one value.
    pub fn slots(self) -> u16 {
        match self {
            ValueKind::Void => 0,
            ValueKind::Long | ValueKind::Double => 2,
            _ => 1,
        }
    }

    fn offset(self) -> Option<u8> {
        match self {
            ValueKind::Int => Some(0),
            ValueKind::Long => Some(1),
            ValueKind::Float => Some(2),
            ValueKind::Double => Some(3),
            ValueKind::Reference => Some(4),
            ValueKind::Void => None,
        }
    }
}

/// Parameter descriptors of a method descriptor, in declaration order.
pub fn parameter_descriptors(method_descriptor: &str) -> Result<Vec<&str>> {
    parse_method(method_descriptor)?;
    let end = method_descriptor.find(')').unwrap_or(method_descriptor.len());
    let params = &method_descriptor[1..end];
    let bytes = params.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        let mut end = start;
        while bytes.get(end) == Some(&b'[') {
            end += 1;
        }
        match bytes.get(end) {
            Some(b'L') => {
                end += params[end..]
                    .find(';')
                    .ok_or_else(|| malformed(method_descriptor, "unterminated class name"))?;
            }
            Some(_) => {}
            None => return Err(malformed(method_descriptor, "array without element type")),
        }
        out.push(&params[start..=end]);
        start = end + 1;
    }
    Ok(out)
}

/// Slots taken by the arguments of a method, excluding `this`.
pub fn argument_slots(method_descriptor: &str) -> Result<u16> {
    let slots = parameter_descriptors(method_descriptor)?
        .into_iter()
        .map(|param| ValueKind::from_validated(param).slots())
        .sum();
    Ok(slots)
}

pub fn is_primitive(descriptor: &str) -> bool {
    matches!(
        descriptor,
        "Z" | "B" | "C" | "S" | "I" | "J" | "F" | "D" | "V"
    )
}

/// Java source spelling of a type descriptor: the keyword for primitives,
/// the simple class name for objects, with `[]` per array dimension.
pub fn type_keyword(descriptor: &str) -> String {
    let dimensions = descriptor.bytes().take_while(|byte| *byte == b'[').count();
    let element = &descriptor[dimensions..];
    let base = match element {
        "Z" => "boolean",
        "B" => "byte",
        "C" => "char",
        "S" => "short",
        "I" => "int",
        "J" => "long",
        "F" => "float",
        "D" => "double",
        "V" => "void",
        _ => {
            let class = element
                .strip_prefix('L')
                .and_then(|value| value.strip_suffix(';'))
                .unwrap_or(element);
            class.rsplit(['/', '$']).next().unwrap_or(class)
        }
    };
    format!("{base}{}", "[]".repeat(dimensions))
}

/// Render a method the way it would be declared, e.g. `int foo(float, long)`.
pub fn plain_signature(name: &str, method_descriptor: &str) -> Result<String> {
    let params = parameter_descriptors(method_descriptor)?
        .into_iter()
        .map(type_keyword)
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "{} {name}({params})",
        type_keyword(return_part(method_descriptor))
    ))
}

/// `a.b.C` to `a/b/C`.
pub fn internal_name(name: &str) -> String {
    name.replace('.', "/")
}

/// `a/b/C` to `a.b.C`.
pub fn dotted_name(name: &str) -> String {
    name.replace('/', ".")
}

fn parse_method(descriptor: &str) -> Result<MethodDescriptor> {
    MethodDescriptor::from_str(descriptor).map_err(|err| malformed(descriptor, err.to_string()))
}

fn is_reference(ty: &TypeDescriptor) -> bool {
    matches!(ty, TypeDescriptor::Object(_) | TypeDescriptor::Array(_, _))
}

fn return_part(method_descriptor: &str) -> &str {
    method_descriptor
        .rfind(')')
        .map(|index| &method_descriptor[index + 1..])
        .unwrap_or(method_descriptor)
}

fn malformed(descriptor: &str, reason: impl Into<String>) -> Error {
    Error::MalformedDescriptor {
        descriptor: descriptor.to_string(),
        reason: reason.into(),
    }
}

/// Report a wrapped field descriptor under its own text.
fn relabel(err: Error, descriptor: &str) -> Error {
    match err {
        Error::MalformedDescriptor { reason, .. } => malformed(descriptor, reason),
        other => other,
    }
}

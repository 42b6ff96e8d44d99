use crate::descriptor::ValueKind;
use crate::error::Result;
use crate::ir::{AccessFlags, Code, Instruction, MethodRecord};
use crate::opcodes;

/// Access used for accessors when the caller has no preference.
pub const DEFAULT_ACCESSOR_ACCESS: AccessFlags = AccessFlags::PUBLIC;

/// Build `fieldType methodName() { return this.fieldName; }` for `owner`.
///
/// Names are used as given, so pass runtime names when injecting into an
/// obfuscated class.
pub fn generate_getter(
    owner: &str,
    method_name: &str,
    field_name: &str,
    field_descriptor: &str,
    access: AccessFlags,
) -> Result<MethodRecord> {
    let kind = ValueKind::of_field(field_descriptor)?;
    let mut method = MethodRecord::new(access, method_name, format!("(){field_descriptor}"));
    method.code = Some(Code {
        max_stack: kind.slots(),
        max_locals: 1,
        instructions: vec![
            load_this(),
            field_access(opcodes::GETFIELD, owner, field_name, field_descriptor),
            Instruction::Insn(kind.return_opcode()),
        ],
        ..Code::default()
    });
    Ok(method)
}

/// Build `void methodName(fieldType value) { this.fieldName = value; }` for `owner`.
pub fn generate_setter(
    owner: &str,
    method_name: &str,
    field_name: &str,
    field_descriptor: &str,
    access: AccessFlags,
) -> Result<MethodRecord> {
    let kind = ValueKind::of_field(field_descriptor)?;
    let mut method = MethodRecord::new(access, method_name, format!("({field_descriptor})V"));
    let mut instructions = vec![load_this()];
    if let Some(load) = kind.load_opcode() {
        instructions.push(Instruction::Var {
            opcode: load,
            index: 1,
        });
    }
    instructions.push(field_access(opcodes::PUTFIELD, owner, field_name, field_descriptor));
    instructions.push(Instruction::Insn(opcodes::RETURN));
    method.code = Some(Code {
        max_stack: 1 + kind.slots(),
        max_locals: 1 + kind.slots(),
        instructions,
        ..Code::default()
    });
    Ok(method)
}

/// Call-site instruction for a class (not interface) method.
pub fn method_call(owner: &str, name: &str, descriptor: &str, is_static: bool) -> Instruction {
    Instruction::Method {
        opcode: if is_static {
            opcodes::INVOKESTATIC
        } else {
            opcodes::INVOKEVIRTUAL
        },
        owner: owner.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        interface: false,
    }
}

fn load_this() -> Instruction {
    Instruction::Var {
        opcode: opcodes::ALOAD,
        index: 0,
    }
}

fn field_access(opcode: u8, owner: &str, name: &str, descriptor: &str) -> Instruction {
    Instruction::Field {
        opcode,
        owner: owner.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
    }
}

use log::debug;

use crate::descriptor::{ValueKind, internal_name};
use crate::error::{Error, Result};
use crate::ir::{Constant, Instruction, MethodRecord};
use crate::mapping::Remapper;

/// An instruction found by a search, with its position in the method's
/// instruction sequence (labels included).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Match<'a> {
    pub index: usize,
    pub instruction: &'a Instruction,
}

/// Last instruction in `method` satisfying `predicate`.
fn find_last<'a>(
    method: &'a MethodRecord,
    mut predicate: impl FnMut(&Instruction) -> bool,
) -> Option<Match<'a>> {
    method
        .instructions()
        .iter()
        .enumerate()
        .rev()
        .find(|(_, instruction)| predicate(instruction))
        .map(|(index, instruction)| Match { index, instruction })
}

/// Last instruction with the given opcode.
pub fn find_last_opcode(method: &MethodRecord, opcode: u8) -> Option<Match<'_>> {
    find_last(method, |instruction| instruction.opcode() == Some(opcode))
}

/// Last return instruction of the kind the method's descriptor returns.
///
/// A method returning `String` only matches `areturn`, never an `ireturn`
/// that happens to sit in the same method.
pub fn find_last_return(method: &MethodRecord) -> Result<Option<Match<'_>>> {
    let opcode = ValueKind::of_return(&method.descriptor)?.return_opcode();
    Ok(find_last_opcode(method, opcode))
}

/// Last `ldc` loading a constant equal to `value`.
pub fn find_last_literal<'a>(method: &'a MethodRecord, value: &Constant) -> Option<Match<'a>> {
    find_last(method, |instruction| {
        matches!(instruction, Instruction::Ldc(constant) if constant == value)
    })
}

/// Last call to a method named in the canonical scheme.
///
/// `name_and_descriptor` is the method name immediately followed by its
/// descriptor, e.g. `spawn(Lnet/demo/Entity;)Z`. Owner, name and descriptor
/// are mapped to the runtime scheme before comparing. With
/// `allow_fallback_owner`, a call whose owner is the canonical owner as
/// given also matches.
pub fn find_last_call<'a>(
    method: &'a MethodRecord,
    remapper: &Remapper,
    owner: &str,
    name_and_descriptor: &str,
    opcode: u8,
    allow_fallback_owner: bool,
) -> Result<Option<Match<'a>>> {
    let split = name_and_descriptor
        .find('(')
        .ok_or_else(|| Error::MalformedDescriptor {
            descriptor: name_and_descriptor.to_string(),
            reason: "expected a method name followed by a descriptor".to_string(),
        })?;
    let (name, descriptor) = name_and_descriptor.split_at(split);
    let target = remapper.to_runtime_method(owner, name, descriptor)?;
    let canonical_owner = internal_name(owner);

    Ok(find_last(method, |instruction| {
        let Instruction::Method {
            opcode: candidate_opcode,
            owner: candidate_owner,
            name: candidate_name,
            descriptor: candidate_descriptor,
            ..
        } = instruction
        else {
            return false;
        };
        debug!(
            "call candidate {candidate_owner}.{candidate_name}{candidate_descriptor} \
             against {}.{}{}",
            target.owner, target.name, target.descriptor
        );
        *candidate_opcode == opcode
            && *candidate_name == target.name
            && *candidate_descriptor == target.descriptor
            && (*candidate_owner == target.owner
                || (allow_fallback_owner && *candidate_owner == canonical_owner))
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ir::{AccessFlags, Code, Label};
    use crate::mapping::tests::FailingOracle;
    use crate::mapping::{NameTable, NamingMode};
    use crate::opcodes;

    fn method(descriptor: &str, instructions: Vec<Instruction>) -> MethodRecord {
        let mut method = MethodRecord::new(AccessFlags::PUBLIC, "target", descriptor);
        method.code = Some(Code {
            max_stack: 4,
            max_locals: 4,
            instructions,
            ..Code::default()
        });
        method
    }

    fn call(opcode: u8, owner: &str, name: &str, descriptor: &str) -> Instruction {
        Instruction::Method {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface: false,
        }
    }

    #[test]
    fn find_last_opcode_returns_final_occurrence() {
        let mut instructions = vec![Instruction::Insn(opcodes::NOP); 11];
        for position in [2, 5, 9] {
            instructions[position] = Instruction::Insn(opcodes::POP);
        }
        let method = method("()V", instructions);

        let found = find_last_opcode(&method, opcodes::POP).expect("pop present");

        assert_eq!(found.index, 9);
        assert_eq!(found.instruction, &Instruction::Insn(opcodes::POP));
    }

    #[test]
    fn find_last_opcode_is_none_without_match() {
        let method = method("()V", vec![Instruction::Insn(opcodes::RETURN)]);

        assert_eq!(find_last_opcode(&method, opcodes::ATHROW), None);
        let abstract_method = MethodRecord::new(AccessFlags::ABSTRACT, "run", "()V");
        assert_eq!(find_last_opcode(&abstract_method, opcodes::RETURN), None);
    }

    #[test]
    fn find_last_return_follows_descriptor_kind() {
        let method = method(
            "()Ljava/lang/String;",
            vec![
                Instruction::Var {
                    opcode: opcodes::ILOAD,
                    index: 1,
                },
                Instruction::Jump {
                    opcode: opcodes::IFEQ,
                    target: Label(0),
                },
                Instruction::Insn(opcodes::ACONST_NULL),
                Instruction::Insn(opcodes::ARETURN),
                Instruction::Label(Label(0)),
                Instruction::Insn(opcodes::ICONST_0),
                Instruction::Insn(opcodes::IRETURN),
            ],
        );

        let found = find_last_return(&method)
            .expect("valid descriptor")
            .expect("areturn present");

        assert_eq!(found.index, 3);
        assert_eq!(found.instruction.opcode(), Some(opcodes::ARETURN));
    }

    #[test]
    fn find_last_return_rejects_malformed_descriptor() {
        let method = method("(I", vec![Instruction::Insn(opcodes::RETURN)]);

        assert!(matches!(
            find_last_return(&method),
            Err(Error::MalformedDescriptor { .. })
        ));
    }

    #[test]
    fn find_last_literal_compares_constants() {
        let method = method(
            "()V",
            vec![
                Instruction::Ldc(Constant::from("tick")),
                Instruction::Ldc(Constant::Int(40)),
                Instruction::Ldc(Constant::from("tick")),
                Instruction::Ldc(Constant::from("tock")),
                Instruction::Insn(opcodes::RETURN),
            ],
        );

        let found = find_last_literal(&method, &Constant::from("tick")).expect("literal present");

        assert_eq!(found.index, 2);
        assert_eq!(
            find_last_literal(&method, &Constant::Int(40)).map(|found| found.index),
            Some(1)
        );
        assert_eq!(find_last_literal(&method, &Constant::Long(40)), None);
    }

    #[test]
    fn find_last_call_maps_canonical_names() {
        let table = NameTable::from_json(
            r#"{
                "classes": {"net/demo/World": "abc", "net/demo/Entity": "abd"},
                "methods": [{"owner": "net/demo/World", "name": "spawn", "desc": "(Lnet/demo/Entity;)Z", "runtime": "a"}]
            }"#,
        )
        .expect("table");
        let remapper = Remapper::new(NamingMode::Obfuscated, Arc::new(table));
        let method = method(
            "()V",
            vec![
                call(opcodes::INVOKEVIRTUAL, "abc", "a", "(Labd;)Z"),
                call(opcodes::INVOKEVIRTUAL, "abc", "b", "(Labd;)Z"),
                call(opcodes::INVOKEVIRTUAL, "abc", "a", "(Labd;)Z"),
                call(opcodes::INVOKESTATIC, "abc", "a", "(Labd;)Z"),
                Instruction::Insn(opcodes::RETURN),
            ],
        );

        let found = find_last_call(
            &method,
            &remapper,
            "net/demo/World",
            "spawn(Lnet/demo/Entity;)Z",
            opcodes::INVOKEVIRTUAL,
            false,
        )
        .expect("mapping succeeds")
        .expect("call present");

        assert_eq!(found.index, 2);
    }

    #[test]
    fn find_last_call_fallback_owner_is_opt_in() {
        let table = NameTable::from_json(r#"{"classes": {"net/demo/Helper": "zz"}}"#).expect("table");
        let remapper = Remapper::new(NamingMode::Obfuscated, Arc::new(table));
        let method = method(
            "()V",
            vec![
                call(opcodes::INVOKESTATIC, "net/demo/Helper", "hook", "()V"),
                Instruction::Insn(opcodes::RETURN),
            ],
        );

        let strict = find_last_call(
            &method,
            &remapper,
            "net.demo.Helper",
            "hook()V",
            opcodes::INVOKESTATIC,
            false,
        )
        .expect("mapping succeeds");
        let lenient = find_last_call(
            &method,
            &remapper,
            "net.demo.Helper",
            "hook()V",
            opcodes::INVOKESTATIC,
            true,
        )
        .expect("mapping succeeds");

        assert_eq!(strict, None);
        assert_eq!(lenient.map(|found| found.index), Some(0));
    }

    #[test]
    fn find_last_call_requires_descriptor() {
        let method = method("()V", vec![Instruction::Insn(opcodes::RETURN)]);

        let err = find_last_call(
            &method,
            &Remapper::identity(),
            "a/B",
            "hook",
            opcodes::INVOKESTATIC,
            false,
        )
        .expect_err("no descriptor");

        assert!(matches!(err, Error::MalformedDescriptor { .. }));
    }

    #[test]
    fn find_last_call_propagates_mapping_failure() {
        let method = method(
            "()V",
            vec![call(opcodes::INVOKESTATIC, "a/B", "hook", "()V")],
        );
        let remapper = Remapper::new(NamingMode::Obfuscated, Arc::new(FailingOracle));

        let err = find_last_call(&method, &remapper, "a/B", "hook()V", opcodes::INVOKESTATIC, true)
            .expect_err("mapping failure");

        assert!(matches!(err, Error::UnknownMapping { .. }));
    }
}

use bitflags::bitflags;

use crate::constant_pool::ConstantPool;

/// Class file version written for records built from scratch (Java 8).
pub const DEFAULT_MAJOR_VERSION: u16 = 52;

bitflags! {
    /// Access and property flags shared by classes, fields and methods.
    ///
    /// Some bits mean different things depending on where they appear
    /// (`SUPER` on a class is `SYNCHRONIZED` on a method), so both names exist.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const BRIDGE = 0x0040;
        const TRANSIENT = 0x0080;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

/// In-memory form of a parsed JVM class.
///
/// All class names are internal (slash-separated) names.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassRecord {
    pub minor_version: u16,
    pub major_version: u16,
    pub access: AccessFlags,
    pub name: String,
    /// `None` only for `java/lang/Object` (and module descriptors).
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldRecord>,
    pub methods: Vec<MethodRecord>,
    pub annotations: Vec<Annotation>,
    /// Class attributes kept verbatim.
    pub attributes: Vec<RawAttribute>,
    /// Attribute names in the order they were read. Attributes are written
    /// back in this order; ones not listed follow it.
    pub attribute_order: Vec<String>,
    pub(crate) constant_pool: ConstantPool,
}

impl ClassRecord {
    /// Empty public class with the given internal name and superclass.
    pub fn new(name: impl Into<String>, super_name: Option<&str>) -> Self {
        Self {
            minor_version: 0,
            major_version: DEFAULT_MAJOR_VERSION,
            access: AccessFlags::PUBLIC | AccessFlags::SUPER,
            name: name.into(),
            super_name: super_name.map(str::to_string),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
            attributes: Vec::new(),
            attribute_order: Vec::new(),
            constant_pool: ConstantPool::default(),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access.contains(AccessFlags::INTERFACE)
    }

    pub fn field(&self, name: &str) -> Option<&FieldRecord> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Descriptor of the first field with the given name.
    pub fn field_descriptor(&self, name: &str) -> Option<&str> {
        self.field(name).map(|field| field.descriptor.as_str())
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodRecord> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }

    /// Append a method unless one with the same name and descriptor exists.
    pub fn add_method(&mut self, method: MethodRecord) -> bool {
        if self.method(&method.name, &method.descriptor).is_some() {
            return false;
        }
        self.methods.push(method);
        true
    }
}

/// Field declared by a class.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldRecord {
    pub access: AccessFlags,
    pub name: String,
    pub descriptor: String,
    pub annotations: Vec<Annotation>,
    pub attributes: Vec<RawAttribute>,
    pub attribute_order: Vec<String>,
}

impl FieldRecord {
    pub fn new(access: AccessFlags, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            annotations: Vec::new(),
            attributes: Vec::new(),
            attribute_order: Vec::new(),
        }
    }
}

/// Method declared by a class, with its bytecode when it has any.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodRecord {
    pub access: AccessFlags,
    pub name: String,
    pub descriptor: String,
    /// Internal names from the `Exceptions` attribute.
    pub exceptions: Vec<String>,
    pub annotations: Vec<Annotation>,
    /// `None` for abstract and native methods.
    pub code: Option<Code>,
    pub attributes: Vec<RawAttribute>,
    pub attribute_order: Vec<String>,
}

impl MethodRecord {
    pub fn new(access: AccessFlags, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            exceptions: Vec::new(),
            annotations: Vec::new(),
            code: None,
            attributes: Vec::new(),
            attribute_order: Vec::new(),
        }
    }

    /// Instruction sequence in program order; empty when there is no code.
    pub fn instructions(&self) -> &[Instruction] {
        self.code
            .as_ref()
            .map(|code| code.instructions.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }
}

/// Contents of a `Code` attribute.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Instruction>,
    pub try_catch: Vec<TryCatch>,
    /// Nested attributes (line numbers, frames, ...) kept verbatim. They carry
    /// bytecode offsets and go stale if the instruction layout changes.
    pub attributes: Vec<RawAttribute>,
    pub attribute_order: Vec<String>,
}

impl Code {
    /// A label id not used by any instruction or handler yet.
    pub fn next_label(&self) -> Label {
        let from_insns = self.instructions.iter().filter_map(|insn| match insn {
            Instruction::Label(label) => Some(label.0),
            _ => None,
        });
        let from_handlers = self
            .try_catch
            .iter()
            .flat_map(|block| [block.start.0, block.end.0, block.handler.0]);
        from_insns
            .chain(from_handlers)
            .max()
            .map(|max| Label(max + 1))
            .unwrap_or(Label(0))
    }
}

/// Exception table entry.
#[derive(Clone, Debug, PartialEq)]
pub struct TryCatch {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    /// `None` catches everything (`finally`).
    pub catch_type: Option<String>,
}

/// Position marker inside an instruction sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

/// Attribute carried through parse and serialize without interpretation.
#[derive(Clone, Debug, PartialEq)]
pub struct RawAttribute {
    pub name: String,
    pub data: Vec<u8>,
}

/// Literal loaded by `ldc`, `ldc_w` or `ldc2_w`.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    /// String literal that is not valid Unicode, such as one holding a lone
    /// surrogate, as UTF-16 code units.
    Utf16(Vec<u16>),
    /// Internal name, or descriptor for array classes.
    Class(String),
    MethodType(String),
    /// Method handle or dynamic constant, referenced by pool index.
    Pooled(u16),
}

impl From<&str> for Constant {
    fn from(value: &str) -> Self {
        Constant::String(value.to_string())
    }
}

impl From<i32> for Constant {
    fn from(value: i32) -> Self {
        Constant::Int(value)
    }
}

/// One bytecode instruction, or a zero-width label marking a branch target.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Label(Label),
    /// Instruction without operands (`iadd`, `areturn`, ...).
    Insn(u8),
    /// `bipush`, `sipush` or `newarray`.
    Int { opcode: u8, operand: i32 },
    /// Local variable access; short forms such as `aload_0` are normalised.
    Var { opcode: u8, index: u16 },
    Iinc { index: u16, delta: i16 },
    /// `new`, `anewarray`, `checkcast` or `instanceof`.
    Type { opcode: u8, class: String },
    Field {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
    },
    Method {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
        interface: bool,
    },
    InvokeDynamic {
        bootstrap: u16,
        name: String,
        descriptor: String,
    },
    Ldc(Constant),
    Jump { opcode: u8, target: Label },
    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        pairs: Vec<(i32, Label)>,
    },
    MultiANewArray { class: String, dimensions: u8 },
}

impl Instruction {
    /// Opcode of the instruction; labels have none.
    pub fn opcode(&self) -> Option<u8> {
        use crate::opcodes;

        let opcode = match self {
            Instruction::Label(_) => return None,
            Instruction::Insn(opcode)
            | Instruction::Int { opcode, .. }
            | Instruction::Var { opcode, .. }
            | Instruction::Type { opcode, .. }
            | Instruction::Field { opcode, .. }
            | Instruction::Method { opcode, .. }
            | Instruction::Jump { opcode, .. } => *opcode,
            Instruction::Iinc { .. } => opcodes::IINC,
            Instruction::InvokeDynamic { .. } => opcodes::INVOKEDYNAMIC,
            Instruction::Ldc(_) => opcodes::LDC,
            Instruction::TableSwitch { .. } => opcodes::TABLESWITCH,
            Instruction::LookupSwitch { .. } => opcodes::LOOKUPSWITCH,
            Instruction::MultiANewArray { .. } => opcodes::MULTIANEWARRAY,
        };
        Some(opcode)
    }
}

/// Annotation attached to a class, field or method.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    /// Type descriptor, e.g. `Ljava/lang/Deprecated;`.
    pub descriptor: String,
    /// Retained at runtime (`RuntimeVisibleAnnotations`).
    pub visible: bool,
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    pub fn new(descriptor: impl Into<String>, visible: bool) -> Self {
        Self {
            descriptor: descriptor.into(),
            visible,
            elements: Vec::new(),
        }
    }
}

/// Value of an annotation element.
#[derive(Clone, Debug, PartialEq)]
pub enum ElementValue {
    /// Primitive or string constant; `tag` is the element tag (`I`, `Z`, `s`, ...).
    Const { tag: u8, value: Constant },
    Enum { descriptor: String, name: String },
    /// Return descriptor of a class literal.
    Class(String),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes;

    #[test]
    fn add_method_rejects_duplicate_signature() {
        let mut class = ClassRecord::new("a/Foo", Some("java/lang/Object"));

        assert!(class.add_method(MethodRecord::new(AccessFlags::PUBLIC, "run", "()V")));
        assert!(!class.add_method(MethodRecord::new(AccessFlags::PRIVATE, "run", "()V")));
        assert!(class.add_method(MethodRecord::new(AccessFlags::PUBLIC, "run", "(I)V")));
        assert_eq!(class.methods.len(), 2);
    }

    #[test]
    fn field_descriptor_finds_declared_field() {
        let mut class = ClassRecord::new("a/Foo", Some("java/lang/Object"));
        class
            .fields
            .push(FieldRecord::new(AccessFlags::PRIVATE, "count", "I"));

        assert_eq!(class.field_descriptor("count"), Some("I"));
        assert_eq!(class.field_descriptor("missing"), None);
    }

    #[test]
    fn next_label_skips_used_ids() {
        let code = Code {
            instructions: vec![
                Instruction::Label(Label(3)),
                Instruction::Jump {
                    opcode: opcodes::GOTO,
                    target: Label(3),
                },
            ],
            try_catch: vec![TryCatch {
                start: Label(0),
                end: Label(7),
                handler: Label(3),
                catch_type: None,
            }],
            ..Code::default()
        };

        assert_eq!(code.next_label(), Label(8));
        assert_eq!(Code::default().next_label(), Label(0));
    }

    #[test]
    fn opcode_reports_implicit_opcodes() {
        assert_eq!(Instruction::Label(Label(0)).opcode(), None);
        assert_eq!(
            Instruction::Ldc(Constant::from("x")).opcode(),
            Some(opcodes::LDC)
        );
        assert_eq!(
            Instruction::Iinc { index: 1, delta: 1 }.opcode(),
            Some(opcodes::IINC)
        );
    }
}

//! In-memory structural model of a compiled class.
//!
//! The model carries no logic beyond small lookups; the codec fills it, the
//! graph builder reads it, and the transformer rewrites method bodies in place.

use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Internal name of the universal root type.
pub const OBJECT: &str = "java/lang/Object";

/// Constructor method name.
pub const INIT: &str = "<init>";

/// Access flag bits (JVM-compatible values).
pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const SYNTHETIC: u16 = 0x1000;
}

/// Annotation element value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationValue {
    Str(String),
    /// Class literal, by internal name
    Class(String),
    Int(i32),
    /// Any other primitive constant: its JVM element tag (`B C S Z J F D`) and raw bits
    Primitive { tag: char, bits: u64 },
    Enum { type_name: String, constant: String },
    Nested(Annotation),
    Array(Vec<AnnotationValue>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub type_name: String,
    pub elements: Vec<(String, AnnotationValue)>,
    /// Retained at run time; marker annotations usually are not
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub visible: bool,
}

impl Annotation {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            elements: Vec::new(),
            visible: false,
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: AnnotationValue) -> Self {
        self.elements.push((name.into(), value));
        self
    }

    pub fn element(&self, name: &str) -> Option<&AnnotationValue> {
        self.elements
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Class literals of an element, accepting a single class or an array of classes.
    pub fn class_list(&self, name: &str) -> Vec<String> {
        match self.element(name) {
            Some(AnnotationValue::Class(c)) => vec![c.clone()],
            Some(AnnotationValue::Array(values)) => values
                .iter()
                .filter_map(|v| match v {
                    AnnotationValue::Class(c) => Some(c.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn has_annotation(annotations: &[Annotation], type_name: &str) -> bool {
    annotations.iter().any(|a| a.type_name == type_name)
}

fn find_annotation<'a>(annotations: &'a [Annotation], type_name: &str) -> Option<&'a Annotation> {
    annotations.iter().find(|a| a.type_name == type_name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldModel {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub annotations: Vec<Annotation>,
}

impl FieldModel {
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    pub fn has_annotation(&self, type_name: &str) -> bool {
        has_annotation(&self.annotations, type_name)
    }

    pub fn annotation(&self, type_name: &str) -> Option<&Annotation> {
        find_annotation(&self.annotations, type_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodModel {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub annotations: Vec<Annotation>,
    pub code: Option<Code>,
}

impl MethodModel {
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    pub fn is_constructor(&self) -> bool {
        self.name == INIT
    }

    pub fn has_annotation(&self, type_name: &str) -> bool {
        has_annotation(&self.annotations, type_name)
    }

    pub fn annotation(&self, type_name: &str) -> Option<&Annotation> {
        find_annotation(&self.annotations, type_name)
    }
}

/// Branch target marker inside an instruction list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Label(pub u16);

/// Symbolic reference to a field or method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Stack-machine instruction set of a method body.
///
/// `Label` is a pseudo-instruction: it occupies no execution step and only
/// marks a branch target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    Nop,
    AconstNull,
    Iconst(i32),
    /// String constant
    Ldc(String),
    Iload(u16),
    Istore(u16),
    Aload(u16),
    Astore(u16),
    Pop,
    Dup,
    Swap,
    New(String),
    CheckCast(String),
    GetField(MemberRef),
    PutField(MemberRef),
    GetStatic(MemberRef),
    PutStatic(MemberRef),
    Invoke { kind: InvokeKind, target: MemberRef },
    IfNull(Label),
    IfNonNull(Label),
    IfEq(Label),
    IfNe(Label),
    Goto(Label),
    Label(Label),
    Return,
    Ireturn,
    Areturn,
    Athrow,
}

impl Instruction {
    pub fn branch_target(&self) -> Option<Label> {
        match self {
            Instruction::IfNull(l)
            | Instruction::IfNonNull(l)
            | Instruction::IfEq(l)
            | Instruction::IfNe(l)
            | Instruction::Goto(l) => Some(*l),
            _ => None,
        }
    }

    /// True if control never falls through to the next instruction.
    pub fn ends_flow(&self) -> bool {
        matches!(
            self,
            Instruction::Goto(_)
                | Instruction::Return
                | Instruction::Ireturn
                | Instruction::Areturn
                | Instruction::Athrow
        )
    }
}

/// Verification type of a local or operand slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    UninitializedThis,
    /// Result of the `New` at the given instruction index, before its constructor ran.
    Uninitialized(u32),
    Object(String),
}

/// Frame recorded at a branch target label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub label: Label,
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
}

/// Method body with its verifier metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Instruction>,
    pub frames: Vec<Frame>,
}

impl Code {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            ..Self::default()
        }
    }

    /// First label id above every id used in this body; `None` once the id space is spent.
    pub fn next_free_label(&self) -> Option<u16> {
        self.instructions
            .iter()
            .filter_map(|insn| match insn {
                Instruction::Label(l) => Some(l.0),
                other => other.branch_target().map(|l| l.0),
            })
            .max()
            .map_or(Some(0), |max| max.checked_add(1))
    }
}

/// Roles assigned to a class during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ClassRoles {
    /// Declares at least one provider.
    pub provider: bool,
    /// Owns at least one injection site.
    pub component: bool,
}

/// Field read inside a body the codec kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpaqueRead {
    pub method: String,
    pub descriptor: String,
    pub field: MemberRef,
}

/// Format-specific data a codec carries from decode to encode.
///
/// Out of band: never serialized, and ignored by model equality.
#[derive(Clone, Default)]
pub struct CodecState(Option<Arc<dyn Any + Send + Sync>>);

impl CodecState {
    pub fn new<T: Any + Send + Sync>(state: T) -> Self {
        Self(Some(Arc::new(state)))
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|state| state.downcast_ref())
    }
}

impl fmt::Debug for CodecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CodecState(..)")
    }
}

impl PartialEq for CodecState {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for CodecState {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassModel {
    pub version: (u16, u16),
    pub access: u16,
    /// Internal (`/`-separated) name
    pub name: String,
    /// `None` only for the root object type
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub fields: Vec<FieldModel>,
    pub methods: Vec<MethodModel>,
    /// Derived during discovery, not serialized by codecs
    pub roles: ClassRoles,
    /// Field reads of method bodies kept verbatim by the codec
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub opaque_reads: Vec<OpaqueRead>,
    #[serde(skip)]
    pub codec_state: CodecState,
}

impl ClassModel {
    pub fn new(name: impl Into<String>, super_name: Option<String>) -> Self {
        Self {
            version: (1, 0),
            access: access::PUBLIC,
            name: name.into(),
            super_name,
            interfaces: Vec::new(),
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            roles: ClassRoles::default(),
            opaque_reads: Vec::new(),
            codec_state: CodecState::default(),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access & access::INTERFACE != 0
    }

    pub fn has_annotation(&self, type_name: &str) -> bool {
        has_annotation(&self.annotations, type_name)
    }

    pub fn annotation(&self, type_name: &str) -> Option<&Annotation> {
        find_annotation(&self.annotations, type_name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldModel> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodModel> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn constructors(&self) -> impl Iterator<Item = &MethodModel> {
        self.methods.iter().filter(|m| m.is_constructor())
    }
}

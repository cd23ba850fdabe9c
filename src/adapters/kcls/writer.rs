use crate::adapters::kcls::format::{MAGIC, op, tag, vt};
use crate::adapters::frames;
use crate::domain::class_model::{
    Annotation, AnnotationValue, ClassModel, Code, FieldModel, Instruction, InvokeKind, MemberRef,
    MethodModel, VerificationType,
};
use crate::domain::error::WeaveError;
use crate::domain::hierarchy::InheritanceJudgement;
use std::collections::HashMap;

/// UTF-8 constant pool, interned in first-use order.
#[derive(Debug, Default)]
pub struct ConstantPool {
    entries: Vec<String>,
    index: HashMap<String, u16>,
}

impl ConstantPool {
    pub fn intern(&mut self, value: &str) -> Result<u16, String> {
        if let Some(&idx) = self.index.get(value) {
            return Ok(idx);
        }
        let idx = u16::try_from(self.entries.len() + 1)
            .map_err(|_| "constant pool overflow".to_string())?;
        if value.len() > u16::MAX as usize {
            return Err(format!("constant of {} bytes is too long", value.len()));
        }
        self.entries.push(value.to_string());
        self.index.insert(value.to_string(), idx);
        Ok(idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn write(&self, out: &mut Vec<u8>) {
        // intern() keeps the count within u16
        out.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&(entry.len() as u16).to_be_bytes());
            out.extend_from_slice(entry.as_bytes());
        }
    }
}

/// Serializes the body first; the pool is only complete afterwards.
struct ClassWriter<'a> {
    class: &'a str,
    pool: ConstantPool,
    body: Vec<u8>,
}

impl<'a> ClassWriter<'a> {
    fn fail(&self, reason: impl Into<String>) -> WeaveError {
        WeaveError::encode(self.class, reason)
    }

    fn u8(&mut self, v: u8) {
        self.body.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.body.extend_from_slice(&v.to_be_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.body.extend_from_slice(&v.to_be_bytes());
    }

    fn count(&mut self, len: usize, what: &str) -> Result<(), WeaveError> {
        let n = u16::try_from(len).map_err(|_| self.fail(format!("too many {what}: {len}")))?;
        self.u16(n);
        Ok(())
    }

    fn string(&mut self, value: &str) -> Result<(), WeaveError> {
        let idx = self.pool.intern(value).map_err(|e| self.fail(e))?;
        self.u16(idx);
        Ok(())
    }

    fn annotations(&mut self, annotations: &[Annotation]) -> Result<(), WeaveError> {
        self.count(annotations.len(), "annotations")?;
        annotations.iter().try_for_each(|a| self.annotation(a))
    }

    fn annotation(&mut self, annotation: &Annotation) -> Result<(), WeaveError> {
        self.string(&annotation.type_name)?;
        self.count(annotation.elements.len(), "annotation elements")?;
        for (name, value) in &annotation.elements {
            self.string(name)?;
            self.value(value)?;
        }
        Ok(())
    }

    fn value(&mut self, value: &AnnotationValue) -> Result<(), WeaveError> {
        match value {
            AnnotationValue::Str(s) => {
                self.u8(tag::STRING);
                self.string(s)
            }
            AnnotationValue::Class(c) => {
                self.u8(tag::CLASS);
                self.string(c)
            }
            AnnotationValue::Int(i) => {
                self.u8(tag::INT);
                self.u32(*i as u32);
                Ok(())
            }
            AnnotationValue::Primitive { tag: element, bits } => {
                let element = u8::try_from(*element)
                    .map_err(|_| self.fail(format!("invalid element tag {element:?}")))?;
                self.u8(tag::PRIMITIVE);
                self.u8(element);
                self.u32((bits >> 32) as u32);
                self.u32(*bits as u32);
                Ok(())
            }
            AnnotationValue::Enum {
                type_name,
                constant,
            } => {
                self.u8(tag::ENUM);
                self.string(type_name)?;
                self.string(constant)
            }
            AnnotationValue::Nested(annotation) => {
                self.u8(tag::NESTED);
                self.annotation(annotation)
            }
            AnnotationValue::Array(values) => {
                self.u8(tag::ARRAY);
                self.count(values.len(), "array values")?;
                values.iter().try_for_each(|v| self.value(v))
            }
        }
    }

    fn member(&mut self, member: &MemberRef) -> Result<(), WeaveError> {
        self.string(&member.owner)?;
        self.string(&member.name)?;
        self.string(&member.descriptor)
    }

    fn instruction(&mut self, insn: &Instruction) -> Result<(), WeaveError> {
        match insn {
            Instruction::Nop => self.u8(op::NOP),
            Instruction::AconstNull => self.u8(op::ACONST_NULL),
            Instruction::Iconst(v) => {
                self.u8(op::ICONST);
                self.u32(*v as u32);
            }
            Instruction::Ldc(s) => {
                self.u8(op::LDC);
                self.string(s)?;
            }
            Instruction::Iload(n) => self.local(op::ILOAD, *n),
            Instruction::Istore(n) => self.local(op::ISTORE, *n),
            Instruction::Aload(n) => self.local(op::ALOAD, *n),
            Instruction::Astore(n) => self.local(op::ASTORE, *n),
            Instruction::Pop => self.u8(op::POP),
            Instruction::Dup => self.u8(op::DUP),
            Instruction::Swap => self.u8(op::SWAP),
            Instruction::New(c) => {
                self.u8(op::NEW);
                self.string(c)?;
            }
            Instruction::CheckCast(c) => {
                self.u8(op::CHECKCAST);
                self.string(c)?;
            }
            Instruction::GetField(m) => self.with_member(op::GETFIELD, m)?,
            Instruction::PutField(m) => self.with_member(op::PUTFIELD, m)?,
            Instruction::GetStatic(m) => self.with_member(op::GETSTATIC, m)?,
            Instruction::PutStatic(m) => self.with_member(op::PUTSTATIC, m)?,
            Instruction::Invoke { kind, target } => {
                let opcode = match kind {
                    InvokeKind::Virtual => op::INVOKEVIRTUAL,
                    InvokeKind::Special => op::INVOKESPECIAL,
                    InvokeKind::Static => op::INVOKESTATIC,
                    InvokeKind::Interface => op::INVOKEINTERFACE,
                };
                self.with_member(opcode, target)?;
            }
            Instruction::IfNull(l) => self.local(op::IFNULL, l.0),
            Instruction::IfNonNull(l) => self.local(op::IFNONNULL, l.0),
            Instruction::IfEq(l) => self.local(op::IFEQ, l.0),
            Instruction::IfNe(l) => self.local(op::IFNE, l.0),
            Instruction::Goto(l) => self.local(op::GOTO, l.0),
            Instruction::Label(l) => self.local(op::LABEL, l.0),
            Instruction::Return => self.u8(op::RETURN),
            Instruction::Ireturn => self.u8(op::IRETURN),
            Instruction::Areturn => self.u8(op::ARETURN),
            Instruction::Athrow => self.u8(op::ATHROW),
        }
        Ok(())
    }

    /// Opcode with a u16 operand (local slot or label id)
    fn local(&mut self, opcode: u8, operand: u16) {
        self.u8(opcode);
        self.u16(operand);
    }

    fn with_member(&mut self, opcode: u8, member: &MemberRef) -> Result<(), WeaveError> {
        self.u8(opcode);
        self.member(member)
    }

    fn verification_types(&mut self, types: &[VerificationType]) -> Result<(), WeaveError> {
        self.count(types.len(), "frame entries")?;
        for ty in types {
            match ty {
                VerificationType::Top => self.u8(vt::TOP),
                VerificationType::Integer => self.u8(vt::INTEGER),
                VerificationType::Float => self.u8(vt::FLOAT),
                VerificationType::Long => self.u8(vt::LONG),
                VerificationType::Double => self.u8(vt::DOUBLE),
                VerificationType::Null => self.u8(vt::NULL),
                VerificationType::UninitializedThis => self.u8(vt::UNINITIALIZED_THIS),
                VerificationType::Object(name) => {
                    self.u8(vt::OBJECT);
                    self.string(name)?;
                }
                VerificationType::Uninitialized(at) => {
                    self.u8(vt::UNINITIALIZED);
                    self.u32(*at);
                }
            }
        }
        Ok(())
    }

    fn code(&mut self, code: &Code) -> Result<(), WeaveError> {
        self.u16(code.max_stack);
        self.u16(code.max_locals);
        let count = u32::try_from(code.instructions.len())
            .map_err(|_| self.fail("method body too large"))?;
        self.u32(count);
        for insn in &code.instructions {
            self.instruction(insn)?;
        }
        self.count(code.frames.len(), "frames")?;
        for frame in &code.frames {
            self.u16(frame.label.0);
            self.verification_types(&frame.locals)?;
            self.verification_types(&frame.stack)?;
        }
        Ok(())
    }

    fn field(&mut self, field: &FieldModel) -> Result<(), WeaveError> {
        self.u16(field.access);
        self.string(&field.name)?;
        self.string(&field.descriptor)?;
        self.annotations(&field.annotations)
    }

    fn method(
        &mut self,
        model: &ClassModel,
        method: &MethodModel,
        judgement: &dyn InheritanceJudgement,
    ) -> Result<(), WeaveError> {
        self.u16(method.access);
        self.string(&method.name)?;
        self.string(&method.descriptor)?;
        self.annotations(&method.annotations)?;
        match &method.code {
            None => self.u8(0),
            Some(code) => {
                let computed = frames::compute(model, method, &code.instructions, judgement)?;
                let code = Code {
                    max_stack: computed.max_stack,
                    max_locals: computed.max_locals,
                    instructions: code.instructions.clone(),
                    frames: computed.frames,
                };
                self.u8(1);
                self.code(&code)?;
            }
        }
        Ok(())
    }
}

/// Encode a class, recomputing the verifier metadata of every method body.
pub fn write_class(
    model: &ClassModel,
    judgement: &dyn InheritanceJudgement,
) -> Result<Vec<u8>, WeaveError> {
    let mut w = ClassWriter {
        class: &model.name,
        pool: ConstantPool::default(),
        body: Vec::new(),
    };

    w.u16(model.access);
    w.string(&model.name)?;
    match &model.super_name {
        Some(s) => w.string(s)?,
        None => w.u16(0),
    }
    w.count(model.interfaces.len(), "interfaces")?;
    for interface in &model.interfaces {
        w.string(interface)?;
    }
    w.annotations(&model.annotations)?;
    w.count(model.fields.len(), "fields")?;
    for field in &model.fields {
        w.field(field)?;
    }
    w.count(model.methods.len(), "methods")?;
    for method in &model.methods {
        w.method(model, method, judgement)?;
    }

    let mut out = Vec::with_capacity(w.body.len() + 64);
    out.extend_from_slice(&MAGIC.to_be_bytes());
    out.extend_from_slice(&model.version.0.to_be_bytes());
    out.extend_from_slice(&model.version.1.to_be_bytes());
    w.pool.write(&mut out);
    out.extend_from_slice(&w.body);
    Ok(out)
}

use crate::adapters::frames;
use crate::adapters::jvm::format::{
    DEFAULT_MAJOR, FULL_FRAME, MAGIC, MAX_CODE_LENGTH, MIN_MAJOR, attr, op, vt,
};
use crate::adapters::jvm::pool::ConstantPool;
use crate::adapters::jvm::state::JvmState;
use crate::domain::class_model::{
    Annotation, AnnotationValue, ClassModel, Code, FieldModel, Frame, Instruction, InvokeKind,
    Label, MethodModel, VerificationType,
};
use crate::domain::descriptor::{MethodDescriptor, reference_descriptor};
use crate::domain::error::WeaveError;
use crate::domain::hierarchy::InheritanceJudgement;
use std::collections::{BTreeMap, HashMap};

/// Attribute ready to write: pool index of its name, then its payload.
type Attribute = (u16, Vec<u8>);

/// One instruction lowered to bytes, or a branch waiting for its offset.
enum Op {
    Bytes(Vec<u8>),
    Branch { opcode: u8, label: Label },
    /// Widens to `goto_w` when the offset leaves i16
    Goto(Label),
    Mark(Label),
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn class_literal_descriptor(name: &str) -> String {
    match name {
        "B" | "C" | "D" | "F" | "I" | "J" | "S" | "Z" | "V" => name.to_string(),
        _ => reference_descriptor(name),
    }
}

/// Short form for slots 0 to 3, then the one-byte and `wide` forms.
fn local(short: u8, long: u8, slot: u16) -> Vec<u8> {
    match slot {
        0..=3 => vec![short + slot as u8],
        4..=255 => vec![long, slot as u8],
        _ => {
            let [hi, lo] = slot.to_be_bytes();
            vec![op::WIDE, long, hi, lo]
        }
    }
}

fn with_index(opcode: u8, index: u16) -> Vec<u8> {
    let [hi, lo] = index.to_be_bytes();
    vec![opcode, hi, lo]
}

fn ldc(index: u16) -> Vec<u8> {
    match u8::try_from(index) {
        Ok(small) => vec![op::LDC, small],
        Err(_) => with_index(op::LDC_W, index),
    }
}

/// Full-frame locals: one entry per long or double, trailing tops implied.
fn frame_locals(locals: &[VerificationType]) -> Vec<&VerificationType> {
    let mut out = Vec::with_capacity(locals.len());
    let mut i = 0;
    while i < locals.len() {
        let ty = &locals[i];
        out.push(ty);
        let pair = matches!(ty, VerificationType::Long | VerificationType::Double)
            && matches!(locals.get(i + 1), Some(VerificationType::Top));
        i += if pair { 2 } else { 1 };
    }
    while matches!(out.last(), Some(VerificationType::Top)) {
        out.pop();
    }
    out
}

struct ClassWriter<'a> {
    model: &'a ClassModel,
    state: Option<&'a JvmState>,
    pool: ConstantPool,
}

impl<'a> ClassWriter<'a> {
    fn fail(&self, reason: impl Into<String>) -> WeaveError {
        WeaveError::encode(&self.model.name, reason)
    }

    fn count(&self, len: usize, what: &str) -> Result<u16, WeaveError> {
        u16::try_from(len).map_err(|_| self.fail(format!("too many {what}: {len}")))
    }

    fn utf8(&mut self, value: &str) -> Result<u16, WeaveError> {
        self.pool.utf8(value).map_err(|e| self.fail(e))
    }

    fn class(&mut self, name: &str) -> Result<u16, WeaveError> {
        self.pool.class(name).map_err(|e| self.fail(e))
    }

    fn write_attributes(&self, out: &mut Vec<u8>, attributes: Vec<Attribute>) -> Result<(), WeaveError> {
        put_u16(out, self.count(attributes.len(), "attributes")?);
        for (name, info) in attributes {
            let len = u32::try_from(info.len()).map_err(|_| self.fail("attribute too large"))?;
            put_u16(out, name);
            put_u32(out, len);
            out.extend_from_slice(&info);
        }
        Ok(())
    }

    /// Visible and invisible annotations go to separate attributes.
    fn annotation_attributes(&mut self, annotations: &[Annotation]) -> Result<Vec<Attribute>, WeaveError> {
        let mut attributes = Vec::new();
        for (visible, name) in [
            (true, attr::VISIBLE_ANNOTATIONS),
            (false, attr::INVISIBLE_ANNOTATIONS),
        ] {
            let group: Vec<&Annotation> = annotations.iter().filter(|a| a.visible == visible).collect();
            if group.is_empty() {
                continue;
            }
            let mut info = Vec::new();
            put_u16(&mut info, self.count(group.len(), "annotations")?);
            for annotation in group {
                self.annotation(&mut info, annotation)?;
            }
            attributes.push((self.utf8(name)?, info));
        }
        Ok(attributes)
    }

    fn annotation(&mut self, out: &mut Vec<u8>, annotation: &Annotation) -> Result<(), WeaveError> {
        put_u16(out, self.utf8(&reference_descriptor(&annotation.type_name))?);
        put_u16(out, self.count(annotation.elements.len(), "annotation elements")?);
        for (name, value) in &annotation.elements {
            put_u16(out, self.utf8(name)?);
            self.value(out, value)?;
        }
        Ok(())
    }

    fn value(&mut self, out: &mut Vec<u8>, value: &AnnotationValue) -> Result<(), WeaveError> {
        match value {
            AnnotationValue::Str(s) => {
                out.push(b's');
                put_u16(out, self.utf8(s)?);
            }
            AnnotationValue::Class(c) => {
                out.push(b'c');
                put_u16(out, self.utf8(&class_literal_descriptor(c))?);
            }
            AnnotationValue::Int(i) => {
                out.push(b'I');
                let index = self.pool.integer(*i).map_err(|e| self.fail(e))?;
                put_u16(out, index);
            }
            AnnotationValue::Primitive { tag, bits } => {
                let index = match tag {
                    'J' => self.pool.long(*bits),
                    'D' => self.pool.double(*bits),
                    'F' => self.pool.float(*bits as u32),
                    'B' | 'C' | 'S' | 'Z' => self.pool.integer(*bits as u32 as i32),
                    other => return Err(self.fail(format!("invalid element tag {other:?}"))),
                }
                .map_err(|e| self.fail(e))?;
                out.push(*tag as u8);
                put_u16(out, index);
            }
            AnnotationValue::Enum {
                type_name,
                constant,
            } => {
                out.push(b'e');
                put_u16(out, self.utf8(type_name)?);
                put_u16(out, self.utf8(constant)?);
            }
            AnnotationValue::Nested(annotation) => {
                out.push(b'@');
                self.annotation(out, annotation)?;
            }
            AnnotationValue::Array(values) => {
                out.push(b'[');
                put_u16(out, self.count(values.len(), "array values")?);
                for value in values {
                    self.value(out, value)?;
                }
            }
        }
        Ok(())
    }

    fn lower(&mut self, insn: &Instruction) -> Result<Op, WeaveError> {
        let bytes = match insn {
            Instruction::Nop => vec![op::NOP],
            Instruction::AconstNull => vec![op::ACONST_NULL],
            Instruction::Iconst(v @ -1..=5) => vec![(i32::from(op::ICONST_0) + v) as u8],
            Instruction::Iconst(v) => match (i8::try_from(*v), i16::try_from(*v)) {
                (Ok(b), _) => vec![op::BIPUSH, b as u8],
                (_, Ok(s)) => with_index(op::SIPUSH, s as u16),
                _ => ldc(self.pool.integer(*v).map_err(|e| self.fail(e))?),
            },
            Instruction::Ldc(s) => ldc(self.pool.string(s).map_err(|e| self.fail(e))?),
            Instruction::Iload(n) => local(op::ILOAD_0, op::ILOAD, *n),
            Instruction::Aload(n) => local(op::ALOAD_0, op::ALOAD, *n),
            Instruction::Istore(n) => local(op::ISTORE_0, op::ISTORE, *n),
            Instruction::Astore(n) => local(op::ASTORE_0, op::ASTORE, *n),
            Instruction::Pop => vec![op::POP],
            Instruction::Dup => vec![op::DUP],
            Instruction::Swap => vec![op::SWAP],
            Instruction::New(c) => with_index(op::NEW, self.class(c)?),
            Instruction::CheckCast(c) => with_index(op::CHECKCAST, self.class(c)?),
            Instruction::GetField(m)
            | Instruction::PutField(m)
            | Instruction::GetStatic(m)
            | Instruction::PutStatic(m) => {
                let opcode = match insn {
                    Instruction::GetField(_) => op::GETFIELD,
                    Instruction::PutField(_) => op::PUTFIELD,
                    Instruction::GetStatic(_) => op::GETSTATIC,
                    _ => op::PUTSTATIC,
                };
                with_index(opcode, self.pool.field_ref(m).map_err(|e| self.fail(e))?)
            }
            Instruction::Invoke {
                kind: InvokeKind::Interface,
                target,
            } => {
                let slots = MethodDescriptor::parse(&target.descriptor)
                    .map(|d| d.param_slots() + 1)
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| {
                        self.fail(format!("bad interface call descriptor `{}`", target.descriptor))
                    })?;
                let index = self.pool.method_ref(target, true).map_err(|e| self.fail(e))?;
                let mut bytes = with_index(op::INVOKEINTERFACE, index);
                bytes.extend_from_slice(&[slots, 0]);
                bytes
            }
            Instruction::Invoke { kind, target } => {
                let opcode = match kind {
                    InvokeKind::Virtual => op::INVOKEVIRTUAL,
                    InvokeKind::Special => op::INVOKESPECIAL,
                    _ => op::INVOKESTATIC,
                };
                with_index(opcode, self.pool.method_ref(target, false).map_err(|e| self.fail(e))?)
            }
            Instruction::IfNull(l) => return Ok(Op::Branch { opcode: op::IFNULL, label: *l }),
            Instruction::IfNonNull(l) => return Ok(Op::Branch { opcode: op::IFNONNULL, label: *l }),
            Instruction::IfEq(l) => return Ok(Op::Branch { opcode: op::IFEQ, label: *l }),
            Instruction::IfNe(l) => return Ok(Op::Branch { opcode: op::IFNE, label: *l }),
            Instruction::Goto(l) => return Ok(Op::Goto(*l)),
            Instruction::Label(l) => return Ok(Op::Mark(*l)),
            Instruction::Return => vec![op::RETURN],
            Instruction::Ireturn => vec![op::IRETURN],
            Instruction::Areturn => vec![op::ARETURN],
            Instruction::Athrow => vec![op::ATHROW],
        };
        Ok(Op::Bytes(bytes))
    }

    fn target(&self, labels: &HashMap<Label, usize>, label: Label) -> Result<usize, WeaveError> {
        labels
            .get(&label)
            .copied()
            .ok_or_else(|| self.fail(format!("branch to undefined label {}", label.0)))
    }

    fn verification_type(
        &mut self,
        out: &mut Vec<u8>,
        ty: &VerificationType,
        offsets: &[usize],
    ) -> Result<(), WeaveError> {
        match ty {
            VerificationType::Top => out.push(vt::TOP),
            VerificationType::Integer => out.push(vt::INTEGER),
            VerificationType::Float => out.push(vt::FLOAT),
            VerificationType::Long => out.push(vt::LONG),
            VerificationType::Double => out.push(vt::DOUBLE),
            VerificationType::Null => out.push(vt::NULL),
            VerificationType::UninitializedThis => out.push(vt::UNINITIALIZED_THIS),
            VerificationType::Object(name) => {
                out.push(vt::OBJECT);
                put_u16(out, self.class(name)?);
            }
            VerificationType::Uninitialized(at) => {
                let offset = offsets
                    .get(*at as usize)
                    .ok_or_else(|| self.fail(format!("uninitialized value from missing instruction {at}")))?;
                out.push(vt::UNINITIALIZED);
                put_u16(out, *offset as u16);
            }
        }
        Ok(())
    }

    /// Assemble a body: lay out branches, then write the frames as full frames.
    fn code_attribute(
        &mut self,
        method: &MethodModel,
        code: &Code,
        judgement: &dyn InheritanceJudgement,
    ) -> Result<Vec<u8>, WeaveError> {
        let computed = frames::compute(self.model, method, &code.instructions, judgement)?;
        let ops = code
            .instructions
            .iter()
            .map(|insn| self.lower(insn))
            .collect::<Result<Vec<_>, _>>()?;

        let mut wide = vec![false; ops.len()];
        let (offsets, labels) = loop {
            let mut offsets = Vec::with_capacity(ops.len() + 1);
            let mut labels = HashMap::new();
            let mut pc = 0usize;
            for (i, lowered) in ops.iter().enumerate() {
                offsets.push(pc);
                pc += match lowered {
                    Op::Bytes(bytes) => bytes.len(),
                    Op::Branch { .. } => 3,
                    Op::Goto(_) if wide[i] => 5,
                    Op::Goto(_) => 3,
                    Op::Mark(label) => {
                        labels.insert(*label, pc);
                        0
                    }
                };
            }
            offsets.push(pc);

            let mut grew = false;
            for (i, lowered) in ops.iter().enumerate() {
                if let Op::Goto(label) = lowered {
                    let delta = self.target(&labels, *label)? as i64 - offsets[i] as i64;
                    if !wide[i] && i16::try_from(delta).is_err() {
                        wide[i] = true;
                        grew = true;
                    }
                }
            }
            if !grew {
                break (offsets, labels);
            }
        };

        let length = offsets[ops.len()];
        if length == 0 || length > MAX_CODE_LENGTH {
            return Err(self.fail(format!(
                "`{}{}` assembles to {length} bytes of code",
                method.name, method.descriptor
            )));
        }
        let mut bytes = Vec::with_capacity(length);
        for (i, lowered) in ops.iter().enumerate() {
            match lowered {
                Op::Bytes(b) => bytes.extend_from_slice(b),
                Op::Mark(_) => {}
                Op::Branch { opcode, label } => {
                    let delta = self.target(&labels, *label)? as i64 - offsets[i] as i64;
                    let delta = i16::try_from(delta).map_err(|_| {
                        self.fail(format!("conditional branch in `{}` spans {delta} bytes", method.name))
                    })?;
                    bytes.push(*opcode);
                    bytes.extend_from_slice(&delta.to_be_bytes());
                }
                Op::Goto(label) => {
                    let delta = self.target(&labels, *label)? as i64 - offsets[i] as i64;
                    if wide[i] {
                        bytes.push(op::GOTO_W);
                        bytes.extend_from_slice(&(delta as i32).to_be_bytes());
                    } else {
                        bytes.push(op::GOTO);
                        bytes.extend_from_slice(&(delta as i16).to_be_bytes());
                    }
                }
            }
        }

        // one frame per offset; labels sharing an offset share a state
        let mut at_offset: BTreeMap<usize, &Frame> = BTreeMap::new();
        for frame in &computed.frames {
            let offset = self.target(&labels, frame.label)?;
            if offset < length {
                at_offset.insert(offset, frame);
            }
        }

        let mut info = Vec::new();
        put_u16(&mut info, computed.max_stack);
        put_u16(&mut info, computed.max_locals);
        put_u32(&mut info, length as u32);
        info.extend_from_slice(&bytes);
        // no exception handlers
        put_u16(&mut info, 0);

        if at_offset.is_empty() {
            put_u16(&mut info, 0);
            return Ok(info);
        }
        let mut table = Vec::new();
        put_u16(&mut table, self.count(at_offset.len(), "frames")?);
        let mut previous: Option<usize> = None;
        for (&offset, frame) in &at_offset {
            let delta = previous.map_or(offset, |p| offset - p - 1);
            table.push(FULL_FRAME);
            put_u16(&mut table, delta as u16);
            let locals = frame_locals(&frame.locals);
            put_u16(&mut table, self.count(locals.len(), "frame locals")?);
            for ty in locals {
                self.verification_type(&mut table, ty, &offsets)?;
            }
            put_u16(&mut table, self.count(frame.stack.len(), "frame stack entries")?);
            for ty in &frame.stack {
                self.verification_type(&mut table, ty, &offsets)?;
            }
            previous = Some(offset);
        }
        let name = self.utf8(attr::STACK_MAP_TABLE)?;
        self.write_attributes(&mut info, vec![(name, table)])?;
        Ok(info)
    }

    fn field(&mut self, out: &mut Vec<u8>, field: &FieldModel) -> Result<(), WeaveError> {
        put_u16(out, field.access);
        put_u16(out, self.utf8(&field.name)?);
        put_u16(out, self.utf8(&field.descriptor)?);
        let mut attributes: Vec<Attribute> = self
            .state
            .and_then(|s| s.fields.get(&(field.name.clone(), field.descriptor.clone())))
            .map(|raw| raw.iter().map(|a| (a.name, a.info.clone())).collect())
            .unwrap_or_default();
        attributes.extend(self.annotation_attributes(&field.annotations)?);
        self.write_attributes(out, attributes)
    }

    fn method(
        &mut self,
        out: &mut Vec<u8>,
        method: &MethodModel,
        judgement: &dyn InheritanceJudgement,
    ) -> Result<(), WeaveError> {
        put_u16(out, method.access);
        put_u16(out, self.utf8(&method.name)?);
        put_u16(out, self.utf8(&method.descriptor)?);

        let raw = self
            .state
            .and_then(|s| s.methods.get(&(method.name.clone(), method.descriptor.clone())));
        let raw_code = raw.and_then(|m| m.code.as_ref());
        let mut attributes: Vec<Attribute> = Vec::new();
        let code = match (&method.code, raw_code) {
            (Some(code), Some(raw)) if raw.decoded.as_ref() == Some(&code.instructions) => {
                Some(raw.info.clone())
            }
            (Some(code), _) => Some(self.code_attribute(method, code, judgement)?),
            (None, Some(raw)) if raw.decoded.is_none() => Some(raw.info.clone()),
            (None, _) => None,
        };
        if let Some(info) = code {
            attributes.push((self.utf8(attr::CODE)?, info));
        }
        if let Some(raw) = raw {
            attributes.extend(raw.attributes.iter().map(|a| (a.name, a.info.clone())));
        }
        attributes.extend(self.annotation_attributes(&method.annotations)?);
        self.write_attributes(out, attributes)
    }
}

/// Encode a class file. Bodies the model left as decoded are copied verbatim;
/// every other body is assembled with recomputed verifier metadata.
pub fn write_class(
    model: &ClassModel,
    judgement: &dyn InheritanceJudgement,
) -> Result<Vec<u8>, WeaveError> {
    let state = model.codec_state.get::<JvmState>();
    let mut w = ClassWriter {
        model,
        state,
        pool: state.map(|s| ConstantPool::seeded(&s.pool)).unwrap_or_default(),
    };

    let mut body = Vec::new();
    put_u16(&mut body, model.access);
    put_u16(&mut body, w.class(&model.name)?);
    let super_index = match &model.super_name {
        Some(name) => w.class(name)?,
        None => 0,
    };
    put_u16(&mut body, super_index);
    put_u16(&mut body, w.count(model.interfaces.len(), "interfaces")?);
    for interface in &model.interfaces {
        put_u16(&mut body, w.class(interface)?);
    }
    put_u16(&mut body, w.count(model.fields.len(), "fields")?);
    for field in &model.fields {
        w.field(&mut body, field)?;
    }
    put_u16(&mut body, w.count(model.methods.len(), "methods")?);
    for method in &model.methods {
        w.method(&mut body, method, judgement)?;
    }
    let mut attributes: Vec<Attribute> = state
        .map(|s| s.attributes.iter().map(|a| (a.name, a.info.clone())).collect())
        .unwrap_or_default();
    attributes.extend(w.annotation_attributes(&model.annotations)?);
    w.write_attributes(&mut body, attributes)?;

    let (major, minor) = if model.version.0 < MIN_MAJOR {
        (DEFAULT_MAJOR, 0)
    } else {
        model.version
    };
    let mut out = Vec::with_capacity(body.len() + 256);
    out.extend_from_slice(&MAGIC.to_be_bytes());
    out.extend_from_slice(&minor.to_be_bytes());
    out.extend_from_slice(&major.to_be_bytes());
    w.pool.write(&mut out).map_err(|e| w.fail(e))?;
    out.extend_from_slice(&body);
    Ok(out)
}

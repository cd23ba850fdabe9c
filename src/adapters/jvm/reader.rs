use crate::adapters::jvm::format::{MAGIC, MAX_CODE_LENGTH, attr, instruction_length, op, tag};
use crate::adapters::jvm::pool::{Constant, decode_modified_utf8};
use crate::adapters::jvm::state::{JvmState, MethodState, RawAttribute, RawCode};
use crate::domain::class_model::{
    Annotation, AnnotationValue, ClassModel, ClassRoles, Code, CodecState, FieldModel,
    Instruction, InvokeKind, Label, MemberRef, MethodModel, OpaqueRead,
};
use crate::domain::descriptor::FieldType;
use crate::domain::error::MalformedClassError;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Annotation nesting deeper than this is rejected
const MAX_VALUE_DEPTH: usize = 16;

type ReadResult<T> = Result<T, MalformedClassError>;

/// Attribute header plus the span of its payload in the input.
struct AttributeSpan {
    name_index: u16,
    name: String,
    start: usize,
    len: usize,
}

/// Attributes of one member, sorted by what the model does with them.
struct MemberAttributes {
    annotations: Vec<Annotation>,
    raw: Vec<RawAttribute>,
    code: Option<AttributeSpan>,
}

enum Body {
    Modeled(Vec<Instruction>),
    /// Kept as bytes; the reason names the first construct outside the subset
    Opaque(String),
}

enum Decoded {
    Done(Instruction),
    Branch(fn(Label) -> Instruction, usize),
}

enum MethodBody {
    Modeled(Code),
    Opaque { reason: String, reads: Vec<MemberRef> },
}

/// `Lpkg/Name;` to `pkg/Name`; primitive and array literals stay descriptors.
fn class_literal(descriptor: &str) -> String {
    match FieldType::parse(descriptor) {
        Some(FieldType::Object(name)) => name,
        _ => descriptor.to_string(),
    }
}

/// Cursor over one class file.
struct ClassReader<'a> {
    entry: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Index 0 holds a `Gap`
    pool: Vec<Constant>,
}

impl<'a> ClassReader<'a> {
    fn error(&self, offset: usize, reason: impl Into<String>) -> MalformedClassError {
        MalformedClassError::new(self.entry, offset, reason)
    }

    fn take(&mut self, len: usize) -> ReadResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| self.error(self.pos, format!("unexpected end of input, need {len} byte(s)")))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> ReadResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> ReadResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> ReadResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> ReadResult<u64> {
        Ok(u64::from(self.u32()?) << 32 | u64::from(self.u32()?))
    }

    fn read_pool(&mut self) -> ReadResult<()> {
        let at = self.pos;
        let count = usize::from(self.u16()?);
        if count == 0 {
            return Err(self.error(at, "constant pool count 0"));
        }
        self.pool.push(Constant::Gap);
        while self.pool.len() < count {
            let at = self.pos;
            let constant = match self.u8()? {
                tag::UTF8 => {
                    let len = usize::from(self.u16()?);
                    let start = self.pos;
                    let raw = self.take(len)?;
                    let value = decode_modified_utf8(raw)
                        .ok_or_else(|| self.error(start, "invalid modified UTF-8 in constant pool"))?;
                    Constant::Utf8(value)
                }
                tag::INTEGER => Constant::Integer(self.u32()? as i32),
                tag::FLOAT => Constant::Float(self.u32()?),
                tag::LONG => Constant::Long(self.u64()?),
                tag::DOUBLE => Constant::Double(self.u64()?),
                tag::CLASS => Constant::Class(self.u16()?),
                tag::STRING => Constant::String(self.u16()?),
                tag::FIELDREF => Constant::Fieldref(self.u16()?, self.u16()?),
                tag::METHODREF => Constant::Methodref(self.u16()?, self.u16()?),
                tag::INTERFACE_METHODREF => Constant::InterfaceMethodref(self.u16()?, self.u16()?),
                tag::NAME_AND_TYPE => Constant::NameAndType(self.u16()?, self.u16()?),
                tag::METHOD_HANDLE => Constant::MethodHandle(self.u8()?, self.u16()?),
                tag::METHOD_TYPE => Constant::MethodType(self.u16()?),
                tag::DYNAMIC => Constant::Dynamic(self.u16()?, self.u16()?),
                tag::INVOKE_DYNAMIC => Constant::InvokeDynamic(self.u16()?, self.u16()?),
                tag::MODULE => Constant::Module(self.u16()?),
                tag::PACKAGE => Constant::Package(self.u16()?),
                other => return Err(self.error(at, format!("unknown constant pool tag {other}"))),
            };
            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            self.pool.push(constant);
            if wide {
                if self.pool.len() == count {
                    return Err(self.error(at, "eight-byte constant in the last pool slot"));
                }
                self.pool.push(Constant::Gap);
            }
        }
        Ok(())
    }

    fn constant(&self, at: usize, index: u16) -> ReadResult<&Constant> {
        match self.pool.get(usize::from(index)) {
            Some(Constant::Gap) | None => {
                Err(self.error(at, format!("constant pool index {index} out of range")))
            }
            Some(constant) => Ok(constant),
        }
    }

    fn utf8_at(&self, at: usize, index: u16) -> ReadResult<String> {
        match self.constant(at, index)? {
            Constant::Utf8(value) => Ok(value.clone()),
            _ => Err(self.error(at, format!("constant {index} is not a UTF-8 entry"))),
        }
    }

    fn class_at(&self, at: usize, index: u16) -> ReadResult<String> {
        match self.constant(at, index)? {
            Constant::Class(name) => self.utf8_at(at, *name),
            _ => Err(self.error(at, format!("constant {index} is not a class entry"))),
        }
    }

    /// Field or method reference, with the tag of its pool entry.
    fn member_at(&self, at: usize, index: u16) -> ReadResult<(MemberRef, u8)> {
        let (kind, class, nat) = match self.constant(at, index)? {
            Constant::Fieldref(c, nt) => (tag::FIELDREF, *c, *nt),
            Constant::Methodref(c, nt) => (tag::METHODREF, *c, *nt),
            Constant::InterfaceMethodref(c, nt) => (tag::INTERFACE_METHODREF, *c, *nt),
            _ => return Err(self.error(at, format!("constant {index} is not a member reference"))),
        };
        let (name, descriptor) = match self.constant(at, nat)? {
            Constant::NameAndType(n, d) => (*n, *d),
            _ => return Err(self.error(at, format!("constant {nat} is not a name-and-type entry"))),
        };
        let member = MemberRef::new(
            self.class_at(at, class)?,
            self.utf8_at(at, name)?,
            self.utf8_at(at, descriptor)?,
        );
        Ok((member, kind))
    }

    fn utf8(&mut self) -> ReadResult<String> {
        let at = self.pos;
        let index = self.u16()?;
        self.utf8_at(at, index)
    }

    fn class_name(&mut self) -> ReadResult<String> {
        let at = self.pos;
        let index = self.u16()?;
        self.class_at(at, index)
    }

    fn attributes(&mut self) -> ReadResult<Vec<AttributeSpan>> {
        let count = self.u16()?;
        (0..count)
            .map(|_| {
                let at = self.pos;
                let name_index = self.u16()?;
                let name = self.utf8_at(at, name_index)?;
                let len = self.u32()? as usize;
                let start = self.pos;
                self.take(len)?;
                Ok(AttributeSpan {
                    name_index,
                    name,
                    start,
                    len,
                })
            })
            .collect()
    }

    /// Run `read` over an attribute payload, which it must consume exactly.
    fn within<T>(
        &mut self,
        span: &AttributeSpan,
        read: impl FnOnce(&mut Self) -> ReadResult<T>,
    ) -> ReadResult<T> {
        let resume = self.pos;
        self.pos = span.start;
        let value = read(self)?;
        if self.pos != span.start + span.len {
            return Err(self.error(self.pos, format!("{} attribute length mismatch", span.name)));
        }
        self.pos = resume;
        Ok(value)
    }

    fn member_attributes(&mut self) -> ReadResult<MemberAttributes> {
        let mut sorted = MemberAttributes {
            annotations: Vec::new(),
            raw: Vec::new(),
            code: None,
        };
        for span in self.attributes()? {
            match span.name.as_str() {
                attr::VISIBLE_ANNOTATIONS | attr::INVISIBLE_ANNOTATIONS => {
                    let visible = span.name == attr::VISIBLE_ANNOTATIONS;
                    let annotations = self.within(&span, |r| r.annotations(visible))?;
                    sorted.annotations.extend(annotations);
                }
                attr::CODE if sorted.code.is_none() => sorted.code = Some(span),
                attr::CODE => return Err(self.error(span.start, "second Code attribute")),
                _ => sorted.raw.push(RawAttribute {
                    name: span.name_index,
                    info: self.bytes[span.start..span.start + span.len].to_vec(),
                }),
            }
        }
        Ok(sorted)
    }

    fn annotations(&mut self, visible: bool) -> ReadResult<Vec<Annotation>> {
        let count = self.u16()?;
        (0..count)
            .map(|_| {
                let mut annotation = self.annotation(0)?;
                annotation.visible = visible;
                Ok(annotation)
            })
            .collect()
    }

    fn annotation(&mut self, depth: usize) -> ReadResult<Annotation> {
        let at = self.pos;
        let descriptor = self.utf8()?;
        let type_name = match FieldType::parse(&descriptor) {
            Some(FieldType::Object(name)) => name,
            _ => return Err(self.error(at, format!("annotation type `{descriptor}` is not a class"))),
        };
        let mut annotation = Annotation::new(type_name);
        let elements = self.u16()?;
        for _ in 0..elements {
            let name = self.utf8()?;
            let value = self.value(depth)?;
            annotation.elements.push((name, value));
        }
        Ok(annotation)
    }

    fn value(&mut self, depth: usize) -> ReadResult<AnnotationValue> {
        let at = self.pos;
        if depth > MAX_VALUE_DEPTH {
            return Err(self.error(at, "annotation value nested too deeply"));
        }
        let element = self.u8()?;
        let value = match element {
            b'B' | b'C' | b'S' | b'Z' | b'I' | b'J' | b'F' | b'D' => {
                let at = self.pos;
                let index = self.u16()?;
                let bits = match (element, self.constant(at, index)?) {
                    (b'J', Constant::Long(bits)) | (b'D', Constant::Double(bits)) => *bits,
                    (b'F', Constant::Float(bits)) => u64::from(*bits),
                    (b'B' | b'C' | b'S' | b'Z' | b'I', Constant::Integer(v)) => u64::from(*v as u32),
                    _ => {
                        return Err(self.error(
                            at,
                            format!("constant {index} does not fit element tag `{}`", char::from(element)),
                        ));
                    }
                };
                if element == b'I' {
                    AnnotationValue::Int(bits as u32 as i32)
                } else {
                    AnnotationValue::Primitive {
                        tag: char::from(element),
                        bits,
                    }
                }
            }
            b's' => AnnotationValue::Str(self.utf8()?),
            b'e' => AnnotationValue::Enum {
                type_name: self.utf8()?,
                constant: self.utf8()?,
            },
            b'c' => AnnotationValue::Class(class_literal(&self.utf8()?)),
            b'@' => AnnotationValue::Nested(self.annotation(depth + 1)?),
            b'[' => {
                let count = self.u16()?;
                let mut values = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    values.push(self.value(depth + 1)?);
                }
                AnnotationValue::Array(values)
            }
            other => return Err(self.error(at, format!("unknown annotation value tag 0x{other:02x}"))),
        };
        Ok(value)
    }

    fn instruction_at(&self, code: &[u8], code_start: usize, pc: usize) -> ReadResult<usize> {
        instruction_length(code, pc)
            .filter(|&len| pc + len <= code.len())
            .ok_or_else(|| {
                self.error(
                    code_start + pc,
                    format!("invalid or truncated instruction 0x{:02x}", code[pc]),
                )
            })
    }

    fn branch(&self, code: &[u8], at: usize, pc: usize, offset: i64) -> ReadResult<usize> {
        usize::try_from(pc as i64 + offset)
            .ok()
            .filter(|&target| target < code.len())
            .ok_or_else(|| self.error(at, "branch target outside the code"))
    }

    fn ldc(&self, at: usize, index: u16) -> ReadResult<Option<Instruction>> {
        Ok(match self.constant(at, index)? {
            Constant::String(value) => Some(Instruction::Ldc(self.utf8_at(at, *value)?)),
            Constant::Integer(v) => Some(Instruction::Iconst(*v)),
            _ => None,
        })
    }

    /// Decode a body into the instruction model, labelling every branch target.
    fn decode(&self, code: &[u8], code_start: usize) -> ReadResult<Body> {
        let mut decoded: Vec<(usize, Decoded)> = Vec::new();
        let mut pc = 0;
        while pc < code.len() {
            let at = code_start + pc;
            let len = self.instruction_at(code, code_start, pc)?;
            let operand = &code[pc + 1..pc + len];
            let index = || u16::from_be_bytes([operand[0], operand[1]]);
            let offset16 = || i64::from(u16::from_be_bytes([operand[0], operand[1]]) as i16);
            let opcode = code[pc];
            let insn = match opcode {
                op::NOP => Decoded::Done(Instruction::Nop),
                op::ACONST_NULL => Decoded::Done(Instruction::AconstNull),
                op::ICONST_M1..=op::ICONST_5 => {
                    Decoded::Done(Instruction::Iconst(i32::from(opcode) - i32::from(op::ICONST_0)))
                }
                op::BIPUSH => Decoded::Done(Instruction::Iconst(i32::from(operand[0] as i8))),
                op::SIPUSH => Decoded::Done(Instruction::Iconst(i32::from(index() as i16))),
                op::LDC | op::LDC_W => {
                    let entry = if opcode == op::LDC { u16::from(operand[0]) } else { index() };
                    match self.ldc(at, entry)? {
                        Some(insn) => Decoded::Done(insn),
                        None => return Ok(Body::Opaque(format!("non-string constant load at {pc}"))),
                    }
                }
                op::ILOAD => Decoded::Done(Instruction::Iload(u16::from(operand[0]))),
                op::ALOAD => Decoded::Done(Instruction::Aload(u16::from(operand[0]))),
                op::ISTORE => Decoded::Done(Instruction::Istore(u16::from(operand[0]))),
                op::ASTORE => Decoded::Done(Instruction::Astore(u16::from(operand[0]))),
                0x1a..=0x1d => Decoded::Done(Instruction::Iload(u16::from(opcode - op::ILOAD_0))),
                0x2a..=0x2d => Decoded::Done(Instruction::Aload(u16::from(opcode - op::ALOAD_0))),
                0x3b..=0x3e => Decoded::Done(Instruction::Istore(u16::from(opcode - op::ISTORE_0))),
                0x4b..=0x4e => Decoded::Done(Instruction::Astore(u16::from(opcode - op::ASTORE_0))),
                op::WIDE => {
                    let slot = u16::from_be_bytes([operand[1], operand[2]]);
                    Decoded::Done(match operand[0] {
                        op::ILOAD => Instruction::Iload(slot),
                        op::ALOAD => Instruction::Aload(slot),
                        op::ISTORE => Instruction::Istore(slot),
                        op::ASTORE => Instruction::Astore(slot),
                        other => return Ok(Body::Opaque(format!("wide opcode 0x{other:02x} at {pc}"))),
                    })
                }
                op::POP => Decoded::Done(Instruction::Pop),
                op::DUP => Decoded::Done(Instruction::Dup),
                op::SWAP => Decoded::Done(Instruction::Swap),
                op::NEW => Decoded::Done(Instruction::New(self.class_at(at, index())?)),
                op::CHECKCAST => Decoded::Done(Instruction::CheckCast(self.class_at(at, index())?)),
                op::GETFIELD | op::PUTFIELD | op::GETSTATIC | op::PUTSTATIC => {
                    let (field, kind) = self.member_at(at, index())?;
                    if kind != tag::FIELDREF {
                        return Err(self.error(at, "field instruction refers to a method"));
                    }
                    Decoded::Done(match opcode {
                        op::GETFIELD => Instruction::GetField(field),
                        op::PUTFIELD => Instruction::PutField(field),
                        op::GETSTATIC => Instruction::GetStatic(field),
                        _ => Instruction::PutStatic(field),
                    })
                }
                op::INVOKEVIRTUAL | op::INVOKESPECIAL | op::INVOKESTATIC | op::INVOKEINTERFACE => {
                    let (target, kind) = self.member_at(at, index())?;
                    let kind = match (opcode, kind) {
                        (_, tag::FIELDREF) => {
                            return Err(self.error(at, "invoke refers to a field"));
                        }
                        (op::INVOKEINTERFACE, tag::INTERFACE_METHODREF) => InvokeKind::Interface,
                        (op::INVOKEVIRTUAL, tag::METHODREF) => InvokeKind::Virtual,
                        (op::INVOKESPECIAL, tag::METHODREF) => InvokeKind::Special,
                        (op::INVOKESTATIC, tag::METHODREF) => InvokeKind::Static,
                        _ => return Ok(Body::Opaque(format!("interface method call at {pc}"))),
                    };
                    Decoded::Done(Instruction::Invoke { kind, target })
                }
                op::IFNULL => Decoded::Branch(Instruction::IfNull, self.branch(code, at, pc, offset16())?),
                op::IFNONNULL => {
                    Decoded::Branch(Instruction::IfNonNull, self.branch(code, at, pc, offset16())?)
                }
                op::IFEQ => Decoded::Branch(Instruction::IfEq, self.branch(code, at, pc, offset16())?),
                op::IFNE => Decoded::Branch(Instruction::IfNe, self.branch(code, at, pc, offset16())?),
                op::GOTO => Decoded::Branch(Instruction::Goto, self.branch(code, at, pc, offset16())?),
                op::GOTO_W => {
                    let offset = i32::from_be_bytes([operand[0], operand[1], operand[2], operand[3]]);
                    Decoded::Branch(Instruction::Goto, self.branch(code, at, pc, i64::from(offset))?)
                }
                op::RETURN => Decoded::Done(Instruction::Return),
                op::IRETURN => Decoded::Done(Instruction::Ireturn),
                op::ARETURN => Decoded::Done(Instruction::Areturn),
                op::ATHROW => Decoded::Done(Instruction::Athrow),
                other => return Ok(Body::Opaque(format!("opcode 0x{other:02x} at {pc}"))),
            };
            decoded.push((pc, insn));
            pc += len;
        }

        let starts: HashSet<usize> = decoded.iter().map(|(pc, _)| *pc).collect();
        let targets: BTreeSet<usize> = decoded
            .iter()
            .filter_map(|(_, insn)| match insn {
                Decoded::Branch(_, target) => Some(*target),
                Decoded::Done(_) => None,
            })
            .collect();
        if let Some(&bad) = targets.iter().find(|t| !starts.contains(t)) {
            return Err(self.error(code_start + bad, "branch into the middle of an instruction"));
        }
        // one label per target; a body this large has no use for more than u16 of them
        if targets.len() > usize::from(u16::MAX) {
            return Ok(Body::Opaque("too many branch targets".into()));
        }
        let labels: HashMap<usize, Label> = targets
            .iter()
            .enumerate()
            .map(|(i, &target)| (target, Label(i as u16)))
            .collect();

        let mut instructions = Vec::with_capacity(decoded.len() + labels.len());
        for (pc, insn) in decoded {
            if let Some(&label) = labels.get(&pc) {
                instructions.push(Instruction::Label(label));
            }
            instructions.push(match insn {
                Decoded::Done(insn) => insn,
                Decoded::Branch(make, target) => make(labels[&target]),
            });
        }
        Ok(Body::Modeled(instructions))
    }

    /// Every field a raw body reads with `getfield`.
    fn field_reads(&self, code: &[u8], code_start: usize) -> ReadResult<Vec<MemberRef>> {
        let mut reads = Vec::new();
        let mut pc = 0;
        while pc < code.len() {
            let len = self.instruction_at(code, code_start, pc)?;
            if code[pc] == op::GETFIELD {
                let index = u16::from_be_bytes([code[pc + 1], code[pc + 2]]);
                let (field, kind) = self.member_at(code_start + pc, index)?;
                if kind == tag::FIELDREF {
                    reads.push(field);
                }
            }
            pc += len;
        }
        Ok(reads)
    }

    fn method_body(&mut self, span: &AttributeSpan) -> ReadResult<MethodBody> {
        self.within(span, |r| {
            let max_stack = r.u16()?;
            let max_locals = r.u16()?;
            let at = r.pos;
            let length = r.u32()? as usize;
            let code_start = r.pos;
            let code = r.take(length)?;
            if length == 0 || length > MAX_CODE_LENGTH {
                return Err(r.error(at, format!("code length {length} out of range")));
            }
            let handlers = r.u16()?;
            r.take(usize::from(handlers) * 8)?;
            // StackMapTable and debug tables stay in the raw copy
            r.attributes()?;

            let body = if handlers > 0 {
                Body::Opaque("exception handlers".into())
            } else {
                r.decode(code, code_start)?
            };
            Ok(match body {
                Body::Modeled(instructions) => MethodBody::Modeled(Code {
                    max_stack,
                    max_locals,
                    instructions,
                    frames: Vec::new(),
                }),
                Body::Opaque(reason) => MethodBody::Opaque {
                    reason,
                    reads: r.field_reads(code, code_start)?,
                },
            })
        })
    }

    fn class(&mut self) -> ReadResult<ClassModel> {
        let magic = self.u32()?;
        if magic != MAGIC {
            return Err(self.error(0, format!("bad magic 0x{magic:08x}")));
        }
        let minor = self.u16()?;
        let major = self.u16()?;
        self.read_pool()?;

        let access = self.u16()?;
        let name = self.class_name()?;
        let at = self.pos;
        let super_name = match self.u16()? {
            0 => None,
            index => Some(self.class_at(at, index)?),
        };
        let interfaces = (0..self.u16()?)
            .map(|_| self.class_name())
            .collect::<ReadResult<Vec<_>>>()?;

        let mut state = JvmState::default();
        let mut opaque_reads = Vec::new();

        let mut fields = Vec::new();
        for _ in 0..self.u16()? {
            let access = self.u16()?;
            let field_name = self.utf8()?;
            let descriptor = self.utf8()?;
            let attributes = self.member_attributes()?;
            if let Some(span) = attributes.code {
                return Err(self.error(span.start, "Code attribute on a field"));
            }
            state
                .fields
                .insert((field_name.clone(), descriptor.clone()), attributes.raw);
            fields.push(FieldModel {
                access,
                name: field_name,
                descriptor,
                annotations: attributes.annotations,
            });
        }

        let mut methods = Vec::new();
        for _ in 0..self.u16()? {
            let access = self.u16()?;
            let method_name = self.utf8()?;
            let descriptor = self.utf8()?;
            let attributes = self.member_attributes()?;
            let mut method_state = MethodState {
                attributes: attributes.raw,
                code: None,
            };
            let mut code = None;
            if let Some(span) = attributes.code {
                let info = self.bytes[span.start..span.start + span.len].to_vec();
                match self.method_body(&span)? {
                    MethodBody::Modeled(body) => {
                        method_state.code = Some(RawCode {
                            info,
                            decoded: Some(body.instructions.clone()),
                        });
                        code = Some(body);
                    }
                    MethodBody::Opaque { reason, reads } => {
                        tracing::debug!(
                            class = %name,
                            method = %method_name,
                            %reason,
                            "keeping method body verbatim"
                        );
                        opaque_reads.extend(reads.into_iter().map(|field| OpaqueRead {
                            method: method_name.clone(),
                            descriptor: descriptor.clone(),
                            field,
                        }));
                        method_state.code = Some(RawCode {
                            info,
                            decoded: None,
                        });
                    }
                }
            }
            state
                .methods
                .insert((method_name.clone(), descriptor.clone()), method_state);
            methods.push(MethodModel {
                access,
                name: method_name,
                descriptor,
                annotations: attributes.annotations,
                code,
            });
        }

        let attributes = self.member_attributes()?;
        if let Some(span) = attributes.code {
            return Err(self.error(span.start, "Code attribute on a class"));
        }
        state.attributes = attributes.raw;

        if self.pos != self.bytes.len() {
            return Err(self.error(self.pos, "trailing bytes after class"));
        }
        state.pool = self.pool[1..].to_vec();

        Ok(ClassModel {
            version: (major, minor),
            access,
            name,
            super_name,
            interfaces,
            annotations: attributes.annotations,
            fields,
            methods,
            roles: ClassRoles::default(),
            opaque_reads,
            codec_state: CodecState::new(state),
        })
    }
}

/// Decode one class file.
pub fn read_class(entry: &str, bytes: &[u8]) -> Result<ClassModel, MalformedClassError> {
    ClassReader {
        entry,
        bytes,
        pos: 0,
        pool: Vec::new(),
    }
    .class()
}

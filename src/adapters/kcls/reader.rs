use crate::adapters::kcls::format::{MAGIC, op, tag, vt};
use crate::domain::class_model::{
    Annotation, AnnotationValue, ClassModel, ClassRoles, Code, CodecState, FieldModel, Frame, Instruction,
    InvokeKind, Label, MemberRef, MethodModel, VerificationType,
};
use crate::domain::error::MalformedClassError;

/// Annotation nesting deeper than this is rejected
const MAX_VALUE_DEPTH: usize = 16;

type ReadResult<T> = Result<T, MalformedClassError>;

/// Cursor over one class image.
struct ClassReader<'a> {
    entry: &'a str,
    bytes: &'a [u8],
    pos: usize,
    pool: Vec<String>,
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

    fn i32(&mut self) -> ReadResult<i32> {
        Ok(self.u32()? as i32)
    }

    fn read_pool(&mut self) -> ReadResult<()> {
        let count = self.u16()?;
        // index 0 is reserved
        self.pool.push(String::new());
        for _ in 0..count {
            let len = self.u16()? as usize;
            let at = self.pos;
            let raw = self.take(len)?;
            let s = std::str::from_utf8(raw)
                .map_err(|e| self.error(at + e.valid_up_to(), "invalid UTF-8 in constant pool"))?;
            self.pool.push(s.to_string());
        }
        Ok(())
    }

    /// Pool string at the next u16 index; 0 is never valid here.
    fn string(&mut self) -> ReadResult<String> {
        let at = self.pos;
        let index = self.u16()? as usize;
        if index == 0 {
            return Err(self.error(at, "constant pool index 0"));
        }
        self.pool
            .get(index)
            .cloned()
            .ok_or_else(|| self.error(at, format!("constant pool index {index} out of range")))
    }

    fn optional_string(&mut self) -> ReadResult<Option<String>> {
        let at = self.pos;
        match self.u16()? {
            0 => Ok(None),
            _ => {
                self.pos = at;
                self.string().map(Some)
            }
        }
    }

    fn annotations(&mut self) -> ReadResult<Vec<Annotation>> {
        let count = self.u16()?;
        (0..count).map(|_| self.annotation(0)).collect()
    }

    fn annotation(&mut self, depth: usize) -> ReadResult<Annotation> {
        let mut annotation = Annotation::new(self.string()?);
        let elements = self.u16()?;
        for _ in 0..elements {
            let name = self.string()?;
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
        match self.u8()? {
            tag::STRING => Ok(AnnotationValue::Str(self.string()?)),
            tag::CLASS => Ok(AnnotationValue::Class(self.string()?)),
            tag::INT => Ok(AnnotationValue::Int(self.i32()?)),
            tag::PRIMITIVE => {
                let tag = char::from(self.u8()?);
                let high = u64::from(self.u32()?);
                let low = u64::from(self.u32()?);
                Ok(AnnotationValue::Primitive {
                    tag,
                    bits: high << 32 | low,
                })
            }
            tag::ENUM => Ok(AnnotationValue::Enum {
                type_name: self.string()?,
                constant: self.string()?,
            }),
            tag::NESTED => Ok(AnnotationValue::Nested(self.annotation(depth + 1)?)),
            tag::ARRAY => {
                let count = self.u16()?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(self.value(depth + 1)?);
                }
                Ok(AnnotationValue::Array(values))
            }
            other => Err(self.error(at, format!("unknown annotation value tag 0x{other:02x}"))),
        }
    }

    fn member(&mut self) -> ReadResult<MemberRef> {
        Ok(MemberRef::new(self.string()?, self.string()?, self.string()?))
    }

    fn label(&mut self) -> ReadResult<Label> {
        Ok(Label(self.u16()?))
    }

    fn instruction(&mut self) -> ReadResult<Instruction> {
        let at = self.pos;
        let insn = match self.u8()? {
            op::NOP => Instruction::Nop,
            op::ACONST_NULL => Instruction::AconstNull,
            op::ICONST => Instruction::Iconst(self.i32()?),
            op::LDC => Instruction::Ldc(self.string()?),
            op::ILOAD => Instruction::Iload(self.u16()?),
            op::ISTORE => Instruction::Istore(self.u16()?),
            op::ALOAD => Instruction::Aload(self.u16()?),
            op::ASTORE => Instruction::Astore(self.u16()?),
            op::POP => Instruction::Pop,
            op::DUP => Instruction::Dup,
            op::SWAP => Instruction::Swap,
            op::NEW => Instruction::New(self.string()?),
            op::CHECKCAST => Instruction::CheckCast(self.string()?),
            op::GETFIELD => Instruction::GetField(self.member()?),
            op::PUTFIELD => Instruction::PutField(self.member()?),
            op::GETSTATIC => Instruction::GetStatic(self.member()?),
            op::PUTSTATIC => Instruction::PutStatic(self.member()?),
            op::INVOKEVIRTUAL => self.invoke(InvokeKind::Virtual)?,
            op::INVOKESPECIAL => self.invoke(InvokeKind::Special)?,
            op::INVOKESTATIC => self.invoke(InvokeKind::Static)?,
            op::INVOKEINTERFACE => self.invoke(InvokeKind::Interface)?,
            op::IFNULL => Instruction::IfNull(self.label()?),
            op::IFNONNULL => Instruction::IfNonNull(self.label()?),
            op::IFEQ => Instruction::IfEq(self.label()?),
            op::IFNE => Instruction::IfNe(self.label()?),
            op::GOTO => Instruction::Goto(self.label()?),
            op::LABEL => Instruction::Label(self.label()?),
            op::RETURN => Instruction::Return,
            op::IRETURN => Instruction::Ireturn,
            op::ARETURN => Instruction::Areturn,
            op::ATHROW => Instruction::Athrow,
            other => return Err(self.error(at, format!("unknown opcode 0x{other:02x}"))),
        };
        Ok(insn)
    }

    fn invoke(&mut self, kind: InvokeKind) -> ReadResult<Instruction> {
        Ok(Instruction::Invoke {
            kind,
            target: self.member()?,
        })
    }

    fn verification_type(&mut self) -> ReadResult<VerificationType> {
        let at = self.pos;
        Ok(match self.u8()? {
            vt::TOP => VerificationType::Top,
            vt::INTEGER => VerificationType::Integer,
            vt::FLOAT => VerificationType::Float,
            vt::LONG => VerificationType::Long,
            vt::DOUBLE => VerificationType::Double,
            vt::NULL => VerificationType::Null,
            vt::UNINITIALIZED_THIS => VerificationType::UninitializedThis,
            vt::OBJECT => VerificationType::Object(self.string()?),
            vt::UNINITIALIZED => VerificationType::Uninitialized(self.u32()?),
            other => return Err(self.error(at, format!("unknown verification tag {other}"))),
        })
    }

    fn verification_types(&mut self) -> ReadResult<Vec<VerificationType>> {
        let count = self.u16()?;
        (0..count).map(|_| self.verification_type()).collect()
    }

    fn code(&mut self) -> ReadResult<Code> {
        let max_stack = self.u16()?;
        let max_locals = self.u16()?;

        let at = self.pos;
        let count = self.u32()? as usize;
        // every instruction takes at least one byte
        if count > self.bytes.len() - self.pos {
            return Err(self.error(at, format!("instruction count {count} exceeds input")));
        }
        let mut instructions = Vec::with_capacity(count);
        for _ in 0..count {
            instructions.push(self.instruction()?);
        }

        let frame_count = self.u16()?;
        let mut frames = Vec::with_capacity(frame_count as usize);
        for _ in 0..frame_count {
            frames.push(Frame {
                label: self.label()?,
                locals: self.verification_types()?,
                stack: self.verification_types()?,
            });
        }

        Ok(Code {
            max_stack,
            max_locals,
            instructions,
            frames,
        })
    }

    fn field(&mut self) -> ReadResult<FieldModel> {
        Ok(FieldModel {
            access: self.u16()?,
            name: self.string()?,
            descriptor: self.string()?,
            annotations: self.annotations()?,
        })
    }

    fn method(&mut self) -> ReadResult<MethodModel> {
        let access = self.u16()?;
        let name = self.string()?;
        let descriptor = self.string()?;
        let annotations = self.annotations()?;
        let at = self.pos;
        let code = match self.u8()? {
            0 => None,
            1 => Some(self.code()?),
            other => return Err(self.error(at, format!("invalid code flag {other}"))),
        };
        Ok(MethodModel {
            access,
            name,
            descriptor,
            annotations,
            code,
        })
    }

    fn class(&mut self) -> ReadResult<ClassModel> {
        let magic = self.u32()?;
        if magic != MAGIC {
            return Err(self.error(0, format!("bad magic 0x{magic:08x}")));
        }
        let major = self.u16()?;
        let minor = self.u16()?;
        self.read_pool()?;

        let access = self.u16()?;
        let name = self.string()?;
        let super_name = self.optional_string()?;
        let interfaces = (0..self.u16()?)
            .map(|_| self.string())
            .collect::<ReadResult<Vec<_>>>()?;
        let annotations = self.annotations()?;
        let fields = (0..self.u16()?)
            .map(|_| self.field())
            .collect::<ReadResult<Vec<_>>>()?;
        let methods = (0..self.u16()?)
            .map(|_| self.method())
            .collect::<ReadResult<Vec<_>>>()?;

        if self.pos != self.bytes.len() {
            return Err(self.error(self.pos, "trailing bytes after class"));
        }

        Ok(ClassModel {
            version: (major, minor),
            access,
            name,
            super_name,
            interfaces,
            annotations,
            fields,
            methods,
            roles: ClassRoles::default(),
            opaque_reads: Vec::new(),
            codec_state: CodecState::default(),
        })
    }
}

/// Decode one class image.
pub fn read_class(entry: &str, bytes: &[u8]) -> Result<ClassModel, MalformedClassError> {
    ClassReader {
        entry,
        bytes,
        pos: 0,
        pool: Vec::new(),
    }
    .class()
}

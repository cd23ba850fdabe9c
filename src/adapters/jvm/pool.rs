//! Constant pool entries, the pool builder, and modified UTF-8.

use crate::adapters::jvm::format::tag;
use crate::domain::class_model::MemberRef;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    /// Raw IEEE bits
    Float(u32),
    Long(u64),
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref(u16, u16),
    Methodref(u16, u16),
    InterfaceMethodref(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
    Module(u16),
    Package(u16),
    /// Unusable slot after a `Long` or `Double`, and index 0
    Gap,
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), String> {
        let pair = |out: &mut Vec<u8>, t: u8, a: u16, b: u16| {
            out.push(t);
            out.extend_from_slice(&a.to_be_bytes());
            out.extend_from_slice(&b.to_be_bytes());
        };
        let single = |out: &mut Vec<u8>, t: u8, a: u16| {
            out.push(t);
            out.extend_from_slice(&a.to_be_bytes());
        };
        match self {
            Constant::Utf8(s) => {
                let bytes = encode_modified_utf8(s);
                let len = u16::try_from(bytes.len())
                    .map_err(|_| format!("constant of {} bytes is too long", bytes.len()))?;
                single(out, tag::UTF8, len);
                out.extend_from_slice(&bytes);
            }
            Constant::Integer(v) => {
                out.push(tag::INTEGER);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Constant::Float(bits) => {
                out.push(tag::FLOAT);
                out.extend_from_slice(&bits.to_be_bytes());
            }
            Constant::Long(bits) => {
                out.push(tag::LONG);
                out.extend_from_slice(&bits.to_be_bytes());
            }
            Constant::Double(bits) => {
                out.push(tag::DOUBLE);
                out.extend_from_slice(&bits.to_be_bytes());
            }
            Constant::Class(n) => single(out, tag::CLASS, *n),
            Constant::String(n) => single(out, tag::STRING, *n),
            Constant::Fieldref(c, nt) => pair(out, tag::FIELDREF, *c, *nt),
            Constant::Methodref(c, nt) => pair(out, tag::METHODREF, *c, *nt),
            Constant::InterfaceMethodref(c, nt) => pair(out, tag::INTERFACE_METHODREF, *c, *nt),
            Constant::NameAndType(n, d) => pair(out, tag::NAME_AND_TYPE, *n, *d),
            Constant::MethodHandle(kind, r) => {
                out.push(tag::METHOD_HANDLE);
                out.push(*kind);
                out.extend_from_slice(&r.to_be_bytes());
            }
            Constant::MethodType(d) => single(out, tag::METHOD_TYPE, *d),
            Constant::Dynamic(b, nt) => pair(out, tag::DYNAMIC, *b, *nt),
            Constant::InvokeDynamic(b, nt) => pair(out, tag::INVOKE_DYNAMIC, *b, *nt),
            Constant::Module(n) => single(out, tag::MODULE, *n),
            Constant::Package(n) => single(out, tag::PACKAGE, *n),
            Constant::Gap => {}
        }
        Ok(())
    }
}

/// Pool under construction. Seeding it with the pool a class was read with
/// keeps every original index valid, so raw attributes can be copied as is.
#[derive(Debug, Default)]
pub struct ConstantPool {
    /// `entries[i]` has index `i + 1`
    entries: Vec<Constant>,
    index: HashMap<Constant, u16>,
}

impl ConstantPool {
    pub fn seeded(entries: &[Constant]) -> Self {
        let mut pool = Self {
            entries: entries.to_vec(),
            index: HashMap::new(),
        };
        for (i, entry) in entries.iter().enumerate() {
            if *entry != Constant::Gap {
                // the reader bounds the pool by a u16 count
                pool.index.entry(entry.clone()).or_insert((i + 1) as u16);
            }
        }
        pool
    }

    fn add(&mut self, constant: Constant) -> Result<u16, String> {
        if let Some(&idx) = self.index.get(&constant) {
            return Ok(idx);
        }
        let width = if constant.is_wide() { 2 } else { 1 };
        // the count written before the pool is one above the last index
        if self.entries.len() + width >= usize::from(u16::MAX) {
            return Err("constant pool overflow".to_string());
        }
        let idx = (self.entries.len() + 1) as u16;
        self.entries.push(constant.clone());
        if width == 2 {
            self.entries.push(Constant::Gap);
        }
        self.index.insert(constant, idx);
        Ok(idx)
    }

    pub fn utf8(&mut self, value: &str) -> Result<u16, String> {
        self.add(Constant::Utf8(value.to_string()))
    }

    pub fn class(&mut self, name: &str) -> Result<u16, String> {
        let name = self.utf8(name)?;
        self.add(Constant::Class(name))
    }

    pub fn string(&mut self, value: &str) -> Result<u16, String> {
        let value = self.utf8(value)?;
        self.add(Constant::String(value))
    }

    pub fn integer(&mut self, value: i32) -> Result<u16, String> {
        self.add(Constant::Integer(value))
    }

    pub fn float(&mut self, bits: u32) -> Result<u16, String> {
        self.add(Constant::Float(bits))
    }

    pub fn long(&mut self, bits: u64) -> Result<u16, String> {
        self.add(Constant::Long(bits))
    }

    pub fn double(&mut self, bits: u64) -> Result<u16, String> {
        self.add(Constant::Double(bits))
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, String> {
        let name = self.utf8(name)?;
        let descriptor = self.utf8(descriptor)?;
        self.add(Constant::NameAndType(name, descriptor))
    }

    pub fn field_ref(&mut self, member: &MemberRef) -> Result<u16, String> {
        let owner = self.class(&member.owner)?;
        let nat = self.name_and_type(&member.name, &member.descriptor)?;
        self.add(Constant::Fieldref(owner, nat))
    }

    pub fn method_ref(&mut self, member: &MemberRef, interface: bool) -> Result<u16, String> {
        let owner = self.class(&member.owner)?;
        let nat = self.name_and_type(&member.name, &member.descriptor)?;
        if interface {
            self.add(Constant::InterfaceMethodref(owner, nat))
        } else {
            self.add(Constant::Methodref(owner, nat))
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), String> {
        // add() keeps the count within u16
        out.extend_from_slice(&((self.entries.len() + 1) as u16).to_be_bytes());
        self.entries.iter().try_for_each(|entry| entry.write(out))
    }
}

/// Decode the JVM's modified UTF-8: two-byte NUL, surrogates encoded one by one.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let cont = |i: usize| bytes.get(i).filter(|&&b| b & 0xc0 == 0x80).map(|&b| u16::from(b & 0x3f));
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xe0 == 0xc0 {
            units.push(u16::from(b & 0x1f) << 6 | cont(i + 1)?);
            i += 2;
        } else if b & 0xf0 == 0xe0 {
            units.push(u16::from(b & 0x0f) << 12 | cont(i + 1)? << 6 | cont(i + 2)?);
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}

pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x01..=0x7f => out.push(unit as u8),
            0x00 | 0x80..=0x7ff => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}

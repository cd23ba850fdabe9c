//! Field and method descriptors (`I`, `Lpkg/Name;`, `[I`, `(ILpkg/A;)V`).

use serde::Serialize;
use std::fmt;

/// A parsed field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum FieldType {
    /// Primitive, keyed by its descriptor character (`B C D F I J S Z`).
    Base(char),
    /// Reference to a class by internal name.
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a complete field descriptor; trailing input is rejected.
    pub fn parse(descriptor: &str) -> Option<FieldType> {
        let (ty, rest) = parse_field_type(descriptor)?;
        rest.is_empty().then_some(ty)
    }

    /// Name used for type matching: internal name for classes, descriptor for arrays
    /// and primitives.
    pub fn type_name(&self) -> String {
        match self {
            FieldType::Object(name) => name.clone(),
            other => other.descriptor(),
        }
    }

    pub fn descriptor(&self) -> String {
        match self {
            FieldType::Base(c) => c.to_string(),
            FieldType::Object(name) => format!("L{};", name),
            FieldType::Array(inner) => format!("[{}", inner.descriptor()),
        }
    }

    pub fn is_reference(&self) -> bool {
        !matches!(self, FieldType::Base(_))
    }

    /// Local-variable / operand slots taken by a value of this type.
    pub fn slots(&self) -> u16 {
        match self {
            FieldType::Base('J') | FieldType::Base('D') => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

/// A parsed method descriptor. `ret` is `None` for `V`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Option<MethodDescriptor> {
        let mut rest = descriptor.strip_prefix('(')?;
        let mut params = Vec::new();
        while !rest.starts_with(')') {
            let (ty, tail) = parse_field_type(rest)?;
            params.push(ty);
            rest = tail;
        }
        let rest = &rest[1..];
        let ret = if rest == "V" {
            None
        } else {
            Some(FieldType::parse(rest)?)
        };
        Some(MethodDescriptor { params, ret })
    }

    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for p in &self.params {
            out.push_str(&p.descriptor());
        }
        out.push(')');
        match &self.ret {
            Some(ret) => out.push_str(&ret.descriptor()),
            None => out.push('V'),
        }
        out
    }

    /// Argument slots the parameters occupy, as counted by `invokeinterface`.
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slots).sum()
    }
}

fn parse_field_type(input: &str) -> Option<(FieldType, &str)> {
    let mut chars = input.chars();
    match chars.next()? {
        c @ ('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
            Some((FieldType::Base(c), &input[1..]))
        }
        'L' => {
            let end = input.find(';')?;
            let name = &input[1..end];
            if name.is_empty() {
                return None;
            }
            Some((FieldType::Object(name.to_string()), &input[end + 1..]))
        }
        '[' => {
            let (inner, rest) = parse_field_type(&input[1..])?;
            Some((FieldType::Array(Box::new(inner)), rest))
        }
        _ => None,
    }
}

/// Descriptor for a reference to `type_name` (internal name or array descriptor).
pub fn reference_descriptor(type_name: &str) -> String {
    if type_name.starts_with('[') {
        type_name.to_string()
    } else {
        format!("L{};", type_name)
    }
}

/// Simple (unqualified) part of an internal class name.
pub fn simple_name(type_name: &str) -> &str {
    type_name.rsplit('/').next().unwrap_or(type_name)
}

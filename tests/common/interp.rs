//! Minimal stack machine that executes woven classes.
//!
//! Only what the fixtures emit is supported. `test/Marker.hit(String)` is a
//! native that records its argument, so constructor runs can be counted.

use super::fixtures::{MARKER, codec};
use anyhow::{Context, Result, anyhow, bail};
use knit_weaver::domain::class_model::{
    ClassModel, INIT, Instruction, InvokeKind, MethodModel, OBJECT,
};
use knit_weaver::domain::descriptor::MethodDescriptor;
use knit_weaver::domain::ports::ClassCodec;
use std::collections::HashMap;

const STEP_LIMIT: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Int(i32),
    Str(String),
    Ref(usize),
}

#[derive(Debug)]
struct Object {
    class: String,
    fields: HashMap<String, Value>,
}

#[derive(Default)]
pub struct Vm {
    classes: HashMap<String, ClassModel>,
    heap: Vec<Object>,
    statics: HashMap<(String, String), Value>,
    hits: Vec<String>,
    steps: usize,
}

impl Vm {
    pub fn from_models(models: impl IntoIterator<Item = ClassModel>) -> Self {
        let mut vm = Self::default();
        for model in models {
            vm.classes.insert(model.name.clone(), model);
        }
        vm
    }

    /// Decode every `(entry, bytes)` pair with the fixture codec.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Result<Self> {
        let codec = codec();
        let mut models = Vec::new();
        for (entry, bytes) in entries {
            models.push(codec.decode(entry, bytes)?);
        }
        Ok(Self::from_models(models))
    }

    /// Allocate `class` and run its no-arg constructor.
    pub fn instantiate(&mut self, class: &str) -> Result<Value> {
        let object = self.allocate(class);
        self.call(class, INIT, "()V", vec![object.clone()])?;
        Ok(object)
    }

    /// Invoke a method directly; `args` includes the receiver for instance methods.
    pub fn call(&mut self, class: &str, name: &str, descriptor: &str, args: Vec<Value>) -> Result<Value> {
        if class == OBJECT && name == INIT {
            return Ok(Value::Null);
        }
        let method = self
            .find_method(class, name, descriptor)
            .with_context(|| format!("no method {class}.{name}{descriptor}"))?;
        self.execute(class, &method, args)
    }

    /// Constructor runs recorded so far for `class`.
    pub fn hits(&self, class: &str) -> usize {
        self.hits.iter().filter(|h| h.as_str() == class).count()
    }

    pub fn class_of(&self, value: &Value) -> Option<&str> {
        match value {
            Value::Ref(r) => self.heap.get(*r).map(|o| o.class.as_str()),
            _ => None,
        }
    }

    pub fn field(&self, value: &Value, name: &str) -> Value {
        match value {
            Value::Ref(r) => self.heap[*r].fields.get(name).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    pub fn static_field(&self, owner: &str, name: &str) -> Value {
        self.statics
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn allocate(&mut self, class: &str) -> Value {
        self.heap.push(Object {
            class: class.to_string(),
            fields: HashMap::new(),
        });
        Value::Ref(self.heap.len() - 1)
    }

    /// Search `class` and then its superclasses.
    fn find_method(&self, class: &str, name: &str, descriptor: &str) -> Option<MethodModel> {
        let mut current = Some(class.to_string());
        while let Some(name_now) = current {
            let model = self.classes.get(&name_now)?;
            if let Some(method) = model.method(name, descriptor) {
                return Some(method.clone());
            }
            current = model.super_name.clone();
        }
        None
    }

    fn execute(&mut self, class: &str, method: &MethodModel, args: Vec<Value>) -> Result<Value> {
        let code = method
            .code
            .as_ref()
            .ok_or_else(|| anyhow!("{class}.{} has no body", method.name))?;
        let labels: HashMap<u16, usize> = code
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(i, insn)| match insn {
                Instruction::Label(l) => Some((l.0, i)),
                _ => None,
            })
            .collect();

        let mut locals = args;
        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0;
        loop {
            self.steps += 1;
            if self.steps > STEP_LIMIT {
                bail!("step limit exceeded in {class}.{}", method.name);
            }
            let insn = code
                .instructions
                .get(pc)
                .ok_or_else(|| anyhow!("fell off the end of {class}.{}", method.name))?
                .clone();
            pc += 1;
            match insn {
                Instruction::Nop | Instruction::Label(_) | Instruction::CheckCast(_) => {}
                Instruction::AconstNull => stack.push(Value::Null),
                Instruction::Iconst(v) => stack.push(Value::Int(v)),
                Instruction::Ldc(s) => stack.push(Value::Str(s)),
                Instruction::Iload(n) | Instruction::Aload(n) => {
                    stack.push(locals.get(n as usize).cloned().unwrap_or(Value::Null));
                }
                Instruction::Istore(n) | Instruction::Astore(n) => {
                    let value = pop(&mut stack)?;
                    let n = n as usize;
                    if locals.len() <= n {
                        locals.resize(n + 1, Value::Null);
                    }
                    locals[n] = value;
                }
                Instruction::Pop => {
                    pop(&mut stack)?;
                }
                Instruction::Dup => {
                    let top = stack.last().cloned().ok_or_else(|| anyhow!("dup on empty stack"))?;
                    stack.push(top);
                }
                Instruction::Swap => {
                    let a = pop(&mut stack)?;
                    let b = pop(&mut stack)?;
                    stack.push(a);
                    stack.push(b);
                }
                Instruction::New(ty) => {
                    let object = self.allocate(&ty);
                    stack.push(object);
                }
                Instruction::GetField(m) => {
                    let target = pop(&mut stack)?;
                    stack.push(self.field(&target, &m.name));
                }
                Instruction::PutField(m) => {
                    let value = pop(&mut stack)?;
                    let Value::Ref(r) = pop(&mut stack)? else {
                        bail!("putfield {} on a non-reference", m.name);
                    };
                    self.heap[r].fields.insert(m.name, value);
                }
                Instruction::GetStatic(m) => {
                    stack.push(self.static_field(&m.owner, &m.name));
                }
                Instruction::PutStatic(m) => {
                    let value = pop(&mut stack)?;
                    self.statics.insert((m.owner, m.name), value);
                }
                Instruction::Invoke { kind, target } => {
                    let descriptor = MethodDescriptor::parse(&target.descriptor)
                        .ok_or_else(|| anyhow!("bad descriptor {}", target.descriptor))?;
                    let mut args = Vec::with_capacity(descriptor.params.len() + 1);
                    for _ in 0..descriptor.params.len() {
                        args.push(pop(&mut stack)?);
                    }
                    if kind != InvokeKind::Static {
                        args.push(pop(&mut stack)?);
                    }
                    args.reverse();

                    if target.owner == MARKER && target.name == "hit" {
                        if let Some(Value::Str(tag)) = args.first() {
                            self.hits.push(tag.clone());
                        }
                        continue;
                    }
                    let owner = match kind {
                        InvokeKind::Virtual | InvokeKind::Interface => self
                            .class_of(&args[0])
                            .map(str::to_string)
                            .unwrap_or(target.owner.clone()),
                        InvokeKind::Special | InvokeKind::Static => target.owner.clone(),
                    };
                    let result = self.call(&owner, &target.name, &target.descriptor, args)?;
                    if descriptor.ret.is_some() {
                        stack.push(result);
                    }
                }
                Instruction::IfNull(l) => {
                    if pop(&mut stack)? == Value::Null {
                        pc = jump(&labels, l.0)?;
                    }
                }
                Instruction::IfNonNull(l) => {
                    if pop(&mut stack)? != Value::Null {
                        pc = jump(&labels, l.0)?;
                    }
                }
                Instruction::IfEq(l) => {
                    if pop(&mut stack)? == Value::Int(0) {
                        pc = jump(&labels, l.0)?;
                    }
                }
                Instruction::IfNe(l) => {
                    if pop(&mut stack)? != Value::Int(0) {
                        pc = jump(&labels, l.0)?;
                    }
                }
                Instruction::Goto(l) => pc = jump(&labels, l.0)?,
                Instruction::Return => return Ok(Value::Null),
                Instruction::Ireturn | Instruction::Areturn => return pop(&mut stack),
                Instruction::Athrow => bail!("exception thrown in {class}.{}", method.name),
            }
        }
    }
}

fn pop(stack: &mut Vec<Value>) -> Result<Value> {
    stack.pop().ok_or_else(|| anyhow!("stack underflow"))
}

fn jump(labels: &HashMap<u16, usize>, label: u16) -> Result<usize> {
    labels
        .get(&label)
        .copied()
        .ok_or_else(|| anyhow!("unknown label L{label}"))
}

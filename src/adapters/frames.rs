//! Verifier metadata recomputation.
//!
//! Abstract interpretation over one method body: a worklist of instruction
//! indices, each carrying the types of its locals and operand stack. States
//! meeting at a join are merged, reference types through the inheritance
//! judgement's common ancestor. The fixpoint yields `max_stack`, `max_locals`
//! and one frame per branch target or fall-through-free label.

use crate::domain::class_model::{
    ClassModel, Frame, INIT, Instruction, InvokeKind, MethodModel, OBJECT, VerificationType,
};
use crate::domain::descriptor::{FieldType, MethodDescriptor};
use crate::domain::error::WeaveError;
use crate::domain::hierarchy::InheritanceJudgement;
use std::collections::{HashMap, HashSet, VecDeque};

const STRING: &str = "java/lang/String";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedFrames {
    pub max_stack: u16,
    pub max_locals: u16,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct State {
    locals: Vec<VerificationType>,
    stack: Vec<VerificationType>,
}

fn verification_type(ty: &FieldType) -> VerificationType {
    match ty {
        FieldType::Base('F') => VerificationType::Float,
        FieldType::Base('J') => VerificationType::Long,
        FieldType::Base('D') => VerificationType::Double,
        FieldType::Base(_) => VerificationType::Integer,
        other => VerificationType::Object(other.type_name()),
    }
}

fn is_wide(ty: &VerificationType) -> bool {
    matches!(ty, VerificationType::Long | VerificationType::Double)
}

fn is_reference(ty: &VerificationType) -> bool {
    matches!(
        ty,
        VerificationType::Null
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_)
            | VerificationType::UninitializedThis
    )
}

fn stack_slots(stack: &[VerificationType]) -> usize {
    stack.iter().map(|t| if is_wide(t) { 2 } else { 1 }).sum()
}

struct Interpreter<'a> {
    class: &'a ClassModel,
    method: &'a MethodModel,
    instructions: &'a [Instruction],
    judgement: &'a dyn InheritanceJudgement,
    labels: HashMap<u16, usize>,
    max_stack: usize,
    max_locals: usize,
}

impl<'a> Interpreter<'a> {
    fn fail(&self, at: usize, reason: impl std::fmt::Display) -> WeaveError {
        WeaveError::encode(
            &self.class.name,
            format!(
                "{}{} instruction {}: {}",
                self.method.name, self.method.descriptor, at, reason
            ),
        )
    }

    fn entry_state(&mut self) -> Result<State, WeaveError> {
        let descriptor = MethodDescriptor::parse(&self.method.descriptor)
            .ok_or_else(|| self.fail(0, "invalid method descriptor"))?;

        let mut locals = Vec::new();
        if !self.method.is_static() {
            locals.push(if self.method.is_constructor() {
                VerificationType::UninitializedThis
            } else {
                VerificationType::Object(self.class.name.clone())
            });
        }
        for param in &descriptor.params {
            let ty = verification_type(param);
            let wide = is_wide(&ty);
            locals.push(ty);
            if wide {
                locals.push(VerificationType::Top);
            }
        }
        self.max_locals = locals.len();
        Ok(State {
            locals,
            stack: Vec::new(),
        })
    }

    fn target(&self, at: usize, label: u16) -> Result<usize, WeaveError> {
        self.labels
            .get(&label)
            .copied()
            .ok_or_else(|| self.fail(at, format!("branch to undefined label {label}")))
    }

    fn pop(&self, at: usize, state: &mut State) -> Result<VerificationType, WeaveError> {
        state
            .stack
            .pop()
            .ok_or_else(|| self.fail(at, "operand stack underflow"))
    }

    fn pop_reference(&self, at: usize, state: &mut State) -> Result<VerificationType, WeaveError> {
        let value = self.pop(at, state)?;
        if !is_reference(&value) {
            return Err(self.fail(at, format!("expected a reference, found {value:?}")));
        }
        Ok(value)
    }

    fn pop_int(&self, at: usize, state: &mut State) -> Result<(), WeaveError> {
        match self.pop(at, state)? {
            VerificationType::Integer => Ok(()),
            other => Err(self.fail(at, format!("expected an int, found {other:?}"))),
        }
    }

    fn push(&mut self, state: &mut State, value: VerificationType) {
        state.stack.push(value);
        self.max_stack = self.max_stack.max(stack_slots(&state.stack));
    }

    fn store(&mut self, state: &mut State, slot: u16, value: VerificationType) {
        let slot = slot as usize;
        if state.locals.len() <= slot {
            state.locals.resize(slot + 1, VerificationType::Top);
        }
        state.locals[slot] = value;
        self.max_locals = self.max_locals.max(slot + 1);
    }

    fn load(&self, at: usize, state: &State, slot: u16) -> Result<VerificationType, WeaveError> {
        match state.locals.get(slot as usize) {
            Some(VerificationType::Top) | None => {
                Err(self.fail(at, format!("read of unset local {slot}")))
            }
            Some(ty) => Ok(ty.clone()),
        }
    }

    /// Replace every occurrence of an uninitialized value once its constructor ran.
    fn initialize(&self, state: &mut State, from: &VerificationType, to: VerificationType) {
        for slot in state.locals.iter_mut().chain(state.stack.iter_mut()) {
            if *slot == *from {
                *slot = to.clone();
            }
        }
    }

    /// Apply one instruction; returns the successor indices.
    fn step(&mut self, at: usize, state: &mut State) -> Result<Vec<usize>, WeaveError> {
        let instructions = self.instructions;
        let insn = &instructions[at];
        match insn {
            Instruction::Nop | Instruction::Label(_) => {}
            Instruction::AconstNull => self.push(state, VerificationType::Null),
            Instruction::Iconst(_) => self.push(state, VerificationType::Integer),
            Instruction::Ldc(_) => self.push(state, VerificationType::Object(STRING.into())),
            Instruction::Iload(n) => {
                match self.load(at, state, *n)? {
                    VerificationType::Integer => {}
                    other => return Err(self.fail(at, format!("iload of {other:?}"))),
                }
                self.push(state, VerificationType::Integer);
            }
            Instruction::Aload(n) => {
                let value = self.load(at, state, *n)?;
                if !is_reference(&value) {
                    return Err(self.fail(at, format!("aload of {value:?}")));
                }
                self.push(state, value);
            }
            Instruction::Istore(n) => {
                self.pop_int(at, state)?;
                self.store(state, *n, VerificationType::Integer);
            }
            Instruction::Astore(n) => {
                let value = self.pop_reference(at, state)?;
                self.store(state, *n, value);
            }
            Instruction::Pop => {
                self.pop(at, state)?;
            }
            Instruction::Dup => {
                let top = state
                    .stack
                    .last()
                    .cloned()
                    .ok_or_else(|| self.fail(at, "operand stack underflow"))?;
                self.push(state, top);
            }
            Instruction::Swap => {
                let a = self.pop(at, state)?;
                let b = self.pop(at, state)?;
                self.push(state, a);
                self.push(state, b);
            }
            Instruction::New(_) => self.push(state, VerificationType::Uninitialized(at as u32)),
            Instruction::CheckCast(ty) => {
                self.pop_reference(at, state)?;
                self.push(state, VerificationType::Object(ty.clone()));
            }
            Instruction::GetField(m) | Instruction::GetStatic(m) => {
                if matches!(insn, Instruction::GetField(_)) {
                    self.pop_reference(at, state)?;
                }
                let ty = FieldType::parse(&m.descriptor)
                    .ok_or_else(|| self.fail(at, format!("invalid field descriptor {}", m.descriptor)))?;
                self.push(state, verification_type(&ty));
            }
            Instruction::PutField(_) | Instruction::PutStatic(_) => {
                self.pop(at, state)?;
                if matches!(insn, Instruction::PutField(_)) {
                    self.pop_reference(at, state)?;
                }
            }
            Instruction::Invoke { kind, target } => {
                let descriptor = MethodDescriptor::parse(&target.descriptor).ok_or_else(|| {
                    self.fail(at, format!("invalid method descriptor {}", target.descriptor))
                })?;
                for _ in &descriptor.params {
                    self.pop(at, state)?;
                }
                if *kind != InvokeKind::Static {
                    let receiver = self.pop_reference(at, state)?;
                    if *kind == InvokeKind::Special && target.name == INIT {
                        let initialized = match &receiver {
                            VerificationType::Uninitialized(new_at) => {
                                match instructions.get(*new_at as usize) {
                                    Some(Instruction::New(ty)) => ty.clone(),
                                    _ => return Err(self.fail(at, "constructor on a value not created by New")),
                                }
                            }
                            VerificationType::UninitializedThis => self.class.name.clone(),
                            other => {
                                return Err(self.fail(at, format!("constructor on initialized {other:?}")));
                            }
                        };
                        self.initialize(state, &receiver, VerificationType::Object(initialized));
                    }
                }
                if let Some(ret) = &descriptor.ret {
                    self.push(state, verification_type(ret));
                }
            }
            Instruction::IfNull(l) | Instruction::IfNonNull(l) => {
                self.pop_reference(at, state)?;
                return Ok(vec![at + 1, self.target(at, l.0)?]);
            }
            Instruction::IfEq(l) | Instruction::IfNe(l) => {
                self.pop_int(at, state)?;
                return Ok(vec![at + 1, self.target(at, l.0)?]);
            }
            Instruction::Goto(l) => return Ok(vec![self.target(at, l.0)?]),
            Instruction::Return => {
                if MethodDescriptor::parse(&self.method.descriptor).is_some_and(|d| d.ret.is_some()) {
                    return Err(self.fail(at, "void return from a value-returning method"));
                }
                return Ok(Vec::new());
            }
            Instruction::Ireturn => {
                self.pop_int(at, state)?;
                return Ok(Vec::new());
            }
            Instruction::Areturn | Instruction::Athrow => {
                self.pop_reference(at, state)?;
                return Ok(Vec::new());
            }
        }
        Ok(vec![at + 1])
    }

    fn merge_type(&self, a: &VerificationType, b: &VerificationType) -> Option<VerificationType> {
        use VerificationType::*;
        match (a, b) {
            _ if a == b => Some(a.clone()),
            (Null, Object(_)) => Some(b.clone()),
            (Object(_), Null) => Some(a.clone()),
            (Object(x), Object(y)) => {
                Some(Object(self.judgement.common_ancestor(x, y)))
            }
            _ => None,
        }
    }

    /// Merge `incoming` into `current`; returns true when `current` changed.
    fn merge(&self, at: usize, current: &mut State, incoming: &State) -> Result<bool, WeaveError> {
        if current.stack.len() != incoming.stack.len() {
            return Err(self.fail(
                at,
                format!(
                    "inconsistent stack height at join: {} vs {}",
                    current.stack.len(),
                    incoming.stack.len()
                ),
            ));
        }

        let mut changed = false;
        for (slot, theirs) in current.stack.iter_mut().zip(&incoming.stack) {
            let merged = self
                .merge_type(slot, theirs)
                .ok_or_else(|| self.fail(at, format!("incompatible stack values {slot:?} and {theirs:?}")))?;
            if *slot != merged {
                *slot = merged;
                changed = true;
            }
        }

        // locals only present on one side are unusable after the join
        if current.locals.len() > incoming.locals.len() {
            current.locals.truncate(incoming.locals.len());
            changed = true;
        }
        for (slot, theirs) in current.locals.iter_mut().zip(&incoming.locals) {
            let merged = self.merge_type(slot, theirs).unwrap_or(VerificationType::Top);
            if *slot != merged {
                *slot = merged;
                changed = true;
            }
        }
        Ok(changed)
    }

    fn run(mut self) -> Result<ComputedFrames, WeaveError> {
        for (i, insn) in self.instructions.iter().enumerate() {
            if let Instruction::Label(l) = insn
                && self.labels.insert(l.0, i).is_some()
            {
                return Err(self.fail(i, format!("label {} defined twice", l.0)));
            }
        }

        let mut frame_at: HashSet<usize> = HashSet::new();
        for (i, insn) in self.instructions.iter().enumerate() {
            if let Some(l) = insn.branch_target() {
                frame_at.insert(self.target(i, l.0)?);
            }
            if insn.ends_flow()
                && let Some(Instruction::Label(_)) = self.instructions.get(i + 1)
            {
                frame_at.insert(i + 1);
            }
        }

        let mut states: Vec<Option<State>> = vec![None; self.instructions.len()];
        if self.instructions.is_empty() {
            return Err(self.fail(0, "empty method body"));
        }
        states[0] = Some(self.entry_state()?);

        let mut worklist: VecDeque<usize> = VecDeque::from([0]);
        let mut queued: HashSet<usize> = HashSet::from([0]);
        while let Some(at) = worklist.pop_front() {
            queued.remove(&at);
            let Some(mut state) = states[at].clone() else {
                continue;
            };
            for next in self.step(at, &mut state)? {
                if next >= self.instructions.len() {
                    return Err(self.fail(at, "control falls off the end of the method"));
                }
                let changed = match states[next].as_mut() {
                    Some(existing) => self.merge(next, existing, &state)?,
                    None => {
                        states[next] = Some(state.clone());
                        true
                    }
                };
                if changed && queued.insert(next) {
                    worklist.push_back(next);
                }
            }
        }

        let mut frames = Vec::new();
        let mut targets: Vec<usize> = frame_at.into_iter().collect();
        targets.sort_unstable();
        for at in targets {
            let (Some(state), Instruction::Label(label)) = (&states[at], &self.instructions[at]) else {
                continue;
            };
            frames.push(Frame {
                label: *label,
                locals: state.locals.clone(),
                stack: state.stack.clone(),
            });
        }

        let max_stack = u16::try_from(self.max_stack)
            .map_err(|_| self.fail(0, "operand stack too deep"))?;
        let max_locals = u16::try_from(self.max_locals)
            .map_err(|_| self.fail(0, "too many locals"))?;
        tracing::trace!(
            class = %self.class.name,
            method = %self.method.name,
            max_stack,
            max_locals,
            frames = frames.len(),
            "frames computed"
        );
        Ok(ComputedFrames {
            max_stack,
            max_locals,
            frames,
        })
    }
}

/// Recompute `max_stack`, `max_locals` and the frame table of one method body.
pub fn compute(
    class: &ClassModel,
    method: &MethodModel,
    instructions: &[Instruction],
    judgement: &dyn InheritanceJudgement,
) -> Result<ComputedFrames, WeaveError> {
    Interpreter {
        class,
        method,
        instructions,
        judgement,
        labels: HashMap::new(),
        max_stack: 0,
        max_locals: 0,
    }
    .run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::class_model::{Code, Label, MemberRef, access};
    use crate::domain::hierarchy::TypeHierarchy;

    fn method(descriptor: &str, is_static: bool, instructions: Vec<Instruction>) -> MethodModel {
        MethodModel {
            access: if is_static { access::STATIC } else { access::PUBLIC },
            name: "get".into(),
            descriptor: descriptor.into(),
            annotations: vec![],
            code: Some(Code::new(instructions)),
        }
    }

    fn hierarchy() -> TypeHierarchy {
        let mut h = TypeHierarchy::new();
        h.register("app/Store", Some(OBJECT.into()), vec![], false);
        h.register("app/Cache", Some("app/Store".into()), vec![], false);
        h.register("app/Disk", Some("app/Store".into()), vec![], false);
        h
    }

    #[test]
    fn test_singleton_chain_frames() {
        let slot = MemberRef::new("app/Store", "knit$singleton$init$app_1Store", "Lapp/Store;");
        let insns = vec![
            Instruction::Aload(0),
            Instruction::Pop,
            Instruction::GetStatic(slot.clone()),
            Instruction::Dup,
            Instruction::IfNonNull(Label(0)),
            Instruction::Pop,
            Instruction::New("app/Store".into()),
            Instruction::Dup,
            Instruction::Invoke {
                kind: InvokeKind::Special,
                target: MemberRef::new("app/Store", "<init>", "()V"),
            },
            Instruction::Dup,
            Instruction::PutStatic(slot),
            Instruction::Label(Label(0)),
            Instruction::Areturn,
        ];
        let class = ClassModel::new("app/Main", Some(OBJECT.into()));
        let m = method("()Lapp/Store;", false, insns.clone());
        let computed = compute(&class, &m, &insns, &hierarchy()).unwrap();

        assert_eq!(computed.max_stack, 2);
        assert_eq!(computed.max_locals, 1);
        assert_eq!(
            computed.frames,
            vec![Frame {
                label: Label(0),
                locals: vec![VerificationType::Object("app/Main".into())],
                stack: vec![VerificationType::Object("app/Store".into())],
            }]
        );
    }

    #[test]
    fn test_join_merges_to_common_ancestor() {
        let insns = vec![
            Instruction::Iload(0),
            Instruction::IfEq(Label(1)),
            Instruction::New("app/Cache".into()),
            Instruction::Dup,
            Instruction::Invoke {
                kind: InvokeKind::Special,
                target: MemberRef::new("app/Cache", "<init>", "()V"),
            },
            Instruction::Goto(Label(2)),
            Instruction::Label(Label(1)),
            Instruction::New("app/Disk".into()),
            Instruction::Dup,
            Instruction::Invoke {
                kind: InvokeKind::Special,
                target: MemberRef::new("app/Disk", "<init>", "()V"),
            },
            Instruction::Label(Label(2)),
            Instruction::Areturn,
        ];
        let class = ClassModel::new("app/Factory", Some(OBJECT.into()));
        let m = method("(Z)Lapp/Store;", true, insns.clone());
        let computed = compute(&class, &m, &insns, &hierarchy()).unwrap();

        let join = computed.frames.iter().find(|f| f.label == Label(2)).unwrap();
        assert_eq!(join.stack, vec![VerificationType::Object("app/Store".into())]);
        assert_eq!(computed.frames.len(), 2);
    }

    #[test]
    fn test_constructor_initializes_this() {
        let insns = vec![
            Instruction::Aload(0),
            Instruction::Invoke {
                kind: InvokeKind::Special,
                target: MemberRef::new(OBJECT, "<init>", "()V"),
            },
            Instruction::Return,
        ];
        let class = ClassModel::new("app/Store", Some(OBJECT.into()));
        let mut m = method("()V", false, insns.clone());
        m.name = "<init>".into();
        let computed = compute(&class, &m, &insns, &hierarchy()).unwrap();
        assert_eq!(computed.max_stack, 1);
        assert!(computed.frames.is_empty());
    }

    #[test]
    fn test_underflow_is_an_encode_error() {
        let insns = vec![Instruction::Pop, Instruction::Return];
        let class = ClassModel::new("app/Broken", Some(OBJECT.into()));
        let m = method("()V", true, insns.clone());
        let err = compute(&class, &m, &insns, &hierarchy()).unwrap_err();
        assert!(err.to_string().contains("underflow"));
    }
}

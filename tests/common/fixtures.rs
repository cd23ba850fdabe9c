//! Class-model builders for weaving scenarios.

use knit_weaver::adapters::jvm::JvmCodec;
use knit_weaver::domain::class_model::{
    Annotation, AnnotationValue, ClassModel, Code, FieldModel, INIT, Instruction, InvokeKind,
    MemberRef, MethodModel, OBJECT, access,
};
use knit_weaver::domain::descriptor::{MethodDescriptor, reference_descriptor};
use knit_weaver::domain::hierarchy::TypeHierarchy;
use knit_weaver::domain::loader::{ClassEntry, ClassPool};
use knit_weaver::domain::ports::ClassCodec;

pub const PROVIDES: &str = "knit/Provides";
pub const SINGLETON: &str = "knit/Singleton";
pub const INJECT: &str = "knit/DI";

/// Native owner the interpreter intercepts; `hit(String)` records a constructor run.
pub const MARKER: &str = "test/Marker";

pub fn provides() -> Annotation {
    Annotation::new(PROVIDES)
}

pub fn provides_as(types: &[&str]) -> Annotation {
    Annotation::new(PROVIDES).with(
        "value",
        AnnotationValue::Array(
            types
                .iter()
                .map(|t| AnnotationValue::Class((*t).to_string()))
                .collect(),
        ),
    )
}

pub fn singleton() -> Annotation {
    Annotation::new(SINGLETON)
}

pub fn marker_hit(tag: &str) -> [Instruction; 2] {
    [
        Instruction::Ldc(tag.to_string()),
        Instruction::Invoke {
            kind: InvokeKind::Static,
            target: MemberRef::new(MARKER, "hit", "(Ljava/lang/String;)V"),
        },
    ]
}

pub fn getter_name(field: &str) -> String {
    format!("get_{field}")
}

pub struct ClassBuilder {
    model: ClassModel,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            model: ClassModel::new(name, Some(OBJECT.to_string())),
        }
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.model.super_name = Some(super_name.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.model.interfaces.push(interface.to_string());
        self
    }

    pub fn interface(mut self) -> Self {
        self.model.access |= access::INTERFACE | access::ABSTRACT;
        self
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.model.annotations.push(annotation);
        self
    }

    /// Constructor taking `params`, storing each into `dep<i>` and hitting the marker.
    pub fn constructor(self, params: &[&str]) -> Self {
        self.constructor_with(params, Vec::new())
    }

    pub fn constructor_with(mut self, params: &[&str], annotations: Vec<Annotation>) -> Self {
        let owner = self.model.name.clone();
        let super_name = self
            .model
            .super_name
            .clone()
            .unwrap_or_else(|| OBJECT.to_string());
        let descriptor = method_descriptor(params, None);

        let mut body = vec![
            Instruction::Aload(0),
            Instruction::Invoke {
                kind: InvokeKind::Special,
                target: MemberRef::new(super_name, INIT, "()V"),
            },
        ];
        for (i, param) in params.iter().enumerate() {
            let field = format!("dep{i}");
            let field_descriptor = reference_descriptor(param);
            self.model.fields.push(FieldModel {
                access: access::PRIVATE,
                name: field.clone(),
                descriptor: field_descriptor.clone(),
                annotations: Vec::new(),
            });
            body.push(Instruction::Aload(0));
            body.push(Instruction::Aload(i as u16 + 1));
            body.push(Instruction::PutField(MemberRef::new(
                owner.clone(),
                field,
                field_descriptor,
            )));
        }
        body.extend(marker_hit(&owner));
        body.push(Instruction::Return);

        self.model.methods.push(MethodModel {
            access: access::PUBLIC,
            name: INIT.to_string(),
            descriptor,
            annotations,
            code: Some(Code::new(body)),
        });
        self
    }

    /// `@DI` field of `ty` plus a getter that reads it.
    pub fn inject(mut self, field: &str, ty: &str) -> Self {
        let descriptor = reference_descriptor(ty);
        self.model.fields.push(FieldModel {
            access: access::PRIVATE,
            name: field.to_string(),
            descriptor: descriptor.clone(),
            annotations: vec![Annotation::new(INJECT)],
        });
        self.model.methods.push(MethodModel {
            access: access::PUBLIC,
            name: getter_name(field),
            descriptor: format!("(){descriptor}"),
            annotations: Vec::new(),
            code: Some(Code::new(vec![
                Instruction::Aload(0),
                Instruction::GetField(MemberRef::new(
                    self.model.name.clone(),
                    field,
                    descriptor,
                )),
                Instruction::Areturn,
            ])),
        });
        self
    }

    /// Method `peek_<field>` reading a field declared by a superclass through
    /// this class's own owner reference.
    pub fn reads_inherited(mut self, field: &str, ty: &str) -> Self {
        let descriptor = reference_descriptor(ty);
        self.model.methods.push(MethodModel {
            access: access::PUBLIC,
            name: format!("peek_{field}"),
            descriptor: format!("(){descriptor}"),
            annotations: Vec::new(),
            code: Some(Code::new(vec![
                Instruction::Aload(0),
                Instruction::GetField(MemberRef::new(
                    self.model.name.clone(),
                    field,
                    descriptor,
                )),
                Instruction::Areturn,
            ])),
        });
        self
    }

    /// Static `@Provides` method constructing `returns` through its no-arg constructor.
    pub fn static_provider(mut self, name: &str, returns: &str, annotations: Vec<Annotation>) -> Self {
        let mut annotations = annotations;
        if !annotations.iter().any(|a| a.type_name == PROVIDES) {
            annotations.push(provides());
        }
        self.model.methods.push(MethodModel {
            access: access::PUBLIC | access::STATIC,
            name: name.to_string(),
            descriptor: method_descriptor(&[], Some(returns)),
            annotations,
            code: Some(Code::new(vec![
                Instruction::New(returns.to_string()),
                Instruction::Dup,
                Instruction::Invoke {
                    kind: InvokeKind::Special,
                    target: MemberRef::new(returns, INIT, "()V"),
                },
                Instruction::Areturn,
            ])),
        });
        self
    }

    /// Plain method that does nothing; keeps a class non-trivial without markers.
    pub fn noop_method(mut self, name: &str) -> Self {
        self.model.methods.push(MethodModel {
            access: access::PUBLIC,
            name: name.to_string(),
            descriptor: "()V".to_string(),
            annotations: Vec::new(),
            code: Some(Code::new(vec![Instruction::Nop, Instruction::Return])),
        });
        self
    }

    pub fn build(self) -> ClassModel {
        self.model
    }
}

pub fn method_descriptor(params: &[&str], ret: Option<&str>) -> String {
    let mut out = String::from("(");
    for param in params {
        out.push_str(&reference_descriptor(param));
    }
    out.push(')');
    match ret {
        Some(ret) => out.push_str(&reference_descriptor(ret)),
        None => out.push('V'),
    }
    debug_assert!(MethodDescriptor::parse(&out).is_some());
    out
}

pub fn entry_name(class: &str) -> String {
    format!("{class}.class")
}

/// Codec the scenarios run through unless a test picks another.
pub fn codec() -> JvmCodec {
    JvmCodec::new()
}

pub fn encode(model: &ClassModel) -> Vec<u8> {
    encode_with(&codec(), model)
}

pub fn encode_with(codec: &dyn ClassCodec, model: &ClassModel) -> Vec<u8> {
    codec
        .encode(model, &TypeHierarchy::new())
        .expect("encode fixture")
}

pub fn pool(program: &[ClassModel]) -> ClassPool {
    pool_with_libraries(program, &[])
}

pub fn pool_with_libraries(program: &[ClassModel], libraries: &[ClassModel]) -> ClassPool {
    let mut pool = ClassPool::new();
    for class in program {
        pool.push(ClassEntry::from_vec(entry_name(&class.name), encode(class), false));
    }
    for class in libraries {
        pool.push(ClassEntry::from_vec(entry_name(&class.name), encode(class), true));
    }
    pool
}

/// Store provider, consumer injecting it, and an unrelated class.
pub fn store_and_consumer(store_annotations: &[Annotation]) -> Vec<ClassModel> {
    let mut store = ClassBuilder::new("app/Store").annotated(provides());
    for annotation in store_annotations {
        store = store.annotated(annotation.clone());
    }
    vec![
        store.constructor(&[]).build(),
        ClassBuilder::new("app/Consumer")
            .constructor(&[])
            .inject("store", "app/Store")
            .build(),
        ClassBuilder::new("app/Plain").constructor(&[]).noop_method("run").build(),
    ]
}

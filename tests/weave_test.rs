//! End-to-end weaving tests: encoded classes in, woven classes executed.

mod common;

use std::sync::Arc;

use common::fixtures::{
    ClassBuilder, codec, entry_name, getter_name, pool, pool_with_libraries, provides,
    provides_as, singleton, store_and_consumer,
};
use common::interp::{Value, Vm};
use knit_weaver::app::engine::{WeaveEngine, Woven};
use knit_weaver::domain::class_model::{ClassModel, Instruction, access};
use knit_weaver::domain::error::{BindingError, Warning, WeaveError};
use knit_weaver::domain::loader::{ClassEntry, ClassPool};
use knit_weaver::domain::ports::{ClassCodec, EntrySink};
use knit_weaver::domain::transform::CACHE_SLOT_PREFIX;

fn engine() -> WeaveEngine {
    WeaveEngine::new(Arc::new(codec()))
}

/// Collects written entries in memory.
#[derive(Default)]
struct MemorySink {
    entries: Vec<(String, Vec<u8>)>,
}

impl EntrySink for MemorySink {
    fn put_entry(&mut self, name: &str, bytes: &[u8]) -> anyhow::Result<()> {
        self.entries.push((name.to_string(), bytes.to_vec()));
        Ok(())
    }
}

fn weave_to_memory(classes: &mut ClassPool) -> (Woven, MemorySink) {
    let engine = engine();
    let woven = engine.weave(classes).expect("weave");
    let mut sink = MemorySink::default();
    engine.write(&woven, classes, &mut sink).expect("write");
    (woven, sink)
}

fn vm_of(sink: &MemorySink) -> Vm {
    Vm::from_entries(
        sink.entries
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice())),
    )
    .expect("decode woven output")
}

fn decoded(sink: &MemorySink, class: &str) -> ClassModel {
    let (name, bytes) = sink
        .entries
        .iter()
        .find(|(name, _)| *name == entry_name(class))
        .unwrap_or_else(|| panic!("{class} not written"));
    codec().decode(name, bytes).unwrap()
}

fn get(vm: &mut Vm, consumer: &Value, class: &str, field: &str, ty: &str) -> Value {
    vm.call(
        class,
        &getter_name(field),
        &format!("()L{ty};"),
        vec![consumer.clone()],
    )
    .unwrap()
}

#[test]
fn test_field_read_becomes_constructor_call() {
    let mut classes = pool(&store_and_consumer(&[]));
    let (woven, sink) = weave_to_memory(&mut classes);

    assert_eq!(woven.report.classes, 3);
    assert_eq!(woven.report.transformed, 1);
    assert_eq!(woven.report.sites_rewritten, 1);
    assert_eq!(woven.report.bindings, 1);

    let consumer = decoded(&sink, "app/Consumer");
    let getter = consumer.method("get_store", "()Lapp/Store;").unwrap();
    let instructions = &getter.code.as_ref().unwrap().instructions;
    assert!(instructions.contains(&Instruction::New("app/Store".into())));
    assert!(
        !instructions
            .iter()
            .any(|i| matches!(i, Instruction::GetField(m) if m.name == "store"))
    );

    let mut vm = vm_of(&sink);
    let consumer = vm.instantiate("app/Consumer").unwrap();
    let store = get(&mut vm, &consumer, "app/Consumer", "store", "app/Store");
    assert_eq!(vm.class_of(&store), Some("app/Store"));
    assert_eq!(vm.hits("app/Store"), 1);
}

#[test]
fn test_factory_scope_constructs_per_access() {
    let mut classes = pool(&store_and_consumer(&[]));
    let (_, sink) = weave_to_memory(&mut classes);

    let mut vm = vm_of(&sink);
    let consumer = vm.instantiate("app/Consumer").unwrap();
    let first = get(&mut vm, &consumer, "app/Consumer", "store", "app/Store");
    let second = get(&mut vm, &consumer, "app/Consumer", "store", "app/Store");
    assert_ne!(first, second);
    assert_eq!(vm.hits("app/Store"), 2);
}

#[test]
fn test_singleton_constructed_once_across_consumers() {
    let mut classes = pool(&store_and_consumer(&[singleton()]));
    let (woven, sink) = weave_to_memory(&mut classes);
    assert_eq!(woven.report.cache_slots, 1);

    let store = decoded(&sink, "app/Store");
    let slot = store
        .fields
        .iter()
        .find(|f| f.name.starts_with(CACHE_SLOT_PREFIX))
        .expect("cache slot");
    assert_eq!(slot.descriptor, "Lapp/Store;");
    assert_ne!(slot.access & access::STATIC, 0);

    let mut vm = vm_of(&sink);
    let a = vm.instantiate("app/Consumer").unwrap();
    let b = vm.instantiate("app/Consumer").unwrap();
    let first = get(&mut vm, &a, "app/Consumer", "store", "app/Store");
    let second = get(&mut vm, &b, "app/Consumer", "store", "app/Store");
    let third = get(&mut vm, &a, "app/Consumer", "store", "app/Store");

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(vm.hits("app/Store"), 1);
}

#[test]
fn test_singleton_shared_between_consumer_classes() {
    let mut models = store_and_consumer(&[singleton()]);
    models.push(
        ClassBuilder::new("app/Reporter")
            .constructor(&[])
            .inject("sink", "app/Store")
            .build(),
    );
    let mut classes = pool(&models);
    let (woven, sink) = weave_to_memory(&mut classes);
    assert_eq!(woven.report.sites_rewritten, 2);
    assert_eq!(woven.report.cache_slots, 1);

    let mut vm = vm_of(&sink);
    let consumer = vm.instantiate("app/Consumer").unwrap();
    let reporter = vm.instantiate("app/Reporter").unwrap();
    let from_reporter = get(&mut vm, &reporter, "app/Reporter", "sink", "app/Store");
    let from_consumer = get(&mut vm, &consumer, "app/Consumer", "store", "app/Store");

    assert_eq!(from_reporter, from_consumer);
    assert_eq!(vm.hits("app/Store"), 1);
}

#[test]
fn test_overloaded_singleton_providers_get_separate_slots() {
    let models = vec![
        ClassBuilder::new("a/Store").constructor(&[]).build(),
        ClassBuilder::new("b/Store").constructor(&[]).build(),
        ClassBuilder::new("app/Module")
            .static_provider("create", "a/Store", vec![singleton()])
            .static_provider("create", "b/Store", vec![singleton()])
            .build(),
        ClassBuilder::new("app/Consumer")
            .constructor(&[])
            .inject("first", "a/Store")
            .inject("second", "b/Store")
            .build(),
    ];
    let mut classes = pool(&models);
    let (woven, sink) = weave_to_memory(&mut classes);
    assert_eq!(woven.report.cache_slots, 2);

    let module = decoded(&sink, "app/Module");
    let mut slots: Vec<(&str, &str)> = module
        .fields
        .iter()
        .filter(|f| f.name.starts_with(CACHE_SLOT_PREFIX))
        .map(|f| (f.name.as_str(), f.descriptor.as_str()))
        .collect();
    slots.sort_by_key(|&(_, descriptor)| descriptor);
    assert_eq!(slots.len(), 2);
    assert_ne!(slots[0].0, slots[1].0);
    assert_eq!(slots[0].1, "La/Store;");
    assert_eq!(slots[1].1, "Lb/Store;");

    let mut vm = vm_of(&sink);
    let consumer = vm.instantiate("app/Consumer").unwrap();
    let first = get(&mut vm, &consumer, "app/Consumer", "first", "a/Store");
    let second = get(&mut vm, &consumer, "app/Consumer", "second", "b/Store");
    assert_eq!(vm.class_of(&first), Some("a/Store"));
    assert_eq!(vm.class_of(&second), Some("b/Store"));
    assert_eq!(get(&mut vm, &consumer, "app/Consumer", "first", "a/Store"), first);
    assert_eq!(get(&mut vm, &consumer, "app/Consumer", "second", "b/Store"), second);
    assert_eq!(vm.hits("a/Store"), 1);
    assert_eq!(vm.hits("b/Store"), 1);
}

#[test]
fn test_inherited_field_read_through_subclass_is_rewritten() {
    let mut models = store_and_consumer(&[]);
    models.push(
        ClassBuilder::new("app/SubConsumer")
            .extends("app/Consumer")
            .constructor(&[])
            .reads_inherited("store", "app/Store")
            .build(),
    );
    let mut classes = pool(&models);
    let (woven, sink) = weave_to_memory(&mut classes);
    assert_eq!(woven.report.sites_rewritten, 2);

    let sub = decoded(&sink, "app/SubConsumer");
    let peek = sub.method("peek_store", "()Lapp/Store;").unwrap();
    assert!(
        !peek
            .code
            .as_ref()
            .unwrap()
            .instructions
            .iter()
            .any(|i| matches!(i, Instruction::GetField(m) if m.name == "store"))
    );

    let mut vm = vm_of(&sink);
    let instance = vm.instantiate("app/SubConsumer").unwrap();
    let store = vm
        .call("app/SubConsumer", "peek_store", "()Lapp/Store;", vec![instance])
        .unwrap();
    assert_eq!(vm.class_of(&store), Some("app/Store"));
    assert_eq!(vm.hits("app/Store"), 1);
}

#[test]
fn test_untouched_classes_are_byte_identical() {
    let models = store_and_consumer(&[]);
    let mut classes = pool(&models);
    let original: Vec<(String, Vec<u8>)> = classes
        .entries()
        .iter()
        .map(|e| (e.name.clone(), e.bytes().to_vec()))
        .collect();
    let (_, sink) = weave_to_memory(&mut classes);

    let plain = entry_name("app/Plain");
    let before = original.iter().find(|(n, _)| *n == plain).unwrap();
    let after = sink.entries.iter().find(|(n, _)| *n == plain).unwrap();
    assert_eq!(before.1, after.1);

    // Provider without singleton scope gains no slot and stays as it was.
    let store = entry_name("app/Store");
    let before = original.iter().find(|(n, _)| *n == store).unwrap();
    let after = sink.entries.iter().find(|(n, _)| *n == store).unwrap();
    assert_eq!(before.1, after.1);
}

#[test]
fn test_output_preserves_input_order() {
    let mut classes = pool(&store_and_consumer(&[]));
    let (_, sink) = weave_to_memory(&mut classes);
    let names: Vec<&str> = sink.entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec!["app/Store.class", "app/Consumer.class", "app/Plain.class"]
    );
}

#[test]
fn test_weave_is_deterministic() {
    let models = store_and_consumer(&[singleton()]);
    let (_, first) = weave_to_memory(&mut pool(&models));
    let (_, second) = weave_to_memory(&mut pool(&models));
    assert_eq!(first.entries, second.entries);

    let threaded = engine().with_threads(2).unwrap();
    let mut classes = pool(&models);
    let woven = threaded.weave(&mut classes).unwrap();
    let mut sink = MemorySink::default();
    threaded.write(&woven, &classes, &mut sink).unwrap();
    assert_eq!(first.entries, sink.entries);
}

#[test]
fn test_constructor_dependencies_are_chained() {
    let models = vec![
        ClassBuilder::new("app/Store")
            .annotated(provides())
            .annotated(singleton())
            .constructor(&[])
            .build(),
        ClassBuilder::new("app/Service")
            .annotated(provides())
            .constructor(&["app/Store"])
            .build(),
        ClassBuilder::new("app/Consumer")
            .constructor(&[])
            .inject("service", "app/Service")
            .build(),
    ];
    let mut classes = pool(&models);
    let (woven, sink) = weave_to_memory(&mut classes);
    assert_eq!(woven.report.bindings, 2);

    let mut vm = vm_of(&sink);
    let consumer = vm.instantiate("app/Consumer").unwrap();
    let a = get(&mut vm, &consumer, "app/Consumer", "service", "app/Service");
    let b = get(&mut vm, &consumer, "app/Consumer", "service", "app/Service");

    assert_eq!(vm.class_of(&a), Some("app/Service"));
    assert_ne!(a, b);
    assert_eq!(vm.hits("app/Service"), 2);
    assert_eq!(vm.hits("app/Store"), 1);
    assert_eq!(vm.field(&a, "dep0"), vm.field(&b, "dep0"));
    assert_eq!(vm.class_of(&vm.field(&a, "dep0")), Some("app/Store"));
}

#[test]
fn test_static_method_provider_for_interface() {
    let models = vec![
        ClassBuilder::new("app/Repo").interface().build(),
        ClassBuilder::new("app/SqlRepo")
            .implements("app/Repo")
            .constructor(&[])
            .build(),
        ClassBuilder::new("app/Module")
            .static_provider("repo", "app/SqlRepo", vec![provides_as(&["app/Repo"])])
            .build(),
        ClassBuilder::new("app/Consumer")
            .constructor(&[])
            .inject("repo", "app/Repo")
            .build(),
    ];
    let mut classes = pool(&models);
    let (woven, sink) = weave_to_memory(&mut classes);
    assert_eq!(woven.report.provider_classes, 1);
    assert_eq!(woven.report.component_classes, 1);

    let mut vm = vm_of(&sink);
    let consumer = vm.instantiate("app/Consumer").unwrap();
    let repo = get(&mut vm, &consumer, "app/Consumer", "repo", "app/Repo");
    assert_eq!(vm.class_of(&repo), Some("app/SqlRepo"));
}

#[test]
fn test_library_classes_inform_hierarchy_but_are_not_emitted() {
    let library = vec![ClassBuilder::new("lib/Base").constructor(&[]).build()];
    let program = vec![
        ClassBuilder::new("app/Impl")
            .extends("lib/Base")
            .annotated(provides())
            .constructor(&[])
            .build(),
        ClassBuilder::new("app/Consumer")
            .constructor(&[])
            .inject("base", "lib/Base")
            .build(),
    ];
    let mut classes = pool_with_libraries(&program, &library);
    let (woven, sink) = weave_to_memory(&mut classes);

    assert_eq!(woven.report.libraries, 1);
    assert!(sink.entries.iter().all(|(n, _)| !n.starts_with("lib/")));

    let mut vm = Vm::from_entries(
        sink.entries
            .iter()
            .map(|(n, b)| (n.as_str(), b.as_slice()))
            .chain(classes.entries().iter().filter(|e| e.library).map(|e| (e.name.as_str(), e.bytes()))),
    )
    .unwrap();
    let consumer = vm.instantiate("app/Consumer").unwrap();
    let base = get(&mut vm, &consumer, "app/Consumer", "base", "lib/Base");
    assert_eq!(vm.class_of(&base), Some("app/Impl"));
    assert_eq!(vm.hits("lib/Base"), 1);
}

#[test]
fn test_duplicate_class_first_definition_wins() {
    let first = ClassBuilder::new("app/Store")
        .annotated(provides())
        .constructor(&[])
        .build();
    let second = ClassBuilder::new("app/Store").constructor(&[]).build();
    let consumer = ClassBuilder::new("app/Consumer")
        .constructor(&[])
        .inject("store", "app/Store")
        .build();

    let codec = codec();
    let judgement = knit_weaver::domain::hierarchy::TypeHierarchy::new();
    let mut classes = ClassPool::new();
    for (entry, model) in [
        ("a/app/Store.class", &first),
        ("b/app/Store.class", &second),
        ("app/Consumer.class", &consumer),
    ] {
        classes.push(ClassEntry::from_vec(
            entry,
            codec.encode(model, &judgement).unwrap(),
            false,
        ));
    }

    let (woven, sink) = weave_to_memory(&mut classes);
    assert!(woven.report.warnings.iter().any(|w| matches!(
        w,
        Warning::DuplicateClass { entry } if entry == "app/Store"
    )));
    let names: Vec<&str> = sink.entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a/app/Store.class", "app/Consumer.class"]);
}

#[test]
fn test_unresolved_binding_aborts_without_output() {
    let models = vec![
        ClassBuilder::new("app/Main")
            .constructor(&[])
            .inject("logger", "app/Logger")
            .build(),
    ];
    let mut classes = pool(&models);
    let err = engine().weave(&mut classes).unwrap_err();

    let errors = err.binding_errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        BindingError::Unresolved { site, requested, .. }
            if site == "app/Main.logger" && requested == "app/Logger"
    ));
}

#[test]
fn test_malformed_input_aborts() {
    let mut classes = pool(&store_and_consumer(&[]));
    classes.push(ClassEntry::from_vec("app/Broken.class", vec![0xCA, 0xFE], false));
    let err = engine().weave(&mut classes).unwrap_err();
    match err {
        WeaveError::Malformed(e) => assert_eq!(e.entry, "app/Broken.class"),
        other => panic!("expected malformed class, got {other}"),
    }
}

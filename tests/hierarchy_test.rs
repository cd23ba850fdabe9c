//! Algebraic properties of the inheritance judgement over a small classpath.

use knit_weaver::domain::class_model::OBJECT;
use knit_weaver::domain::dump::normalize_class_name;
use knit_weaver::domain::hierarchy::{InheritanceJudgement, Relation, TypeHierarchy};

fn classpath() -> TypeHierarchy {
    let mut h = TypeHierarchy::new();
    h.register("app/Store", Some(OBJECT.into()), vec![], false);
    h.register("app/Closeable", Some(OBJECT.into()), vec![], false);
    h.register(
        "app/DiskStore",
        Some("app/Store".into()),
        vec!["app/Closeable".into()],
        false,
    );
    h.register("app/CachedDiskStore", Some("app/DiskStore".into()), vec![], false);
    h.register("app/MemoryStore", Some("app/Store".into()), vec![], false);
    h.register("app/Clock", Some(OBJECT.into()), vec![], false);
    h.register("app/Plugin", Some("ext/Missing".into()), vec![], false);
    h
}

const TYPES: &[&str] = &[
    OBJECT,
    "app/Store",
    "app/Closeable",
    "app/DiskStore",
    "app/CachedDiskStore",
    "app/MemoryStore",
    "app/Clock",
    "app/Plugin",
    "ext/Missing",
    "[Lapp/Store;",
    "[Lapp/DiskStore;",
    "[I",
];

#[test]
fn test_inherits_is_antisymmetric() {
    let h = classpath();
    for a in TYPES {
        for b in TYPES {
            if h.inherits(a, b) && h.inherits(b, a) {
                assert_eq!(a, b, "mutual inheritance between distinct types");
            }
        }
    }
}

#[test]
fn test_common_ancestor_is_symmetric_and_total() {
    let h = classpath();
    for a in TYPES {
        for b in TYPES {
            let ab = h.common_ancestor(a, b);
            assert_eq!(ab, h.common_ancestor(b, a), "{a} / {b}");
            assert!(h.inherits(a, &ab) || ab == OBJECT);
        }
    }
}

#[test]
fn test_relate_is_consistent_with_inherits() {
    let h = classpath();
    for a in TYPES {
        for b in TYPES {
            match h.relate(a, b) {
                Relation::Same => assert_eq!(a, b),
                Relation::Subtype => assert!(h.inherits(a, b)),
                Relation::Supertype => assert!(h.inherits(b, a)),
                Relation::Unrelated | Relation::UnknownExternal => {
                    assert!(!h.inherits(a, b) && !h.inherits(b, a), "{a} / {b}");
                }
            }
        }
    }
}

#[test]
fn test_unloaded_parent_is_unknown_not_unrelated() {
    let h = classpath();
    assert_eq!(h.relate("app/Plugin", "app/Store"), Relation::UnknownExternal);
    assert_eq!(h.relate("app/Clock", "app/Store"), Relation::Unrelated);
    assert!(h.inherits("app/Plugin", OBJECT));
}

#[test]
fn test_distance_ranks_nearer_supertypes_first() {
    let h = classpath();
    assert_eq!(h.distance("app/DiskStore", "app/Store"), Some(1));
    assert_eq!(h.distance("app/CachedDiskStore", "app/Store"), Some(2));
    assert_eq!(h.distance("app/CachedDiskStore", "app/Closeable"), Some(2));
    assert_eq!(h.distance("app/Store", "app/DiskStore"), None);
}

#[test]
fn test_normalization_is_idempotent() {
    for name in TYPES.iter().copied().chain(["a.b/C", "", "plain"]) {
        let once = normalize_class_name(name);
        assert_eq!(normalize_class_name(&once), once);
        assert!(!once.contains('/'));
    }
}

mod common;

use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use common::runtime;
use garnet::{Arity, GlobalHooks, RegistryError, Value};

#[test]
fn bootstrap_types_are_wired_cyclically() {
    let rt = runtime();
    let registry = rt.registry();
    let core = rt.core();
    assert_eq!(registry.superclass(core.basic_object), None);
    assert_eq!(registry.superclass(core.object), Some(core.basic_object));
    assert_eq!(registry.superclass(core.module), Some(core.object));
    assert_eq!(registry.superclass(core.class), Some(core.module));
    for ty in [core.class, core.basic_object, core.object, core.module] {
        let value = registry.type_value(ty);
        assert_eq!(rt.logical_type(&value), core.class);
    }
    let class = registry.resolve_path("Class").unwrap();
    assert_eq!(class.as_type(), Some(core.class));
    registry.verify().unwrap();
}

#[test]
fn every_class_chain_ends_at_basic_object() {
    let rt = runtime();
    let registry = rt.registry();
    for ty in registry.types() {
        let ancestors = registry.ancestors(ty);
        assert_eq!(ancestors[0], ty);
        if registry.superclass(ty).is_some() {
            assert_eq!(ancestors.last(), Some(&rt.core().basic_object));
        }
    }
}

#[test]
fn include_is_idempotent_and_moves_to_front() {
    let rt = runtime();
    let registry = rt.registry();
    let a = registry.define_module("A").unwrap();
    let b = registry.define_module("B").unwrap();
    let c = registry.define_class(Some(rt.core().object), "C", None).unwrap();
    registry.include(c, a).unwrap();
    registry.include(c, b).unwrap();
    assert_eq!(registry.includes(c), vec![b, a]);
    registry.include(c, a).unwrap();
    assert_eq!(registry.includes(c), vec![a, b]);
    let ancestors = registry.ancestors(c);
    assert_eq!(&ancestors[..3], &[c, a, b]);

    assert!(matches!(
        registry.include(a, a),
        Err(RegistryError::CyclicInclude { .. })
    ));
    assert!(matches!(
        registry.include(c, rt.core().object),
        Err(RegistryError::IncludeNotModule { .. })
    ));
}

#[test]
fn include_invalidates_method_lookup() {
    let rt = runtime();
    let registry = rt.registry();
    let m = registry.define_module("Greeting").unwrap();
    let c = registry.define_class(Some(rt.core().object), "Greeter", None).unwrap();
    registry.define_method(m, "greet", Arity::Exact(0), Arc::new(|_, _, _| Ok(Value::Fixnum(1))));
    let object = rt.new_object(c);
    let site = garnet::DispatchSite::new(&rt.options().caches);
    assert!(site.call(&rt, &object, "greet", &[]).is_err());
    registry.include(c, m).unwrap();
    assert_eq!(site.call(&rt, &object, "greet", &[]).unwrap(), Value::Fixnum(1));
}

#[test]
fn singleton_splits_meta_type_from_logical_type() {
    let rt = runtime();
    let core = rt.core();
    let object = rt.new_object(core.object);
    assert_eq!(rt.meta_type(&object), rt.logical_type(&object));

    rt.define_singleton_method(&object, "answer", Arity::Exact(0), Arc::new(|_, _, _| Ok(Value::Fixnum(42))))
        .unwrap();
    let singleton = rt.meta_type(&object);
    assert_ne!(singleton, core.object);
    assert_eq!(rt.logical_type(&object), core.object);
    assert_eq!(rt.registry().superclass(singleton), Some(core.object));
    assert!(rt.registry().is_singleton(singleton));
    assert_eq!(rt.call(&object, "answer", &[]).unwrap(), Value::Fixnum(42));
    let class = rt.call(&object, "class", &[]).unwrap();
    assert_eq!(class.as_type(), Some(core.object));
}

#[test]
fn class_reopening_rules() {
    let rt = runtime();
    let registry = rt.registry();
    let core = rt.core();
    let first = registry.define_class(Some(core.standard_error), "MyError", None).unwrap();
    let again = registry.define_class(Some(core.standard_error), "MyError", None).unwrap();
    assert_eq!(first, again);
    let err = registry.define_class(Some(core.object), "MyError", None).unwrap_err();
    assert_eq!(err.to_string(), "superclass mismatch for class MyError");
    let raised = rt.exceptions().from_registry(&err);
    assert_eq!(raised.class(), core.type_error);

    let nested = registry.define_class_under(core.truffle, Some(core.object), "Thing", None).unwrap();
    assert_eq!(registry.display_name(nested), "Truffle::Thing");
}

#[test]
fn errno_aliases_share_a_class() {
    let rt = runtime();
    let eagain = rt.registry().resolve_path("Errno::EAGAIN").unwrap();
    let ewouldblock = rt.registry().resolve_path("Errno::EWOULDBLOCK").unwrap();
    assert!(eagain.identical(&ewouldblock));
    let class = eagain.as_type().unwrap();
    assert_eq!(rt.registry().display_name(class), "Errno::EAGAIN");
    assert!(rt.registry().is_ancestor(class, rt.core().system_call_error));
    assert_eq!(
        rt.registry().get_constant(class, "Errno"),
        Some(Value::Fixnum(11))
    );
    assert_eq!(rt.errno().name_of(11).as_deref(), Some("EAGAIN"));
}

#[test]
fn hooked_globals_and_aliases() {
    let rt = runtime();
    let globals = rt.globals();
    let backing = Arc::new(AtomicI64::new(5));
    let read = backing.clone();
    let write = backing.clone();
    globals.define_hooked(
        "$counter",
        GlobalHooks {
            getter: Arc::new(move || Ok(Value::Fixnum(read.load(Ordering::SeqCst)))),
            setter: Arc::new(move |value| {
                write.store(value.as_fixnum().unwrap_or_default(), Ordering::SeqCst);
                Ok(())
            }),
            defined: Arc::new(|| true),
        },
    );
    globals.alias("$count", "$counter");
    assert_eq!(globals.get("$count").unwrap(), Value::Fixnum(5));
    globals.set("$count", Value::Fixnum(8)).unwrap();
    assert_eq!(backing.load(Ordering::SeqCst), 8);
    assert!(globals.is_defined("$counter"));

    assert_eq!(globals.get("$never_set").unwrap(), Value::Nil);
    assert!(!globals.is_defined("$never_set"));
    assert_eq!(globals.get("$-v").unwrap(), Value::Bool(false));
}

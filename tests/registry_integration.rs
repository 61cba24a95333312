//! Integration tests for the runtime type registry

use mockall::{mock, predicate::eq};
use proptest::prelude::*;
use visflow::{
    config::EngineConfig,
    context::EngineContext,
    data::{DataObject, EmptyPayload, PropertyArray},
    registry::{
        InstanceContext, ModuleLoader, RegistryError, RuntimeObject, StaticModuleLoader,
        TypeRegistration, TypeRegistry,
    },
};

mock! {
    pub Loader {}

    impl ModuleLoader for Loader {
        fn load(&self, module: &str) -> Result<(), String>;
    }
}

fn new_data(ctx: &InstanceContext<'_>) -> Result<RuntimeObject, String> {
    Ok(RuntimeObject::Data(DataObject::new(ctx.class, EmptyPayload)))
}

#[test]
fn test_abstract_base_and_concrete_derived() {
    let mut registry = TypeRegistry::new();
    let base = registry
        .register_type(TypeRegistration::new("p", "Base").abstract_type())
        .unwrap();
    let derived = registry
        .register_type(TypeRegistration::new("p", "Derived").parent(base).factory(new_data))
        .unwrap();
    registry.mark_module_loaded("p");

    let obj = registry.create_instance(derived, None).unwrap().into_data().unwrap();
    assert_eq!(obj.class(), derived);

    match registry.create_instance(base, None) {
        Err(RegistryError::AbstractType(name)) => assert_eq!(name, "p::Base"),
        other => panic!("expected AbstractType, got {:?}", other),
    }

    assert_eq!(registry.encode_type(derived).unwrap(), "p::Derived");
    assert_eq!(registry.decode_type("p::Derived").unwrap(), derived);
}

#[test]
fn test_builtin_property_instance_is_usable() {
    let engine = EngineContext::new(EngineConfig::default()).unwrap();
    let classes = *engine.classes();

    let property = engine
        .registry()
        .create_instance(classes.property, Some(&engine))
        .unwrap()
        .into_data()
        .unwrap();
    let mut array = property.payload::<PropertyArray>().unwrap().clone();
    assert_eq!(array.len(), 0);
    assert_eq!(array.component_iter(0).count(), 0);
    array.retain_elements(&[]);
    assert!(array.is_empty());
}

#[test]
fn test_duplicate_and_lookup() {
    let mut registry = TypeRegistry::new();
    let a = registry.register_type(TypeRegistration::new("p", "A")).unwrap();
    assert_eq!(registry.lookup("p", "A"), Some(a));
    assert_eq!(registry.lookup("q", "A"), None);
    assert!(matches!(
        registry.register_type(TypeRegistration::new("p", "A")),
        Err(RegistryError::DuplicateType { .. })
    ));
    // Same name under another plugin is a different type
    assert!(registry.register_type(TypeRegistration::new("q", "A")).is_ok());
}

#[test]
fn test_decode_malformed() {
    let registry = TypeRegistry::new();
    for bad in ["NoSeparator", "::Name", "plugin::", "a::b::c"] {
        assert!(
            matches!(registry.decode_type(bad), Err(RegistryError::Decode(_))),
            "{} should not decode",
            bad
        );
    }
    assert!(matches!(
        registry.decode_type("p::Missing"),
        Err(RegistryError::UnknownType(_))
    ));
}

#[test]
fn test_list_subclasses_in_registration_order() {
    let mut registry = TypeRegistry::new();
    let base = registry
        .register_type(TypeRegistration::new("p", "Base").abstract_type())
        .unwrap();
    let b = registry.register_type(TypeRegistration::new("p", "B").parent(base)).unwrap();
    let mid = registry
        .register_type(TypeRegistration::new("p", "Mid").parent(base).abstract_type())
        .unwrap();
    let c = registry.register_type(TypeRegistration::new("p", "C").parent(mid)).unwrap();
    registry.register_type(TypeRegistration::new("p", "Other")).unwrap();

    assert_eq!(registry.list_subclasses(base, true), vec![b, c]);
    assert_eq!(registry.list_subclasses(base, false), vec![base, b, mid, c]);
}

#[test]
fn test_module_loaded_once() {
    let mut loader = MockLoader::new();
    loader.expect_load().with(eq("ext")).times(1).returning(|_| Ok(()));

    let mut registry = TypeRegistry::with_loader(Box::new(loader));
    let t = registry
        .register_type(TypeRegistration::new("ext", "Thing").factory(new_data))
        .unwrap();

    assert!(!registry.is_module_loaded("ext"));
    registry.create_instance(t, None).unwrap();
    registry.create_instance(t, None).unwrap();
    assert!(registry.is_module_loaded("ext"));
}

#[test]
fn test_module_load_failure_is_reported_and_remembered() {
    let mut loader = MockLoader::new();
    loader
        .expect_load()
        .times(1)
        .returning(|_| Err("library not found".to_string()));

    let mut registry = TypeRegistry::with_loader(Box::new(loader));
    let t = registry
        .register_type(TypeRegistration::new("ext", "Thing").factory(new_data))
        .unwrap();

    for _ in 0..2 {
        match registry.create_instance(t, None) {
            Err(RegistryError::ModuleLoad { module, reason }) => {
                assert_eq!(module, "ext");
                assert_eq!(reason, "library not found");
            }
            other => panic!("expected ModuleLoad, got {:?}", other),
        }
    }
}

#[test]
fn test_static_loader_runs_hook() {
    let loader = StaticModuleLoader::new().with_module("ext", || Ok(()));
    let mut registry = TypeRegistry::with_loader(Box::new(loader));
    let t = registry
        .register_type(TypeRegistration::new("ext", "Thing").factory(new_data))
        .unwrap();
    let other = registry
        .register_type(TypeRegistration::new("missing", "Thing").factory(new_data))
        .unwrap();

    assert!(registry.create_instance(t, None).is_ok());
    assert!(matches!(
        registry.create_instance(other, None),
        Err(RegistryError::ModuleLoad { .. })
    ));
}

#[test]
fn test_factory_failure_becomes_instantiation_error() {
    fn broken(_ctx: &InstanceContext<'_>) -> Result<RuntimeObject, String> {
        Err("out of widgets".to_string())
    }
    let mut registry = TypeRegistry::new();
    let t = registry
        .register_type(TypeRegistration::new("core", "Broken").factory(broken))
        .unwrap();
    match registry.create_instance(t, None) {
        Err(RegistryError::Instantiation { name, reason }) => {
            assert_eq!(name, "core::Broken");
            assert_eq!(reason, "out of widgets");
        }
        other => panic!("expected Instantiation, got {:?}", other),
    }
}

proptest! {
    /// Random single-inheritance forests: ancestry is exactly the parent chain.
    #[test]
    fn prop_ancestry_follows_parent_chain(parents in prop::collection::vec(any::<prop::sample::Index>(), 1..24)) {
        let mut registry = TypeRegistry::new();
        let mut ids = vec![registry.root()];
        let mut parent_of = vec![None];

        for (i, choice) in parents.iter().enumerate() {
            let parent = choice.index(ids.len());
            let id = registry
                .register_type(TypeRegistration::new("p", format!("T{}", i)).parent(ids[parent]))
                .unwrap();
            ids.push(id);
            parent_of.push(Some(parent));
        }

        let ancestors = |mut i: usize| {
            let mut chain = vec![i];
            while let Some(p) = parent_of[i] {
                chain.push(p);
                i = p;
            }
            chain
        };

        for b in 0..ids.len() {
            let chain = ancestors(b);
            for a in 0..ids.len() {
                let expected = chain.contains(&a);
                prop_assert_eq!(registry.is_derived_from(ids[b], ids[a]), expected);
                if expected && a != b {
                    prop_assert!(!registry.is_derived_from(ids[a], ids[b]));
                }
            }
        }
    }
}

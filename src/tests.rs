use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use once_cell::sync::OnceCell;
use proptest::prelude::*;

use super::*;

#[derive(Debug)]
struct Named(String);

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

/// Part without imports producing `Named(name)`
fn named_part(name: &str, export: ExportDeclaration) -> PartDescriptor {
    let label = name.to_string();
    PartDescriptor::new(name)
        .export_declaration(export)
        .constructor(ConstructorDescriptor::new(vec![], move || Named(label.clone())))
}

fn simple_part(name: &str) -> PartDescriptor {
    named_part(name, ExportDeclaration::new(Contract::named(name)))
}

fn counting_part(name: &str, created: &Arc<AtomicUsize>) -> PartDescriptor {
    let (label, created) = (name.to_string(), created.clone());
    PartDescriptor::new(name)
        .export(Contract::named(name))
        .constructor(ConstructorDescriptor::new(vec![], move || {
            created.fetch_add(1, Ordering::SeqCst);
            Named(label.clone())
        }))
}

fn labels(items: &[Instance]) -> Vec<String> {
    items
        .iter()
        .map(|i| i.downcast_ref::<Named>().map(|n| n.0.clone()).unwrap_or_default())
        .collect()
}

fn container(parts: Vec<PartDescriptor>) -> CompositionHost {
    ContainerConfiguration::new().with_parts(parts).create_container()
}

#[test]
fn single_export_is_returned() -> Result<()> {
    let host = container(vec![simple_part("Clock")]);
    let clock: Arc<Named> = host.get(&Contract::named("Clock"))?;
    assert_eq!(clock.0, "Clock");
    Ok(())
}

#[test]
fn missing_or_duplicate_exports_fail_cardinality() {
    let host = container(vec![
        named_part("First", ExportDeclaration::new(Contract::named("Logger"))),
        named_part("Second", ExportDeclaration::new(Contract::named("Logger"))),
    ]);

    let err = host.get_export(&Contract::named("Missing")).unwrap_err();
    assert!(matches!(err, CompositionError::CardinalityMismatch { found: 0, .. }));

    let err = host.get_export(&Contract::named("Logger")).unwrap_err();
    assert!(matches!(err, CompositionError::CardinalityMismatch { found: 2, .. }));

    assert!(host.try_get_export(&Contract::named("Missing")).unwrap().is_none());
}

#[test]
fn shared_and_non_shared_instances() -> Result<()> {
    let host = container(vec![simple_part("Transient"), simple_part("Singleton").shared()]);

    let s1: Arc<Named> = host.get(&Contract::named("Singleton"))?;
    let s2: Arc<Named> = host.get(&Contract::named("Singleton"))?;
    assert!(Arc::ptr_eq(&s1, &s2));

    let t1: Arc<Named> = host.get(&Contract::named("Transient"))?;
    let t2: Arc<Named> = host.get(&Contract::named("Transient"))?;
    assert!(!Arc::ptr_eq(&t1, &t2));
    Ok(())
}

#[test]
fn wrong_type_is_reported() {
    let host = container(vec![simple_part("Clock")]);
    let err = host.get::<String>(&Contract::named("Clock")).unwrap_err();
    assert!(matches!(err, CompositionError::TypeMismatch { .. }));
}

#[test]
fn constructor_imports_are_injected() -> Result<()> {
    struct Greeter {
        clock: Arc<Named>,
    }

    let host = container(vec![
        simple_part("Clock").shared(),
        export_part!(
            "Greeter" => [Contract::named("Greeter")],
            |clock: Arc<Named>| Greeter { clock },
            clock: Contract::named("Clock")
        ),
    ]);

    let g1: Arc<Greeter> = host.get(&Contract::named("Greeter"))?;
    let g2: Arc<Greeter> = host.get(&Contract::named("Greeter"))?;
    assert!(!Arc::ptr_eq(&g1, &g2));
    assert!(Arc::ptr_eq(&g1.clock, &g2.clock));
    assert_eq!(g1.clock.0, "Clock");
    Ok(())
}

#[test]
fn ordered_import_sorts_by_metadata() -> Result<()> {
    let plugin = || ExportDeclaration::new(Contract::named("Plugin"));
    let host = container(vec![
        named_part("three", plugin().with_metadata("Order", 3)),
        named_part("one", plugin().with_metadata("Order", 1)),
        named_part("two", plugin().with_metadata("Order", 2)),
    ]);

    let ordered: Arc<Vec<Instance>> = host.get(&Contract::named("Plugin").ordered_by("Order"))?;
    assert_eq!(labels(&ordered), ["one", "two", "three"]);

    let unordered = host.get_many(&Contract::named("Plugin"))?;
    assert_eq!(labels(&unordered), ["three", "one", "two"]);
    Ok(())
}

#[test]
fn ordered_import_requires_metadata_on_every_export() {
    let plugin = || ExportDeclaration::new(Contract::named("Plugin"));
    let host = container(vec![
        named_part("ranked", plugin().with_metadata("Order", 1)),
        named_part("Unranked", plugin()),
        named_part("Nulled", plugin().with_metadata("Order", MetadataValue::Null)),
    ]);

    let err = host
        .get_export(&Contract::named("Plugin").ordered_by("Order"))
        .unwrap_err();
    match err {
        CompositionError::MissingOrderingMetadata { key, origins } => {
            assert_eq!(key, "Order");
            assert_eq!(origins, "'Unranked' and 'Nulled'");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn many_valued_import_may_be_empty() -> Result<()> {
    let host = container(vec![simple_part("Clock")]);
    assert!(host.get_many(&Contract::named("Plugin"))?.is_empty());
    let ordered: Arc<Vec<Instance>> = host.get(&Contract::named("Plugin").ordered_by("Order"))?;
    assert!(ordered.is_empty());
    Ok(())
}

#[test]
fn keyed_import_maps_by_metadata() -> Result<()> {
    let handler = || ExportDeclaration::new(Contract::named("Handler"));
    let host = container(vec![
        named_part("OnState", handler().with_metadata("State", "on")),
        named_part("OffState", handler().with_metadata("State", "off")),
    ]);

    let handlers: Arc<KeyedExports> = host.get(&Contract::named("Handler").keyed_by("State"))?;
    assert_eq!(handlers.len(), 2);
    let on = handlers[&MetadataValue::from("on")].downcast_ref::<Named>().map(|n| n.0.as_str());
    assert_eq!(on, Some("OnState"));
    Ok(())
}

#[test]
fn keyed_import_rejects_duplicate_keys() {
    let handler = || ExportDeclaration::new(Contract::named("Handler"));
    let host = container(vec![
        named_part("First", handler().with_metadata("State", "on")),
        named_part("Second", handler().with_metadata("State", "on")),
    ]);

    let err = host
        .get_export(&Contract::named("Handler").keyed_by("State"))
        .unwrap_err();
    assert!(matches!(
        err,
        CompositionError::DuplicateKey { ref first, ref second, .. } if first == "First" && second == "Second"
    ));
}

#[test]
fn direct_cycle_is_reported() {
    struct A;
    struct B;
    let host = container(vec![
        export_part!("A" => [Contract::named("A")], |_b: Arc<B>| A, b: Contract::named("B")),
        export_part!("B" => [Contract::named("B")], |_a: Arc<A>| B, a: Contract::named("A")),
    ]);

    let err = host.get_export(&Contract::named("A")).unwrap_err();
    assert_eq!(
        err,
        CompositionError::CyclicDependency {
            chain: "A -> B -> A".to_string()
        }
    );
    // failures are not cached: the same error is reported again
    assert!(matches!(
        host.get_export(&Contract::named("B")),
        Err(CompositionError::CyclicDependency { .. })
    ));
}

#[test]
fn deferred_import_breaks_cycle_and_activates_once() -> Result<()> {
    struct A {
        b: Arc<Deferred>,
    }
    struct B {
        _a: Arc<A>,
    }

    let created = counter();
    let counted = created.clone();
    let host = container(vec![
        export_part!(
            "A" => [Contract::named("A")],
            |b: Arc<Deferred>| A { b },
            b: Contract::named("B").deferred()
        ),
        PartDescriptor::new("B")
            .export(Contract::named("B"))
            .constructor(ConstructorDescriptor::importing(
                vec![ParameterImport::required("a", Contract::named("A"))],
                move |a: Arc<A>| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    B { _a: a }
                },
            )),
    ]);

    let a: Arc<A> = host.get(&Contract::named("A"))?;
    assert_eq!(created.load(Ordering::SeqCst), 0);
    assert!(!a.b.is_forced());

    let b1: Arc<B> = a.b.get()?;
    let b2: Arc<B> = a.b.get()?;
    assert!(Arc::ptr_eq(&b1, &b2));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn deferred_exposes_metadata_without_activation() -> Result<()> {
    let created = counter();
    let host = container(vec![counting_part("Plugin", &created)
        .export_declaration(ExportDeclaration::new(Contract::named("Tagged")).with_metadata("Name", "tagged"))]);

    let deferred: Arc<Deferred> = host.get(&Contract::named("Tagged").deferred())?;
    assert_eq!(deferred.metadata()["Name"], MetadataValue::from("tagged"));
    assert_eq!(deferred.origin(), "Plugin");
    assert_eq!(created.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn required_deferred_of_missing_contract_fails_at_build() {
    let created = counter();
    let counted = created.clone();
    let host = container(vec![PartDescriptor::new("Consumer")
        .export(Contract::named("Consumer"))
        .constructor(ConstructorDescriptor::importing(
            vec![ParameterImport::required("plugin", Contract::named("Missing").deferred())],
            move |_plugin: Arc<Deferred>| {
                counted.fetch_add(1, Ordering::SeqCst);
            },
        ))]);

    let err = host.get_export(&Contract::named("Consumer")).unwrap_err();
    assert!(matches!(
        err,
        CompositionError::CardinalityMismatch { found: 0, site: Some(ref site), .. } if site == "plugin"
    ));
    assert_eq!(created.load(Ordering::SeqCst), 0);
    assert!(host.try_get_export(&Contract::named("Missing").deferred()).unwrap().is_none());
}

#[test]
fn optional_deferred_of_missing_contract_is_none() -> Result<()> {
    struct Consumer {
        plugin: Option<Arc<Deferred>>,
    }

    let host = container(vec![PartDescriptor::new("Consumer")
        .export(Contract::named("Consumer"))
        .constructor(ConstructorDescriptor::importing(
            vec![ParameterImport::optional("plugin", Contract::named("Missing").deferred())],
            |plugin: Option<Arc<Deferred>>| Consumer { plugin },
        ))]);

    let consumer: Arc<Consumer> = host.get(&Contract::named("Consumer"))?;
    assert!(consumer.plugin.is_none());
    Ok(())
}

/// Part exporting `Plugin` with `Order` and `Key` metadata, counting activations
fn counted_plugin(name: &str, order: i64, created: &Arc<AtomicUsize>) -> PartDescriptor {
    let (label, created) = (name.to_string(), created.clone());
    PartDescriptor::new(name)
        .export_declaration(
            ExportDeclaration::new(Contract::named("Plugin"))
                .with_metadata("Order", order)
                .with_metadata("Key", name),
        )
        .constructor(ConstructorDescriptor::new(vec![], move || {
            created.fetch_add(1, Ordering::SeqCst);
            Named(label.clone())
        }))
}

fn deferred_handles(items: &[Instance]) -> Vec<Arc<Deferred>> {
    items
        .iter()
        .filter_map(|item| item.clone().downcast::<Deferred>().ok())
        .collect()
}

#[test]
fn many_deferred_wraps_every_export() -> Result<()> {
    let created = counter();
    let host = container(vec![
        counted_plugin("second", 2, &created),
        counted_plugin("first", 1, &created),
    ]);

    let items: Arc<Vec<Instance>> = host.get(&Contract::named("Plugin").deferred().many())?;
    let handles = deferred_handles(&items);
    assert_eq!(handles.len(), 2);
    assert_eq!(created.load(Ordering::SeqCst), 0);

    let origins: Vec<&str> = handles.iter().map(|h| h.origin()).collect();
    assert_eq!(origins, ["second", "first"]);
    assert_eq!(handles[0].metadata()["Order"], MetadataValue::from(2));

    assert_eq!(handles[1].get::<Named>()?.0, "first");
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(!handles[0].is_forced());
    Ok(())
}

#[test]
fn ordered_deferred_sorts_by_target_metadata() -> Result<()> {
    let created = counter();
    let host = container(vec![
        counted_plugin("second", 2, &created),
        counted_plugin("first", 1, &created),
    ]);

    let items: Arc<Vec<Instance>> = host.get(&Contract::named("Plugin").deferred().ordered_by("Order"))?;
    let origins: Vec<String> = deferred_handles(&items).iter().map(|h| h.origin().to_string()).collect();
    assert_eq!(origins, ["first", "second"]);
    assert_eq!(created.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn keyed_deferred_maps_by_target_metadata() -> Result<()> {
    let created = counter();
    let host = container(vec![
        counted_plugin("a", 1, &created),
        counted_plugin("b", 2, &created),
    ]);

    let keyed: Arc<KeyedExports> = host.get(&Contract::named("Plugin").deferred().keyed_by("Key"))?;
    assert_eq!(keyed.len(), 2);
    assert_eq!(created.load(Ordering::SeqCst), 0);

    let b = keyed[&MetadataValue::from("b")].clone().downcast::<Deferred>().ok();
    let forced = b.map(|handle| handle.get::<Named>()).transpose()?;
    assert_eq!(forced.map(|n| n.0.clone()).as_deref(), Some("b"));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn ordered_deferred_reports_the_part_missing_metadata() {
    let host = container(vec![
        counted_plugin("ranked", 1, &counter()),
        named_part("Unranked", ExportDeclaration::new(Contract::named("Plugin"))),
    ]);

    let err = host
        .get_export(&Contract::named("Plugin").deferred().ordered_by("Order"))
        .unwrap_err();
    assert!(matches!(
        err,
        CompositionError::MissingOrderingMetadata { ref origins, .. } if origins == "'Unranked'"
    ));
}

#[test]
fn optional_parameter_receives_none() -> Result<()> {
    struct HasOptional {
        missing: Option<Arc<Named>>,
        supplied: Arc<Named>,
    }

    let host = container(vec![
        simple_part("Supplied"),
        PartDescriptor::new("HasOptional")
            .export(Contract::named("HasOptional"))
            .constructor(ConstructorDescriptor::importing(
                vec![
                    ParameterImport::optional("missing", Contract::named("Missing")),
                    ParameterImport::required("supplied", Contract::named("Supplied")),
                ],
                |missing: Option<Arc<Named>>, supplied: Arc<Named>| HasOptional { missing, supplied },
            )),
    ]);

    let part: Arc<HasOptional> = host.get(&Contract::named("HasOptional"))?;
    assert!(part.missing.is_none());
    assert_eq!(part.supplied.0, "Supplied");
    Ok(())
}

#[test]
fn optional_parameter_still_rejects_duplicates() {
    let host = container(vec![
        named_part("First", ExportDeclaration::new(Contract::named("Logger"))),
        named_part("Second", ExportDeclaration::new(Contract::named("Logger"))),
        PartDescriptor::new("Consumer")
            .export(Contract::named("Consumer"))
            .constructor(ConstructorDescriptor::importing(
                vec![ParameterImport::optional("logger", Contract::named("Logger"))],
                |_logger: Option<Arc<Named>>| (),
            )),
    ]);

    let err = host.get_export(&Contract::named("Consumer")).unwrap_err();
    assert!(matches!(
        err,
        CompositionError::CardinalityMismatch { found: 2, site: Some(ref site), .. } if site == "logger"
    ));
}

#[test]
fn constructor_selection() -> Result<()> {
    let no_constructor = PartDescriptor::new("Bare").export(Contract::named("Bare"));
    let two_importing = PartDescriptor::new("Twice")
        .export(Contract::named("Twice"))
        .constructor(ConstructorDescriptor::importing(vec![], || 1_u8))
        .constructor(ConstructorDescriptor::importing(vec![], || 2_u8));
    let fallback = PartDescriptor::new("Fallback")
        .export(Contract::named("Fallback"))
        .constructor(ConstructorDescriptor::new(
            vec![ParameterImport::required("x", Contract::named("Missing"))],
            |_x: Arc<Named>| 1_u8,
        ))
        .constructor(ConstructorDescriptor::default_of::<u8>());
    let private_only = PartDescriptor::new("Hidden")
        .export(Contract::named("Hidden"))
        .constructor(ConstructorDescriptor::default_of::<u8>().private());

    let host = container(vec![no_constructor, two_importing, fallback, private_only]);

    assert!(matches!(
        host.get_export(&Contract::named("Bare")),
        Err(CompositionError::NoImportingConstructor { .. })
    ));
    assert!(matches!(
        host.get_export(&Contract::named("Twice")),
        Err(CompositionError::AmbiguousConstructor { .. })
    ));
    assert!(matches!(
        host.get_export(&Contract::named("Hidden")),
        Err(CompositionError::NoImportingConstructor { .. })
    ));
    assert_eq!(*host.get::<u8>(&Contract::named("Fallback"))?, 0);
    Ok(())
}

#[test]
fn allow_default_import_requires_optional_argument() {
    let created = counter();
    let counted = created.clone();
    let host = container(vec![PartDescriptor::new("Strict")
        .export(Contract::named("Strict"))
        .constructor(ConstructorDescriptor::importing(
            vec![ParameterImport::optional("clock", Contract::named("Clock"))],
            move |_clock: Arc<Named>| {
                counted.fetch_add(1, Ordering::SeqCst);
            },
        ))]);

    assert!(matches!(
        host.get_export(&Contract::named("Strict")),
        Err(CompositionError::NonOptionalParameter { ref part, ref parameter }) if part == "Strict" && parameter == "clock"
    ));
    assert_eq!(created.load(Ordering::SeqCst), 0);
}

#[test]
fn constructor_arity_must_match_imports() {
    let part = PartDescriptor::new("Mismatch")
        .export(Contract::named("Mismatch"))
        .constructor(ConstructorDescriptor::importing(vec![], |_x: Arc<Named>| 1_u8));
    let host = container(vec![part]);
    assert!(matches!(
        host.get_export(&Contract::named("Mismatch")),
        Err(CompositionError::Activation(_))
    ));
}

#[derive(Default)]
struct TracksImportSatisfaction {
    imported: OnceCell<Arc<Named>>,
    set_on_imports_satisfied: OnceCell<Arc<Named>>,
    missing_setter_called: OnceCell<bool>,
}

#[test]
fn imports_satisfied_runs_after_property_injection() -> Result<()> {
    let notified = counter();
    let counted = notified.clone();
    let host = container(vec![
        simple_part("Imported"),
        PartDescriptor::new("TracksImportSatisfaction")
            .export(Contract::named("Tracks"))
            .constructor(ConstructorDescriptor::default_of::<TracksImportSatisfaction>())
            .property(
                "imported",
                Contract::named("Imported"),
                false,
                |part: &TracksImportSatisfaction, value: Arc<Named>| {
                    let _ = part.imported.set(value);
                },
            )
            .property(
                "missing",
                Contract::named("Missing"),
                true,
                |part: &TracksImportSatisfaction, _: Arc<Named>| {
                    let _ = part.missing_setter_called.set(true);
                },
            )
            .on_imports_satisfied(move |part: &TracksImportSatisfaction| {
                counted.fetch_add(1, Ordering::SeqCst);
                if let Some(imported) = part.imported.get() {
                    let _ = part.set_on_imports_satisfied.set(imported.clone());
                }
            }),
    ]);

    let tracks: Arc<TracksImportSatisfaction> = host.get(&Contract::named("Tracks"))?;
    assert!(tracks.set_on_imports_satisfied.get().is_some());
    assert!(tracks.missing_setter_called.get().is_none());
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn scoped_sharing_and_disposal() -> Result<()> {
    let released = counter();
    let root_released = counter();
    let (r1, r2) = (released.clone(), root_released.clone());
    let host = container(vec![
        simple_part("Request")
            .shared_within("Request")
            .on_release(move |_: &Named| {
                r1.fetch_add(1, Ordering::SeqCst);
            }),
        simple_part("Config").shared().on_release(move |_: &Named| {
            r2.fetch_add(1, Ordering::SeqCst);
        }),
    ]);

    let request = Contract::named("Request");
    let config = Contract::named("Config");
    let first = host.begin_scope(&["Request"]);
    let second = host.begin_scope(&["Request"]);

    let a1: Arc<Named> = first.get(&request)?;
    let a2: Arc<Named> = first.get(&request)?;
    let b: Arc<Named> = second.get(&request)?;
    assert!(Arc::ptr_eq(&a1, &a2));
    assert!(!Arc::ptr_eq(&a1, &b));

    // nested scopes without the boundary reuse the enclosing instance
    let nested = first.begin_scope::<&str>(&[]);
    assert!(Arc::ptr_eq(&a1, &nested.get::<Named>(&request)?));

    let root_config: Arc<Named> = host.get(&config)?;
    assert!(Arc::ptr_eq(&root_config, &first.get::<Named>(&config)?));

    first.dispose();
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(root_released.load(Ordering::SeqCst), 0);
    assert!(matches!(first.get_export(&request), Err(CompositionError::ContextDisposed)));

    assert!(Arc::ptr_eq(&b, &second.get::<Named>(&request)?));
    assert!(Arc::ptr_eq(&root_config, &second.get::<Named>(&config)?));

    assert!(matches!(
        host.get_export(&request),
        Err(CompositionError::SharingBoundaryNotFound(ref name)) if name == "Request"
    ));

    first.dispose();
    assert_eq!(released.load(Ordering::SeqCst), 1);
    host.dispose();
    assert_eq!(root_released.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn non_shared_instances_are_released_by_their_context() -> Result<()> {
    let released = counter();
    let counted = released.clone();
    let host = container(vec![simple_part("Connection").on_release(move |_: &Named| {
        counted.fetch_add(1, Ordering::SeqCst);
    })]);

    let scope = host.begin_scope::<&str>(&[]);
    scope.get_export(&Contract::named("Connection"))?;
    scope.get_export(&Contract::named("Connection"))?;
    host.get_export(&Contract::named("Connection"))?;

    scope.dispose();
    assert_eq!(released.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn export_factory_creates_fresh_instances() -> Result<()> {
    let released = counter();
    let counted = released.clone();
    let host = container(vec![simple_part("Session")
        .shared_within("Session")
        .on_release(move |_: &Named| {
            counted.fetch_add(1, Ordering::SeqCst);
        })]);

    let contract = Contract::named("Session")
        .factory()
        .with_constraint(SHARING_BOUNDARY_NAMES, vec!["Session"]);
    let factory: Arc<ExportFactory> = host.get(&contract)?;
    assert_eq!(factory.sharing_boundaries(), ["Session"]);

    let first = factory.create()?;
    let second = factory.create()?;
    let target = Contract::named("Session");
    assert!(!Arc::ptr_eq(&first.get::<Named>(&target)?, &second.get::<Named>(&target)?));

    first.dispose();
    assert_eq!(released.load(Ordering::SeqCst), 1);
    second.dispose();
    assert_eq!(released.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn export_factory_of_non_shared_part_creates_distinct_instances() -> Result<()> {
    let created = counter();
    let host = container(vec![counting_part("Widget", &created)]);

    let factory: Arc<ExportFactory> = host.get(&Contract::named("Widget").factory())?;
    assert_eq!(created.load(Ordering::SeqCst), 0);
    assert!(factory.sharing_boundaries().is_empty());

    let target = Contract::named("Widget");
    let first = factory.create()?;
    let second = factory.create()?;
    assert!(!Arc::ptr_eq(&first.get::<Named>(&target)?, &second.get::<Named>(&target)?));
    assert_eq!(created.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn many_factories_wrap_every_export() -> Result<()> {
    let created = counter();
    let host = container(vec![
        counted_plugin("second", 2, &created),
        counted_plugin("first", 1, &created),
    ]);

    let items: Arc<Vec<Instance>> = host.get(&Contract::named("Plugin").factory().ordered_by("Order"))?;
    let factories: Vec<Arc<ExportFactory>> = items
        .iter()
        .filter_map(|item| item.clone().downcast::<ExportFactory>().ok())
        .collect();
    assert_eq!(factories.len(), 2);
    assert_eq!(created.load(Ordering::SeqCst), 0);
    assert_eq!(factories[0].metadata()["Key"], MetadataValue::from("first"));

    let plugin = Contract::named("Plugin");
    let made = factories[1].create()?;
    assert_eq!(made.get::<Named>(&plugin)?.0, "second");
    assert_eq!(created.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn current_scope_is_injectable() -> Result<()> {
    struct Opener {
        scope: Arc<LifetimeContext>,
    }

    let host = container(vec![export_part!(
        "Opener" => [Contract::named("Opener")],
        |scope: Arc<LifetimeContext>| Opener { scope },
        scope: Contract::scope()
    )]);

    let from_root: Arc<Opener> = host.get(&Contract::named("Opener"))?;
    assert!(from_root.scope.ptr_eq(host.root()));

    let child = host.begin_scope(&["Unit"]);
    let from_child: Arc<Opener> = child.get(&Contract::named("Opener"))?;
    assert!(from_child.scope.ptr_eq(&child));

    let nested = from_child.scope.begin_scope(&["Nested"]);
    assert!(nested.parent().is_some_and(|p| p.ptr_eq(&child)));
    Ok(())
}

struct Repository {
    entity: String,
}

fn repository_part(closed: &Arc<AtomicUsize>) -> PartDescriptor {
    let closed = closed.clone();
    PartDescriptor::new("Repository")
        .export(Contract::named("Repository"))
        .open_generic(1, move |args: &[ContractType]| {
            closed.fetch_add(1, Ordering::SeqCst);
            let entity = args[0].to_string();
            Ok(PartDescriptor::new(&format!("Repository<{}>", entity))
                .export(Contract::generic("Repository", args.to_vec()))
                .constructor(ConstructorDescriptor::new(vec![], move || Repository {
                    entity: entity.clone(),
                })))
        })
}

#[test]
fn open_generic_parts_close_once_per_arguments() -> Result<()> {
    let closed = counter();
    let host = container(vec![repository_part(&closed)]);
    let user = Contract::generic("Repository", vec![ContractType::named("User")]);

    let repo: Arc<Repository> = host.get(&user)?;
    assert_eq!(repo.entity, "User");
    host.get_export(&user)?;
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    // same arguments under another constraint: no second closing
    let constrained = user.clone().with_constraint("Region", "eu");
    assert!(host.try_get_export(&constrained)?.is_none());
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    let order: Arc<Repository> = host.get(&Contract::generic("Repository", vec![ContractType::named("Order")]))?;
    assert_eq!(order.entity, "Order");
    assert_eq!(closed.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn open_generic_arity_is_checked() {
    let closed = counter();
    let host = container(vec![repository_part(&closed)]);
    let contract = Contract::generic(
        "Repository",
        vec![ContractType::named("User"), ContractType::named("Order")],
    );
    assert!(matches!(
        host.get_export(&contract),
        Err(CompositionError::GenericArityMismatch {
            expected: 1,
            supplied: 2,
            ..
        })
    ));
    assert_eq!(closed.load(Ordering::SeqCst), 0);
}

#[test]
fn failed_resolution_is_not_published() {
    let host = container(vec![export_part!(
        "Consumer" => [Contract::named("Consumer")],
        |_dep: Arc<Named>| (),
        dep: Contract::named("Missing")
    )]);

    assert!(host.get_export(&Contract::named("Consumer")).is_err());
    assert_eq!(host.root().registry().cached_contracts(), 0);
    assert!(host.get_export(&Contract::named("Consumer")).is_err());
}

#[test]
fn resolved_contracts_are_published_together() -> Result<()> {
    let host = container(vec![
        simple_part("Clock"),
        export_part!("Consumer" => [Contract::named("Consumer")], |_c: Arc<Named>| (), clock: Contract::named("Clock")),
    ]);
    host.get_export(&Contract::named("Consumer"))?;
    assert_eq!(host.root().registry().cached_contracts(), 2);
    Ok(())
}

#[test]
fn reentrant_shared_activation_fails() {
    let host = container(vec![PartDescriptor::new("Selfish")
        .export(Contract::named("Selfish"))
        .shared()
        .constructor(
            ConstructorDescriptor::from_instances(
                vec![ParameterImport::required("me", Contract::named("Selfish").deferred())],
                |args| {
                    let me = args.into_iter().flatten().next();
                    let deferred = me.and_then(|m| m.downcast::<Deferred>().ok());
                    match deferred {
                        Some(deferred) => deferred.force(),
                        None => Err(CompositionError::Activation("no handle".into())),
                    }
                },
            )
            .designated(),
        )]);

    assert!(matches!(
        host.get_export(&Contract::named("Selfish")),
        Err(CompositionError::ReentrantActivation { ref origin }) if origin == "Selfish"
    ));
}

#[test]
fn concurrent_first_access_activates_shared_part_once() {
    let created = counter();
    let counted = created.clone();
    let host = container(vec![PartDescriptor::new("Slow")
        .export(Contract::named("Slow"))
        .shared()
        .constructor(ConstructorDescriptor::new(vec![], move || {
            counted.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            Named("Slow".into())
        }))]);

    let threads = 8;
    let barrier = Barrier::new(threads);
    let instances: Vec<Arc<Named>> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    host.get::<Named>(&Contract::named("Slow"))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked").expect("resolution failed"))
            .collect()
    });

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

struct CustomProvider;

impl ExportDescriptorProvider for CustomProvider {
    fn get_export_descriptors(
        &self,
        contract: &Contract,
        _: &mut dyn DependencyAccessor,
    ) -> Result<Vec<ExportDescriptorPromise>> {
        if *contract != Contract::named("Answer") {
            return Ok(Vec::new());
        }
        Ok(vec![ExportDescriptorPromise::without_dependencies(
            contract.clone(),
            "CustomProvider",
            false,
            |_| {
                let activator: CompositeActivator =
                    Arc::new(|_: &LifetimeContext, _: &CompositionOperation| Ok(Arc::new(42_i64) as Instance));
                Ok(activator)
            },
        )])
    }
}

#[test]
fn custom_providers_join_the_pipeline() -> Result<()> {
    let host = ContainerConfiguration::new()
        .with_provider(CustomProvider)
        .with_part(named_part(
            "Part",
            ExportDeclaration::new(Contract::named("Answer")).with_metadata("Order", 1),
        ))
        .create_container();

    let answers = host.get_many(&Contract::named("Answer"))?;
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0].downcast_ref::<i64>(), Some(&42));

    let err = host.get_export(&Contract::named("Answer").ordered_by("Order")).unwrap_err();
    assert!(matches!(err, CompositionError::MissingOrderingMetadata { ref origins, .. } if origins == "'CustomProvider'"));
    Ok(())
}

struct Settings;

impl Part for Settings {
    fn descriptor() -> PartDescriptor {
        PartDescriptor::new("Settings")
            .export(Contract::named("Settings"))
            .shared()
            .constructor(ConstructorDescriptor::new(vec![], || Settings))
    }
}

#[test]
fn parts_can_describe_themselves() -> Result<()> {
    let host = ContainerConfiguration::new().with_part_type::<Settings>().create_container();
    let s1: Arc<Settings> = host.get(&Contract::named("Settings"))?;
    let s2: Arc<Settings> = host.get(&Contract::named("Settings"))?;
    assert!(Arc::ptr_eq(&s1, &s2));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn ordering_is_sorted_and_stable(keys in prop::collection::vec(0i64..4, 0..8)) {
        let parts = keys
            .iter()
            .enumerate()
            .map(|(i, key)| named_part(
                &i.to_string(),
                ExportDeclaration::new(Contract::named("Plugin")).with_metadata("Order", *key),
            ))
            .collect();
        let host = container(parts);

        let ordered: Arc<Vec<Instance>> = host.get(&Contract::named("Plugin").ordered_by("Order")).unwrap();
        let indices: Vec<usize> = labels(&ordered).iter().map(|l| l.parse().unwrap()).collect();

        let mut expected: Vec<usize> = (0..keys.len()).collect();
        expected.sort_by_key(|&i| keys[i]);
        prop_assert_eq!(indices, expected);
    }
}

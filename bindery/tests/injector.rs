use bindery::error::InjectorError;
use bindery::injector::{Factory, Injector};
use bindery::instance::{
    BindsTo, Inject, InstancePtr, InstanceResolver, TypedInstanceResolver,
};
use bindery::partial::create_component;
use bindery::signature::{Param, Signature, TypeKey};
use std::cell::RefCell;
use std::rc::Rc;

fn same_instance<A: ?Sized, B: ?Sized>(first: &Rc<A>, second: &Rc<B>) -> bool {
    Rc::as_ptr(first) as *const () == Rc::as_ptr(second) as *const ()
}

trait Writer {
    fn destination(&self) -> &'static str;
}

struct StdoutWriter;

impl Writer for StdoutWriter {
    fn destination(&self) -> &'static str {
        "stdout"
    }
}

impl BindsTo<dyn Writer> for StdoutWriter {
    fn into_base(this: InstancePtr<Self>) -> InstancePtr<dyn Writer> {
        this
    }
}

impl Inject for StdoutWriter {
    fn signature() -> Signature {
        Signature::nullary(TypeKey::of::<Self>())
    }

    fn construct(_resolver: &mut dyn InstanceResolver) -> Result<Self, InjectorError> {
        Ok(StdoutWriter)
    }
}

trait Greeter {
    fn writer(&self) -> InstancePtr<dyn Writer>;
}

struct HelloGreeter {
    writer: InstancePtr<dyn Writer>,
}

impl Greeter for HelloGreeter {
    fn writer(&self) -> InstancePtr<dyn Writer> {
        self.writer.clone()
    }
}

impl BindsTo<dyn Greeter> for HelloGreeter {
    fn into_base(this: InstancePtr<Self>) -> InstancePtr<dyn Greeter> {
        this
    }
}

impl Inject for HelloGreeter {
    fn signature() -> Signature {
        Signature::new(
            TypeKey::of::<Self>(),
            vec![Param::injected(TypeKey::of::<dyn Writer>())],
        )
    }

    fn construct(resolver: &mut dyn InstanceResolver) -> Result<Self, InjectorError> {
        Ok(Self {
            writer: resolver.resolve::<dyn Writer>()?,
        })
    }
}

fn greeter_component() -> bindery::component::Component {
    create_component()
        .register_constructor::<StdoutWriter>()
        .bind::<dyn Writer, StdoutWriter>()
        .register_constructor::<HelloGreeter>()
        .bind::<dyn Greeter, HelloGreeter>()
        .seal()
        .unwrap()
}

#[test]
fn should_resolve_a_chain_to_unique_instances() {
    let injector = Injector::new(&greeter_component()).unwrap();

    let first = injector.get::<dyn Greeter>().unwrap();
    let second = injector.get::<dyn Greeter>().unwrap();
    assert!(same_instance(&first, &second));

    // the greeter's writer is the same singleton a direct lookup yields
    let writer = injector.get::<dyn Writer>().unwrap();
    assert!(same_instance(&first.writer(), &writer));
    assert_eq!(writer.destination(), "stdout");
}

#[test]
fn should_share_one_instance_between_interface_and_implementation() {
    let injector = Injector::new(&greeter_component()).unwrap();

    let concrete = injector.get::<HelloGreeter>().unwrap();
    let interface = injector.get::<dyn Greeter>().unwrap();
    assert!(same_instance(&concrete, &interface));
}

#[test]
fn should_isolate_injectors_sharing_a_component() {
    let component = greeter_component();
    let first = Injector::new(&component).unwrap();
    let second = Injector::new(&component).unwrap();

    assert!(!same_instance(
        &first.get::<dyn Writer>().unwrap(),
        &second.get::<dyn Writer>().unwrap(),
    ));
}

struct Logger;

impl Inject for Logger {
    fn signature() -> Signature {
        Signature::nullary(TypeKey::of::<Self>())
    }

    fn construct(_resolver: &mut dyn InstanceResolver) -> Result<Self, InjectorError> {
        Ok(Logger)
    }
}

struct Request {
    id: u32,
    logger: InstancePtr<Logger>,
}

#[test]
fn should_build_fresh_values_through_assisted_factories() {
    let component = create_component()
        .register_constructor::<Logger>()
        .register_factory::<(u32,), _, _>(|id: u32, logger: InstancePtr<Logger>| Request {
            id,
            logger,
        })
        .seal()
        .unwrap();
    let injector = Injector::new(&component).unwrap();

    let factory = injector.factory::<(u32,), Request>().unwrap();
    let first = factory.create((42,)).unwrap();
    let second = factory.create((7,)).unwrap();

    assert_eq!(first.id, 42);
    assert_eq!(second.id, 7);
    // fresh requests, one shared logger singleton
    assert!(Rc::ptr_eq(&first.logger, &second.logger));
    assert!(same_instance(
        &first.logger,
        &injector.get::<Logger>().unwrap()
    ));

    // the handle itself is a memoized singleton
    let again = injector.get::<Factory<(u32,), Request>>().unwrap();
    assert!(Rc::ptr_eq(&factory, &again));
}

struct Dispatcher {
    requests: InstancePtr<Factory<(u32,), Request>>,
}

impl Inject for Dispatcher {
    fn signature() -> Signature {
        Signature::new(
            TypeKey::of::<Self>(),
            vec![Param::injected(TypeKey::of::<Factory<(u32,), Request>>())],
        )
    }

    fn construct(resolver: &mut dyn InstanceResolver) -> Result<Self, InjectorError> {
        Ok(Self {
            requests: resolver.resolve::<Factory<(u32,), Request>>()?,
        })
    }
}

#[test]
fn should_inject_factories_into_other_bindings() {
    let component = create_component()
        .register_constructor::<Logger>()
        .register_factory::<(u32,), _, _>(|id: u32, logger: InstancePtr<Logger>| Request {
            id,
            logger,
        })
        .register_constructor::<Dispatcher>()
        .seal()
        .unwrap();
    let injector = Injector::new(&component).unwrap();

    let dispatcher = injector.get::<Dispatcher>().unwrap();
    let request = dispatcher.requests.create((9,)).unwrap();
    assert_eq!(request.id, 9);
    assert!(same_instance(
        &request.logger,
        &injector.get::<Logger>().unwrap()
    ));
}

trait Plugin: std::fmt::Debug {
    fn name(&self) -> &'static str;
}

#[derive(Debug)]
struct AuditPlugin;

impl Plugin for AuditPlugin {
    fn name(&self) -> &'static str {
        "audit"
    }
}

impl BindsTo<dyn Plugin> for AuditPlugin {
    fn into_base(this: InstancePtr<Self>) -> InstancePtr<dyn Plugin> {
        this
    }
}

impl Inject for AuditPlugin {
    fn signature() -> Signature {
        Signature::nullary(TypeKey::of::<Self>())
    }

    fn construct(_resolver: &mut dyn InstanceResolver) -> Result<Self, InjectorError> {
        Ok(AuditPlugin)
    }
}

#[derive(Debug)]
struct MetricsPlugin;

impl Plugin for MetricsPlugin {
    fn name(&self) -> &'static str {
        "metrics"
    }
}

impl BindsTo<dyn Plugin> for MetricsPlugin {
    fn into_base(this: InstancePtr<Self>) -> InstancePtr<dyn Plugin> {
        this
    }
}

impl Inject for MetricsPlugin {
    fn signature() -> Signature {
        Signature::nullary(TypeKey::of::<Self>())
    }

    fn construct(_resolver: &mut dyn InstanceResolver) -> Result<Self, InjectorError> {
        Ok(MetricsPlugin)
    }
}

#[test]
fn should_return_multibindings_in_declaration_order() {
    let component = create_component()
        .register_constructor::<AuditPlugin>()
        .register_constructor::<MetricsPlugin>()
        .add_multibinding::<dyn Plugin, AuditPlugin>()
        .add_multibinding::<dyn Plugin, MetricsPlugin>()
        .seal()
        .unwrap();
    let injector = Injector::new(&component).unwrap();

    let plugins = injector.get_multibindings::<dyn Plugin>().unwrap();
    assert_eq!(
        plugins.iter().map(|plugin| plugin.name()).collect::<Vec<_>>(),
        vec!["audit", "metrics"]
    );

    // contributions reuse the unique singletons they point at
    assert!(same_instance(
        &plugins[0],
        &injector.get::<AuditPlugin>().unwrap()
    ));

    // and they never satisfy a unique lookup
    assert_eq!(
        injector.get::<dyn Plugin>().unwrap_err(),
        InjectorError::UnboundType(TypeKey::of::<dyn Plugin>())
    );
}

#[test]
fn should_mix_contribution_shapes_in_order() {
    let external = Rc::new(AuditPlugin);
    let component = create_component()
        .register_constructor::<MetricsPlugin>()
        .add_instance_multibinding(external.clone())
        .add_multibinding::<dyn Plugin, MetricsPlugin>()
        .add_multibinding_provider(|| AuditPlugin)
        .seal()
        .unwrap();
    let injector = Injector::new(&component).unwrap();

    let instances = injector.get_multibindings::<AuditPlugin>().unwrap();
    assert_eq!(instances.len(), 2);
    assert!(same_instance(&instances[0], &external));

    let plugins = injector.get_multibindings::<dyn Plugin>().unwrap();
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0].name(), "metrics");
}

#[derive(Debug)]
struct AppConfig {
    #[allow(dead_code)]
    verbose: bool,
}

#[test]
fn should_never_destroy_external_instances() {
    let config = Rc::new(AppConfig { verbose: true });

    {
        let component = create_component()
            .bind_instance(config.clone())
            .seal()
            .unwrap();
        let injector = Injector::new(&component).unwrap();

        let resolved = injector.get::<AppConfig>().unwrap();
        assert!(Rc::ptr_eq(&resolved, &config));
        drop(resolved);
    }

    // component and injector are gone; the caller's instance survives
    assert_eq!(Rc::strong_count(&config), 1);
}

struct Recorder(RefCell<Vec<&'static str>>);

struct TrackedWriter {
    recorder: InstancePtr<Recorder>,
}

impl Drop for TrackedWriter {
    fn drop(&mut self) {
        self.recorder.0.borrow_mut().push("writer");
    }
}

impl Inject for TrackedWriter {
    fn signature() -> Signature {
        Signature::new(
            TypeKey::of::<Self>(),
            vec![Param::injected(TypeKey::of::<Recorder>())],
        )
    }

    fn construct(resolver: &mut dyn InstanceResolver) -> Result<Self, InjectorError> {
        Ok(Self {
            recorder: resolver.resolve::<Recorder>()?,
        })
    }
}

struct TrackedGreeter {
    _writer: InstancePtr<TrackedWriter>,
    recorder: InstancePtr<Recorder>,
}

impl Drop for TrackedGreeter {
    fn drop(&mut self) {
        self.recorder.0.borrow_mut().push("greeter");
    }
}

impl Inject for TrackedGreeter {
    fn signature() -> Signature {
        Signature::new(
            TypeKey::of::<Self>(),
            vec![
                Param::injected(TypeKey::of::<TrackedWriter>()),
                Param::injected(TypeKey::of::<Recorder>()),
            ],
        )
    }

    fn construct(resolver: &mut dyn InstanceResolver) -> Result<Self, InjectorError> {
        Ok(Self {
            _writer: resolver.resolve::<TrackedWriter>()?,
            recorder: resolver.resolve::<Recorder>()?,
        })
    }
}

#[test]
fn should_tear_down_in_reverse_construction_order() {
    let recorder = Rc::new(Recorder(RefCell::new(Vec::new())));

    let component = create_component()
        .bind_instance(recorder.clone())
        .register_constructor::<TrackedWriter>()
        .register_constructor::<TrackedGreeter>()
        .seal()
        .unwrap();
    let injector = Injector::new(&component).unwrap();

    // construction order: writer before greeter
    drop(injector.get::<TrackedGreeter>().unwrap());
    drop(injector);
    drop(component);

    assert_eq!(*recorder.0.borrow(), vec!["greeter", "writer"]);
}

struct FirstDependency;

impl Inject for FirstDependency {
    fn signature() -> Signature {
        Signature::new(
            TypeKey::of::<Self>(),
            vec![Param::injected(TypeKey::of::<Recorder>())],
        )
    }

    fn construct(resolver: &mut dyn InstanceResolver) -> Result<Self, InjectorError> {
        let recorder = resolver.resolve::<Recorder>()?;
        recorder.0.borrow_mut().push("first");
        Ok(FirstDependency)
    }
}

struct SecondDependency;

impl Inject for SecondDependency {
    fn signature() -> Signature {
        Signature::new(
            TypeKey::of::<Self>(),
            vec![Param::injected(TypeKey::of::<Recorder>())],
        )
    }

    fn construct(resolver: &mut dyn InstanceResolver) -> Result<Self, InjectorError> {
        let recorder = resolver.resolve::<Recorder>()?;
        recorder.0.borrow_mut().push("second");
        Ok(SecondDependency)
    }
}

struct OrderedConsumer {
    _first: InstancePtr<FirstDependency>,
    _second: InstancePtr<SecondDependency>,
}

impl Inject for OrderedConsumer {
    fn signature() -> Signature {
        Signature::new(
            TypeKey::of::<Self>(),
            vec![
                Param::injected(TypeKey::of::<FirstDependency>()),
                Param::injected(TypeKey::of::<SecondDependency>()),
            ],
        )
    }

    fn construct(resolver: &mut dyn InstanceResolver) -> Result<Self, InjectorError> {
        Ok(Self {
            _first: resolver.resolve::<FirstDependency>()?,
            _second: resolver.resolve::<SecondDependency>()?,
        })
    }
}

#[test]
fn should_construct_dependencies_in_signature_order() {
    let recorder = Rc::new(Recorder(RefCell::new(Vec::new())));

    let component = create_component()
        .bind_instance(recorder.clone())
        .register_constructor::<SecondDependency>()
        .register_constructor::<FirstDependency>()
        .register_constructor::<OrderedConsumer>()
        .seal()
        .unwrap();
    let injector = Injector::new(&component).unwrap();

    // signature order wins over declaration order
    injector.get::<OrderedConsumer>().unwrap();
    assert_eq!(*recorder.0.borrow(), vec!["first", "second"]);
}

struct PrimaryTag;
struct FallbackTag;

#[test]
fn should_keep_annotated_bindings_distinct() {
    let primary = Rc::new(AppConfig { verbose: true });
    let fallback = Rc::new(AppConfig { verbose: false });

    let component = create_component()
        .bind_instance_annotated::<PrimaryTag, AppConfig>(primary.clone())
        .bind_instance_annotated::<FallbackTag, AppConfig>(fallback.clone())
        .seal()
        .unwrap();
    let injector = Injector::new(&component).unwrap();

    let resolved_primary = injector.get_annotated::<PrimaryTag, AppConfig>().unwrap();
    let resolved_fallback = injector.get_annotated::<FallbackTag, AppConfig>().unwrap();
    assert!(Rc::ptr_eq(&resolved_primary, &primary));
    assert!(Rc::ptr_eq(&resolved_fallback, &fallback));

    // the plain key was never bound
    assert_eq!(
        injector.get::<AppConfig>().unwrap_err(),
        InjectorError::UnboundType(TypeKey::of::<AppConfig>())
    );
}

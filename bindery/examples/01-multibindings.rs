use bindery::error::InjectorError;
use bindery::injector::Injector;
use bindery::instance::{BindsTo, Inject, InstancePtr, InstanceResolver};
use bindery::partial::create_component;
use bindery::signature::{Signature, TypeKey};

trait Plugin {
    fn name(&self) -> &'static str;
}

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

fn main() {
    // multibindings form a namespace parallel to unique bindings: each
    // contribution is retrieved collectively, in declaration order
    let component = create_component()
        .register_constructor::<AuditPlugin>()
        .register_constructor::<MetricsPlugin>()
        .add_multibinding::<dyn Plugin, AuditPlugin>()
        .add_multibinding::<dyn Plugin, MetricsPlugin>()
        .seal()
        .expect("error sealing the component");

    let injector = Injector::new(&component).expect("error creating the injector");
    let plugins = injector
        .get_multibindings::<dyn Plugin>()
        .expect("error resolving plugins");

    // prints "audit, metrics"
    println!(
        "{}",
        plugins
            .iter()
            .map(|plugin| plugin.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
}

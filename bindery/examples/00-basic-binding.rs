use bindery::error::InjectorError;
use bindery::injector::Injector;
use bindery::instance::{
    BindsTo, Inject, InstancePtr, InstanceResolver, TypedInstanceResolver,
};
use bindery::partial::create_component;
use bindery::signature::{Param, Signature, TypeKey};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

// this is a trait we would like to depend on
trait Writer {
    fn write(&self, message: &str);
}

struct StdoutWriter;

impl Writer for StdoutWriter {
    fn write(&self, message: &str) {
        println!("{message}");
    }
}

// we're telling the container StdoutWriter can stand in for dyn Writer
impl BindsTo<dyn Writer> for StdoutWriter {
    fn into_base(this: InstancePtr<Self>) -> InstancePtr<dyn Writer> {
        this
    }
}

// a component with a dependency; its canonical constructor pulls the
// abstract writer, not a concrete one
struct Greeter {
    writer: InstancePtr<dyn Writer>,
}

impl Greeter {
    fn greet(&self) {
        self.writer.write("Hello world!");
    }
}

impl Inject for Greeter {
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

// note: for the sake of simplicity, errors are unwrapped, rather than
// gracefully handled
fn main() {
    // seal-time diagnostics are logged; RUST_LOG=debug shows them
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let component = create_component()
        .register_provider(|| StdoutWriter)
        .bind::<dyn Writer, StdoutWriter>()
        .register_constructor::<Greeter>()
        .seal()
        .expect("error sealing the component");

    let injector = Injector::new(&component).expect("error creating the injector");

    // prints "Hello world!"
    injector
        .get::<Greeter>()
        .expect("error creating Greeter")
        .greet();
}

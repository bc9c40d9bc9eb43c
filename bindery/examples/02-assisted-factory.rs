use bindery::error::InjectorError;
use bindery::injector::Injector;
use bindery::instance::{Inject, InstancePtr, InstanceResolver};
use bindery::partial::create_component;
use bindery::signature::{Signature, TypeKey};

struct Logger;

impl Logger {
    fn log(&self, message: &str) {
        eprintln!("[log] {message}");
    }
}

impl Inject for Logger {
    fn signature() -> Signature {
        Signature::nullary(TypeKey::of::<Self>())
    }

    fn construct(_resolver: &mut dyn InstanceResolver) -> Result<Self, InjectorError> {
        Ok(Logger)
    }
}

// a request carries per-invocation data (the id, supplied by the caller)
// next to injected infrastructure (the logger singleton)
struct Request {
    id: u32,
    logger: InstancePtr<Logger>,
}

impl Request {
    fn handle(&self) {
        self.logger.log(&format!("handling request {}", self.id));
    }
}

fn main() {
    // assisted parameters come first, injected dependencies after; the
    // assisted tuple is spelled explicitly
    let component = create_component()
        .register_constructor::<Logger>()
        .register_factory::<(u32,), _, _>(|id: u32, logger: InstancePtr<Logger>| Request {
            id,
            logger,
        })
        .seal()
        .expect("error sealing the component");

    let injector = Injector::new(&component).expect("error creating the injector");
    let requests = injector
        .factory::<(u32,), Request>()
        .expect("error resolving the request factory");

    // every call produces a fresh request sharing the one logger
    for id in [1, 2, 3] {
        requests
            .create((id,))
            .expect("error creating a request")
            .handle();
    }
}

//! A dependency injection container built around an immutable binding graph.
//!
//! Bindings are declared on a [Partial](partial::Partial) - a value that
//! accumulates declarations while tracking what it provides and what it still
//! requires. Sealing the partial compiles the declarations into a validated
//! [Component](component::Component): duplicates, missing dependencies, and
//! dependency cycles are all rejected at that point, before any instance
//! exists. An [Injector](injector::Injector) then realizes bindings lazily,
//! memoizing one instance per key and tearing everything down in reverse
//! construction order.
//!
//! ### Simple usage example
//!
//! ```
//! use bindery::injector::Injector;
//! use bindery::instance::{
//!     BindsTo, Inject, InstancePtr, InstanceResolver, TypedInstanceResolver,
//! };
//! use bindery::partial::create_component;
//! use bindery::signature::{Param, Signature, TypeKey};
//!
//! // an abstraction we want to depend on
//! trait Writer {
//!     fn write(&self, message: &str);
//! }
//!
//! struct StdoutWriter;
//!
//! impl Writer for StdoutWriter {
//!     fn write(&self, message: &str) {
//!         println!("{message}");
//!     }
//! }
//!
//! // witnesses that StdoutWriter can stand in for dyn Writer
//! impl BindsTo<dyn Writer> for StdoutWriter {
//!     fn into_base(this: InstancePtr<Self>) -> InstancePtr<dyn Writer> {
//!         this
//!     }
//! }
//!
//! struct Greeter {
//!     writer: InstancePtr<dyn Writer>,
//! }
//!
//! impl Greeter {
//!     fn greet(&self) {
//!         self.writer.write("Hello world!");
//!     }
//! }
//!
//! // the canonical constructor: one injected dependency
//! impl Inject for Greeter {
//!     fn signature() -> Signature {
//!         Signature::new(
//!             TypeKey::of::<Self>(),
//!             vec![Param::injected(TypeKey::of::<dyn Writer>())],
//!         )
//!     }
//!
//!     fn construct(
//!         resolver: &mut dyn InstanceResolver,
//!     ) -> Result<Self, bindery::error::InjectorError> {
//!         Ok(Self {
//!             writer: resolver.resolve::<dyn Writer>()?,
//!         })
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let component = create_component()
//!     .register_provider(|| StdoutWriter)
//!     .bind::<dyn Writer, StdoutWriter>()
//!     .register_constructor::<Greeter>()
//!     .seal()?;
//!
//! let injector = Injector::new(&component)?;
//! injector.get::<Greeter>()?.greet();
//! # Ok(())
//! # }
//! ```

pub mod component;
pub mod declaration;
pub mod error;
pub mod injector;
pub mod instance;
pub mod partial;
pub mod signature;

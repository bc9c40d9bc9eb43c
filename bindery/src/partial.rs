//! The partial component: an accumulator of binding declarations.
//!
//! A [Partial] is built through chained operations that consume and return it,
//! tracking two dynamic type sets along the way: *provided* (keys the sealed
//! component will answer for) and *required* (keys some binding needs but
//! nothing declares yet). Sealing hands the accumulated declarations to the
//! compiler in [crate::component].
//!
//! Providers and factories must be stateless: pass a function item or a
//! capture-free closure. A callable with captured state is recorded and
//! reported when the partial is sealed.

use crate::component::{compile, Component, SealOptions};
use crate::declaration::{
    BindingKind, ConstructorThunk, Declaration, FactoryHandleThunk, MultibindingKind,
};
use crate::error::{InjectorError, SealError};
use crate::injector::Factory;
use crate::instance::{
    alias_step_cast, default_cast, AnyInstancePtr, BindsTo, Inject, InstancePtr, InstanceResolver,
    TypedInstanceResolver,
};
use crate::signature::{Param, Signature, TypeKey};
use fxhash::FxHashSet;
use std::mem::size_of;
use std::rc::Rc;
use tracing::trace;

/// Starts an empty partial. The conventional entry point; equivalent to
/// [Partial::default].
pub fn create_component() -> Partial {
    Partial::default()
}

/// A partially-constructed component: ordered declarations plus the dynamic
/// provided/required sets. Linear use only - every operation consumes the
/// value and returns the extended one.
#[derive(Default)]
pub struct Partial {
    pub(crate) declarations: Vec<Declaration>,
    pub(crate) defects: Vec<SealError>,
    provided: FxHashSet<TypeKey>,
    required: FxHashSet<TypeKey>,
    next_index: u32,
}

impl Partial {
    /// Binds the interface `I` (typically a `dyn Trait` key) to the
    /// implementation `C`. `C` itself must be bound by another declaration,
    /// or the sealed component carries it as a requirement.
    pub fn bind<I: ?Sized + 'static, C: BindsTo<I> + ?Sized>(mut self) -> Self {
        let interface = TypeKey::of::<I>();
        let implementation = TypeKey::of::<C>();

        self.require(implementation);
        self.provide(interface);
        self.push(BindingKind::BindTo {
            interface,
            implementation,
            step: alias_step_cast::<I, C>,
        })
    }

    /// Registers the canonical constructor of `T`, as declared by its
    /// [Inject] impl.
    pub fn register_constructor<T: Inject>(mut self) -> Self {
        let signature = T::signature();
        debug_assert_eq!(signature.ret(), TypeKey::of::<T>());

        for key in signature.injected_keys().collect::<Vec<_>>() {
            self.require(key);
        }
        self.provide(signature.ret());

        let construct: ConstructorThunk = Rc::new(|resolver: &mut dyn InstanceResolver| {
            T::construct(resolver).map(|instance| Rc::new(instance) as AnyInstancePtr)
        });
        let target = signature.ret();
        self.push(BindingKind::Constructor {
            target,
            signature,
            construct,
            cast: default_cast::<T>,
        })
    }

    /// Binds `C` to an instance supplied - and kept - by the caller. The
    /// container shares the pointer but never destroys the value: teardown
    /// releases only the container's own references.
    pub fn bind_instance<C: 'static>(mut self, instance: InstancePtr<C>) -> Self {
        let target = TypeKey::of::<C>();

        self.provide(target);
        self.push(BindingKind::Instance {
            target,
            instance: instance as AnyInstancePtr,
            cast: default_cast::<C>,
        })
    }

    /// Like [Partial::bind_instance], under the key of `C` annotated with the
    /// tag `A`. Retrieve with
    /// [Injector::get_annotated](crate::injector::Injector::get_annotated).
    pub fn bind_instance_annotated<A: ?Sized + 'static, C: 'static>(
        mut self,
        instance: InstancePtr<C>,
    ) -> Self {
        let target = TypeKey::annotated::<A, C>();

        self.provide(target);
        self.push(BindingKind::Instance {
            target,
            instance: instance as AnyInstancePtr,
            cast: default_cast::<C>,
        })
    }

    /// Registers a stateless callable as the producer of its return type. The
    /// signature is inferred from the callable: each parameter is an
    /// [InstancePtr] of an injected dependency.
    pub fn register_provider<Deps, P: ProviderCallable<Deps>>(mut self, provider: P) -> Self {
        let signature = P::signature();
        let target = signature.ret();

        if size_of::<P>() != 0 {
            self.defects.push(SealError::StatefulCallable { target });
            return self;
        }

        for key in signature.injected_keys().collect::<Vec<_>>() {
            self.require(key);
        }
        self.provide(target);
        self.push(BindingKind::Provider {
            target,
            signature,
            construct: provider.into_thunk(),
            cast: default_cast::<P::Output>,
        })
    }

    /// Registers a stateless factory callable and provides
    /// `Factory<Args, T>`, a handle that accepts the assisted arguments and
    /// produces a fresh `T` per invocation. By convention the callable takes
    /// the assisted parameters first (plain values), then the injected ones
    /// (as [InstancePtr]s); `Args` is the assisted tuple, spelled explicitly:
    ///
    /// ```ignore
    /// partial.register_factory::<(u32,), _, _>(|id, logger: InstancePtr<Logger>| Request::new(id, logger))
    /// ```
    pub fn register_factory<Args: 'static, Deps, F: FactoryCallable<Args, Deps>>(
        mut self,
        factory: F,
    ) -> Self {
        let signature = F::signature();
        let target = TypeKey::of::<Factory<Args, F::Output>>();

        if size_of::<F>() != 0 {
            self.defects.push(SealError::StatefulCallable { target });
            return self;
        }

        for key in signature.injected_keys().collect::<Vec<_>>() {
            self.require(key);
        }
        self.provide(target);

        let produce = factory.into_produce();
        let make_handle: FactoryHandleThunk = Rc::new(move |deferred| {
            Rc::new(Factory::new(deferred, produce.clone())) as AnyInstancePtr
        });
        self.push(BindingKind::Factory {
            target,
            signature,
            make_handle,
            cast: default_cast::<Factory<Args, F::Output>>,
        })
    }

    /// Contributes `C` to the multibinding set of `I`. Contributions are
    /// retrieved collectively through
    /// [Injector::get_multibindings](crate::injector::Injector::get_multibindings);
    /// they never satisfy a unique lookup of `I`.
    pub fn add_multibinding<I: ?Sized + 'static, C: BindsTo<I> + ?Sized>(mut self) -> Self {
        let interface = TypeKey::of::<I>();
        let implementation = TypeKey::of::<C>();

        self.require(implementation);
        self.push(BindingKind::Multibinding(MultibindingKind::BindTo {
            interface,
            implementation,
            step: alias_step_cast::<I, C>,
        }))
    }

    /// Contributes a caller-owned instance to the multibinding set of `C`.
    pub fn add_instance_multibinding<C: 'static>(mut self, instance: InstancePtr<C>) -> Self {
        self.push(BindingKind::Multibinding(MultibindingKind::Instance {
            target: TypeKey::of::<C>(),
            instance: instance as AnyInstancePtr,
            cast: default_cast::<C>,
        }))
    }

    /// Contributes a stateless callable to the multibinding set of its return
    /// type.
    pub fn add_multibinding_provider<Deps, P: ProviderCallable<Deps>>(
        mut self,
        provider: P,
    ) -> Self {
        let signature = P::signature();
        let target = signature.ret();

        if size_of::<P>() != 0 {
            self.defects.push(SealError::StatefulCallable { target });
            return self;
        }

        for key in signature.injected_keys().collect::<Vec<_>>() {
            self.require(key);
        }
        self.push(BindingKind::Multibinding(MultibindingKind::Provider {
            target,
            signature,
            construct: provider.into_thunk(),
            cast: default_cast::<P::Output>,
        }))
    }

    /// Merges a sealed component's bindings into this partial. Installing the
    /// same component twice is a no-op for its declarations; requirements of
    /// the installed component become requirements here unless something
    /// already provides them.
    pub fn install(mut self, component: &Component) -> Self {
        for key in component.provides().collect::<Vec<_>>() {
            self.provide(key);
        }
        for key in component.requires().collect::<Vec<_>>() {
            self.require(key);
        }
        self.push(BindingKind::Install(component.clone()))
    }

    /// Keys this partial will provide once sealed.
    pub fn provides(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.provided.iter().copied()
    }

    /// Keys some declaration needs but nothing provides yet.
    pub fn requires(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.required.iter().copied()
    }

    /// Seals a complete partial: every dependency must be satisfied.
    pub fn seal(self) -> Result<Component, SealError> {
        self.seal_with_options(&[], SealOptions::default())
    }

    /// Seals a partial that deliberately leaves `requirements` unsatisfied.
    /// The resulting component can only be installed into another partial
    /// that provides them; it cannot create an injector.
    pub fn seal_with_requirements(self, requirements: &[TypeKey]) -> Result<Component, SealError> {
        self.seal_with_options(requirements, SealOptions::default())
    }

    /// Seals with an explicit requirement contract and compiler options.
    pub fn seal_with_options(
        self,
        requirements: &[TypeKey],
        options: SealOptions,
    ) -> Result<Component, SealError> {
        compile(self, requirements, options)
    }

    fn provide(&mut self, key: TypeKey) {
        self.provided.insert(key);
        self.required.remove(&key);
    }

    fn require(&mut self, key: TypeKey) {
        if !self.provided.contains(&key) {
            self.required.insert(key);
        }
    }

    fn push(mut self, kind: BindingKind) -> Self {
        trace!(index = self.next_index, kind = ?kind, "declared binding");
        self.declarations
            .push(Declaration::new(kind, self.next_index));
        self.next_index += 1;
        self
    }
}

/// A stateless callable usable as a provider: every parameter is an
/// [InstancePtr] of an injected dependency, the return value is the produced
/// instance. Implemented for functions and capture-free closures of up to
/// eight dependencies.
pub trait ProviderCallable<Deps>: 'static {
    type Output: 'static;

    fn signature() -> Signature;

    fn into_thunk(self) -> ConstructorThunk;
}

/// A stateless callable usable as a factory: assisted parameters first (plain
/// values), injected dependencies after (as [InstancePtr]s). `Args` is the
/// tuple of assisted parameter types. The produced value is returned by value
/// and never memoized.
pub trait FactoryCallable<Args, Deps>: 'static {
    type Output: 'static;

    fn signature() -> Signature;

    fn into_produce(self) -> ProduceThunk<Args, Self::Output>;
}

/// Typed production thunk backing a [Factory](crate::injector::Factory).
pub type ProduceThunk<Args, T> =
    Rc<dyn Fn(&mut dyn InstanceResolver, Args) -> Result<T, InjectorError>>;

macro_rules! impl_provider_callable {
    ($(($dep:ident, $arg:ident)),*) => {
        impl<F, Out, $($dep),*> ProviderCallable<($($dep,)*)> for F
        where
            F: Fn($(InstancePtr<$dep>),*) -> Out + 'static,
            Out: 'static,
            $($dep: 'static),*
        {
            type Output = Out;

            fn signature() -> Signature {
                Signature::new(
                    TypeKey::of::<Out>(),
                    vec![$(Param::injected(TypeKey::of::<$dep>())),*],
                )
            }

            fn into_thunk(self) -> ConstructorThunk {
                Rc::new(move |resolver: &mut dyn InstanceResolver| {
                    $(let $arg = resolver.resolve::<$dep>()?;)*
                    let _ = resolver;
                    Ok(Rc::new((self)($($arg),*)) as AnyInstancePtr)
                })
            }
        }
    };
}

impl_provider_callable!();
impl_provider_callable!((D1, d1));
impl_provider_callable!((D1, d1), (D2, d2));
impl_provider_callable!((D1, d1), (D2, d2), (D3, d3));
impl_provider_callable!((D1, d1), (D2, d2), (D3, d3), (D4, d4));
impl_provider_callable!((D1, d1), (D2, d2), (D3, d3), (D4, d4), (D5, d5));
impl_provider_callable!((D1, d1), (D2, d2), (D3, d3), (D4, d4), (D5, d5), (D6, d6));
impl_provider_callable!(
    (D1, d1),
    (D2, d2),
    (D3, d3),
    (D4, d4),
    (D5, d5),
    (D6, d6),
    (D7, d7)
);
impl_provider_callable!(
    (D1, d1),
    (D2, d2),
    (D3, d3),
    (D4, d4),
    (D5, d5),
    (D6, d6),
    (D7, d7),
    (D8, d8)
);

macro_rules! impl_factory_callable {
    (($(($assisted:ident, $aval:ident)),*), ($(($dep:ident, $dval:ident)),*)) => {
        impl<F, Out, $($assisted,)* $($dep),*> FactoryCallable<($($assisted,)*), ($($dep,)*)> for F
        where
            F: Fn($($assisted,)* $(InstancePtr<$dep>),*) -> Out + 'static,
            Out: 'static,
            $($assisted: 'static,)*
            $($dep: 'static),*
        {
            type Output = Out;

            fn signature() -> Signature {
                Signature::new(
                    TypeKey::of::<Out>(),
                    vec![
                        $(Param::assisted(TypeKey::of::<$assisted>()),)*
                        $(Param::injected(TypeKey::of::<$dep>())),*
                    ],
                )
            }

            fn into_produce(self) -> ProduceThunk<($($assisted,)*), Out> {
                Rc::new(
                    move |resolver: &mut dyn InstanceResolver, args: ($($assisted,)*)| {
                        let ($($aval,)*) = args;
                        $(let $dval = resolver.resolve::<$dep>()?;)*
                        let _ = resolver;
                        Ok((self)($($aval,)* $($dval),*))
                    },
                )
            }
        }
    };
}

macro_rules! impl_factory_callable_for_deps {
    ($assisted:tt) => {
        impl_factory_callable!($assisted, ());
        impl_factory_callable!($assisted, ((E1, e1)));
        impl_factory_callable!($assisted, ((E1, e1), (E2, e2)));
        impl_factory_callable!($assisted, ((E1, e1), (E2, e2), (E3, e3)));
        impl_factory_callable!($assisted, ((E1, e1), (E2, e2), (E3, e3), (E4, e4)));
    };
}

impl_factory_callable_for_deps!(());
impl_factory_callable_for_deps!(((A1, a1)));
impl_factory_callable_for_deps!(((A1, a1), (A2, a2)));
impl_factory_callable_for_deps!(((A1, a1), (A2, a2), (A3, a3)));

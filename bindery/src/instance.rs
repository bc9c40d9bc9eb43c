//! Instance pointers and the resolver seam constructors run against.
//!
//! Realized instances are shared through [InstancePtr] (reference counted,
//! single-threaded - an injector has one logical owner). The container moves
//! instances around type-erased as [AnyInstancePtr]; recovering the typed
//! pointer goes through a [CastChain] built at seal time, so a `dyn Trait`
//! lookup lands on the same underlying instance as its concrete binding.

use crate::error::InjectorError;
use crate::injector::DeferredResolver;
use crate::signature::{Signature, TypeKey};
#[cfg(test)]
use mockall::automock;
use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

/// Shared pointer to a realized instance.
pub type InstancePtr<T> = Rc<T>;

/// Type-erased shared pointer, as stored in an injector's memo table.
pub type AnyInstancePtr = Rc<dyn Any>;

/// Recovers a typed pointer from an erased one: produces a box holding an
/// `InstancePtr<T>` for the binding's exposed type. Monomorphized per binding
/// at declaration time.
pub type CastFunction = fn(AnyInstancePtr) -> Result<Box<dyn Any>, AnyInstancePtr>;

/// One alias hop: converts a boxed `InstancePtr<C>` into a boxed
/// `InstancePtr<I>` where `C` binds to `I`.
pub type AliasCast = fn(Box<dyn Any>) -> Result<Box<dyn Any>, Box<dyn Any>>;

/// A base cast plus the alias hops collapsed from a `bind` chain. Applying
/// the chain to the erased instance of the canonical binding yields the
/// pointer type the looked-up key exposes.
#[derive(Clone)]
pub struct CastChain {
    base: CastFunction,
    steps: Rc<[AliasCast]>,
}

impl CastChain {
    pub(crate) fn direct(base: CastFunction) -> Self {
        Self {
            base,
            steps: Rc::from(Vec::new()),
        }
    }

    pub(crate) fn aliased(base: CastFunction, steps: Vec<AliasCast>) -> Self {
        Self {
            base,
            steps: Rc::from(steps),
        }
    }

    pub(crate) fn apply(&self, instance: AnyInstancePtr) -> Option<Box<dyn Any>> {
        let mut boxed = (self.base)(instance).ok()?;
        for step in self.steps.iter() {
            boxed = step(boxed).ok()?;
        }
        Some(boxed)
    }
}

impl Debug for CastChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CastChain")
            .field("steps", &self.steps.len())
            .finish()
    }
}

/// Cast for a binding exposed under its own concrete type.
pub(crate) fn default_cast<T: 'static>(
    instance: AnyInstancePtr,
) -> Result<Box<dyn Any>, AnyInstancePtr> {
    instance
        .downcast::<T>()
        .map(|instance| Box::new(instance) as Box<dyn Any>)
}

/// Cast hop for `bind::<I, C>()`.
pub(crate) fn alias_step_cast<I: ?Sized + 'static, C: BindsTo<I> + ?Sized>(
    boxed: Box<dyn Any>,
) -> Result<Box<dyn Any>, Box<dyn Any>> {
    boxed
        .downcast::<InstancePtr<C>>()
        .map(|instance| Box::new(C::into_base(*instance)) as Box<dyn Any>)
}

/// Cast placeholder for alias targets satisfied externally (a component with
/// requirements). Such components cannot create injectors, so the chain is
/// never applied.
pub(crate) fn unresolved_cast(instance: AnyInstancePtr) -> Result<Box<dyn Any>, AnyInstancePtr> {
    Err(instance)
}

pub(crate) fn instance_from_erased<T: ?Sized + 'static>(
    key: TypeKey,
    instance: AnyInstancePtr,
    casts: &CastChain,
) -> Result<InstancePtr<T>, InjectorError> {
    casts
        .apply(instance)
        .and_then(|boxed| boxed.downcast::<InstancePtr<T>>().ok())
        .map(|boxed| *boxed)
        .ok_or(InjectorError::IncompatibleInstance(key))
}

/// Witnesses that `Self` can be exposed as `I` - typically that a concrete
/// component implements the trait behind a `dyn Trait` key. The single method
/// performs the pointer conversion where both types are statically known.
pub trait BindsTo<I: ?Sized + 'static>: 'static {
    fn into_base(this: InstancePtr<Self>) -> InstancePtr<I>;
}

/// The canonical constructor of an injectable type: its dependency signature
/// plus a constructor pulling those dependencies from a resolver. Host-level
/// sugar would derive this; hand-written impls are a few lines.
pub trait Inject: Sized + 'static {
    /// Dependency signature; the return key must be `TypeKey::of::<Self>()`.
    fn signature() -> Signature;

    fn construct(resolver: &mut dyn InstanceResolver) -> Result<Self, InjectorError>;
}

/// The seam between bindings and the injector: constructors and providers
/// resolve their dependencies through this trait, never through a concrete
/// injector type.
#[cfg_attr(test, automock)]
pub trait InstanceResolver {
    /// Resolves the unique binding for `key`, realizing it if necessary.
    fn resolve_erased(
        &mut self,
        key: TypeKey,
    ) -> Result<(AnyInstancePtr, CastChain), InjectorError>;

    /// Resolves every multibinding contribution for `key`, in declaration
    /// order. A key with no contributions yields an empty list.
    fn resolve_all_erased(
        &mut self,
        key: TypeKey,
    ) -> Result<Vec<(AnyInstancePtr, CastChain)>, InjectorError>;

    /// A weak handle for deferred resolution, used by factory values that
    /// resolve their injected dependencies at invocation time.
    fn deferred(&self) -> DeferredResolver;
}

/// Strongly-typed access on top of [InstanceResolver].
pub trait TypedInstanceResolver {
    /// Typesafe version of [InstanceResolver::resolve_erased].
    fn resolve<T: ?Sized + 'static>(&mut self) -> Result<InstancePtr<T>, InjectorError>;

    /// Resolves the binding of `T` annotated with the tag `A`.
    fn resolve_annotated<A: ?Sized + 'static, T: ?Sized + 'static>(
        &mut self,
    ) -> Result<InstancePtr<T>, InjectorError>;

    /// Typesafe version of [InstanceResolver::resolve_all_erased].
    fn resolve_all<T: ?Sized + 'static>(&mut self) -> Result<Vec<InstancePtr<T>>, InjectorError>;
}

impl<R: InstanceResolver + ?Sized> TypedInstanceResolver for R {
    fn resolve<T: ?Sized + 'static>(&mut self) -> Result<InstancePtr<T>, InjectorError> {
        let key = TypeKey::of::<T>();
        let (instance, casts) = self.resolve_erased(key)?;
        instance_from_erased(key, instance, &casts)
    }

    fn resolve_annotated<A: ?Sized + 'static, T: ?Sized + 'static>(
        &mut self,
    ) -> Result<InstancePtr<T>, InjectorError> {
        let key = TypeKey::annotated::<A, T>();
        let (instance, casts) = self.resolve_erased(key)?;
        instance_from_erased(key, instance, &casts)
    }

    fn resolve_all<T: ?Sized + 'static>(&mut self) -> Result<Vec<InstancePtr<T>>, InjectorError> {
        let key = TypeKey::of::<T>();
        self.resolve_all_erased(key)?
            .into_iter()
            .map(|(instance, casts)| instance_from_erased(key, instance, &casts))
            .collect()
    }
}

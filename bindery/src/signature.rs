//! Erased type identity and callable signature descriptors.
//!
//! Every binding is keyed by a [TypeKey] - a process-stable, hashable identity
//! for a host type, carrying the type name for diagnostics. Annotated types
//! ([Annotated]) produce keys distinct from their underlying type, which
//! allows the same type to be bound several times under different tags.

use derive_more::Constructor;
use std::any::TypeId;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Stable, erased identity of a host type. Two keys compare equal exactly when
/// they denote the same type (including the annotation tag, if any).
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for a plain type, sized or not (`dyn Trait` keys are common).
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Key for `T` tagged with the annotation type `A`. Distinct from
    /// `TypeKey::of::<T>()`.
    pub fn annotated<A: ?Sized + 'static, T: ?Sized + 'static>() -> Self {
        Self::of::<Annotated<A, T>>()
    }

    /// Human-readable type name; not guaranteed unique across types, unlike
    /// the key itself.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

// identity is the TypeId alone; the name tags along for diagnostics
impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for TypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl Display for TypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Marker type distinguishing an annotated binding of `T` from a plain one.
/// Never instantiated; only its [TypeId] is used.
pub struct Annotated<A: ?Sized, T: ?Sized> {
    _annotation: PhantomData<*const A>,
    _target: PhantomData<*const T>,
}

/// Whether a callable parameter is resolved by the container or supplied by
/// the caller at factory-invocation time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParamMode {
    Injected,
    Assisted,
}

/// One parameter of a [Signature].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Constructor)]
pub struct Param {
    pub key: TypeKey,
    pub mode: ParamMode,
}

impl Param {
    pub fn injected(key: TypeKey) -> Self {
        Self::new(key, ParamMode::Injected)
    }

    pub fn assisted(key: TypeKey) -> Self {
        Self::new(key, ParamMode::Assisted)
    }
}

/// Descriptor of a producing callable: the key of the produced type plus the
/// ordered parameter list. Parameter order is the canonical construction
/// order the injector resolves dependencies in.
#[derive(Clone, Debug, Eq, PartialEq, Constructor)]
pub struct Signature {
    ret: TypeKey,
    params: Vec<Param>,
}

impl Signature {
    /// Signature of a no-argument producer of `ret`.
    pub fn nullary(ret: TypeKey) -> Self {
        Self::new(ret, Vec::new())
    }

    pub fn ret(&self) -> TypeKey {
        self.ret
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Keys of injected parameters, in canonical order.
    pub fn injected_keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.params
            .iter()
            .filter(|param| param.mode == ParamMode::Injected)
            .map(|param| param.key)
    }

    /// Keys of assisted parameters, in declaration order.
    pub fn assisted_keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.params
            .iter()
            .filter(|param| param.mode == ParamMode::Assisted)
            .map(|param| param.key)
    }
}

//! Binding declarations: pure data describing how one key is produced.
//!
//! A [Partial](crate::partial::Partial) accumulates [Declaration]s; the
//! compiler consumes them at seal time. Thunks are stored type-erased and are
//! opaque to everything but the injector.

use crate::component::Component;
use crate::error::InjectorError;
use crate::instance::{AliasCast, AnyInstancePtr, CastFunction, InstanceResolver};
use crate::injector::DeferredResolver;
use crate::signature::{Signature, TypeKey};
use derivative::Derivative;
use std::rc::Rc;

/// Erased producer: pulls injected dependencies from the resolver and returns
/// the realized instance.
pub type ConstructorThunk =
    Rc<dyn Fn(&mut dyn InstanceResolver) -> Result<AnyInstancePtr, InjectorError>>;

/// Erased builder for a factory handle; receives the injector's deferred
/// resolver at construction time.
pub type FactoryHandleThunk = Rc<dyn Fn(DeferredResolver) -> AnyInstancePtr>;

/// One way to produce a value, tagged per production strategy.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub enum BindingKind {
    /// The canonical constructor of `target`, described by `signature`.
    Constructor {
        target: TypeKey,
        signature: Signature,
        #[derivative(Debug = "ignore")]
        construct: ConstructorThunk,
        #[derivative(Debug = "ignore")]
        cast: CastFunction,
    },
    /// A user-supplied instance; the container shares it but never owns it.
    Instance {
        target: TypeKey,
        #[derivative(Debug = "ignore")]
        instance: AnyInstancePtr,
        #[derivative(Debug = "ignore")]
        cast: CastFunction,
    },
    /// A stateless callable producing `target` from injected dependencies.
    Provider {
        target: TypeKey,
        signature: Signature,
        #[derivative(Debug = "ignore")]
        construct: ConstructorThunk,
        #[derivative(Debug = "ignore")]
        cast: CastFunction,
    },
    /// Alias: looking up `interface` resolves to `implementation`'s instance.
    BindTo {
        interface: TypeKey,
        implementation: TypeKey,
        #[derivative(Debug = "ignore")]
        step: AliasCast,
    },
    /// A partially-applied producer exposed as a factory handle under
    /// `target` (the key of the handle type, not of the produced type).
    Factory {
        target: TypeKey,
        signature: Signature,
        #[derivative(Debug = "ignore")]
        make_handle: FactoryHandleThunk,
        #[derivative(Debug = "ignore")]
        cast: CastFunction,
    },
    /// A contribution to a set-valued binding.
    Multibinding(MultibindingKind),
    /// Bindings of another, sealed component, merged at seal time.
    Install(Component),
}

/// The shapes a multibinding contribution can take. Contributions live in a
/// namespace parallel to unique bindings: they never satisfy a unique lookup
/// and unique bindings never appear in the contribution list.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub enum MultibindingKind {
    BindTo {
        interface: TypeKey,
        implementation: TypeKey,
        #[derivative(Debug = "ignore")]
        step: AliasCast,
    },
    Instance {
        target: TypeKey,
        #[derivative(Debug = "ignore")]
        instance: AnyInstancePtr,
        #[derivative(Debug = "ignore")]
        cast: CastFunction,
    },
    Provider {
        target: TypeKey,
        signature: Signature,
        #[derivative(Debug = "ignore")]
        construct: ConstructorThunk,
        #[derivative(Debug = "ignore")]
        cast: CastFunction,
    },
}

impl MultibindingKind {
    /// The key of the set this contribution belongs to.
    pub fn set_key(&self) -> TypeKey {
        match self {
            MultibindingKind::BindTo { interface, .. } => *interface,
            MultibindingKind::Instance { target, .. } => *target,
            MultibindingKind::Provider { target, .. } => *target,
        }
    }
}

impl BindingKind {
    /// The key this declaration provides, if it provides one directly.
    /// `Install` provides through its component, multibindings through the
    /// parallel namespace.
    pub fn provided_key(&self) -> Option<TypeKey> {
        match self {
            BindingKind::Constructor { target, .. }
            | BindingKind::Instance { target, .. }
            | BindingKind::Provider { target, .. }
            | BindingKind::Factory { target, .. } => Some(*target),
            BindingKind::BindTo { interface, .. } => Some(*interface),
            BindingKind::Multibinding(_) | BindingKind::Install(_) => None,
        }
    }
}

/// A [BindingKind] plus its position within the declaring partial, kept for
/// deterministic diagnostics.
#[derive(Clone, Debug)]
pub struct Declaration {
    pub kind: BindingKind,
    pub index: u32,
}

impl Declaration {
    pub(crate) fn new(kind: BindingKind, index: u32) -> Self {
        Self { kind, index }
    }
}

#[cfg(test)]
mod tests {
    use crate::declaration::{BindingKind, MultibindingKind};
    use crate::instance::{default_cast, AnyInstancePtr};
    use crate::signature::TypeKey;
    use std::rc::Rc;

    #[test]
    fn should_expose_provided_keys() {
        let instance = BindingKind::Instance {
            target: TypeKey::of::<i8>(),
            instance: Rc::new(0i8) as AnyInstancePtr,
            cast: default_cast::<i8>,
        };
        assert_eq!(instance.provided_key(), Some(TypeKey::of::<i8>()));

        let contribution = BindingKind::Multibinding(MultibindingKind::Instance {
            target: TypeKey::of::<i8>(),
            instance: Rc::new(0i8) as AnyInstancePtr,
            cast: default_cast::<i8>,
        });
        assert_eq!(contribution.provided_key(), None);
    }

    #[test]
    fn should_report_set_key_per_contribution_shape() {
        let contribution = MultibindingKind::Instance {
            target: TypeKey::of::<u8>(),
            instance: Rc::new(0u8) as AnyInstancePtr,
            cast: default_cast::<u8>,
        };
        assert_eq!(contribution.set_key(), TypeKey::of::<u8>());
    }
}

use crate::signature::TypeKey;
use itertools::Itertools;
use thiserror::Error;

/// Errors detected while sealing a partial into a component. These are
/// configuration errors: the declarations themselves are inconsistent, and no
/// injector can be produced until they are fixed.
#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum SealError {
    /// Two non-multibinding declarations target the same key. Indices refer
    /// to the flattened declaration order reported by the compiler.
    #[error("duplicate binding for '{key}' (declarations #{first} and #{second})")]
    DuplicateBinding {
        key: TypeKey,
        first: usize,
        second: usize,
    },
    /// A binding depends on a key that is neither bound nor listed in the
    /// declared requirements.
    #[error("'{dependent}' needs '{missing}', but nothing provides it")]
    UnsatisfiedDependency { missing: TypeKey, dependent: TypeKey },
    /// The injected-dependency graph contains a cycle. The path starts and
    /// ends with the same key.
    #[error("dependency cycle detected: {}", .path.iter().map(TypeKey::name).join(" -> "))]
    CyclicDependency { path: Vec<TypeKey> },
    /// An interface was bound to itself.
    #[error("'{interface}' is bound to itself")]
    SelfReferentialBind { interface: TypeKey },
    /// The requirement contract declared at seal time does not match the
    /// requirements computed from the declarations: the listed keys were
    /// declared as requirements but are either already provided or not
    /// needed by any binding.
    #[error("requirement contract mismatch; declared but not required: {}", .surplus.iter().map(TypeKey::name).join(", "))]
    RequirementsNotSatisfied { surplus: Vec<TypeKey> },
    /// A provider or factory callable carries captured state.
    #[error("callable producing '{target}' captures state; only stateless callables can be registered")]
    StatefulCallable { target: TypeKey },
}

/// Errors surfaced by a live injector. Configuration errors never reach this
/// stage; these cover requests the component simply cannot answer.
#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum InjectorError {
    /// No unique binding exists for the requested key. Multibinding
    /// contributions do not satisfy unique lookups.
    #[error("no binding found for '{0}'")]
    UnboundType(TypeKey),
    /// An injector was requested for a component that still has requirements.
    #[error("component still requires: {}; injectors need complete components", .missing.iter().map(TypeKey::name).join(", "))]
    RequirementsNotSatisfied { missing: Vec<TypeKey> },
    /// A realized instance could not be downcast to the requested type.
    #[error("instance bound for '{0}' is incompatible with the requested type")]
    IncompatibleInstance(TypeKey),
    /// A factory handle outlived the injector it was created from.
    #[error("the injector backing this factory has been dropped")]
    InjectorGone,
}

//! The injector: realizes bindings from a sealed component on demand.
//!
//! Each injector owns a memo table mapping keys to realized instances -
//! within one injector, a non-multibound key resolves to the same instance
//! for the injector's whole lifetime. Construction is depth-first: a
//! binding's injected dependencies are realized before the binding itself,
//! in canonical signature order. Teardown releases the injector's references
//! in reverse first-construction order.
//!
//! An injector has a single logical owner; it is not `Sync` and performs no
//! locking. Sharing a [Component] across injectors (or threads) is free -
//! components are immutable.

use crate::component::{Component, ResolvedBinding, Strategy};
use crate::error::InjectorError;
use crate::instance::{
    instance_from_erased, AnyInstancePtr, CastChain, InstancePtr, InstanceResolver,
};
use crate::partial::ProduceThunk;
use crate::signature::TypeKey;
use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::rc::{Rc, Weak};
use tracing::trace;

/// A live container over a sealed [Component]. Create with [Injector::new];
/// query with [Injector::get] and [Injector::get_multibindings].
pub struct Injector {
    core: Rc<RefCell<InjectorCore>>,
}

impl Injector {
    /// Creates an injector for a complete component. Components that still
    /// carry requirements must be installed into a providing partial first.
    pub fn new(component: &Component) -> Result<Self, InjectorError> {
        let missing = component.requires().collect_vec();
        if !missing.is_empty() {
            return Err(InjectorError::RequirementsNotSatisfied { missing });
        }

        let core = Rc::new_cyclic(|weak| {
            RefCell::new(InjectorCore {
                component: component.clone(),
                memo: FxHashMap::default(),
                multi_memo: FxHashMap::default(),
                in_progress: FxHashSet::default(),
                construction_log: Vec::new(),
                self_weak: weak.clone(),
            })
        });

        Ok(Self { core })
    }

    /// Returns the unique instance for `T`, constructing it - and,
    /// transitively, its dependencies - on first request.
    pub fn get<T: ?Sized + 'static>(&self) -> Result<InstancePtr<T>, InjectorError> {
        let key = TypeKey::of::<T>();
        let (instance, casts) = self.core.borrow_mut().resolve_erased(key)?;
        instance_from_erased(key, instance, &casts)
    }

    /// Returns the unique instance bound for `T` under the annotation tag
    /// `A`.
    pub fn get_annotated<A: ?Sized + 'static, T: ?Sized + 'static>(
        &self,
    ) -> Result<InstancePtr<T>, InjectorError> {
        let key = TypeKey::annotated::<A, T>();
        let (instance, casts) = self.core.borrow_mut().resolve_erased(key)?;
        instance_from_erased(key, instance, &casts)
    }

    /// Returns one instance per multibinding contribution for `T`, in
    /// declaration order. A key without contributions yields an empty vector.
    pub fn get_multibindings<T: ?Sized + 'static>(
        &self,
    ) -> Result<Vec<InstancePtr<T>>, InjectorError> {
        let key = TypeKey::of::<T>();
        self.core
            .borrow_mut()
            .resolve_all_erased(key)?
            .into_iter()
            .map(|(instance, casts)| instance_from_erased(key, instance, &casts))
            .collect()
    }

    /// Convenience for requesting a factory handle:
    /// `injector.factory::<(u32,), Request>()`.
    pub fn factory<Args: 'static, T: 'static>(
        &self,
    ) -> Result<InstancePtr<Factory<Args, T>>, InjectorError> {
        self.get::<Factory<Args, T>>()
    }
}

impl Debug for Injector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("Injector")
            .field("component", &core.component)
            .field("realized", &core.memo.len())
            .finish()
    }
}

struct InjectorCore {
    component: Component,
    memo: FxHashMap<TypeKey, AnyInstancePtr>,
    multi_memo: FxHashMap<(TypeKey, usize), AnyInstancePtr>,
    in_progress: FxHashSet<TypeKey>,
    construction_log: Vec<ConstructionRecord>,
    self_weak: Weak<RefCell<InjectorCore>>,
}

enum ConstructionRecord {
    Unique(TypeKey),
    Contribution(TypeKey, usize),
}

impl InjectorCore {
    fn resolve_dependencies(&mut self, binding: &ResolvedBinding) -> Result<(), InjectorError> {
        for dependency in &binding.dependencies {
            self.resolve_erased(*dependency)?;
        }
        Ok(())
    }
}

impl InstanceResolver for InjectorCore {
    fn resolve_erased(
        &mut self,
        key: TypeKey,
    ) -> Result<(AnyInstancePtr, CastChain), InjectorError> {
        let component = self.component.clone();
        let binding = component
            .graph()
            .binding(key)
            .ok_or(InjectorError::UnboundType(key))?;

        match &binding.strategy {
            Strategy::Instance { instance, casts } => Ok((instance.clone(), casts.clone())),
            Strategy::Alias { target, casts } => {
                if let Some(instance) = self.memo.get(&key) {
                    return Ok((instance.clone(), casts.clone()));
                }
                let (instance, _) = self.resolve_erased(*target)?;
                // the alias shares the target's instance
                self.memo.insert(key, instance.clone());
                Ok((instance, casts.clone()))
            }
            Strategy::Construct { thunk, casts } => {
                if let Some(instance) = self.memo.get(&key) {
                    return Ok((instance.clone(), casts.clone()));
                }
                if !self.in_progress.insert(key) {
                    // sealing rejects cycles; reaching this means a thunk
                    // resolved a key its signature does not declare
                    panic!("dependency cycle re-detected at runtime while constructing '{key}'");
                }

                let instance = self
                    .resolve_dependencies(binding)
                    .and_then(|_| thunk(self));
                self.in_progress.remove(&key);
                let instance = instance?;

                self.memo.insert(key, instance.clone());
                self.construction_log.push(ConstructionRecord::Unique(key));
                trace!(%key, "constructed instance");
                Ok((instance, casts.clone()))
            }
            Strategy::MakeFactory { make_handle, casts } => {
                if let Some(instance) = self.memo.get(&key) {
                    return Ok((instance.clone(), casts.clone()));
                }
                let handle = make_handle(DeferredResolver {
                    core: self.self_weak.clone(),
                });
                self.memo.insert(key, handle.clone());
                self.construction_log.push(ConstructionRecord::Unique(key));
                trace!(%key, "constructed factory handle");
                Ok((handle, casts.clone()))
            }
        }
    }

    fn resolve_all_erased(
        &mut self,
        key: TypeKey,
    ) -> Result<Vec<(AnyInstancePtr, CastChain)>, InjectorError> {
        let component = self.component.clone();
        let contributions = component.graph().contributions(key);

        let mut instances = Vec::with_capacity(contributions.len());
        for contribution in contributions {
            let instance = match &contribution.strategy {
                Strategy::Instance { instance, .. } => instance.clone(),
                Strategy::Alias { target, .. } => self.resolve_erased(*target)?.0,
                Strategy::Construct { thunk, .. } => {
                    let slot = (key, contribution.index);
                    if let Some(instance) = self.multi_memo.get(&slot) {
                        instance.clone()
                    } else {
                        self.resolve_dependencies(contribution)?;
                        let instance = thunk(self)?;
                        self.multi_memo.insert(slot, instance.clone());
                        self.construction_log
                            .push(ConstructionRecord::Contribution(key, contribution.index));
                        trace!(%key, index = contribution.index, "constructed contribution");
                        instance
                    }
                }
                Strategy::MakeFactory { .. } => {
                    debug_assert!(false, "factories cannot be multibinding contributions");
                    continue;
                }
            };
            instances.push((instance, contribution.casts().clone()));
        }

        Ok(instances)
    }

    fn deferred(&self) -> DeferredResolver {
        DeferredResolver {
            core: self.self_weak.clone(),
        }
    }
}

impl Drop for InjectorCore {
    fn drop(&mut self) {
        // release our references in reverse first-construction order; alias
        // entries go with their target so the target's drop is last
        let component = self.component.clone();
        let graph = component.graph();
        for record in self.construction_log.drain(..).rev() {
            match record {
                ConstructionRecord::Unique(key) => {
                    for alias in graph.aliases_of(key) {
                        self.memo.remove(alias);
                    }
                    self.memo.remove(&key);
                }
                ConstructionRecord::Contribution(key, index) => {
                    self.multi_memo.remove(&(key, index));
                }
            }
        }
    }
}

/// A non-owning handle into an injector, held by factory values. Resolution
/// through the handle works exactly as long as the injector is alive.
#[derive(Clone)]
pub struct DeferredResolver {
    core: Weak<RefCell<InjectorCore>>,
}

impl DeferredResolver {
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self { core: Weak::new() }
    }

    pub(crate) fn with_resolver<R>(
        &self,
        operation: impl FnOnce(&mut dyn InstanceResolver) -> R,
    ) -> Result<R, InjectorError> {
        let core = self.core.upgrade().ok_or(InjectorError::InjectorGone)?;
        let mut core = core.borrow_mut();
        Ok(operation(&mut *core))
    }
}

impl Debug for DeferredResolver {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredResolver")
            .field("alive", &(self.core.strong_count() > 0))
            .finish()
    }
}

/// A partially-applied producer: accepts the assisted arguments declared at
/// registration and returns a fresh, unmemoized value per invocation, with
/// injected dependencies resolved through the backing injector.
///
/// Handles are themselves memoized singletons and can be injected into other
/// bindings. Invoke them from user code, not from within a constructor - the
/// backing injector is busy during construction.
pub struct Factory<Args, T> {
    resolver: DeferredResolver,
    produce: ProduceThunk<Args, T>,
}

impl<Args: 'static, T: 'static> Factory<Args, T> {
    pub(crate) fn new(resolver: DeferredResolver, produce: ProduceThunk<Args, T>) -> Self {
        Self { resolver, produce }
    }

    /// Produces a fresh value from the assisted arguments. Injected
    /// dependencies resolve to the injector's singletons.
    pub fn create(&self, args: Args) -> Result<T, InjectorError> {
        self.resolver
            .with_resolver(|resolver| (self.produce)(resolver, args))?
    }
}

impl<Args, T> Debug for Factory<Args, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("resolver", &self.resolver)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::declaration::{BindingKind, Declaration};
    use crate::error::InjectorError;
    use crate::injector::{DeferredResolver, Factory, Injector};
    use crate::instance::{
        default_cast, AnyInstancePtr, InstanceResolver, TypedInstanceResolver,
    };
    use crate::partial::{create_component, ProduceThunk};
    use crate::signature::{Signature, TypeKey};
    use std::rc::Rc;

    #[derive(Default, Debug)]
    struct Lonely;

    #[test]
    fn should_memoize_instances() {
        let component = create_component()
            .register_provider(|| Lonely)
            .seal()
            .unwrap();
        let injector = Injector::new(&component).unwrap();

        let first = injector.get::<Lonely>().unwrap();
        let second = injector.get::<Lonely>().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn should_report_unbound_types() {
        let component = create_component().seal().unwrap();
        let injector = Injector::new(&component).unwrap();

        assert_eq!(
            injector.get::<Lonely>().unwrap_err(),
            InjectorError::UnboundType(TypeKey::of::<Lonely>())
        );
    }

    #[test]
    fn should_reject_components_with_requirements() {
        let component = create_component()
            .register_provider(|_lonely: Rc<Lonely>| 0i8)
            .seal_with_requirements(&[TypeKey::of::<Lonely>()])
            .unwrap();

        assert_eq!(
            Injector::new(&component).unwrap_err(),
            InjectorError::RequirementsNotSatisfied {
                missing: vec![TypeKey::of::<Lonely>()],
            }
        );
    }

    #[test]
    #[should_panic(expected = "cycle re-detected at runtime")]
    fn should_abort_on_runtime_cycle() {
        // a thunk that resolves a key its signature does not declare; the
        // compiler cannot see the edge, so the runtime defense must trip
        let mut partial = create_component();
        partial.declarations.push(Declaration::new(
            BindingKind::Provider {
                target: TypeKey::of::<Lonely>(),
                signature: Signature::nullary(TypeKey::of::<Lonely>()),
                construct: Rc::new(|resolver: &mut dyn InstanceResolver| {
                    resolver.resolve::<Lonely>().map(|instance| instance as AnyInstancePtr)
                }),
                cast: default_cast::<Lonely>,
            },
            0,
        ));

        let component = partial.seal().unwrap();
        let injector = Injector::new(&component).unwrap();
        let _ = injector.get::<Lonely>();
    }

    #[test]
    fn should_fail_factory_use_after_injector_drop() {
        let produce: ProduceThunk<(), Lonely> = Rc::new(|_, _| Ok(Lonely));
        let factory = Factory::new(DeferredResolver::detached(), produce);

        assert_eq!(
            factory.create(()).unwrap_err(),
            InjectorError::InjectorGone
        );
    }
}

//! Sealing: turning the declarations of a [Partial] into a validated,
//! immutable [Component].
//!
//! The compiler flattens installed components (each distinct component
//! contributes its declarations once), indexes declarations per key, rejects
//! duplicates, collapses alias chains, checks that every injected dependency
//! is either bound or covered by the declared requirement contract, rejects
//! cycles over the injected-dependency graph, and emits the binding graph the
//! injector walks. All diagnostics are deterministic: declarations are
//! processed in flattened source order.

use crate::declaration::{BindingKind, Declaration};
use crate::error::SealError;
use crate::partial::Partial;
use crate::signature::TypeKey;
use fxhash::FxHashSet;
use itertools::Itertools;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;
use tracing::debug;

pub(crate) use graph::{BindingGraph, ResolvedBinding, Strategy};

/// Compiler options. The defaults implement the strict behavior; the one knob
/// loosens duplicate handling for redeclarations that are provably identical.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SealOptions {
    tolerate_idempotent_redeclaration: bool,
}

impl SealOptions {
    /// Accept a duplicate declaration when it is exactly the declaration
    /// already present: the same canonical constructor, the same instance
    /// pointer, or the same provider callable. Distinct-but-equivalent
    /// declarations are still rejected.
    pub fn tolerate_idempotent_redeclaration(mut self, tolerate: bool) -> Self {
        self.tolerate_idempotent_redeclaration = tolerate;
        self
    }
}

/// A sealed, validated component: an immutable binding graph plus the
/// requirement contract it was sealed under. Cheap to clone and share across
/// injectors; installing it into another partial merges its declarations.
#[derive(Clone)]
pub struct Component {
    inner: Rc<ComponentInner>,
}

pub(crate) struct ComponentInner {
    /// Declarations as accumulated, installs unexpanded - flattening happens
    /// on every seal so that component identity still deduplicates
    /// grandchildren.
    declarations: Vec<Declaration>,
    graph: BindingGraph,
    required: Vec<TypeKey>,
}

impl Component {
    /// Keys this component provides unique bindings for.
    pub fn provides(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.inner.graph.keys()
    }

    /// Keys of the requirement contract: dependencies a hosting partial must
    /// provide before an injector can exist.
    pub fn requires(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.inner.required.iter().copied()
    }

    /// Whether a unique binding for `key` exists.
    pub fn provides_key(&self, key: TypeKey) -> bool {
        self.inner.graph.binding(key).is_some()
    }

    pub(crate) fn graph(&self) -> &BindingGraph {
        &self.inner.graph
    }

    pub(crate) fn declarations(&self) -> &[Declaration] {
        &self.inner.declarations
    }

    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

impl Debug for Component {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("bindings", &self.inner.graph.unique_count())
            .field("multibinding_sets", &self.inner.graph.set_count())
            .field("required", &self.inner.required)
            .finish()
    }
}

/// Seals a partial under the given requirement contract.
pub(crate) fn compile(
    partial: Partial,
    requirements: &[TypeKey],
    options: SealOptions,
) -> Result<Component, SealError> {
    if let Some(defect) = partial.defects.first() {
        return Err(defect.clone());
    }

    let declared: FxHashSet<TypeKey> = requirements.iter().copied().collect();
    let flattened = flatten(&partial.declarations);
    let (graph, needed) = graph::build(&flattened, &declared, options)?;

    // contract check: every declared requirement must be genuinely required,
    // and not provided by the component itself
    let surplus = declared
        .iter()
        .filter(|key| graph.binding(**key).is_some() || !needed.contains(*key))
        .copied()
        .sorted_by_key(TypeKey::name)
        .collect_vec();
    if !surplus.is_empty() {
        return Err(SealError::RequirementsNotSatisfied { surplus });
    }

    debug!(
        declarations = flattened.len(),
        bindings = graph.unique_count(),
        multibinding_sets = graph.set_count(),
        requirements = requirements.len(),
        "sealed component"
    );

    Ok(Component {
        inner: Rc::new(ComponentInner {
            declarations: partial.declarations,
            graph,
            required: requirements
                .iter()
                .copied()
                .sorted_by_key(TypeKey::name)
                .dedup()
                .collect(),
        }),
    })
}

/// Depth-first install expansion. A component reached twice - directly or
/// through different parents - contributes its declarations only once.
/// Resulting declarations are renumbered in flattened order; diagnostics
/// refer to these indices.
fn flatten(declarations: &[Declaration]) -> Vec<Declaration> {
    fn collect(
        declarations: &[Declaration],
        seen: &mut FxHashSet<usize>,
        out: &mut Vec<Declaration>,
    ) {
        for declaration in declarations {
            match &declaration.kind {
                BindingKind::Install(component) => {
                    if seen.insert(component.identity()) {
                        collect(component.declarations(), seen, out);
                    }
                }
                _ => out.push(declaration.clone()),
            }
        }
    }

    let mut out = Vec::new();
    collect(declarations, &mut FxHashSet::default(), &mut out);
    for (position, declaration) in out.iter_mut().enumerate() {
        declaration.index = position as u32;
    }
    out
}

mod graph {
    use crate::declaration::{BindingKind, Declaration, MultibindingKind};
    use crate::error::SealError;
    use crate::instance::{unresolved_cast, AliasCast, CastChain, CastFunction};
    use crate::component::SealOptions;
    use crate::signature::TypeKey;
    use derivative::Derivative;
    use fxhash::{FxHashMap, FxHashSet};
    use itertools::Itertools;
    use std::rc::Rc;

    /// The validated binding graph of a sealed component.
    #[derive(Debug)]
    pub(crate) struct BindingGraph {
        bindings: FxHashMap<TypeKey, ResolvedBinding>,
        multibindings: FxHashMap<TypeKey, Vec<ResolvedBinding>>,
        /// canonical target -> alias keys resolving to it, in source order;
        /// consulted at teardown so alias memo entries drop with their target
        aliases_by_target: FxHashMap<TypeKey, Vec<TypeKey>>,
        /// all keys, dependencies before dependents
        topo_order: Vec<TypeKey>,
    }

    impl BindingGraph {
        pub(crate) fn binding(&self, key: TypeKey) -> Option<&ResolvedBinding> {
            self.bindings.get(&key)
        }

        pub(crate) fn contributions(&self, key: TypeKey) -> &[ResolvedBinding] {
            self.multibindings
                .get(&key)
                .map(Vec::as_slice)
                .unwrap_or(&[])
        }

        pub(crate) fn aliases_of(&self, key: TypeKey) -> &[TypeKey] {
            self.aliases_by_target
                .get(&key)
                .map(Vec::as_slice)
                .unwrap_or(&[])
        }

        pub(crate) fn keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
            self.topo_order.iter().copied()
        }

        pub(crate) fn unique_count(&self) -> usize {
            self.bindings.len()
        }

        pub(crate) fn set_count(&self) -> usize {
            self.multibindings.len()
        }
    }

    /// A normalized binding: production strategy plus injected dependencies
    /// in canonical (signature) order.
    #[derive(Debug)]
    pub(crate) struct ResolvedBinding {
        pub(crate) key: TypeKey,
        pub(crate) index: usize,
        pub(crate) strategy: Strategy,
        pub(crate) dependencies: Vec<TypeKey>,
    }

    impl ResolvedBinding {
        /// The cast chain recovering the typed pointer this binding exposes.
        pub(crate) fn casts(&self) -> &CastChain {
            match &self.strategy {
                Strategy::Construct { casts, .. }
                | Strategy::Instance { casts, .. }
                | Strategy::MakeFactory { casts, .. }
                | Strategy::Alias { casts, .. } => casts,
            }
        }
    }

    #[derive(Derivative)]
    #[derivative(Debug)]
    pub(crate) enum Strategy {
        Construct {
            #[derivative(Debug = "ignore")]
            thunk: crate::declaration::ConstructorThunk,
            casts: CastChain,
        },
        Instance {
            #[derivative(Debug = "ignore")]
            instance: crate::instance::AnyInstancePtr,
            casts: CastChain,
        },
        MakeFactory {
            #[derivative(Debug = "ignore")]
            make_handle: crate::declaration::FactoryHandleThunk,
            casts: CastChain,
        },
        Alias {
            target: TypeKey,
            casts: CastChain,
        },
    }

    enum Color {
        Gray,
        Black,
    }

    pub(super) fn build(
        flattened: &[Declaration],
        declared: &FxHashSet<TypeKey>,
        options: SealOptions,
    ) -> Result<(BindingGraph, FxHashSet<TypeKey>), SealError> {
        let index = index_declarations(flattened, options)?;
        let bindings = resolve_bindings(&index, declared)?;
        let multibindings = resolve_contributions(&index, declared)?;
        let needed = check_closure(&bindings, &multibindings, declared)?;
        let topo_order = check_cycles(&bindings)?;

        let mut aliases_by_target: FxHashMap<TypeKey, Vec<TypeKey>> = FxHashMap::default();
        for binding in bindings.values().sorted_by_key(|binding| binding.index) {
            if let Strategy::Alias { target, .. } = &binding.strategy {
                aliases_by_target.entry(*target).or_default().push(binding.key);
            }
        }

        Ok((
            BindingGraph {
                bindings,
                multibindings,
                aliases_by_target,
                topo_order,
            },
            needed,
        ))
    }

    struct DeclarationIndex<'a> {
        /// key -> flattened position of its unique declaration
        unique: FxHashMap<TypeKey, usize>,
        /// set key -> contribution declarations, in flattened order
        contributions: FxHashMap<TypeKey, Vec<(usize, &'a MultibindingKind)>>,
        flattened: &'a [Declaration],
    }

    impl<'a> DeclarationIndex<'a> {
        fn declaration(&self, key: TypeKey) -> Option<&'a Declaration> {
            self.unique.get(&key).map(|position| &self.flattened[*position])
        }

        /// The erased cast of a non-alias binding, used as the base of alias
        /// cast chains.
        fn base_cast(&self, key: TypeKey) -> Option<CastFunction> {
            self.declaration(key).and_then(|declaration| match &declaration.kind {
                BindingKind::Constructor { cast, .. }
                | BindingKind::Instance { cast, .. }
                | BindingKind::Provider { cast, .. }
                | BindingKind::Factory { cast, .. } => Some(*cast),
                BindingKind::BindTo { .. }
                | BindingKind::Multibinding(_)
                | BindingKind::Install(_) => None,
            })
        }

        fn alias_edge(&self, key: TypeKey) -> Option<(TypeKey, AliasCast)> {
            self.declaration(key).and_then(|declaration| match &declaration.kind {
                BindingKind::BindTo {
                    implementation,
                    step,
                    ..
                } => Some((*implementation, *step)),
                _ => None,
            })
        }
    }

    fn index_declarations(
        flattened: &[Declaration],
        options: SealOptions,
    ) -> Result<DeclarationIndex<'_>, SealError> {
        let mut unique: FxHashMap<TypeKey, usize> = FxHashMap::default();
        let mut contributions: FxHashMap<TypeKey, Vec<(usize, &MultibindingKind)>> =
            FxHashMap::default();

        for (position, declaration) in flattened.iter().enumerate() {
            match &declaration.kind {
                BindingKind::Multibinding(kind) => {
                    contributions
                        .entry(kind.set_key())
                        .or_default()
                        .push((position, kind));
                    continue;
                }
                BindingKind::Install(_) => {
                    debug_assert!(false, "installs are expanded before indexing");
                    continue;
                }
                BindingKind::BindTo {
                    interface,
                    implementation,
                    ..
                } if interface == implementation => {
                    return Err(SealError::SelfReferentialBind {
                        interface: *interface,
                    });
                }
                _ => {}
            }

            let key = declaration
                .kind
                .provided_key()
                .expect("non-install declarations provide a key");
            if let Some(existing) = unique.get(&key) {
                if is_idempotent(&flattened[*existing].kind, &declaration.kind, options) {
                    continue;
                }
                return Err(SealError::DuplicateBinding {
                    key,
                    first: *existing,
                    second: position,
                });
            }
            unique.insert(key, position);
        }

        Ok(DeclarationIndex {
            unique,
            contributions,
            flattened,
        })
    }

    /// Two `bind`s of the same pair are always interchangeable. Other kinds
    /// are idempotent only under the corresponding option, and only when the
    /// redeclaration is provably the same declaration: the same canonical
    /// constructor, the same instance pointer, or the same callable.
    fn is_idempotent(existing: &BindingKind, duplicate: &BindingKind, options: SealOptions) -> bool {
        match (existing, duplicate) {
            (
                BindingKind::BindTo {
                    implementation: first,
                    ..
                },
                BindingKind::BindTo {
                    implementation: second,
                    ..
                },
            ) => first == second,
            (
                BindingKind::Constructor {
                    signature: first, ..
                },
                BindingKind::Constructor {
                    signature: second, ..
                },
            ) => options.tolerate_idempotent_redeclaration && first == second,
            (
                BindingKind::Instance {
                    instance: first, ..
                },
                BindingKind::Instance {
                    instance: second, ..
                },
            ) => options.tolerate_idempotent_redeclaration && Rc::ptr_eq(first, second),
            (
                BindingKind::Provider {
                    construct: first, ..
                },
                BindingKind::Provider {
                    construct: second, ..
                },
            ) => options.tolerate_idempotent_redeclaration && Rc::ptr_eq(first, second),
            (
                BindingKind::Factory {
                    make_handle: first, ..
                },
                BindingKind::Factory {
                    make_handle: second,
                    ..
                },
            ) => options.tolerate_idempotent_redeclaration && Rc::ptr_eq(first, second),
            _ => false,
        }
    }

    /// Follows an alias chain to its canonical, non-alias end. Returns the
    /// canonical key and the cast hops bottom-up (canonical first).
    fn canonicalize(
        index: &DeclarationIndex<'_>,
        start: TypeKey,
    ) -> Result<(TypeKey, Vec<AliasCast>), SealError> {
        let mut steps = Vec::new();
        let mut visited = vec![start];
        let mut current = start;

        while let Some((target, step)) = index.alias_edge(current) {
            steps.push(step);
            if visited.contains(&target) {
                visited.push(target);
                return Err(SealError::CyclicDependency { path: visited });
            }
            visited.push(target);
            current = target;
        }

        steps.reverse();
        Ok((current, steps))
    }

    /// The cast chain for a key that resolves through `steps` to `canonical`.
    /// A canonical key satisfied externally has no binding yet; its chain is
    /// unusable, which is fine - such components cannot create injectors.
    fn chain_for(
        index: &DeclarationIndex<'_>,
        canonical: TypeKey,
        steps: Vec<AliasCast>,
    ) -> CastChain {
        let base = index.base_cast(canonical).unwrap_or(unresolved_cast);
        CastChain::aliased(base, steps)
    }

    fn resolve_bindings(
        index: &DeclarationIndex<'_>,
        declared: &FxHashSet<TypeKey>,
    ) -> Result<FxHashMap<TypeKey, ResolvedBinding>, SealError> {
        let mut bindings = FxHashMap::default();

        for (key, position) in index
            .unique
            .iter()
            .sorted_by_key(|(_, position)| **position)
        {
            let declaration = &index.flattened[*position];
            let binding = match &declaration.kind {
                BindingKind::Constructor {
                    signature,
                    construct,
                    cast,
                    ..
                }
                | BindingKind::Provider {
                    signature,
                    construct,
                    cast,
                    ..
                } => ResolvedBinding {
                    key: *key,
                    index: *position,
                    strategy: Strategy::Construct {
                        thunk: construct.clone(),
                        casts: CastChain::direct(*cast),
                    },
                    dependencies: signature.injected_keys().collect(),
                },
                BindingKind::Instance { instance, cast, .. } => ResolvedBinding {
                    key: *key,
                    index: *position,
                    strategy: Strategy::Instance {
                        instance: instance.clone(),
                        casts: CastChain::direct(*cast),
                    },
                    dependencies: Vec::new(),
                },
                BindingKind::Factory {
                    signature,
                    make_handle,
                    cast,
                    ..
                } => ResolvedBinding {
                    key: *key,
                    index: *position,
                    strategy: Strategy::MakeFactory {
                        make_handle: make_handle.clone(),
                        casts: CastChain::direct(*cast),
                    },
                    dependencies: signature.injected_keys().collect(),
                },
                BindingKind::BindTo { implementation, .. } => {
                    let (canonical, steps) = canonicalize(index, *key)?;
                    if index.unique.get(&canonical).is_none() && !declared.contains(&canonical) {
                        return Err(SealError::UnsatisfiedDependency {
                            missing: canonical,
                            dependent: *key,
                        });
                    }
                    ResolvedBinding {
                        key: *key,
                        index: *position,
                        strategy: Strategy::Alias {
                            target: canonical,
                            casts: chain_for(index, canonical, steps),
                        },
                        dependencies: vec![*implementation],
                    }
                }
                BindingKind::Multibinding(_) | BindingKind::Install(_) => continue,
            };

            bindings.insert(*key, binding);
        }

        Ok(bindings)
    }

    fn resolve_contributions(
        index: &DeclarationIndex<'_>,
        declared: &FxHashSet<TypeKey>,
    ) -> Result<FxHashMap<TypeKey, Vec<ResolvedBinding>>, SealError> {
        let mut multibindings: FxHashMap<TypeKey, Vec<ResolvedBinding>> = FxHashMap::default();

        for (set_key, entries) in index
            .contributions
            .iter()
            .sorted_by_key(|(_, entries)| entries[0].0)
        {
            let mut resolved = Vec::with_capacity(entries.len());
            for (position, kind) in entries {
                let binding = match kind {
                    MultibindingKind::BindTo {
                        implementation,
                        step,
                        ..
                    } => {
                        let (canonical, mut steps) = canonicalize(index, *implementation)?;
                        if index.unique.get(&canonical).is_none()
                            && !declared.contains(&canonical)
                        {
                            return Err(SealError::UnsatisfiedDependency {
                                missing: canonical,
                                dependent: *set_key,
                            });
                        }
                        steps.push(*step);
                        ResolvedBinding {
                            key: *set_key,
                            index: *position,
                            strategy: Strategy::Alias {
                                target: canonical,
                                casts: chain_for(index, canonical, steps),
                            },
                            dependencies: vec![*implementation],
                        }
                    }
                    MultibindingKind::Instance { instance, cast, .. } => ResolvedBinding {
                        key: *set_key,
                        index: *position,
                        strategy: Strategy::Instance {
                            instance: instance.clone(),
                            casts: CastChain::direct(*cast),
                        },
                        dependencies: Vec::new(),
                    },
                    MultibindingKind::Provider {
                        signature,
                        construct,
                        cast,
                        ..
                    } => ResolvedBinding {
                        key: *set_key,
                        index: *position,
                        strategy: Strategy::Construct {
                            thunk: construct.clone(),
                            casts: CastChain::direct(*cast),
                        },
                        dependencies: signature.injected_keys().collect(),
                    },
                };
                resolved.push(binding);
            }
            multibindings.insert(*set_key, resolved);
        }

        Ok(multibindings)
    }

    /// Every injected dependency must be a unique key or declared as a
    /// requirement. Returns the set of declared requirements actually used.
    fn check_closure(
        bindings: &FxHashMap<TypeKey, ResolvedBinding>,
        multibindings: &FxHashMap<TypeKey, Vec<ResolvedBinding>>,
        declared: &FxHashSet<TypeKey>,
    ) -> Result<FxHashSet<TypeKey>, SealError> {
        let mut needed = FxHashSet::default();

        let all = bindings
            .values()
            .chain(multibindings.values().flatten())
            .sorted_by_key(|binding| binding.index);
        for binding in all {
            for dependency in &binding.dependencies {
                if bindings.contains_key(dependency) {
                    continue;
                }
                if declared.contains(dependency) {
                    needed.insert(*dependency);
                    continue;
                }
                return Err(SealError::UnsatisfiedDependency {
                    missing: *dependency,
                    dependent: binding.key,
                });
            }
        }

        Ok(needed)
    }

    /// Gray/black depth-first search over injected edges. Returns all keys in
    /// dependencies-first order.
    fn check_cycles(
        bindings: &FxHashMap<TypeKey, ResolvedBinding>,
    ) -> Result<Vec<TypeKey>, SealError> {
        fn visit(
            key: TypeKey,
            bindings: &FxHashMap<TypeKey, ResolvedBinding>,
            colors: &mut FxHashMap<TypeKey, Color>,
            path: &mut Vec<TypeKey>,
            topo: &mut Vec<TypeKey>,
        ) -> Result<(), SealError> {
            match colors.get(&key) {
                Some(Color::Black) => return Ok(()),
                Some(Color::Gray) => {
                    let entry = path
                        .iter()
                        .position(|other| *other == key)
                        .expect("gray keys are on the path");
                    let mut cycle = path[entry..].to_vec();
                    cycle.push(key);
                    return Err(SealError::CyclicDependency { path: cycle });
                }
                None => {}
            }

            colors.insert(key, Color::Gray);
            path.push(key);

            if let Some(binding) = bindings.get(&key) {
                for dependency in &binding.dependencies {
                    // externally-satisfied dependencies are leaves
                    if bindings.contains_key(dependency) {
                        visit(*dependency, bindings, colors, path, topo)?;
                    }
                }
            }

            path.pop();
            colors.insert(key, Color::Black);
            topo.push(key);
            Ok(())
        }

        let mut colors = FxHashMap::default();
        let mut topo = Vec::with_capacity(bindings.len());
        for binding in bindings.values().sorted_by_key(|binding| binding.index) {
            visit(binding.key, bindings, &mut colors, &mut Vec::new(), &mut topo)?;
        }
        Ok(topo)
    }

}

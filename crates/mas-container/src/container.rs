//! The service container.
//!
//! Registration and cached instances live behind one `RwLock`. The lock is
//! never held while user code (factories, constructors, decorators) runs, so
//! factories may freely resolve their own dependencies.

use std::any::{Any, type_name};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use mas_core::runtime;
use serde_json::{Map, Value};

use crate::definition::{ConstructorFn, DecoratorFn, Definition, Service, ServiceOptions};
use crate::error::ContainerError;
use crate::stats::{ContainerSummary, ResolutionStats};

struct ServiceEntry {
    definition: Definition,
    singleton: bool,
    tags: BTreeSet<String>,
    metadata: Map<String, Value>,
    decorators: Vec<Arc<DecoratorFn>>,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<String, ServiceEntry>,
    aliases: HashMap<String, String>,
    instances: HashMap<String, Service>,
    classes: HashMap<String, Arc<ConstructorFn>>,
    stats: HashMap<String, ResolutionStats>,
}

impl Registry {
    /// Follow aliases to a canonical id, rejecting cycles.
    fn canonical(&self, id: &str) -> Result<String, ContainerError> {
        let mut current = id.to_string();
        let mut chain = vec![current.clone()];
        let mut seen: HashSet<String> = HashSet::from([current.clone()]);
        while let Some(target) = self.aliases.get(&current) {
            chain.push(target.clone());
            if !seen.insert(target.clone()) {
                return Err(ContainerError::CircularAlias {
                    alias: id.to_string(),
                    chain,
                });
            }
            current = target.clone();
        }
        Ok(current)
    }
}

/// A snapshot of what is needed to build one service outside the lock.
struct BuildPlan {
    definition: Definition,
    decorators: Vec<Arc<DecoratorFn>>,
    singleton: bool,
}

/// Dependency-injection container mapping string ids to lazily built services.
#[derive(Default)]
pub struct ServiceContainer {
    registry: RwLock<Registry>,
}

/// Resolution handle passed to factories, constructors and decorators.
///
/// Carries the in-flight resolution stack of the current `get` call so that
/// nested lookups participate in cycle detection.
pub struct Resolver<'a> {
    container: &'a ServiceContainer,
    stack: &'a mut Vec<String>,
}

impl Resolver<'_> {
    /// Resolve a dependency as a type-erased service.
    ///
    /// # Errors
    ///
    /// Propagates any [`ContainerError`] from the nested resolution.
    pub fn get_raw(&mut self, id: &str) -> Result<Service, ContainerError> {
        self.container.resolve(id, self.stack)
    }

    /// Resolve a dependency and downcast it to `T`.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::TypeMismatch` if the service is not a `T`.
    pub fn get<T: Any + Send + Sync>(&mut self, id: &str) -> Result<Arc<T>, ContainerError> {
        downcast(id, self.get_raw(id)?)
    }

    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.container.has(id)
    }

    /// Ids currently being resolved, outermost first.
    #[must_use]
    pub fn chain(&self) -> &[String] {
        self.stack.as_slice()
    }
}

fn downcast<T: Any + Send + Sync>(id: &str, service: Service) -> Result<Arc<T>, ContainerError> {
    service
        .downcast::<T>()
        .map_err(|_| ContainerError::TypeMismatch {
            id: id.to_string(),
            expected: type_name::<T>(),
        })
}

impl ServiceContainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a service under `id`.
    ///
    /// # Errors
    ///
    /// - `AlreadyRegistered` if `id` names an existing service or alias.
    /// - `InvalidDefinition` for an empty id, an empty class name, or a class
    ///   without a registered constructor.
    pub fn set(
        &self,
        id: &str,
        definition: Definition,
        options: ServiceOptions,
    ) -> Result<(), ContainerError> {
        if id.trim().is_empty() {
            return Err(ContainerError::InvalidDefinition {
                id: id.to_string(),
                reason: "service id must not be empty".into(),
            });
        }

        let mut registry = self.write();
        if registry.entries.contains_key(id) || registry.aliases.contains_key(id) {
            return Err(ContainerError::AlreadyRegistered { id: id.to_string() });
        }
        if let Definition::Class { class, .. } = &definition {
            if class.trim().is_empty() {
                return Err(ContainerError::InvalidDefinition {
                    id: id.to_string(),
                    reason: "class name must not be empty".into(),
                });
            }
            if !registry.classes.contains_key(class) {
                return Err(ContainerError::InvalidDefinition {
                    id: id.to_string(),
                    reason: format!("class '{class}' has no registered constructor"),
                });
            }
        }

        tracing::debug!(service = id, kind = definition.kind(), singleton = options.singleton, "service registered");
        registry.entries.insert(
            id.to_string(),
            ServiceEntry {
                definition,
                singleton: options.singleton,
                tags: options.tags,
                metadata: options.metadata,
                decorators: Vec::new(),
            },
        );
        Ok(())
    }

    /// Register the constructor used for [`Definition::Class`] definitions.
    ///
    /// Re-registering a class replaces its constructor.
    pub fn register_class<F>(&self, class: &str, constructor: F)
    where
        F: Fn(&[Value], &mut Resolver<'_>) -> Result<Service, ContainerError> + Send + Sync + 'static,
    {
        self.write()
            .classes
            .insert(class.to_string(), Arc::new(constructor));
    }

    /// Resolve `id` to a type-erased service.
    ///
    /// # Errors
    ///
    /// `NotFound`, `CircularDependency`, `CircularAlias`, or `Construction`.
    pub fn get_raw(&self, id: &str) -> Result<Service, ContainerError> {
        let mut stack = Vec::new();
        self.resolve(id, &mut stack)
    }

    /// Resolve `id` and downcast it to `T`.
    ///
    /// # Errors
    ///
    /// As [`Self::get_raw`], plus `TypeMismatch` if the service is not a `T`.
    pub fn get<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>, ContainerError> {
        downcast(id, self.get_raw(id)?)
    }

    /// Alias-aware existence check. No side effects.
    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        let registry = self.read();
        registry
            .canonical(id)
            .is_ok_and(|canonical| registry.entries.contains_key(&canonical))
    }

    /// Make `alias` resolve to `id`.
    ///
    /// # Errors
    ///
    /// - `AliasConflict` if `alias` is already a service or alias.
    /// - `NotFound` if `id` does not resolve to a registered service.
    /// - `CircularAlias` if the alias would lead back to itself.
    pub fn alias(&self, alias: &str, id: &str) -> Result<(), ContainerError> {
        let mut registry = self.write();
        if alias == id {
            return Err(ContainerError::CircularAlias {
                alias: alias.to_string(),
                chain: vec![alias.to_string(), id.to_string()],
            });
        }
        if registry.entries.contains_key(alias) || registry.aliases.contains_key(alias) {
            return Err(ContainerError::AliasConflict {
                alias: alias.to_string(),
            });
        }

        // Walk the target's alias chain; reaching `alias` would close a loop.
        let mut chain = vec![alias.to_string(), id.to_string()];
        let mut current = id.to_string();
        while let Some(next) = registry.aliases.get(&current) {
            if next == alias || chain.contains(next) {
                chain.push(next.clone());
                return Err(ContainerError::CircularAlias {
                    alias: alias.to_string(),
                    chain,
                });
            }
            chain.push(next.clone());
            current = next.clone();
        }
        if !registry.entries.contains_key(&current) {
            return Err(ContainerError::NotFound {
                id: id.to_string(),
                chain: Vec::new(),
            });
        }

        registry.aliases.insert(alias.to_string(), id.to_string());
        Ok(())
    }

    /// Decorate an existing service. Decorators run in registration order.
    ///
    /// Any cached singleton instance is dropped so the next `get` rebuilds it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `id` is not registered.
    pub fn extend<F>(&self, id: &str, decorator: F) -> Result<(), ContainerError>
    where
        F: Fn(Service, &mut Resolver<'_>) -> Result<Service, ContainerError> + Send + Sync + 'static,
    {
        let mut registry = self.write();
        let canonical = registry.canonical(id)?;
        let entry = registry
            .entries
            .get_mut(&canonical)
            .ok_or_else(|| ContainerError::NotFound {
                id: id.to_string(),
                chain: Vec::new(),
            })?;
        entry.decorators.push(Arc::new(decorator));
        registry.instances.remove(&canonical);
        tracing::debug!(service = %canonical, "service extended");
        Ok(())
    }

    /// Resolve every service tagged `tag`, in id order.
    ///
    /// # Errors
    ///
    /// Fails on the first service that cannot be resolved.
    pub fn get_by_tag(&self, tag: &str) -> Result<Vec<(String, Service)>, ContainerError> {
        self.tagged_ids(tag)
            .into_iter()
            .map(|id| self.get_raw(&id).map(|service| (id, service)))
            .collect()
    }

    /// Resolve every service tagged `tag` that is a `T`; others are skipped.
    ///
    /// # Errors
    ///
    /// Fails on the first service that cannot be resolved.
    pub fn get_tagged<T: Any + Send + Sync>(&self, tag: &str) -> Result<Vec<Arc<T>>, ContainerError> {
        Ok(self
            .get_by_tag(tag)?
            .into_iter()
            .filter_map(|(_, service)| service.downcast::<T>().ok())
            .collect())
    }

    /// Ids tagged `tag`, sorted.
    #[must_use]
    pub fn tagged_ids(&self, tag: &str) -> Vec<String> {
        let registry = self.read();
        let mut ids: Vec<String> = registry
            .entries
            .iter()
            .filter(|(_, entry)| entry.tags.contains(tag))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Unregister a service and drop its cached instance and stats.
    ///
    /// Aliases pointing at it are left dangling and stop resolving.
    pub fn remove(&self, id: &str) -> bool {
        let mut registry = self.write();
        let Ok(canonical) = registry.canonical(id) else {
            return false;
        };
        registry.instances.remove(&canonical);
        registry.stats.remove(&canonical);
        registry.entries.remove(&canonical).is_some()
    }

    /// Registered service ids, sorted.
    #[must_use]
    pub fn service_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Aliases and their targets.
    #[must_use]
    pub fn aliases(&self) -> BTreeMap<String, String> {
        self.read()
            .aliases
            .iter()
            .map(|(alias, target)| (alias.clone(), target.clone()))
            .collect()
    }

    /// Tags of a service (alias-aware).
    #[must_use]
    pub fn tags(&self, id: &str) -> Option<BTreeSet<String>> {
        let registry = self.read();
        let canonical = registry.canonical(id).ok()?;
        registry.entries.get(&canonical).map(|e| e.tags.clone())
    }

    /// Metadata of a service (alias-aware).
    #[must_use]
    pub fn metadata(&self, id: &str) -> Option<Map<String, Value>> {
        let registry = self.read();
        let canonical = registry.canonical(id).ok()?;
        registry.entries.get(&canonical).map(|e| e.metadata.clone())
    }

    /// Whether a singleton instance is currently cached for `id`.
    #[must_use]
    pub fn is_instantiated(&self, id: &str) -> bool {
        let registry = self.read();
        registry
            .canonical(id)
            .is_ok_and(|canonical| registry.instances.contains_key(&canonical))
    }

    /// Per-service resolution statistics, keyed by canonical id.
    #[must_use]
    pub fn stats(&self) -> BTreeMap<String, ResolutionStats> {
        self.read()
            .stats
            .iter()
            .map(|(id, stats)| (id.clone(), stats.clone()))
            .collect()
    }

    /// Aggregate view of registrations and resolutions.
    #[must_use]
    pub fn summary(&self) -> ContainerSummary {
        let registry = self.read();
        ContainerSummary {
            services: registry.entries.len(),
            singletons: registry.entries.values().filter(|e| e.singleton).count(),
            instantiated: registry.instances.len(),
            aliases: registry.aliases.len(),
            tags: registry
                .entries
                .values()
                .flat_map(|e| e.tags.iter().cloned())
                .collect::<BTreeSet<_>>()
                .len(),
            resolutions: registry.stats.values().map(|s| s.resolutions).sum(),
            cache_hits: registry.stats.values().map(|s| s.cache_hits).sum(),
        }
    }

    pub fn reset_stats(&self) {
        self.write().stats.clear();
    }

    /// Resolve `id` within an in-flight resolution stack.
    fn resolve(&self, id: &str, stack: &mut Vec<String>) -> Result<Service, ContainerError> {
        let canonical = self.read().canonical(id)?;

        if stack.contains(&canonical) {
            let mut chain = stack.clone();
            chain.push(canonical.clone());
            tracing::warn!(service = %canonical, chain = %chain.join(" -> "), "circular dependency");
            return Err(ContainerError::CircularDependency {
                id: canonical,
                chain,
            });
        }

        let plan = {
            let mut registry = self.write();
            if let Some(instance) = registry.instances.get(&canonical).cloned() {
                registry.stats.entry(canonical.clone()).or_default().cache_hits += 1;
                return Ok(instance);
            }
            let entry = registry
                .entries
                .get(&canonical)
                .ok_or_else(|| ContainerError::NotFound {
                    id: canonical.clone(),
                    chain: stack.clone(),
                })?;
            BuildPlan {
                definition: entry.definition.clone(),
                decorators: entry.decorators.clone(),
                singleton: entry.singleton,
            }
        };

        let started = Instant::now();
        let memory_before = runtime::resident_memory_bytes();

        stack.push(canonical.clone());
        let built = self.build(&canonical, plan.definition, &plan.decorators, stack);
        stack.pop();
        let mut service = built?;

        let elapsed = started.elapsed();
        let memory_delta = match (memory_before, runtime::resident_memory_bytes()) {
            (Some(before), Some(after)) => i64::try_from(after).unwrap_or(i64::MAX)
                - i64::try_from(before).unwrap_or(i64::MAX),
            _ => 0,
        };

        let mut registry = self.write();
        if plan.singleton {
            // A concurrent resolution may have cached first; first one wins.
            service = Arc::clone(
                registry
                    .instances
                    .entry(canonical.clone())
                    .or_insert(service),
            );
        }
        registry
            .stats
            .entry(canonical.clone())
            .or_default()
            .record(elapsed, memory_delta, std::mem::size_of_val(&*service));
        tracing::trace!(service = %canonical, elapsed_us = elapsed.as_micros(), "service resolved");

        Ok(service)
    }

    fn build(
        &self,
        id: &str,
        definition: Definition,
        decorators: &[Arc<DecoratorFn>],
        stack: &mut Vec<String>,
    ) -> Result<Service, ContainerError> {
        let mut resolver = Resolver {
            container: self,
            stack,
        };

        let mut service = match definition {
            Definition::Instance(instance) => instance,
            Definition::Factory(factory) => factory(&mut resolver)?,
            Definition::Class { class, arguments } => {
                let constructor = self.read().classes.get(&class).cloned().ok_or_else(|| {
                    ContainerError::InvalidDefinition {
                        id: id.to_string(),
                        reason: format!("class '{class}' has no registered constructor"),
                    }
                })?;
                constructor(&arguments, &mut resolver)?
            }
        };

        for decorator in decorators {
            service = decorator(service, &mut resolver)?;
        }
        Ok(service)
    }
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("services", &self.service_ids())
            .field("aliases", &self.aliases())
            .finish()
    }
}

use crate::dependency::Graph;
use crate::error::{Error, Result};
use crate::monitor::PerformanceMonitor;
use crate::status::{ErrorSink, InitializationStatus, StatusSnapshot, TracingSink};
use crate::unit::{run_lifecycle, InitializationUnit};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Name the manager's own status is recorded under.
pub const MANAGER_STATUS_NAME: &str = "state_manager";

/// Type alias for the registry entry of one unit
type UnitEntry = Arc<tokio::sync::Mutex<Box<dyn InitializationUnit>>>;
/// Type alias for the unit registry
type UnitRegistry = HashMap<String, UnitEntry>;

/// Graph plus everything derived from it.
#[derive(Debug, Default)]
struct Topology {
    graph: Graph,
    /// Registered names in registration order
    registered: Vec<String>,
    order_cache: Option<Vec<String>>,
}

/// Where a unit is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Unregistered,
    Registered,
    Initializing,
    Initialized,
    Failed,
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Unregistered => "unregistered",
            UnitState::Registered => "registered",
            UnitState::Initializing => "initializing",
            UnitState::Initialized => "initialized",
            UnitState::Failed => "failed",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How [`StateManager::initialize_targets`] walks the selected units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Dependency layers one after another, units inside a layer concurrently
    #[default]
    Parallel,
    /// One unit at a time in initialization order
    Sequential,
}

/// Registers initialization units, tracks their dependency edges and drives
/// each unit only after everything it depends on is initialized.
///
/// # Concurrency Model
///
/// All methods take `&self`. Units live behind their own `tokio::sync::Mutex`
/// so independent units can be initialized concurrently; a unit whose mutex
/// is held is reported as [`UnitState::Initializing`].
///
/// # Lock Ordering (to prevent deadlocks)
///
/// When acquiring multiple locks, always acquire in this order:
/// 1. `units` (RwLock)
/// 2. `topology` (parking_lot Mutex, never held across `.await`)
/// 3. Individual unit `Mutex`es
///
/// # Example
///
/// ```no_run
/// use bringup::config::UnitConfig;
/// use bringup::resource::CacheStrategy;
/// use bringup::unit::ResourceUnit;
/// use bringup::StateManager;
///
/// # async fn example() -> bringup::Result<()> {
/// let manager = StateManager::new();
/// let config = UnitConfig::new().with("host", "localhost").with("port", 6379);
/// manager
///     .register_initialization("cache", Box::new(ResourceUnit::new("cache", CacheStrategy, config)), &[])
///     .await?;
/// manager.initialize("cache").await?;
/// assert!(manager.is_all_complete().await);
/// # Ok(())
/// # }
/// ```
pub struct StateManager {
    units: tokio::sync::RwLock<UnitRegistry>,
    topology: parking_lot::Mutex<Topology>,
    status: parking_lot::Mutex<InitializationStatus>,
    monitor: PerformanceMonitor,
    cancellation_token: CancellationToken,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(TracingSink),
            PerformanceMonitor::new(),
            CancellationToken::new(),
        )
    }

    /// Create a builder for constructing a `StateManager`, optionally from a
    /// configuration file.
    pub fn builder() -> super::StateManagerBuilder {
        super::StateManagerBuilder::new()
    }

    pub(super) fn with_parts(
        sink: Arc<dyn ErrorSink>,
        monitor: PerformanceMonitor,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            units: tokio::sync::RwLock::new(HashMap::new()),
            topology: parking_lot::Mutex::new(Topology::default()),
            status: parking_lot::Mutex::new(InitializationStatus::with_sink(
                MANAGER_STATUS_NAME,
                sink,
            )),
            monitor,
            cancellation_token,
        }
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Stop starting new units. Units already running finish their current
    /// attempt (including cleanup) before the run returns `Error::Cancelled`.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Get a child cancellation token for use in spawned tasks.
    pub fn child_token(&self) -> CancellationToken {
        self.cancellation_token.child_token()
    }

    /// Register `unit` under `name` together with the names it depends on.
    ///
    /// Dependencies do not have to be registered yet; that is checked when
    /// the unit is initialized. A dependency that would close a cycle
    /// rejects the whole registration and leaves the manager unchanged.
    #[tracing::instrument(skip(self, unit, dependencies), fields(unit = %name))]
    pub async fn register_initialization(
        &self,
        name: &str,
        mut unit: Box<dyn InitializationUnit>,
        dependencies: &[&str],
    ) -> Result<()> {
        let mut units = self.units.write().await;
        if units.contains_key(name) {
            return Err(Error::DuplicateUnit(name.to_string()));
        }

        {
            let mut topology = self.topology.lock();
            let previous = topology.graph.clone();
            topology.graph.add_node(name);
            for dependency in dependencies {
                if let Err(e) = topology.graph.add_edge(name, dependency) {
                    topology.graph = previous;
                    return Err(e);
                }
            }
            topology.registered.push(name.to_string());
            topology.order_cache = None;

            // Edges added before registration count too
            for dependency in topology.graph.direct_dependencies(name) {
                unit.status_mut().add_dependency(dependency);
            }
        }

        units.insert(name.to_string(), Arc::new(tokio::sync::Mutex::new(unit)));
        tracing::debug!(dependencies = ?dependencies, "Unit registered");
        Ok(())
    }

    /// Declare that `name` depends on `dependency`.
    ///
    /// Adding an existing edge is a no-op. An edge that closes a cycle is
    /// rolled back and reported as `Error::CircularDependency` with the chain
    /// from `name` back to the repeated unit.
    #[tracing::instrument(skip(self))]
    pub async fn add_dependency(&self, name: &str, dependency: &str) -> Result<()> {
        let units = self.units.read().await;
        let entry = units
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnitNotFound(name.to_string()))?;

        let added = {
            let mut topology = self.topology.lock();
            let added = topology.graph.add_edge(name, dependency)?;
            if added {
                topology.order_cache = None;
            }
            added
        };

        if added {
            entry.lock().await.status_mut().add_dependency(dependency);
            tracing::debug!("Dependency added");
        }
        Ok(())
    }

    /// Initialize one unit.
    ///
    /// Every direct dependency must be registered and initialized; otherwise
    /// this fails before any of the unit's steps run. The unit's previous
    /// outcome is cleared before the new attempt.
    pub async fn initialize(&self, name: &str) -> Result<()> {
        self.initialize_unit(name)
            .instrument(tracing::info_span!("initialize", unit = %name))
            .await
    }

    async fn initialize_unit(&self, name: &str) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (entry, dependencies) = {
            let units = self.units.read().await;
            let entry = units
                .get(name)
                .cloned()
                .ok_or_else(|| Error::UnitNotFound(name.to_string()))?;

            let dependencies = self.topology.lock().graph.direct_dependencies(name);
            let mut resolved = Vec::with_capacity(dependencies.len());
            for dependency in dependencies {
                match units.get(&dependency) {
                    Some(dep_entry) => resolved.push((dependency, Arc::clone(dep_entry))),
                    None => {
                        let err = Error::UnregisteredDependency {
                            unit: name.to_string(),
                            dependency,
                        };
                        self.status.lock().add_error(err.to_string());
                        return Err(err);
                    }
                }
            }
            (entry, resolved)
        };

        for (dependency, dep_entry) in &dependencies {
            if !dep_entry.lock().await.status().is_initialized() {
                let err = Error::DependencyNotReady {
                    unit: name.to_string(),
                    dependency: dependency.clone(),
                };
                self.status.lock().add_error(err.to_string());
                return Err(err);
            }
        }

        let mut unit = entry.lock().await;
        unit.status_mut().clear_outcome();
        tracing::info!(kind = %unit.kind(), "Initializing unit");
        run_lifecycle(unit.as_mut(), &self.monitor).await
    }

    /// True iff `name` is registered and its status reports initialized.
    pub async fn is_initialization_complete(&self, name: &str) -> bool {
        let entry = self.units.read().await.get(name).cloned();
        match entry {
            Some(entry) => entry.lock().await.status().is_initialized(),
            None => false,
        }
    }

    /// Registered units with dependencies before dependents.
    ///
    /// Computed as a depth-first postorder in registration order and cached
    /// until the next registration, new edge or reset. Dependencies that
    /// were never registered are left out.
    pub fn initialization_order(&self) -> Result<Vec<String>> {
        let mut topology = self.topology.lock();
        if let Some(ref order) = topology.order_cache {
            return Ok(order.clone());
        }

        let mut order = topology.graph.topological_sort_of(&topology.registered)?;
        order.retain(|name| topology.registered.contains(name));
        topology.order_cache = Some(order.clone());
        Ok(order)
    }

    /// True iff every registered unit reports initialized.
    pub async fn is_all_complete(&self) -> bool {
        let entries: Vec<UnitEntry> = self.units.read().await.values().cloned().collect();
        for entry in entries {
            if !entry.lock().await.status().is_initialized() {
                return false;
            }
        }
        true
    }

    /// Reset the manager's status and the status of every unit.
    ///
    /// Registrations and dependency edges stay; each unit keeps its declared
    /// dependencies.
    #[tracing::instrument(skip(self))]
    pub async fn reset(&self) {
        let units = self.units.read().await;
        let edges: Vec<(UnitEntry, Vec<String>)> = {
            let mut topology = self.topology.lock();
            topology.order_cache = None;
            units
                .iter()
                .map(|(name, entry)| (Arc::clone(entry), topology.graph.direct_dependencies(name)))
                .collect()
        };

        for (entry, dependencies) in edges {
            let mut unit = entry.lock().await;
            let status = unit.status_mut();
            status.reset();
            for dependency in dependencies {
                status.add_dependency(dependency);
            }
        }
        self.status.lock().reset();
        tracing::info!(units = units.len(), "State reset");
    }

    /// Initialize every registered unit, see [`initialize_targets`](Self::initialize_targets).
    pub async fn initialize_all(&self) -> Result<()> {
        self.initialize_targets(&[], RunMode::Parallel).await
    }

    /// Initialize `targets` and everything they depend on (every registered
    /// unit when `targets` is empty).
    ///
    /// Units that are already initialized are skipped. In parallel mode a
    /// layer starts only after the previous one finished; when a layer has
    /// failures the run stops after that layer and returns them (several
    /// failures come back as `Error::Multiple`).
    #[tracing::instrument(skip(self, targets), fields(targets = targets.len()))]
    pub async fn initialize_targets(&self, targets: &[String], mode: RunMode) -> Result<()> {
        let members = self.expand_targets(targets).await?;
        let started = std::time::Instant::now();

        match mode {
            RunMode::Parallel => {
                let groups = self.topology.lock().graph.parallel_groups_of(&members)?;
                for (index, group) in groups.iter().enumerate() {
                    if self.cancellation_token.is_cancelled() {
                        return Err(Error::Cancelled);
                    }

                    let mut pending = Vec::with_capacity(group.len());
                    for name in group {
                        if self.is_initialization_complete(name).await {
                            tracing::debug!(unit = %name, "Already initialized, skipping");
                        } else {
                            pending.push(name.clone());
                        }
                    }
                    tracing::debug!(group = index, units = ?pending, "Starting group");

                    let results = join_all(pending.iter().map(|name| self.initialize(name))).await;
                    let errors: Vec<Error> = results.into_iter().filter_map(|r| r.err()).collect();
                    if let Some(err) = Error::collect(errors) {
                        return Err(err);
                    }
                }
            }
            RunMode::Sequential => {
                let order = self.topology.lock().graph.topological_sort_of(&members)?;
                for name in order.iter().filter(|n| members.contains(n)) {
                    if self.cancellation_token.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    if self.is_initialization_complete(name).await {
                        continue;
                    }
                    self.initialize(name).await?;
                }
            }
        }

        let mut status = self.status.lock();
        status.add_data("units_initialized", members.len());
        status.add_data("elapsed_ms", started.elapsed().as_millis() as u64);
        status.set_initialized(true);
        tracing::info!(units = members.len(), "Initialization complete");
        Ok(())
    }

    /// Registered targets plus their registered transitive dependencies, in
    /// registration order.
    async fn expand_targets(&self, targets: &[String]) -> Result<Vec<String>> {
        let units = self.units.read().await;
        for target in targets {
            if !units.contains_key(target) {
                return Err(Error::UnitNotFound(target.clone()));
            }
        }

        let topology = self.topology.lock();
        if targets.is_empty() {
            return Ok(topology.registered.clone());
        }

        let mut wanted: std::collections::HashSet<String> = targets.iter().cloned().collect();
        for target in targets {
            wanted.extend(topology.graph.transitive_dependencies(target));
        }
        Ok(topology
            .registered
            .iter()
            .filter(|name| wanted.contains(*name))
            .cloned()
            .collect())
    }

    /// Lifecycle position of `name`.
    pub async fn unit_state(&self, name: &str) -> UnitState {
        let entry = self.units.read().await.get(name).cloned();
        let Some(entry) = entry else {
            return UnitState::Unregistered;
        };
        let Ok(unit) = entry.try_lock() else {
            return UnitState::Initializing;
        };
        let status = unit.status();
        if status.is_initialized() {
            UnitState::Initialized
        } else if status.is_failed() {
            UnitState::Failed
        } else {
            UnitState::Registered
        }
    }

    pub async fn status_snapshot(&self, name: &str) -> Result<StatusSnapshot> {
        let entry = self
            .units
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnitNotFound(name.to_string()))?;
        let snapshot = entry.lock().await.status().snapshot();
        Ok(snapshot)
    }

    /// Snapshots of every unit in initialization order.
    pub async fn snapshots(&self) -> Result<Vec<StatusSnapshot>> {
        let order = self.initialization_order()?;
        let mut snapshots = Vec::with_capacity(order.len());
        for name in &order {
            snapshots.push(self.status_snapshot(name).await?);
        }
        Ok(snapshots)
    }

    /// Snapshot of the manager's own status.
    pub fn manager_snapshot(&self) -> StatusSnapshot {
        self.status.lock().snapshot()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.topology.lock().registered.clone()
    }

    /// Direct dependencies declared for `name`.
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.topology.lock().graph.direct_dependencies(name)
    }
}

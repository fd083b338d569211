//! In-memory registry of trucks and packages.
//!
//! The depot is the caller of the allocation engine: it validates requests at
//! the boundary, loads snapshots, runs the engine and applies the returned
//! mutations. Every state change happens inside [`Depot::transaction`], which
//! journals the previous value of each entry it touches and restores them when
//! the closure fails.

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::allocator::{
    self, AllocationConfig, AllocationError, AllocationOutcome, AllocationStrategy, Mutation,
};
use crate::model::{Package, PackageId, PackageStatus, Truck, TruckId, TruckStatus, ValidationError};
use crate::types::Dimensions;

/// Errors raised by depot operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DepotError {
    #[error("Package(s) not found: {}", join_ids(.0))]
    PackagesNotFound(Vec<PackageId>),
    #[error("Package(s) not pending: {}", join_ids(.0))]
    PackagesNotPending(Vec<PackageId>),
    #[error("Truck {0} not found")]
    TruckNotFound(TruckId),
    #[error("Package {0} not found")]
    PackageNotFound(PackageId),
    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Previous value of an entry written during the running transaction.
#[derive(Debug)]
enum Undo {
    Truck(TruckId, Option<Truck>),
    Package(PackageId, Option<Package>),
}

/// Mutable depot contents, handed to transaction closures.
///
/// All writes go through methods that record an [`Undo`] entry first.
#[derive(Debug, Default)]
pub struct DepotState {
    trucks: BTreeMap<TruckId, Truck>,
    packages: BTreeMap<PackageId, Package>,
    last_truck_id: TruckId,
    last_package_id: PackageId,
    journal: Vec<Undo>,
}

impl DepotState {
    pub fn truck(&self, id: TruckId) -> Result<&Truck, DepotError> {
        self.trucks.get(&id).ok_or(DepotError::TruckNotFound(id))
    }

    pub fn package(&self, id: PackageId) -> Result<&Package, DepotError> {
        self.packages.get(&id).ok_or(DepotError::PackageNotFound(id))
    }

    /// AVAILABLE trucks in id order.
    pub fn available_trucks(&self) -> Vec<Truck> {
        self.trucks
            .values()
            .filter(|t| t.is_available())
            .cloned()
            .collect()
    }

    fn truck_mut(&mut self, id: TruckId) -> Result<&mut Truck, DepotError> {
        let truck = self.trucks.get_mut(&id).ok_or(DepotError::TruckNotFound(id))?;
        self.journal.push(Undo::Truck(id, Some(truck.clone())));
        Ok(truck)
    }

    fn package_mut(&mut self, id: PackageId) -> Result<&mut Package, DepotError> {
        let package = self
            .packages
            .get_mut(&id)
            .ok_or(DepotError::PackageNotFound(id))?;
        self.journal.push(Undo::Package(id, Some(package.clone())));
        Ok(package)
    }

    fn insert_truck(&mut self, dims: Dimensions) -> Result<Truck, DepotError> {
        let truck = Truck::new(self.last_truck_id + 1, dims)?;
        self.last_truck_id = truck.id;
        self.journal.push(Undo::Truck(truck.id, None));
        self.trucks.insert(truck.id, truck.clone());
        Ok(truck)
    }

    fn insert_package(&mut self, dims: Dimensions) -> Result<Package, DepotError> {
        let package = Package::new(self.last_package_id + 1, dims)?;
        self.last_package_id = package.id;
        self.journal.push(Undo::Package(package.id, None));
        self.packages.insert(package.id, package.clone());
        Ok(package)
    }

    /// Restores every journaled entry, newest first.
    fn roll_back(&mut self, last_ids: (TruckId, PackageId)) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Truck(id, Some(previous)) => {
                    self.trucks.insert(id, previous);
                }
                Undo::Truck(id, None) => {
                    self.trucks.remove(&id);
                }
                Undo::Package(id, Some(previous)) => {
                    self.packages.insert(id, previous);
                }
                Undo::Package(id, None) => {
                    self.packages.remove(&id);
                }
            }
        }
        (self.last_truck_id, self.last_package_id) = last_ids;
    }

    /// Loads the requested packages in request order.
    ///
    /// Repeated ids are kept once. Missing ids are reported together, sorted.
    fn load_pending_packages(&self, ids: &[PackageId]) -> Result<Vec<Package>, DepotError> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut missing = Vec::new();

        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.packages.get(&id) {
                Some(pkg) => found.push(pkg.clone()),
                None => missing.push(id),
            }
        }

        if !missing.is_empty() {
            missing.sort_unstable();
            return Err(DepotError::PackagesNotFound(missing));
        }

        let mut not_pending: Vec<PackageId> = found
            .iter()
            .filter(|p| p.status != PackageStatus::Pending)
            .map(|p| p.id)
            .collect();
        if !not_pending.is_empty() {
            not_pending.sort_unstable();
            return Err(DepotError::PackagesNotPending(not_pending));
        }

        Ok(found)
    }

    /// Writes engine mutations back into the state.
    fn apply(&mut self, mutations: &[Mutation]) -> Result<(), DepotError> {
        for mutation in mutations {
            match *mutation {
                Mutation::AssignPackage {
                    package_id,
                    truck_id,
                } => {
                    let pkg = self.package_mut(package_id)?;
                    pkg.status = PackageStatus::Assigned;
                    pkg.truck_id = Some(truck_id);
                }
                Mutation::LoadTruck { truck_id } => {
                    self.truck_mut(truck_id)?.status = TruckStatus::Loaded;
                }
            }
        }
        Ok(())
    }

    fn has_unshipped_packages(&self, truck_id: TruckId) -> bool {
        self.packages
            .values()
            .any(|p| p.truck_id == Some(truck_id) && p.status == PackageStatus::Assigned)
    }
}

/// Shared fleet and package registry.
#[derive(Debug, Default)]
pub struct Depot {
    state: RwLock<DepotState>,
    config: AllocationConfig,
}

impl Depot {
    pub fn new(config: AllocationConfig) -> Self {
        Self {
            state: RwLock::new(DepotState::default()),
            config,
        }
    }

    /// Runs `f` against the state under the write lock.
    ///
    /// If `f` returns `Err`, every entry it wrote is restored from the journal
    /// and the id counters are reset. Transactions are serialized.
    pub async fn transaction<T>(
        &self,
        f: impl FnOnce(&mut DepotState) -> Result<T, DepotError>,
    ) -> Result<T, DepotError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let last_ids = (state.last_truck_id, state.last_package_id);
        let result = f(&mut *state);
        match &result {
            Ok(_) => state.journal.clear(),
            Err(err) => {
                debug!(error = %err, undo = state.journal.len(), "transaction rolled back");
                state.roll_back(last_ids);
            }
        }
        result
    }

    /// Registers a new AVAILABLE truck.
    pub async fn add_truck(&self, dims: Dimensions) -> Result<Truck, DepotError> {
        let truck = self.transaction(|state| state.insert_truck(dims)).await?;
        info!(truck_id = truck.id, capacity = %truck.capacity(), "truck added");
        Ok(truck)
    }

    /// Registers a new PENDING package.
    pub async fn add_package(&self, dims: Dimensions) -> Result<Package, DepotError> {
        let package = self.transaction(|state| state.insert_package(dims)).await?;
        info!(package_id = package.id, "package added");
        Ok(package)
    }

    pub async fn trucks(&self) -> Vec<Truck> {
        self.state.read().await.trucks.values().cloned().collect()
    }

    pub async fn packages(&self) -> Vec<Package> {
        self.state.read().await.packages.values().cloned().collect()
    }

    pub async fn truck(&self, id: TruckId) -> Result<Truck, DepotError> {
        self.state.read().await.truck(id).cloned()
    }

    pub async fn package(&self, id: PackageId) -> Result<Package, DepotError> {
        self.state.read().await.package(id).cloned()
    }

    /// Assigns the requested packages to trucks.
    ///
    /// `strategy` falls back to the configured default. Missing or non-pending
    /// packages are rejected before the engine runs; the engine's mutations are
    /// applied atomically.
    pub async fn assign(
        &self,
        package_ids: &[PackageId],
        strategy: Option<AllocationStrategy>,
    ) -> Result<AllocationOutcome, DepotError> {
        let strategy = strategy.unwrap_or(self.config.default_strategy());
        let config = self.config;

        self.transaction(|state| {
            let packages = state.load_pending_packages(package_ids)?;
            let trucks = state.available_trucks();
            let outcome = allocator::assign(&trucks, &packages, strategy, &config)?;
            state.apply(&outcome.mutations)?;
            Ok(outcome)
        })
        .await
    }

    /// Moves a truck back to AVAILABLE or into MAINTENANCE.
    ///
    /// LOADED is reserved for the allocation engine. A truck still holding
    /// ASSIGNED packages cannot be released.
    pub async fn set_truck_status(
        &self,
        id: TruckId,
        status: TruckStatus,
    ) -> Result<Truck, DepotError> {
        let truck = self
            .transaction(|state| {
                if status == TruckStatus::Loaded {
                    return Err(DepotError::InvalidTransition(
                        "trucks are only loaded by an assignment run".to_string(),
                    ));
                }
                if state.has_unshipped_packages(id) {
                    return Err(DepotError::InvalidTransition(format!(
                        "truck {} still holds assigned packages",
                        id
                    )));
                }
                let truck = state.truck_mut(id)?;
                truck.status = status;
                Ok(truck.clone())
            })
            .await?;
        info!(truck_id = id, status = %status, "truck status changed");
        Ok(truck)
    }

    /// Marks an ASSIGNED package as SHIPPED. The truck reference is kept.
    pub async fn ship_package(&self, id: PackageId) -> Result<Package, DepotError> {
        let package = self
            .transaction(|state| {
                let current = state.package(id)?.status;
                if current != PackageStatus::Assigned {
                    return Err(DepotError::InvalidTransition(format!(
                        "package {} is {}, expected ASSIGNED",
                        id, current
                    )));
                }
                let pkg = state.package_mut(id)?;
                pkg.status = PackageStatus::Shipped;
                Ok(pkg.clone())
            })
            .await?;
        info!(package_id = id, "package shipped");
        Ok(package)
    }
}

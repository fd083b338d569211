//! Allocation engine assigning packages to trucks.
//!
//! Two strategies share the same input (fleet snapshot, package batch) and the
//! same output shape:
//! - best-fit-simple: fills the first AVAILABLE truck greedily by descending volume
//! - bin-packing: first-fit across every AVAILABLE truck, then commits or rejects
//!   each truck's tentative load as a unit
//!
//! A truck's load is only accepted once it reaches the utilization threshold
//! (80% by default). The engine does not mutate its input; it returns explicit
//! [`Mutation`] commands that the caller applies inside its own transaction.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::model::{Package, PackageId, Truck, TruckId, ValidationError};
use crate::types::{Dimensional, Volume};

/// Configuration for the allocation engine.
///
/// Built through [`AllocationConfig::builder`], which keeps the threshold
/// within `(0, 1]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AllocationConfig {
    threshold: Decimal,
    default_strategy: AllocationStrategy,
}

impl AllocationConfig {
    /// 0.8
    pub const DEFAULT_THRESHOLD: Decimal = Decimal::from_parts(8, 0, 0, false, 1);
    pub const DEFAULT_STRATEGY: AllocationStrategy = AllocationStrategy::BestFitSimple;

    /// Creates a builder for custom configuration.
    pub fn builder() -> AllocationConfigBuilder {
        AllocationConfigBuilder::default()
    }

    /// Checks that a threshold lies in `(0, 1]`.
    pub fn validate_threshold(threshold: Decimal) -> Result<(), ValidationError> {
        if threshold <= Decimal::ZERO || threshold > Decimal::ONE {
            return Err(ValidationError::InvalidConfiguration(format!(
                "threshold must be greater than 0 and at most 1, got {}",
                threshold
            )));
        }
        Ok(())
    }

    /// Minimum fraction of a truck's capacity a load must reach to be committed.
    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    /// Strategy used when a request does not pick one.
    pub fn default_strategy(&self) -> AllocationStrategy {
        self.default_strategy
    }

    /// Whether a load of `used` volume is acceptable for a truck of `capacity`.
    pub fn accepts(&self, used: Volume, capacity: Volume) -> bool {
        used >= self.threshold * capacity
    }

    /// Threshold as a percentage without trailing zeros (e.g. `80`).
    pub fn threshold_percent(&self) -> Decimal {
        (self.threshold * Decimal::ONE_HUNDRED).normalize()
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            default_strategy: Self::DEFAULT_STRATEGY,
        }
    }
}

/// Builder for AllocationConfig.
#[derive(Clone, Debug, Default)]
pub struct AllocationConfigBuilder {
    config: AllocationConfig,
}

impl AllocationConfigBuilder {
    /// Sets the utilization threshold.
    pub fn threshold(mut self, threshold: Decimal) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Sets the fallback strategy.
    pub fn default_strategy(mut self, strategy: AllocationStrategy) -> Self {
        self.config.default_strategy = strategy;
        self
    }

    pub fn build(self) -> Result<AllocationConfig, ValidationError> {
        AllocationConfig::validate_threshold(self.config.threshold)?;
        Ok(self.config)
    }
}

/// Assignment strategy selected by the caller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Single truck, greedy by descending volume.
    BestFitSimple,
    /// All available trucks, first-fit by descending volume.
    BinPacking,
}

impl AllocationStrategy {
    /// Maps the `use_bin_packing` request flag onto a strategy.
    pub fn from_bin_packing_flag(use_bin_packing: bool) -> Self {
        if use_bin_packing {
            AllocationStrategy::BinPacking
        } else {
            AllocationStrategy::BestFitSimple
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AllocationStrategy::BestFitSimple => "best_fit_simple",
            AllocationStrategy::BinPacking => "bin_packing",
        }
    }
}

/// Errors that abort an allocation run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("No available trucks; please retry later.")]
    NoCapacity,
    #[error("Total package volume exceeds the supported range.")]
    VolumeOverflow,
}

/// State change the caller has to persist after a successful run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// Package becomes ASSIGNED and references the truck.
    AssignPackage {
        package_id: PackageId,
        truck_id: TruckId,
    },
    /// Truck becomes LOADED.
    LoadTruck { truck_id: TruckId },
}

/// Result of one allocation run.
///
/// Every input package id ends up in exactly one of `assigned` and `deferred`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationOutcome {
    pub assigned: Vec<PackageId>,
    pub deferred: Vec<PackageId>,
    pub message: String,
    pub mutations: Vec<Mutation>,
}

impl AllocationOutcome {
    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Trucks that this run transitions to LOADED.
    pub fn loaded_trucks(&self) -> Vec<TruckId> {
        self.mutations
            .iter()
            .filter_map(|m| match m {
                Mutation::LoadTruck { truck_id } => Some(*truck_id),
                Mutation::AssignPackage { .. } => None,
            })
            .collect()
    }
}

/// Runs the strategy chosen by the caller.
///
/// # Parameters
/// * `trucks` - Fleet snapshot; only AVAILABLE trucks are considered
/// * `packages` - Packages to assign, in request order
/// * `strategy` - Which allocator to run
/// * `config` - Threshold settings
pub fn assign(
    trucks: &[Truck],
    packages: &[Package],
    strategy: AllocationStrategy,
    config: &AllocationConfig,
) -> Result<AllocationOutcome, AllocationError> {
    let outcome = match strategy {
        AllocationStrategy::BestFitSimple => allocate_single(trucks, packages, config),
        AllocationStrategy::BinPacking => allocate_multi(trucks, packages, config),
    }?;

    info!(
        strategy = strategy.code(),
        assigned = outcome.assigned_count(),
        deferred = outcome.deferred_count(),
        "allocation finished"
    );
    Ok(outcome)
}

/// Sums volumes, failing instead of overflowing.
fn total_volume(volumes: impl IntoIterator<Item = Volume>) -> Result<Volume, AllocationError> {
    volumes
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, vol| acc.checked_add(vol))
        .ok_or(AllocationError::VolumeOverflow)
}

/// Pairs every package with its volume, largest first.
///
/// `sort_by` is stable, so equal volumes keep their input order.
fn sorted_by_volume_desc(packages: &[Package]) -> Vec<(&Package, Volume)> {
    let mut entries: Vec<(&Package, Volume)> =
        packages.iter().map(|p| (p, p.volume())).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries
}

/// Single-truck allocation (best-fit-simple).
///
/// Takes the first AVAILABLE truck. If the whole batch stays below the
/// threshold, every package is deferred and nothing changes. Otherwise packages
/// are placed largest first while they fit the remaining capacity; a package
/// that does not fit at its turn is deferred.
pub fn allocate_single(
    trucks: &[Truck],
    packages: &[Package],
    config: &AllocationConfig,
) -> Result<AllocationOutcome, AllocationError> {
    let truck = trucks
        .iter()
        .find(|t| t.is_available())
        .ok_or(AllocationError::NoCapacity)?;

    let capacity = truck.capacity();
    let total = total_volume(packages.iter().map(|p| p.volume()))?;

    if !config.accepts(total, capacity) {
        let deferred: Vec<PackageId> = packages.iter().map(|p| p.id).collect();
        debug!(
            truck_id = truck.id,
            %total,
            %capacity,
            "batch below threshold, deferring all packages"
        );
        let message = format!(
            "Load <{}% of truck {}; {} package(s) deferred.",
            config.threshold_percent(),
            truck.id,
            deferred.len()
        );
        return Ok(AllocationOutcome {
            assigned: Vec::new(),
            deferred,
            message,
            mutations: Vec::new(),
        });
    }

    let mut assigned = Vec::new();
    let mut deferred = Vec::new();
    let mut mutations = Vec::new();
    let mut remaining = capacity;

    for (pkg, vol) in sorted_by_volume_desc(packages) {
        if vol <= remaining {
            remaining -= vol;
            assigned.push(pkg.id);
            mutations.push(Mutation::AssignPackage {
                package_id: pkg.id,
                truck_id: truck.id,
            });
            debug!(package_id = pkg.id, truck_id = truck.id, %vol, %remaining, "package placed");
        } else {
            deferred.push(pkg.id);
            debug!(package_id = pkg.id, %vol, %remaining, "package does not fit");
        }
    }

    if !assigned.is_empty() {
        mutations.push(Mutation::LoadTruck { truck_id: truck.id });
    }

    let message = format!(
        "Assigned {} pkg(s) to truck {}; {} deferred.",
        assigned.len(),
        truck.id,
        deferred.len()
    );
    Ok(AllocationOutcome {
        assigned,
        deferred,
        message,
        mutations,
    })
}

/// Provisional load of one truck during bin-packing.
struct TentativeLoad<'a> {
    truck: &'a Truck,
    capacity: Volume,
    remaining: Volume,
    packages: Vec<(&'a Package, Volume)>,
}

impl<'a> TentativeLoad<'a> {
    fn new(truck: &'a Truck) -> Self {
        let capacity = truck.capacity();
        Self {
            truck,
            capacity,
            remaining: capacity,
            packages: Vec::new(),
        }
    }

    fn used(&self) -> Volume {
        self.capacity - self.remaining
    }
}

/// Multi-truck allocation (bin-packing).
///
/// Places packages largest first into the first AVAILABLE truck with enough
/// remaining capacity. Afterwards each truck's tentative load is committed as
/// a whole if it reaches the threshold, or deferred as a whole otherwise.
/// Packages that fit no truck are deferred after the rejected loads.
pub fn allocate_multi(
    trucks: &[Truck],
    packages: &[Package],
    config: &AllocationConfig,
) -> Result<AllocationOutcome, AllocationError> {
    let mut loads: Vec<TentativeLoad<'_>> = trucks
        .iter()
        .filter(|t| t.is_available())
        .map(TentativeLoad::new)
        .collect();
    if loads.is_empty() {
        return Err(AllocationError::NoCapacity);
    }

    let mut unplaced = Vec::new();
    for (pkg, vol) in sorted_by_volume_desc(packages) {
        match loads.iter_mut().find(|load| vol <= load.remaining) {
            Some(load) => {
                load.remaining -= vol;
                load.packages.push((pkg, vol));
                debug!(
                    package_id = pkg.id,
                    truck_id = load.truck.id,
                    %vol,
                    remaining = %load.remaining,
                    "package placed tentatively"
                );
            }
            None => {
                debug!(package_id = pkg.id, %vol, "package fits no truck");
                unplaced.push(pkg.id);
            }
        }
    }

    let mut assigned = Vec::new();
    let mut deferred = Vec::new();
    let mut mutations = Vec::new();

    for load in &loads {
        let used = load.used();
        if !load.packages.is_empty() && config.accepts(used, load.capacity) {
            for (pkg, _) in &load.packages {
                assigned.push(pkg.id);
                mutations.push(Mutation::AssignPackage {
                    package_id: pkg.id,
                    truck_id: load.truck.id,
                });
            }
            mutations.push(Mutation::LoadTruck {
                truck_id: load.truck.id,
            });
            debug!(truck_id = load.truck.id, %used, capacity = %load.capacity, "load committed");
        } else {
            deferred.extend(load.packages.iter().map(|(pkg, _)| pkg.id));
            if !load.packages.is_empty() {
                debug!(truck_id = load.truck.id, %used, capacity = %load.capacity, "load rejected");
            }
        }
    }

    deferred.extend(unplaced);

    let message = format!(
        "Assigned {} pkg(s); {} deferred.",
        assigned.len(),
        deferred.len()
    );
    Ok(AllocationOutcome {
        assigned,
        deferred,
        message,
        mutations,
    })
}

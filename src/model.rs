//! Data models for truck loading.
//!
//! This module defines the value types the allocation engine works on:
//! - `Truck`: a loading unit with a fixed volume capacity and a status
//! - `Package`: a box waiting for, or already placed on, a truck
//!
//! Both are plain snapshots. The engine never mutates them; it returns
//! mutation commands that the caller applies (see `allocator::Mutation`).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::{Dimensional, Dimensions, Volume, validation};

/// Identifier of a truck.
pub type TruckId = u64;

/// Identifier of a package.
pub type PackageId = u64;

/// Validation error for boundary input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Validates all dimensions of a box and hands them back on success.
///
/// # Examples
/// ```
/// use rust_decimal::Decimal;
/// use truck_dispatch::model::validate_dimensions;
/// use truck_dispatch::types::Dimensions;
///
/// let ok = Dimensions::new(Decimal::new(1250, 2), Decimal::ONE, Decimal::ONE);
/// assert!(validate_dimensions(ok).is_ok());
///
/// let flat = Dimensions::new(Decimal::ONE, Decimal::ZERO, Decimal::ONE);
/// assert!(validate_dimensions(flat).is_err());
/// ```
pub fn validate_dimensions(dims: Dimensions) -> Result<Dimensions, ValidationError> {
    validation::validate_dimensions_3d(&dims).map_err(ValidationError::InvalidDimension)?;
    Ok(dims)
}

/// Lifecycle of a truck.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TruckStatus {
    Available,
    Loaded,
    Maintenance,
}

impl TruckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TruckStatus::Available => "AVAILABLE",
            TruckStatus::Loaded => "LOADED",
            TruckStatus::Maintenance => "MAINTENANCE",
        }
    }
}

impl std::fmt::Display for TruckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a package.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageStatus {
    Pending,
    Assigned,
    Shipped,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::Pending => "PENDING",
            PackageStatus::Assigned => "ASSIGNED",
            PackageStatus::Shipped => "SHIPPED",
        }
    }

    /// Whether a package in this status must carry a truck reference.
    pub fn requires_truck(&self) -> bool {
        matches!(self, PackageStatus::Assigned | PackageStatus::Shipped)
    }
}

impl std::fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A truck and its current status.
///
/// # Fields
/// * `id` - Unique identification number
/// * `dims` - Inner cargo dimensions
/// * `status` - Current lifecycle status
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Truck {
    pub id: TruckId,
    pub dims: Dimensions,
    pub status: TruckStatus,
}

impl Truck {
    /// Creates a new AVAILABLE truck after validating its dimensions.
    pub fn new(id: TruckId, dims: Dimensions) -> Result<Self, ValidationError> {
        let dims = validate_dimensions(dims)?;
        Ok(Self {
            id,
            dims,
            status: TruckStatus::Available,
        })
    }

    /// Total cargo volume of the truck.
    pub fn capacity(&self) -> Volume {
        self.dims.volume()
    }

    /// Only AVAILABLE trucks take part in an allocation run.
    pub fn is_available(&self) -> bool {
        self.status == TruckStatus::Available
    }
}

impl Dimensional for Truck {
    fn dimensions(&self) -> Dimensions {
        self.dims
    }
}

/// A package and its current placement.
///
/// `truck_id` is set if and only if the status is ASSIGNED or SHIPPED.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Package {
    pub id: PackageId,
    pub dims: Dimensions,
    pub status: PackageStatus,
    pub truck_id: Option<TruckId>,
}

impl Package {
    /// Creates a new PENDING package after validating its dimensions.
    pub fn new(id: PackageId, dims: Dimensions) -> Result<Self, ValidationError> {
        let dims = validate_dimensions(dims)?;
        Ok(Self {
            id,
            dims,
            status: PackageStatus::Pending,
            truck_id: None,
        })
    }

    /// Checks the status/truck-reference pairing.
    pub fn is_consistent(&self) -> bool {
        self.status.requires_truck() == self.truck_id.is_some()
    }
}

impl Dimensional for Package {
    fn dimensions(&self) -> Dimensions {
        self.dims
    }
}

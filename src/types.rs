//! Common fixed-point types for box-shaped entities.
//!
//! Trucks and packages are both rectangular boxes. Their sizes are stored as
//! exact decimals with two fractional digits, so every volume derived from them
//! stays exact as well.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

/// Scalar volume of a box (length × width × height).
pub type Volume = Decimal;

/// Maximum number of fractional digits accepted for a single dimension.
pub const DIMENSION_SCALE: u32 = 2;

/// Largest accepted value for a single dimension (ten significant digits, two
/// of them fractional).
pub const MAX_DIMENSION: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

/// Length, width and height of a rectangular box.
///
/// # Examples
/// ```
/// use rust_decimal::Decimal;
/// use truck_dispatch::types::{Dimensions, volume};
///
/// let dims = Dimensions::new(Decimal::new(1000, 2), Decimal::new(250, 2), Decimal::new(4, 0));
/// assert_eq!(volume(&dims), Decimal::new(100, 0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Dimensions {
    #[schema(value_type = String, example = json!("120.00"))]
    pub length: Decimal,
    #[schema(value_type = String, example = json!("80.00"))]
    pub width: Decimal,
    #[schema(value_type = String, example = json!("100.00"))]
    pub height: Decimal,
}

impl Dimensions {
    /// Creates dimensions without validation.
    ///
    /// Use [`crate::model::validate_dimensions`] at the boundary.
    #[inline]
    pub const fn new(length: Decimal, width: Decimal, height: Decimal) -> Self {
        Self {
            length,
            width,
            height,
        }
    }

    /// Converts to tuple format (length, width, height).
    #[inline]
    pub const fn as_tuple(&self) -> (Decimal, Decimal, Decimal) {
        (self.length, self.width, self.height)
    }

    /// Exact volume of the box.
    #[inline]
    pub fn volume(&self) -> Volume {
        volume(self)
    }
}

impl From<(Decimal, Decimal, Decimal)> for Dimensions {
    #[inline]
    fn from(tuple: (Decimal, Decimal, Decimal)) -> Self {
        Self::new(tuple.0, tuple.1, tuple.2)
    }
}

/// Computes `length × width × height` in exact decimal arithmetic.
///
/// Inputs are assumed to be validated (strictly positive, at most two
/// fractional digits), so the product carries at most six fractional digits.
pub fn volume(dims: &Dimensions) -> Volume {
    dims.length * dims.width * dims.height
}

/// Trait for anything with box dimensions.
pub trait Dimensional {
    /// Returns the dimensions of the object.
    fn dimensions(&self) -> Dimensions;

    /// Calculates the volume.
    fn volume(&self) -> Volume {
        volume(&self.dimensions())
    }
}

impl Dimensional for Dimensions {
    fn dimensions(&self) -> Dimensions {
        *self
    }
}

/// Validation helpers shared by trucks and packages.
pub mod validation {
    use rust_decimal::Decimal;

    use super::{DIMENSION_SCALE, Dimensions, MAX_DIMENSION};

    /// Validates a single dimension.
    ///
    /// # Parameters
    /// * `value` - The value to validate
    /// * `name` - Name of the dimension for error messages
    ///
    /// # Returns
    /// `Ok(())` for valid values, otherwise error text
    pub fn validate_dimension(value: Decimal, name: &str) -> Result<(), String> {
        if value <= Decimal::ZERO {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        if value.normalize().scale() > DIMENSION_SCALE {
            return Err(format!(
                "{} must have at most {} decimal places, got: {}",
                name, DIMENSION_SCALE, value
            ));
        }
        if value > MAX_DIMENSION {
            return Err(format!(
                "{} must not exceed {}, got: {}",
                name, MAX_DIMENSION, value
            ));
        }
        Ok(())
    }

    /// Validates all three dimensions of a box.
    pub fn validate_dimensions_3d(dims: &Dimensions) -> Result<(), String> {
        validate_dimension(dims.length, "Length")?;
        validate_dimension(dims.width, "Width")?;
        validate_dimension(dims.height, "Height")?;
        Ok(())
    }
}

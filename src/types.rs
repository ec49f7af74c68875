//! Common types for parcel geometry.
//!
//! Every item and every package is described by a canonical `Dimensions`
//! triple: the largest edge is the width, the middle one the length and the
//! smallest the height. Comparisons against carrier limits are therefore
//! independent of how an item was measured.

use serde::Serialize;
use utoipa::ToSchema;

/// Canonically ordered dimensions (width ≥ length ≥ height) in millimeters.
///
/// # Examples
/// ```
/// use correios_frete::types::Dimensions;
///
/// let dims = Dimensions::canonical(100.0, 450.0, 200.0);
/// assert_eq!(dims.as_tuple(), (450.0, 200.0, 100.0));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, ToSchema)]
pub struct Dimensions {
    pub width: f64,
    pub length: f64,
    pub height: f64,
}

impl Dimensions {
    /// Creates dimensions exactly as given, without reordering.
    #[inline]
    pub const fn new(width: f64, length: f64, height: f64) -> Self {
        Self {
            width,
            length,
            height,
        }
    }

    /// Sorts three raw measurements in descending order and labels them
    /// (width, length, height).
    ///
    /// NaN values are ordered as equal to everything; callers validate
    /// their inputs before normalizing.
    pub fn canonical(a: f64, b: f64, c: f64) -> Self {
        let mut sizes = [a, b, c];
        sizes.sort_by(|x, y| y.partial_cmp(x).unwrap_or(std::cmp::Ordering::Equal));
        Self::new(sizes[0], sizes[1], sizes[2])
    }

    /// Creates canonical dimensions from a raw tuple.
    #[inline]
    pub fn from_raw(raw: (f64, f64, f64)) -> Self {
        Self::canonical(raw.0, raw.1, raw.2)
    }

    /// Converts to tuple format for API compatibility.
    #[inline]
    pub const fn as_tuple(&self) -> (f64, f64, f64) {
        (self.width, self.length, self.height)
    }

    /// Product of all three edges.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.width * self.length * self.height
    }

    /// Sum of all three edges, the usual parcel billing limit.
    #[inline]
    pub fn edge_sum(&self) -> f64 {
        self.width + self.length + self.height
    }

    /// Component-wise maximum with a lower bound.
    #[inline]
    pub fn floored_by(&self, floor: &Self) -> Self {
        Self::new(
            self.width.max(floor.width),
            self.length.max(floor.length),
            self.height.max(floor.height),
        )
    }
}

/// Validation functions shared by items and carrier limits.
pub mod validation {

    /// Validates a single strictly positive, finite measurement.
    ///
    /// # Returns
    /// `Ok(())` for valid values, otherwise error text
    pub fn validate_positive(value: f64, name: &str) -> Result<(), String> {
        if value.is_nan() {
            return Err(format!("{} must not be NaN", name));
        }
        if value.is_infinite() {
            return Err(format!("{} must not be infinite", name));
        }
        if value <= 0.0 {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        Ok(())
    }

    /// Validates a limit where zero means "unlimited".
    pub fn validate_limit(value: f64, name: &str) -> Result<(), String> {
        if !value.is_finite() || value < 0.0 {
            return Err(format!(
                "{} must be a finite non-negative number, got: {}",
                name, value
            ));
        }
        Ok(())
    }
}

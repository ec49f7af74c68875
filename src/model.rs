//! Data models for order packing.
//!
//! This module defines the fundamental data structures for carrier packing:
//! - `Item`: A physical product unit with dimensions and weight
//! - `OrderLine`: An item together with the ordered quantity
//! - `PackageConstraint`: The min/max limits a carrier imposes on a box
//! - `Package`: A box accumulating items under the bounding-box/stacking rules
//!
//! Dimensions are millimeters, weights are grams.

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::{Dimensions, validation};

/// Divisor turning a volume in mm³ into a volumetric weight in grams.
///
/// Correios uses 6000 cm³/kg, which is 600 mm³/g.
pub const CUBIC_WEIGHT_DIVISOR: f64 = 600.0;

/// Validation error for item and constraint data.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
}

/// Validates dimensions and weight together.
fn validate_item_params(dims: (f64, f64, f64), weight: f64) -> Result<(), ValidationError> {
    validation::validate_positive(dims.0, "Width").map_err(ValidationError::InvalidDimension)?;
    validation::validate_positive(dims.1, "Depth").map_err(ValidationError::InvalidDimension)?;
    validation::validate_positive(dims.2, "Height").map_err(ValidationError::InvalidDimension)?;
    validation::validate_positive(weight, "Weight").map_err(ValidationError::InvalidWeight)?;
    Ok(())
}

/// Represents one physical unit of a product.
///
/// # Fields
/// * `id` - Identifier of the product
/// * `dims` - Raw dimensions (width, depth, height) in millimeters, any orientation
/// * `weight` - Gross weight in grams
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Item {
    pub id: usize,
    #[schema(value_type = [f64; 3], example = json!([100.0, 200.0, 50.0]))]
    pub dims: (f64, f64, f64),
    pub weight: f64,
}

impl Item {
    /// Creates a new item with validation.
    ///
    /// # Examples
    /// ```
    /// use correios_frete::model::Item;
    ///
    /// assert!(Item::new(1, (100.0, 200.0, 50.0), 2340.0).is_ok());
    /// assert!(Item::new(1, (0.0, 200.0, 50.0), 2340.0).is_err());
    /// ```
    pub fn new(id: usize, dims: (f64, f64, f64), weight: f64) -> Result<Self, ValidationError> {
        validate_item_params(dims, weight)?;
        Ok(Self { id, dims, weight })
    }

    /// Checks an item that bypassed `Item::new` (e.g. deserialized input).
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_item_params(self.dims, self.weight)
    }

    /// Dimensions sorted into width ≥ length ≥ height.
    #[inline]
    pub fn canonical_dims(&self) -> Dimensions {
        Dimensions::from_raw(self.dims)
    }
}

/// One order line: an item and how many units were ordered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderLine {
    pub item: Item,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(item: Item, quantity: u32) -> Self {
        Self { item, quantity }
    }
}

/// Most units one order may expand to; each unit is packed as its own item.
pub const MAX_ORDER_UNITS: u64 = 10_000;

/// Total ordered units, rejecting orders above `MAX_ORDER_UNITS`.
pub fn validate_order_size(lines: &[OrderLine]) -> Result<u64, ValidationError> {
    let units: u64 = lines.iter().map(|line| u64::from(line.quantity)).sum();
    if units > MAX_ORDER_UNITS {
        return Err(ValidationError::InvalidQuantity(format!(
            "order has {} units, at most {} are allowed",
            units, MAX_ORDER_UNITS
        )));
    }
    Ok(units)
}

/// Physical limits for a single package.
///
/// The maximum edges are stored canonically (largest first) so they can be
/// compared directly against canonical item dimensions. The minimum edges are
/// kept as given: they describe the smallest billable box per axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
pub struct PackageConstraint {
    max: Dimensions,
    max_weight: f64,
    max_edges_sum: f64,
    min: Dimensions,
}

impl PackageConstraint {
    /// Creates a constraint.
    ///
    /// # Parameters
    /// * `max_dims` - Maximum edges in any order; canonicalized descending
    /// * `max_weight` - Maximum weight in grams, `0` disables the check
    /// * `max_edges_sum` - Maximum width + length + height, `0` disables the check
    /// * `min_dims` - Minimum (width, length, height), kept as given
    ///
    /// A `max_edges_sum` smaller than the sum of the minimum edges is raised
    /// to that sum.
    pub fn new(
        max_dims: (f64, f64, f64),
        max_weight: f64,
        max_edges_sum: f64,
        min_dims: (f64, f64, f64),
    ) -> Self {
        let min = Dimensions::new(min_dims.0, min_dims.1, min_dims.2);
        let min_edges_sum = min.edge_sum();
        let max_edges_sum = if max_edges_sum < min_edges_sum {
            min_edges_sum
        } else {
            max_edges_sum
        };

        Self {
            max: Dimensions::from_raw(max_dims),
            max_weight,
            max_edges_sum,
            min,
        }
    }

    /// Creates a constraint after checking that every limit is finite and
    /// non-negative.
    pub fn try_new(
        max_dims: (f64, f64, f64),
        max_weight: f64,
        max_edges_sum: f64,
        min_dims: (f64, f64, f64),
    ) -> Result<Self, ValidationError> {
        for (value, name) in [
            (max_dims.0, "Max width"),
            (max_dims.1, "Max length"),
            (max_dims.2, "Max height"),
            (max_edges_sum, "Max edges sum"),
            (min_dims.0, "Min width"),
            (min_dims.1, "Min length"),
            (min_dims.2, "Min height"),
        ] {
            validation::validate_limit(value, name).map_err(ValidationError::InvalidDimension)?;
        }
        validation::validate_limit(max_weight, "Max weight")
            .map_err(ValidationError::InvalidWeight)?;
        Ok(Self::new(max_dims, max_weight, max_edges_sum, min_dims))
    }

    pub fn max_width(&self) -> f64 {
        self.max.width
    }

    pub fn max_length(&self) -> f64 {
        self.max.length
    }

    pub fn max_height(&self) -> f64 {
        self.max.height
    }

    pub fn max_weight(&self) -> f64 {
        self.max_weight
    }

    pub fn max_edges_sum(&self) -> f64 {
        self.max_edges_sum
    }

    pub fn min_width(&self) -> f64 {
        self.min.width
    }

    pub fn min_length(&self) -> f64 {
        self.min.length
    }

    pub fn min_height(&self) -> f64 {
        self.min.height
    }

    /// Minimum billable box as (width, length, height).
    pub fn min_dimensions(&self) -> Dimensions {
        self.min
    }

    /// Checks hypothetical package state against the limits.
    fn admits(&self, dims: &Dimensions, weight: f64) -> bool {
        if dims.width > self.max.width
            || dims.length > self.max.length
            || dims.height > self.max.height
        {
            return false;
        }
        if self.max_weight > 0.0 && weight > self.max_weight {
            return false;
        }
        if self.max_edges_sum > 0.0 && dims.edge_sum() > self.max_edges_sum {
            return false;
        }
        true
    }
}

/// One shippable box.
///
/// Width and length are the largest canonical width/length among the
/// contained items; height is the sum of their canonical heights. When a
/// constraint is attached the reported dimensions never go below its
/// minimum edges.
#[derive(Clone, Debug, PartialEq)]
pub struct Package {
    dims: Dimensions,
    weight: f64,
    items: Vec<Item>,
    constraint: Option<PackageConstraint>,
}

impl Package {
    /// Creates an empty package, optionally bound to a constraint.
    pub fn new(constraint: Option<PackageConstraint>) -> Self {
        Self {
            dims: Dimensions::default(),
            weight: 0.0,
            items: Vec::new(),
            constraint,
        }
    }

    /// State after adding `item`, without committing it.
    fn with_item(&self, item: &Item) -> (Dimensions, f64) {
        let item_dims = item.canonical_dims();
        let dims = Dimensions::new(
            self.dims.width.max(item_dims.width),
            self.dims.length.max(item_dims.length),
            self.dims.height + item_dims.height,
        );
        (dims, self.weight + item.weight)
    }

    /// Checks whether `item` can be added without breaking the constraint.
    ///
    /// Without a constraint every item fits.
    pub fn fits(&self, item: &Item) -> bool {
        match &self.constraint {
            Some(constraint) => {
                let (dims, weight) = self.with_item(item);
                constraint.admits(&dims, weight)
            }
            None => true,
        }
    }

    /// Adds `item` unconditionally; callers check `fits` first.
    pub fn add(&mut self, item: Item) {
        let (dims, weight) = self.with_item(&item);
        self.dims = dims;
        self.weight = weight;
        self.items.push(item);
    }

    /// Number of items in the package.
    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Contained items in insertion order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn constraint(&self) -> Option<&PackageConstraint> {
        self.constraint.as_ref()
    }

    /// Accumulated dimensions without the minimum-size floor.
    pub fn raw_dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn width(&self) -> f64 {
        match &self.constraint {
            Some(c) => self.dims.width.max(c.min_width()),
            None => self.dims.width,
        }
    }

    pub fn length(&self) -> f64 {
        match &self.constraint {
            Some(c) => self.dims.length.max(c.min_length()),
            None => self.dims.length,
        }
    }

    pub fn height(&self) -> f64 {
        match &self.constraint {
            Some(c) => self.dims.height.max(c.min_height()),
            None => self.dims.height,
        }
    }

    /// Total weight in grams.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Reported (floored) width, length and height.
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width(), self.length(), self.height())
    }

    /// Volume of the reported (floored) box in mm³.
    pub fn volume(&self) -> f64 {
        self.dimensions().volume()
    }

    /// Volumetric weight in grams.
    pub fn cubic_weight(&self) -> f64 {
        self.volume() / CUBIC_WEIGHT_DIVISOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: usize, dims: (f64, f64, f64), weight: f64) -> Item {
        Item::new(id, dims, weight).unwrap()
    }

    fn sample_constraint() -> PackageConstraint {
        PackageConstraint::new((450.0, 200.0, 100.0), 32000.0, 2100.0, (120.0, 150.0, 80.0))
    }

    #[test]
    fn item_validation_rejects_zero_values() {
        assert!(Item::new(1, (0.0, 10.0, 10.0), 1.0).is_err());
        assert!(Item::new(1, (10.0, 0.0, 10.0), 1.0).is_err());
        assert!(Item::new(1, (10.0, 10.0, 0.0), 1.0).is_err());
        assert!(matches!(
            Item::new(1, (10.0, 10.0, 10.0), 0.0),
            Err(ValidationError::InvalidWeight(_))
        ));
    }

    #[test]
    fn empty_package_without_constraint_is_zero() {
        let pkg = Package::new(None);
        assert_eq!(pkg.width(), 0.0);
        assert_eq!(pkg.length(), 0.0);
        assert_eq!(pkg.height(), 0.0);
        assert_eq!(pkg.weight(), 0.0);
        assert_eq!(pkg.count(), 0);
        assert_eq!(pkg.volume(), 0.0);
    }

    #[test]
    fn package_without_constraint_stacks_items() {
        let p1 = item(1, (100.0, 200.0, 50.0), 2340.0);
        let p2 = item(2, (168.0, 365.0, 50.0), 1204.0);

        let mut pkg = Package::new(None);
        pkg.add(p1.clone());
        assert_eq!(pkg.width(), 200.0);
        assert_eq!(pkg.length(), 100.0);
        assert_eq!(pkg.height(), 50.0);
        assert_eq!(pkg.weight(), 2340.0);
        assert_eq!(pkg.volume(), 200.0 * 100.0 * 50.0);

        pkg.add(p1);
        assert_eq!(pkg.height(), 100.0);
        assert_eq!(pkg.weight(), 4680.0);
        assert_eq!(pkg.count(), 2);

        pkg.add(p2);
        assert_eq!(pkg.width(), 365.0);
        assert_eq!(pkg.length(), 168.0);
        assert_eq!(pkg.height(), 150.0);
        assert_eq!(pkg.weight(), 4680.0 + 1204.0);
        assert_eq!(pkg.count(), 3);
        assert_eq!(pkg.items()[2].id, 2);
    }

    #[test]
    fn unconstrained_package_accepts_anything() {
        let mut pkg = Package::new(None);
        let tall = item(1, (10_000.0, 10_000.0, 10_000.0), 1_000_000.0);
        for _ in 0..5 {
            assert!(pkg.fits(&tall));
            pkg.add(tall.clone());
        }
        assert_eq!(pkg.height(), 50_000.0);
    }

    #[test]
    fn package_invariants_hold_after_adds() {
        let items = [
            item(1, (30.0, 10.0, 20.0), 5.0),
            item(2, (5.0, 50.0, 40.0), 7.5),
            item(3, (12.0, 12.0, 12.0), 1.0),
        ];
        let mut pkg = Package::new(None);
        for it in &items {
            pkg.add(it.clone());
        }

        let dims: Vec<Dimensions> = items.iter().map(|i| i.canonical_dims()).collect();
        let raw = pkg.raw_dimensions();
        assert_eq!(raw.height, dims.iter().map(|d| d.height).sum::<f64>());
        assert_eq!(raw.width, dims.iter().map(|d| d.width).fold(0.0, f64::max));
        assert_eq!(raw.length, dims.iter().map(|d| d.length).fold(0.0, f64::max));
        assert_eq!(pkg.weight(), 13.5);
    }

    #[test]
    fn constraint_keeps_canonical_max_dims() {
        let constraint = sample_constraint();
        assert_eq!(constraint.max_width(), 450.0);
        assert_eq!(constraint.max_length(), 200.0);
        assert_eq!(constraint.max_height(), 100.0);
        assert_eq!(constraint.max_weight(), 32000.0);
        assert_eq!(constraint.max_edges_sum(), 2100.0);
        assert_eq!(constraint.min_width(), 120.0);
        assert_eq!(constraint.min_length(), 150.0);
        assert_eq!(constraint.min_height(), 80.0);
    }

    #[test]
    fn constraint_sorts_max_dims() {
        let a = PackageConstraint::new((200.0, 450.0, 100.0), 0.0, 0.0, (0.0, 0.0, 0.0));
        assert_eq!(
            (a.max_width(), a.max_length(), a.max_height()),
            (450.0, 200.0, 100.0)
        );

        let b = PackageConstraint::new((450.0, 700.0, 610.0), 32000.0, 1760.0, (120.0, 150.0, 80.0));
        assert_eq!(b.max_width(), 700.0);
        assert_eq!(b.max_length(), 610.0);
        assert_eq!(b.max_height(), 450.0);
        assert_eq!(b.min_width(), 120.0);
        assert_eq!(b.min_length(), 150.0);
        assert_eq!(b.min_height(), 80.0);
    }

    #[test]
    fn constraint_raises_edges_sum_to_min_floor() {
        let constraint = PackageConstraint::new((450.0, 200.0, 100.0), 0.0, 100.0, (120.0, 150.0, 80.0));
        assert_eq!(constraint.max_edges_sum(), 350.0);
    }

    #[test]
    fn constraint_try_new_rejects_negative_limits() {
        assert!(
            PackageConstraint::try_new((450.0, -1.0, 100.0), 0.0, 0.0, (0.0, 0.0, 0.0)).is_err()
        );
        assert!(
            PackageConstraint::try_new((450.0, 200.0, 100.0), f64::NAN, 0.0, (0.0, 0.0, 0.0))
                .is_err()
        );
        assert!(
            PackageConstraint::try_new((450.0, 200.0, 100.0), 0.0, 0.0, (0.0, 0.0, 0.0)).is_ok()
        );
    }

    #[test]
    fn empty_constrained_package_reports_minimum_size() {
        let pkg = Package::new(Some(sample_constraint()));
        assert_eq!(pkg.width(), 120.0);
        assert_eq!(pkg.length(), 150.0);
        assert_eq!(pkg.height(), 80.0);
        assert_eq!(pkg.volume(), 120.0 * 150.0 * 80.0);
        assert_eq!(pkg.cubic_weight(), 120.0 * 150.0 * 80.0 / 600.0);
    }

    #[test]
    fn constrained_fits_checks_every_axis() {
        let pkg = Package::new(Some(sample_constraint()));

        assert!(!pkg.fits(&item(1, (500.0, 200.0, 100.0), 32000.0)));
        assert!(!pkg.fits(&item(2, (100.0, 300.0, 460.0), 32000.0)));
        assert!(!pkg.fits(&item(3, (450.0, 210.0, 100.0), 32000.0)));
        assert!(!pkg.fits(&item(4, (450.0, 200.0, 110.0), 32000.0)));
        assert!(pkg.fits(&item(5, (450.0, 200.0, 100.0), 32000.0)));
        assert!(pkg.fits(&item(6, (300.0, 200.0, 100.0), 32000.0)));
        assert!(pkg.fits(&item(7, (100.0, 200.0, 400.0), 32000.0)));
        assert!(!pkg.fits(&item(8, (500.0, 500.0, 500.0), 32000.0)));
    }

    #[test]
    fn constrained_fits_rejects_exceeded_height() {
        let constraint =
            PackageConstraint::new((450.0, 700.0, 610.0), 32000.0, 1760.0, (120.0, 150.0, 80.0));
        let mut pkg = Package::new(Some(constraint));

        let p1 = item(1, (500.0, 200.0, 400.0), 5000.0);
        assert!(pkg.fits(&p1));
        pkg.add(p1);

        let p2 = item(2, (500.0, 250.0, 400.0), 5000.0);
        assert!(pkg.fits(&p2));
        pkg.add(p2);

        let p3 = item(3, (500.0, 10.0, 400.0), 5000.0);
        assert!(!pkg.fits(&p3));
    }

    #[test]
    fn constrained_fits_accepts_items_below_minimum() {
        let constraint =
            PackageConstraint::new((450.0, 700.0, 610.0), 32000.0, 1760.0, (120.0, 150.0, 80.0));
        let mut pkg = Package::new(Some(constraint));
        let tiny = item(1, (10.0, 10.0, 10.0), 1000.0);
        assert!(pkg.fits(&tiny));
        pkg.add(tiny);
        assert_eq!(pkg.width(), 120.0);
        assert_eq!(pkg.raw_dimensions().width, 10.0);
    }

    #[test]
    fn constrained_fits_checks_weight() {
        let constraint = PackageConstraint::new((1000.0, 1000.0, 1000.0), 10000.0, 0.0, (0.0, 0.0, 0.0));
        let mut pkg = Package::new(Some(constraint));
        let heavy = item(1, (10.0, 10.0, 10.0), 6000.0);
        assert!(pkg.fits(&heavy));
        pkg.add(heavy.clone());
        assert!(!pkg.fits(&heavy));
        assert!(pkg.fits(&item(2, (10.0, 10.0, 10.0), 4000.0)));
    }

    #[test]
    fn zero_weight_limit_disables_weight_check() {
        let constraint = PackageConstraint::new((1000.0, 1000.0, 1000.0), 0.0, 0.0, (0.0, 0.0, 0.0));
        let pkg = Package::new(Some(constraint));
        assert!(pkg.fits(&item(1, (10.0, 10.0, 10.0), 1_000_000.0)));
    }

    #[test]
    fn constrained_fits_checks_edges_sum() {
        let constraint = PackageConstraint::new((500.0, 500.0, 500.0), 0.0, 600.0, (0.0, 0.0, 0.0));
        let mut pkg = Package::new(Some(constraint));
        let flat = item(1, (300.0, 200.0, 50.0), 100.0);
        assert!(pkg.fits(&flat));
        pkg.add(flat.clone());
        // 300 + 200 + 100 = 600 is still allowed
        assert!(pkg.fits(&flat));
        pkg.add(flat.clone());
        assert!(!pkg.fits(&flat));
    }
}

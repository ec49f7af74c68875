//! Greedy order packing.
//!
//! Items are processed in order-line order. Each item goes into the current
//! package if it fits; otherwise a new package is opened. If an item does not
//! fit even into an empty package, the whole order cannot be shipped with the
//! given constraint.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::model::{
    Item, OrderLine, Package, PackageConstraint, ValidationError, validate_order_size,
};

/// Packing failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PackingError {
    /// A single item exceeds the limits of an empty package.
    #[error("item {item_id} does not fit into an empty package")]
    Impossible { item_id: usize },
    /// The order lines were rejected before packing.
    #[error(transparent)]
    InvalidOrder(#[from] ValidationError),
}

/// Events emitted while packing, for live visualization.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum PackEvent {
    /// A new package was started.
    PackageOpened { id: usize },
    /// An item was placed into a package.
    ItemPacked {
        package_id: usize,
        item_id: usize,
        #[schema(value_type = [f64; 3])]
        dims: (f64, f64, f64),
        weight: f64,
        total_weight: f64,
    },
    /// A package was closed with its final billable size.
    PackageClosed {
        id: usize,
        items: usize,
        #[schema(value_type = [f64; 3])]
        dims: (f64, f64, f64),
        weight: f64,
    },
    /// Packing was aborted because an item never fits.
    PackingImpossible { item_id: usize },
    /// Packing finished.
    Finished { packages: usize },
}

/// Expands order lines into one item per ordered unit, keeping line order.
///
/// Items without a positive width, depth, height or weight are dropped with a
/// warning instead of failing the whole order. Orders above
/// `MAX_ORDER_UNITS` units are rejected before anything is allocated.
pub fn expand_lines(lines: &[OrderLine]) -> Result<Vec<Item>, ValidationError> {
    let units = validate_order_size(lines)?;
    let mut items = Vec::with_capacity(units as usize);
    for line in lines {
        if let Err(err) = line.item.validate() {
            warn!(
                item_id = line.item.id,
                error = %err,
                "skipping misconfigured item; configure its dimensions and weight"
            );
            continue;
        }
        items.extend(std::iter::repeat_n(line.item.clone(), line.quantity as usize));
    }
    Ok(items)
}

/// Packs items into packages under an optional constraint.
#[derive(Clone, Copy, Debug, Default)]
pub struct Packer {
    constraint: Option<PackageConstraint>,
}

impl Packer {
    pub fn new(constraint: Option<PackageConstraint>) -> Self {
        Self { constraint }
    }

    pub fn constraint(&self) -> Option<&PackageConstraint> {
        self.constraint.as_ref()
    }

    /// Creates an empty package bound to this packer's constraint.
    pub fn new_package(&self) -> Package {
        Package::new(self.constraint)
    }

    /// Packs already expanded items.
    ///
    /// # Returns
    /// The closed packages in creation order, or `PackingError::Impossible`
    /// for the first item that does not fit into an empty package.
    pub fn pack(&self, items: Vec<Item>) -> Result<Vec<Package>, PackingError> {
        self.pack_with_progress(items, |_| {})
    }

    /// Expands the order lines and packs the result.
    pub fn pack_lines(&self, lines: &[OrderLine]) -> Result<Vec<Package>, PackingError> {
        self.pack(expand_lines(lines)?)
    }

    /// Packs items and reports every step to `on_event`.
    pub fn pack_with_progress(
        &self,
        items: Vec<Item>,
        mut on_event: impl FnMut(&PackEvent),
    ) -> Result<Vec<Package>, PackingError> {
        let mut packages: Vec<Package> = Vec::new();
        let mut current = self.new_package();
        let mut current_opened = false;

        for item in items {
            if !current.fits(&item) {
                if !self.new_package().fits(&item) {
                    debug!(item_id = item.id, "item does not fit into an empty package");
                    on_event(&PackEvent::PackingImpossible { item_id: item.id });
                    return Err(PackingError::Impossible { item_id: item.id });
                }

                let closed = std::mem::replace(&mut current, self.new_package());
                current_opened = false;
                close_package(closed, &mut packages, &mut on_event);
            }

            if !current_opened {
                debug!(package = packages.len() + 1, "opening package");
                on_event(&PackEvent::PackageOpened {
                    id: packages.len() + 1,
                });
                current_opened = true;
            }

            let item_id = item.id;
            let dims = item.dims;
            let weight = item.weight;
            current.add(item);
            on_event(&PackEvent::ItemPacked {
                package_id: packages.len() + 1,
                item_id,
                dims,
                weight,
                total_weight: current.weight(),
            });
        }

        close_package(current, &mut packages, &mut on_event);

        on_event(&PackEvent::Finished {
            packages: packages.len(),
        });
        Ok(packages)
    }
}

/// Appends a package to the output if it holds at least one item.
fn close_package(
    package: Package,
    packages: &mut Vec<Package>,
    on_event: &mut impl FnMut(&PackEvent),
) {
    if package.is_empty() {
        return;
    }
    let id = packages.len() + 1;
    debug!(
        package = id,
        items = package.count(),
        weight = package.weight(),
        "closing package"
    );
    on_event(&PackEvent::PackageClosed {
        id,
        items: package.count(),
        dims: package.dimensions().as_tuple(),
        weight: package.weight(),
    });
    packages.push(package);
}

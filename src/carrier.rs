//! The Correios carrier: packs an order, quotes every package and turns the
//! results into a shipping price, a delivery estimate and availability
//! reasons.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::aggregator::{
    AggregationError, DeliveryRange, aggregate_delivery, aggregate_price, availability_errors,
};
use crate::cache::{QuoteCache, QuoteRequest, QuoteStore};
use crate::correios::{CorreiosError, QuoteFetcher};
use crate::model::{OrderLine, Package, PackageConstraint, ValidationError};
use crate::packer::{Packer, PackingError};
use crate::quote::{QuoteResult, ServiceCode};
use crate::types::Dimensions;

const KG_TO_G: f64 = 1000.0;

/// Size and weight limits of one service, in millimeters and kilograms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PackageLimits {
    /// `0` disables the weight check.
    pub max_weight_kg: f64,
    pub min_width: f64,
    pub max_width: f64,
    pub min_length: f64,
    pub max_length: f64,
    pub min_height: f64,
    pub max_height: f64,
    pub max_edges_sum: f64,
}

impl PackageLimits {
    pub const DEFAULT_MAX_WEIGHT_KG: f64 = 0.0;
    pub const DEFAULT_MIN_WIDTH: f64 = 160.0;
    pub const DEFAULT_MAX_WIDTH: f64 = 1050.0;
    pub const DEFAULT_MIN_LENGTH: f64 = 110.0;
    pub const DEFAULT_MAX_LENGTH: f64 = 1050.0;
    pub const DEFAULT_MIN_HEIGHT: f64 = 20.0;
    pub const DEFAULT_MAX_HEIGHT: f64 = 1050.0;
    pub const DEFAULT_MAX_EDGES_SUM: f64 = 2000.0;

    /// Package constraint with the weight converted to grams.
    pub fn constraint(&self) -> PackageConstraint {
        PackageConstraint::new(
            (self.max_width, self.max_length, self.max_height),
            self.max_weight_kg * KG_TO_G,
            self.max_edges_sum,
            (self.min_width, self.min_length, self.min_height),
        )
    }

    /// Smallest box size the service bills.
    pub fn min_dimensions(&self) -> Dimensions {
        Dimensions::new(self.min_width, self.min_length, self.min_height)
    }
}

impl Default for PackageLimits {
    fn default() -> Self {
        Self {
            max_weight_kg: Self::DEFAULT_MAX_WEIGHT_KG,
            min_width: Self::DEFAULT_MIN_WIDTH,
            max_width: Self::DEFAULT_MAX_WIDTH,
            min_length: Self::DEFAULT_MIN_LENGTH,
            max_length: Self::DEFAULT_MAX_LENGTH,
            min_height: Self::DEFAULT_MIN_HEIGHT,
            max_height: Self::DEFAULT_MAX_HEIGHT,
            max_edges_sum: Self::DEFAULT_MAX_EDGES_SUM,
        }
    }
}

/// Configuration of one Correios shipping service.
#[derive(Clone, Debug, PartialEq)]
pub struct CarrierSettings {
    pub service: ServiceCode,
    /// Contract specific service code; replaces the standard code when set.
    pub contract_service_code: Option<String>,
    pub origin_postal_code: String,
    pub company_code: Option<String>,
    pub password: Option<String>,
    pub hand_delivery: bool,
    /// Declare the order's product total as insured value.
    pub declared_value: bool,
    pub receipt_notice: bool,
    /// Added once to the summed package prices.
    pub additional_price: Decimal,
    /// Added to both bounds of the delivery range.
    pub additional_delivery_days: u32,
    pub limits: PackageLimits,
}

impl CarrierSettings {
    pub const DEFAULT_ORIGIN_POSTAL_CODE: &'static str = "99999999";

    pub fn new(service: ServiceCode) -> Self {
        Self {
            service,
            contract_service_code: None,
            origin_postal_code: Self::DEFAULT_ORIGIN_POSTAL_CODE.to_string(),
            company_code: None,
            password: None,
            hand_delivery: false,
            declared_value: false,
            receipt_notice: false,
            additional_price: Decimal::ZERO,
            additional_delivery_days: 0,
            limits: PackageLimits::default(),
        }
    }

    /// Code sent as `nCdServico`.
    pub fn service_code(&self) -> String {
        match self.contract_service_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => code.to_string(),
            _ => self.service.code().to_string(),
        }
    }

    pub fn constraint(&self) -> PackageConstraint {
        self.limits.constraint()
    }
}

impl Default for CarrierSettings {
    fn default() -> Self {
        Self::new(ServiceCode::Pac)
    }
}

/// The order to be shipped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderSource {
    pub lines: Vec<OrderLine>,
    pub shipping_postal_code: Option<String>,
    pub billing_postal_code: Option<String>,
    pub products_total: Decimal,
}

impl OrderSource {
    /// Destination postal code as digits only; the billing address is used
    /// when there is no usable shipping address.
    pub fn destination_postal_code(&self) -> Option<String> {
        [&self.shipping_postal_code, &self.billing_postal_code]
            .into_iter()
            .flatten()
            .map(|raw| digits(raw))
            .find(|code| !code.is_empty())
    }
}

fn digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Why the carrier cannot serve an order.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnavailabilityReason {
    ItemsCannotBePacked {
        item_id: usize,
    },
    NothingToShip,
    MissingDestination,
    ServiceUnreachable,
    PackageUndeliverable {
        package_index: usize,
        code: i32,
        message: String,
    },
}

impl fmt::Display for UnavailabilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailabilityReason::ItemsCannotBePacked { .. } => {
                write!(f, "Some items could not be packed within the Correios limits.")
            }
            UnavailabilityReason::NothingToShip => write!(f, "The order has no shippable items."),
            UnavailabilityReason::MissingDestination => {
                write!(f, "The order has no destination postal code.")
            }
            UnavailabilityReason::ServiceUnreachable => {
                write!(f, "The Correios services could not be contacted.")
            }
            UnavailabilityReason::PackageUndeliverable { .. } => {
                write!(f, "Some items cannot be delivered by Correios.")
            }
        }
    }
}

/// Failure to quote an order.
#[derive(Debug, Error)]
pub enum CarrierError {
    #[error(transparent)]
    PackingImpossible(PackingError),
    #[error(transparent)]
    InvalidOrder(ValidationError),
    #[error("the order has no shippable items")]
    NothingToShip,
    #[error("the order has no destination postal code")]
    MissingDestination,
    #[error(transparent)]
    Remote(#[from] CorreiosError),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

impl From<PackingError> for CarrierError {
    fn from(err: PackingError) -> Self {
        match err {
            PackingError::InvalidOrder(invalid) => CarrierError::InvalidOrder(invalid),
            impossible => CarrierError::PackingImpossible(impossible),
        }
    }
}

impl CarrierError {
    /// The carrier may work again later (remote timeout).
    pub fn is_temporary(&self) -> bool {
        matches!(self, CarrierError::Remote(err) if err.is_timeout())
    }
}

/// Everything known about shipping one order with this carrier.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderQuote {
    pub packages: Vec<Package>,
    pub price: Option<Decimal>,
    pub delivery: Option<DeliveryRange>,
    pub unavailability_reasons: Vec<UnavailabilityReason>,
}

impl OrderQuote {
    fn unavailable(reason: UnavailabilityReason, packages: Vec<Package>) -> Self {
        Self {
            packages,
            price: None,
            delivery: None,
            unavailability_reasons: vec![reason],
        }
    }

    pub fn is_available(&self) -> bool {
        self.unavailability_reasons.is_empty() && self.price.is_some()
    }

    /// Correios could not be reached; asking again later may succeed.
    pub fn is_temporarily_unavailable(&self) -> bool {
        self.unavailability_reasons
            .contains(&UnavailabilityReason::ServiceUnreachable)
    }
}

/// Correios carrier bound to a quote source and a shared cache.
pub struct CorreiosCarrier<F, S> {
    settings: CarrierSettings,
    fetcher: F,
    cache: QuoteCache<S>,
}

impl<F: QuoteFetcher, S: QuoteStore> CorreiosCarrier<F, S> {
    pub fn new(settings: CarrierSettings, fetcher: F, store: S) -> Self {
        Self {
            settings,
            fetcher,
            cache: QuoteCache::new(store),
        }
    }

    pub fn settings(&self) -> &CarrierSettings {
        &self.settings
    }

    pub fn cache(&self) -> &QuoteCache<S> {
        &self.cache
    }

    /// Packs the order under the service limits.
    pub fn pack(&self, order: &OrderSource) -> Result<Vec<Package>, PackingError> {
        Packer::new(Some(self.settings.constraint())).pack_lines(&order.lines)
    }

    /// Request parameters for one package going to `destination`.
    pub fn quote_request(
        &self,
        order: &OrderSource,
        destination: &str,
        package: &Package,
    ) -> QuoteRequest {
        let dims = package
            .dimensions()
            .floored_by(&self.settings.limits.min_dimensions());
        let declared_value = if self.settings.declared_value {
            order.products_total
        } else {
            Decimal::ZERO
        };

        QuoteRequest {
            destination_postal_code: destination.to_string(),
            origin_postal_code: digits(&self.settings.origin_postal_code),
            service_code: self.settings.service_code(),
            company_code: self.settings.company_code.clone(),
            password: self.settings.password.clone(),
            hand_delivery: self.settings.hand_delivery,
            declared_value,
            receipt_notice: self.settings.receipt_notice,
            weight: package.weight(),
            width: dims.width,
            length: dims.length,
            height: dims.height,
        }
    }

    /// Quotes every package in order, one request at a time.
    pub async fn fetch_results(
        &self,
        order: &OrderSource,
        packages: &[Package],
    ) -> Result<Vec<QuoteResult>, CarrierError> {
        let destination = order
            .destination_postal_code()
            .ok_or(CarrierError::MissingDestination)?;

        let mut results = Vec::with_capacity(packages.len());
        for package in packages {
            let request = self.quote_request(order, &destination, package);
            let key = request.cache_key();
            let result = self
                .cache
                .get_or_fetch(&key, || self.fetcher.fetch(&request))
                .await?;
            results.push(result);
        }
        Ok(results)
    }

    async fn packed_results(
        &self,
        order: &OrderSource,
    ) -> Result<Vec<QuoteResult>, CarrierError> {
        let packages = self.pack(order)?;
        if packages.is_empty() {
            return Err(CarrierError::NothingToShip);
        }
        self.fetch_results(order, &packages).await
    }

    /// Shipping price for the order, including the additional price.
    pub async fn price(&self, order: &OrderSource) -> Result<Decimal, CarrierError> {
        let results = self.packed_results(order).await?;
        Ok(aggregate_price(&results, self.settings.additional_price)?)
    }

    /// Delivery range for the order, including the additional days.
    pub async fn delivery_time(&self, order: &OrderSource) -> Result<DeliveryRange, CarrierError> {
        let results = self.packed_results(order).await?;
        Ok(aggregate_delivery(
            &results,
            self.settings.additional_delivery_days,
        )?)
    }

    /// Reasons the carrier cannot ship this order; empty when it can.
    ///
    /// Upstream server and transport failures are returned as errors.
    pub async fn unavailability_reasons(
        &self,
        order: &OrderSource,
    ) -> Result<Vec<UnavailabilityReason>, CarrierError> {
        Ok(self.quote_order(order).await?.unavailability_reasons)
    }

    /// Packs and quotes the order once, collecting price, delivery range and
    /// availability together.
    pub async fn quote_order(&self, order: &OrderSource) -> Result<OrderQuote, CarrierError> {
        let packages = match self.pack(order) {
            Ok(packages) => packages,
            Err(PackingError::Impossible { item_id }) => {
                return Ok(OrderQuote::unavailable(
                    UnavailabilityReason::ItemsCannotBePacked { item_id },
                    Vec::new(),
                ));
            }
            Err(err) => return Err(err.into()),
        };
        if packages.is_empty() {
            return Ok(OrderQuote::unavailable(
                UnavailabilityReason::NothingToShip,
                packages,
            ));
        }

        let results = match self.fetch_results(order, &packages).await {
            Ok(results) => results,
            Err(CarrierError::MissingDestination) => {
                return Ok(OrderQuote::unavailable(
                    UnavailabilityReason::MissingDestination,
                    packages,
                ));
            }
            Err(CarrierError::Remote(CorreiosError::Timeout)) => {
                warn!("Correios timed out; carrier unavailable for this order");
                return Ok(OrderQuote::unavailable(
                    UnavailabilityReason::ServiceUnreachable,
                    packages,
                ));
            }
            Err(err) => return Err(err),
        };

        let unavailability_reasons: Vec<UnavailabilityReason> = availability_errors(&results)
            .into_iter()
            .map(|err| {
                warn!(
                    package_index = err.package_index,
                    code = err.error_code,
                    message = %err.message,
                    "package cannot be delivered by Correios"
                );
                UnavailabilityReason::PackageUndeliverable {
                    package_index: err.package_index,
                    code: err.error_code,
                    message: err.message,
                }
            })
            .collect();

        // Failed packages are already listed as reasons; no total applies.
        let (price, delivery) = if unavailability_reasons.is_empty() {
            (
                aggregate_price(&results, self.settings.additional_price).ok(),
                aggregate_delivery(&results, self.settings.additional_delivery_days).ok(),
            )
        } else {
            (None, None)
        };

        info!(
            packages = packages.len(),
            price = ?price,
            available = unavailability_reasons.is_empty(),
            "quoted order"
        );

        Ok(OrderQuote {
            packages,
            price,
            delivery,
            unavailability_reasons,
        })
    }
}

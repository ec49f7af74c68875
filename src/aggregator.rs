//! Combines per-package quotes into order-level price and delivery time.
//!
//! Any package with a service error fails price and delivery aggregation for
//! the whole order; a partial sum would under-quote the shipment.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::quote::QuoteResult;

/// Reason an order-level aggregation is unavailable.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AggregationError {
    #[error("no quote results to aggregate")]
    NoResults,
    #[error("package {package_index} failed with error {code}: {message}")]
    QuoteFailed {
        package_index: usize,
        code: i32,
        message: String,
    },
}

/// Delivery estimate in days, both bounds inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct DeliveryRange {
    pub min_days: u32,
    pub max_days: u32,
}

/// A package the carrier cannot deliver.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct AvailabilityError {
    pub package_index: usize,
    pub error_code: i32,
    pub message: String,
}

/// Returns the first erroring result, logging it.
fn first_failure(results: &[QuoteResult]) -> Result<(), AggregationError> {
    if results.is_empty() {
        return Err(AggregationError::NoResults);
    }
    match results.iter().enumerate().find(|(_, r)| !r.is_success()) {
        Some((package_index, result)) => {
            error!(
                package_index,
                code = result.error,
                message = %result.error_message,
                service = %result.code,
                "Correios quote failed"
            );
            Err(AggregationError::QuoteFailed {
                package_index,
                code: result.error,
                message: result.error_message.clone(),
            })
        }
        None => Ok(()),
    }
}

/// Sums the package prices and adds the carrier surcharge once.
///
/// # Examples
/// ```
/// use correios_frete::aggregator::aggregate_price;
/// use correios_frete::quote::QuoteResult;
/// use rust_decimal::Decimal;
///
/// let results = vec![
///     QuoteResult::success("41106", Decimal::new(1000, 2), 3),
///     QuoteResult::success("41106", Decimal::new(1500, 2), 5),
/// ];
/// let total = aggregate_price(&results, Decimal::new(200, 2)).unwrap();
/// assert_eq!(total, Decimal::new(2700, 2));
/// ```
pub fn aggregate_price(
    results: &[QuoteResult],
    surcharge: Decimal,
) -> Result<Decimal, AggregationError> {
    first_failure(results)?;
    let total: Decimal = results.iter().map(|r| r.price).sum();
    Ok(total + surcharge)
}

/// Computes the delivery range across packages and adds the surcharge days
/// to both bounds.
pub fn aggregate_delivery(
    results: &[QuoteResult],
    surcharge_days: u32,
) -> Result<DeliveryRange, AggregationError> {
    first_failure(results)?;

    let mut min_days: Option<u32> = None;
    let mut max_days: u32 = 0;
    for result in results {
        let days = result.delivery_days;
        min_days = Some(min_days.map_or(days, |current| current.min(days)));
        max_days = max_days.max(days);
    }

    let min_days = min_days.unwrap_or(0);
    Ok(DeliveryRange {
        min_days: min_days.saturating_add(surcharge_days),
        max_days: max_days.saturating_add(surcharge_days),
    })
}

/// Lists every package whose quote reported an error.
pub fn availability_errors(results: &[QuoteResult]) -> Vec<AvailabilityError> {
    results
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.is_success())
        .map(|(package_index, r)| AvailabilityError {
            package_index,
            error_code: r.error,
            message: r.error_message.clone(),
        })
        .collect()
}

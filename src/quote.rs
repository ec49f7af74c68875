//! Price and delivery-time results returned by the Correios web service.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error code the web service reports for a successful quote.
pub const NO_ERROR: i32 = 0;

/// Correios delivery services and their standard codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceCode {
    Pac,
    Sedex,
    SedexACobrar,
    Sedex10,
    SedexHoje,
    ESedex,
}

impl ServiceCode {
    pub const ALL: [ServiceCode; 6] = [
        ServiceCode::Pac,
        ServiceCode::Sedex,
        ServiceCode::SedexACobrar,
        ServiceCode::Sedex10,
        ServiceCode::SedexHoje,
        ServiceCode::ESedex,
    ];

    /// Numeric code sent as `nCdServico`.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceCode::Pac => "41106",
            ServiceCode::Sedex => "40010",
            ServiceCode::SedexACobrar => "40045",
            ServiceCode::Sedex10 => "40215",
            ServiceCode::SedexHoje => "40290",
            ServiceCode::ESedex => "99999",
        }
    }

    /// Identifier used in configuration (`PAC`, `SEDEX_10`, ...).
    pub fn identifier(&self) -> &'static str {
        match self {
            ServiceCode::Pac => "PAC",
            ServiceCode::Sedex => "SEDEX",
            ServiceCode::SedexACobrar => "SEDEX_A_COBRAR",
            ServiceCode::Sedex10 => "SEDEX_10",
            ServiceCode::SedexHoje => "SEDEX_HOJE",
            ServiceCode::ESedex => "ESEDEX",
        }
    }

    /// Human readable service name.
    pub fn label(&self) -> &'static str {
        match self {
            ServiceCode::Pac => "PAC",
            ServiceCode::Sedex => "Sedex",
            ServiceCode::SedexACobrar => "Sedex a cobrar",
            ServiceCode::Sedex10 => "Sedex 10",
            ServiceCode::SedexHoje => "Sedex Hoje",
            ServiceCode::ESedex => "eSedex",
        }
    }
}

impl fmt::Display for ServiceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.code(), self.label())
    }
}

/// Unknown service identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown Correios service '{0}'")]
pub struct UnknownServiceCode(pub String);

impl FromStr for ServiceCode {
    type Err = UnknownServiceCode;

    /// Accepts either the identifier (`SEDEX_10`) or the numeric code (`40215`).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase();
        ServiceCode::ALL
            .into_iter()
            .find(|service| service.identifier() == normalized || service.code() == normalized)
            .ok_or_else(|| UnknownServiceCode(raw.to_string()))
    }
}

/// Result of one price/delivery-time lookup for one package.
///
/// `error == 0` means success; any other value is a business error reported
/// by the service (e.g. unserved postal code) with `error_message` as detail.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QuoteResult {
    pub code: String,
    #[schema(value_type = String, example = "27.50")]
    pub price: Decimal,
    pub delivery_days: u32,
    #[schema(value_type = String)]
    pub hand_delivery_price: Decimal,
    #[schema(value_type = String)]
    pub receipt_notice_price: Decimal,
    #[schema(value_type = String)]
    pub declared_value_price: Decimal,
    pub home_delivery: bool,
    pub saturday_delivery: bool,
    pub error: i32,
    pub error_message: String,
    #[schema(value_type = String)]
    pub price_without_extras: Decimal,
    pub observation: String,
}

impl QuoteResult {
    /// Successful result with the given price and delivery days.
    pub fn success(code: impl Into<String>, price: Decimal, delivery_days: u32) -> Self {
        Self {
            code: code.into(),
            price,
            delivery_days,
            price_without_extras: price,
            ..Self::default()
        }
    }

    /// Result carrying a service-side error.
    pub fn failure(code: impl Into<String>, error: i32, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            error,
            error_message: message.into(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error == NO_ERROR
    }
}

/// Parses a Brazilian formatted amount such as `5.123,49`.
///
/// Empty or malformed values become zero.
pub fn parse_currency(raw: Option<&str>) -> Decimal {
    let Some(raw) = raw else {
        return Decimal::ZERO;
    };
    let normalized = raw.trim().replace('.', "").replace(',', ".");
    if normalized.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(&normalized).unwrap_or(Decimal::ZERO)
}

/// Parses an integer field; malformed values become zero.
pub fn parse_int(raw: Option<&str>) -> i32 {
    raw.and_then(|value| value.trim().parse::<i32>().ok())
        .unwrap_or(0)
}

/// Parses an `S`/`N` flag.
pub fn parse_flag(raw: Option<&str>) -> bool {
    raw.map(|value| value.trim().eq_ignore_ascii_case("S"))
        .unwrap_or(false)
}

/// `S`/`N` rendering of a boolean for request parameters.
pub fn flag(value: bool) -> &'static str {
    if value { "S" } else { "N" }
}

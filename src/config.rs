use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::carrier::{CarrierSettings, PackageLimits};
use crate::quote::ServiceCode;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub web_service: WebServiceConfig,
    pub carrier: CarrierSettings,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            web_service: WebServiceConfig::from_env(),
            carrier: carrier_from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;

    fn from_env() -> Self {
        let host_value =
            env_string("CORREIOS_API_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "Could not parse CORREIOS_API_HOST ('{}'): {}. Using {}.",
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = match env_string("CORREIOS_API_PORT") {
            Some(raw) => parse_port(&raw).unwrap_or(Self::DEFAULT_PORT),
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            display_host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
        }
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    match raw.parse::<u16>() {
        Ok(0) => {
            warn!("CORREIOS_API_PORT must not be 0. Using default port.");
            None
        }
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                "Could not parse CORREIOS_API_PORT ('{}'): {}. Using default port.",
                raw, err
            );
            None
        }
    }
}

/// Where and how long to ask the Correios web service.
#[derive(Clone, Debug, PartialEq)]
pub struct WebServiceConfig {
    url: String,
    timeout: Duration,
}

impl WebServiceConfig {
    pub const DEFAULT_URL: &'static str =
        "http://ws.correios.com.br/calculador/CalcPrecoPrazo.aspx";
    pub const DEFAULT_TIMEOUT_SECS: f64 = 5.0;

    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    fn from_env() -> Self {
        let url = env_string("CORREIOS_WS_URL").unwrap_or_else(|| Self::DEFAULT_URL.to_string());
        let timeout_secs = load_f64_with_warning(
            "CORREIOS_WS_TIMEOUT_SECS",
            Self::DEFAULT_TIMEOUT_SECS,
            |value| value > 0.0 && value.is_finite(),
            "must be greater than 0",
        );
        Self::new(url, Duration::from_secs_f64(timeout_secs))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for WebServiceConfig {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_URL,
            Duration::from_secs_f64(Self::DEFAULT_TIMEOUT_SECS),
        )
    }
}

fn carrier_from_env() -> CarrierSettings {
    let service = match env_string("CORREIOS_SERVICE") {
        Some(raw) => raw.parse::<ServiceCode>().unwrap_or_else(|err| {
            warn!("{}. Using {}.", err, ServiceCode::Pac);
            ServiceCode::Pac
        }),
        None => ServiceCode::Pac,
    };

    let non_negative = |value: f64| value >= 0.0 && value.is_finite();
    let positive = |value: f64| value > 0.0 && value.is_finite();
    let limits = PackageLimits {
        max_weight_kg: load_f64_with_warning(
            "CORREIOS_MAX_WEIGHT_KG",
            PackageLimits::DEFAULT_MAX_WEIGHT_KG,
            non_negative,
            "must not be negative",
        ),
        min_width: load_f64_with_warning(
            "CORREIOS_MIN_WIDTH_MM",
            PackageLimits::DEFAULT_MIN_WIDTH,
            non_negative,
            "must not be negative",
        ),
        max_width: load_f64_with_warning(
            "CORREIOS_MAX_WIDTH_MM",
            PackageLimits::DEFAULT_MAX_WIDTH,
            positive,
            "must be greater than 0",
        ),
        min_length: load_f64_with_warning(
            "CORREIOS_MIN_LENGTH_MM",
            PackageLimits::DEFAULT_MIN_LENGTH,
            non_negative,
            "must not be negative",
        ),
        max_length: load_f64_with_warning(
            "CORREIOS_MAX_LENGTH_MM",
            PackageLimits::DEFAULT_MAX_LENGTH,
            positive,
            "must be greater than 0",
        ),
        min_height: load_f64_with_warning(
            "CORREIOS_MIN_HEIGHT_MM",
            PackageLimits::DEFAULT_MIN_HEIGHT,
            non_negative,
            "must not be negative",
        ),
        max_height: load_f64_with_warning(
            "CORREIOS_MAX_HEIGHT_MM",
            PackageLimits::DEFAULT_MAX_HEIGHT,
            positive,
            "must be greater than 0",
        ),
        max_edges_sum: load_f64_with_warning(
            "CORREIOS_MAX_EDGES_SUM_MM",
            PackageLimits::DEFAULT_MAX_EDGES_SUM,
            non_negative,
            "must not be negative",
        ),
    };

    let flag = |name: &str| {
        env_string(name)
            .and_then(|raw| parse_bool(&raw, name))
            .unwrap_or(false)
    };

    let additional_price = env_string("CORREIOS_ADDITIONAL_PRICE")
        .and_then(|raw| parse_decimal(&raw, "CORREIOS_ADDITIONAL_PRICE"))
        .unwrap_or(Decimal::ZERO);
    let additional_delivery_days = env_string("CORREIOS_ADDITIONAL_DELIVERY_DAYS")
        .and_then(|raw| parse_u32(&raw, "CORREIOS_ADDITIONAL_DELIVERY_DAYS"))
        .unwrap_or(0);

    let settings = CarrierSettings {
        service,
        contract_service_code: env_string("CORREIOS_CONTRACT_SERVICE_CODE"),
        origin_postal_code: env_string("CORREIOS_ORIGIN_POSTAL_CODE")
            .unwrap_or_else(|| CarrierSettings::DEFAULT_ORIGIN_POSTAL_CODE.to_string()),
        company_code: env_string("CORREIOS_COMPANY_CODE"),
        password: env_string("CORREIOS_PASSWORD"),
        hand_delivery: flag("CORREIOS_HAND_DELIVERY"),
        declared_value: flag("CORREIOS_DECLARED_VALUE"),
        receipt_notice: flag("CORREIOS_RECEIPT_NOTICE"),
        additional_price,
        additional_delivery_days,
        limits,
    };
    if settings.company_code.is_some() != settings.password.is_some() {
        warn!("CORREIOS_COMPANY_CODE and CORREIOS_PASSWORD should be set together");
    }
    settings
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!("Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

/// Accepts both `12.50` and the Brazilian `12,50`.
fn parse_decimal(raw: &str, var_name: &str) -> Option<Decimal> {
    match raw.trim().replace(',', ".").parse::<Decimal>() {
        Ok(value) if value >= Decimal::ZERO => Some(value),
        Ok(value) => {
            warn!("{} must not be negative ({}). Using 0.", var_name, value);
            None
        }
        Err(err) => {
            warn!(
                "Could not parse {} ('{}') as amount: {}. Using 0.",
                var_name, raw, err
            );
            None
        }
    }
}

fn parse_u32(raw: &str, var_name: &str) -> Option<u32> {
    match raw.trim().parse::<u32>() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                "Could not parse {} ('{}') as whole number: {}. Using 0.",
                var_name, raw, err
            );
            None
        }
    }
}

fn load_f64_with_warning(
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
) -> f64 {
    match env_string(var_name) {
        Some(raw) => parse_f64_with_warning(var_name, &raw, default, validator, invalid_hint),
        None => default,
    }
}

fn parse_f64_with_warning(
    var_name: &str,
    raw: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
) -> f64 {
    match raw.parse::<f64>() {
        Ok(value) if validator(value) => {
            let tolerance = (default.abs().max(1.0)) * 1e-9;
            if (value - default).abs() > tolerance {
                info!("{} = {} (default {})", var_name, value, default);
            }
            value
        }
        Ok(_) => {
            warn!(
                "{} contains invalid value '{}': {}. Using {}.",
                var_name, raw, invalid_hint, default
            );
            default
        }
        Err(err) => {
            warn!(
                "Could not parse {} ('{}') as number: {}. Using {}.",
                var_name, raw, err, default
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_true_values() {
        assert_eq!(parse_bool("1", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("true", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("yes", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("on", "TEST_VAR"), Some(true));

        // Test case insensitivity
        assert_eq!(parse_bool("TRUE", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("Yes", "TEST_VAR"), Some(true));

        // Test with whitespace
        assert_eq!(parse_bool(" true ", "TEST_VAR"), Some(true));
    }

    #[test]
    fn test_parse_bool_false_values() {
        assert_eq!(parse_bool("0", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("false", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("no", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("OFF", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("  0  ", "TEST_VAR"), Some(false));
    }

    #[test]
    fn test_parse_bool_invalid_values() {
        assert_eq!(parse_bool("invalid", "TEST_VAR"), None);
        assert_eq!(parse_bool("2", "TEST_VAR"), None);
        assert_eq!(parse_bool("", "TEST_VAR"), None);
    }

    #[test]
    fn test_parse_decimal_accepts_comma() {
        assert_eq!(
            parse_decimal("12,50", "TEST_VAR"),
            Some(Decimal::new(1250, 2))
        );
        assert_eq!(parse_decimal("3", "TEST_VAR"), Some(Decimal::new(3, 0)));
        assert_eq!(parse_decimal("-1", "TEST_VAR"), None);
        assert_eq!(parse_decimal("abc", "TEST_VAR"), None);
    }

    #[test]
    fn test_parse_u32() {
        assert_eq!(parse_u32(" 4 ", "TEST_VAR"), Some(4));
        assert_eq!(parse_u32("-4", "TEST_VAR"), None);
    }

    #[test]
    fn test_parse_port_rejects_zero() {
        assert_eq!(parse_port("9000"), Some(9000));
        assert_eq!(parse_port("0"), None);
        assert_eq!(parse_port("http"), None);
    }

    #[test]
    fn test_parse_f64_falls_back_to_default() {
        let positive = |value: f64| value > 0.0;
        assert_eq!(
            parse_f64_with_warning("TEST_VAR", "2.5", 5.0, positive, "must be > 0"),
            2.5
        );
        assert_eq!(
            parse_f64_with_warning("TEST_VAR", "0", 5.0, positive, "must be > 0"),
            5.0
        );
        assert_eq!(
            parse_f64_with_warning("TEST_VAR", "soon", 5.0, positive, "must be > 0"),
            5.0
        );
    }

    #[test]
    fn test_web_service_defaults() {
        let config = WebServiceConfig::default();
        assert_eq!(
            config.url(),
            "http://ws.correios.com.br/calculador/CalcPrecoPrazo.aspx"
        );
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_api_defaults_bind_everywhere() {
        let config = ApiConfig::default();
        assert!(config.binds_to_all_interfaces());
        assert_eq!(config.socket_addr().port(), 8080);
        assert_eq!(config.display_host(), "0.0.0.0");
    }
}

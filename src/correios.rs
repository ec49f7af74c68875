//! Client for the Correios price and delivery-time web service.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::cache::QuoteRequest;
use crate::config::WebServiceConfig;
use crate::quote::{QuoteResult, flag, parse_currency, parse_flag, parse_int};

/// Package format sent as `nCdFormato`: box or parcel.
const FORMAT_BOX: &str = "1";

/// Failure to obtain a quote from the remote service.
#[derive(Debug, Error)]
pub enum CorreiosError {
    /// The request did not complete within the configured timeout.
    #[error("timed out contacting the Correios web service")]
    Timeout,
    /// The service answered with a non-200 status.
    #[error("Correios web service answered with HTTP {status}")]
    Server { status: u16, body: String },
    /// Connection or protocol failure other than a timeout.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response body could not be understood.
    #[error("invalid Correios response: {0}")]
    InvalidResponse(String),
}

impl CorreiosError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CorreiosError::Timeout)
    }
}

impl From<reqwest::Error> for CorreiosError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CorreiosError::Timeout
        } else {
            CorreiosError::Transport(err.to_string())
        }
    }
}

/// Source of quotes for single packages.
pub trait QuoteFetcher: Send + Sync {
    fn fetch(
        &self,
        request: &QuoteRequest,
    ) -> impl Future<Output = Result<QuoteResult, CorreiosError>> + Send;
}

/// HTTP client for the `CalcPrecoPrazo` web service.
#[derive(Clone, Debug)]
pub struct CorreiosClient {
    http: reqwest::Client,
    url: String,
}

fn user_agent() -> String {
    format!("correios-frete/{}", env!("CARGO_PKG_VERSION"))
}

impl CorreiosClient {
    /// Builds a client with the configured endpoint and timeout.
    pub fn new(config: &WebServiceConfig) -> Result<Self, CorreiosError> {
        Self::with_timeout(config.url(), config.timeout())
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, CorreiosError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl QuoteFetcher for CorreiosClient {
    async fn fetch(&self, request: &QuoteRequest) -> Result<QuoteResult, CorreiosError> {
        debug!(
            service = %request.service_code,
            destination = %request.destination_postal_code,
            "requesting Correios quote"
        );

        let response = match self
            .http
            .post(&self.url)
            .query(&request_params(request))
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                error!(url = %self.url, "timeout contacting the Correios web service");
                return Err(CorreiosError::Timeout);
            }
            Err(err) => return Err(err.into()),
        };

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            error!(status = status.as_u16(), "Correios web service returned an error status");
            return Err(CorreiosError::Server {
                status: status.as_u16(),
                body,
            });
        }

        parse_response(&body)
    }
}

/// Query parameters of a `CalcPrecoPrazo` request.
///
/// Weight is sent in kilograms and edges in centimeters.
pub fn request_params(request: &QuoteRequest) -> Vec<(&'static str, String)> {
    vec![
        ("nCdEmpresa", request.company_code.clone().unwrap_or_default()),
        ("sDsSenha", request.password.clone().unwrap_or_default()),
        ("nCdServico", request.service_code.clone()),
        ("sCepOrigem", request.origin_postal_code.clone()),
        ("sCepDestino", request.destination_postal_code.clone()),
        ("nVlPeso", (request.weight / 1000.0).to_string()),
        ("nCdFormato", FORMAT_BOX.to_string()),
        ("nVlComprimento", (request.length / 10.0).to_string()),
        ("nVlAltura", (request.height / 10.0).to_string()),
        ("nVlLargura", (request.width / 10.0).to_string()),
        ("nVlDiametro", "0".to_string()),
        ("sCdMaoPropria", flag(request.hand_delivery).to_string()),
        ("nVlValorDeclarado", request.declared_value.normalize().to_string()),
        ("sCdAvisoRecebimento", flag(request.receipt_notice).to_string()),
        ("strRetorno", "xml".to_string()),
    ]
}

#[derive(Debug, Deserialize)]
struct ServicesEnvelope {
    #[serde(rename = "cServico", default)]
    services: Vec<RawService>,
}

#[derive(Debug, Default, Deserialize)]
struct RawService {
    #[serde(rename = "Codigo")]
    code: Option<String>,
    #[serde(rename = "Valor")]
    price: Option<String>,
    #[serde(rename = "PrazoEntrega")]
    delivery_days: Option<String>,
    #[serde(rename = "ValorMaoPropria")]
    hand_delivery_price: Option<String>,
    #[serde(rename = "ValorAvisoRecebimento")]
    receipt_notice_price: Option<String>,
    #[serde(rename = "ValorValorDeclarado")]
    declared_value_price: Option<String>,
    #[serde(rename = "EntregaDomiciliar")]
    home_delivery: Option<String>,
    #[serde(rename = "EntregaSabado")]
    saturday_delivery: Option<String>,
    #[serde(rename = "Erro")]
    error: Option<String>,
    #[serde(rename = "MsgErro")]
    error_message: Option<String>,
    #[serde(rename = "ValorSemAdicionais")]
    price_without_extras: Option<String>,
    #[serde(rename = "obsFim")]
    observation: Option<String>,
}

impl From<RawService> for QuoteResult {
    fn from(raw: RawService) -> Self {
        QuoteResult {
            code: raw.code.unwrap_or_default(),
            price: parse_currency(raw.price.as_deref()),
            delivery_days: u32::try_from(parse_int(raw.delivery_days.as_deref())).unwrap_or(0),
            hand_delivery_price: parse_currency(raw.hand_delivery_price.as_deref()),
            receipt_notice_price: parse_currency(raw.receipt_notice_price.as_deref()),
            declared_value_price: parse_currency(raw.declared_value_price.as_deref()),
            home_delivery: parse_flag(raw.home_delivery.as_deref()),
            saturday_delivery: parse_flag(raw.saturday_delivery.as_deref()),
            error: parse_int(raw.error.as_deref()),
            error_message: raw.error_message.unwrap_or_default(),
            price_without_extras: parse_currency(raw.price_without_extras.as_deref()),
            observation: raw.observation.unwrap_or_default(),
        }
    }
}

/// Parses a `<Servicos>` document. Only one service is requested at a time,
/// so the first `<cServico>` is used.
pub fn parse_response(body: &str) -> Result<QuoteResult, CorreiosError> {
    let envelope: ServicesEnvelope = quick_xml::de::from_str(body)
        .map_err(|err| CorreiosError::InvalidResponse(err.to_string()))?;
    envelope
        .services
        .into_iter()
        .next()
        .map(QuoteResult::from)
        .ok_or_else(|| CorreiosError::InvalidResponse("missing cServico element".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const SINGLE: &str = r#"<?xml version="1.0" encoding="ISO-8859-1" ?>
<Servicos>
    <cServico>
        <Codigo>40010</Codigo>
        <Valor>1.234,56</Valor>
        <PrazoEntrega>5</PrazoEntrega>
        <ValorMaoPropria>5,50</ValorMaoPropria>
        <ValorAvisoRecebimento>4,30</ValorAvisoRecebimento>
        <ValorValorDeclarado>0,00</ValorValorDeclarado>
        <EntregaDomiciliar>S</EntregaDomiciliar>
        <EntregaSabado>N</EntregaSabado>
        <Erro>0</Erro>
        <MsgErro></MsgErro>
        <ValorSemAdicionais>1.224,76</ValorSemAdicionais>
        <obsFim></obsFim>
    </cServico>
</Servicos>"#;

    #[test]
    fn parses_single_service() {
        let result = parse_response(SINGLE).unwrap();
        assert_eq!(result.code, "40010");
        assert_eq!(result.price, dec!(1234.56));
        assert_eq!(result.delivery_days, 5);
        assert_eq!(result.hand_delivery_price, dec!(5.50));
        assert_eq!(result.receipt_notice_price, dec!(4.30));
        assert_eq!(result.declared_value_price, Decimal::ZERO);
        assert!(result.home_delivery);
        assert!(!result.saturday_delivery);
        assert_eq!(result.error, 0);
        assert!(result.error_message.is_empty());
        assert_eq!(result.price_without_extras, dec!(1224.76));
        assert!(result.is_success());
    }

    #[test]
    fn uses_first_of_several_services() {
        let body = r#"<Servicos>
            <cServico><Codigo>41106</Codigo><Valor>20,00</Valor><PrazoEntrega>8</PrazoEntrega><Erro>0</Erro></cServico>
            <cServico><Codigo>1321312</Codigo><Valor>3132,123</Valor><PrazoEntrega>14</PrazoEntrega><Erro>0</Erro></cServico>
        </Servicos>"#;
        let result = parse_response(body).unwrap();
        assert_eq!(result.code, "41106");
        assert_eq!(result.price, dec!(20.00));
        assert_eq!(result.delivery_days, 8);
    }

    #[test]
    fn parses_service_error() {
        let body = r#"<Servicos><cServico>
            <Codigo>40215</Codigo><Valor>0,00</Valor><PrazoEntrega>0</PrazoEntrega>
            <Erro>-888</Erro><MsgErro>Para este servico so esta disponivel o calculo do PRAZO.</MsgErro>
        </cServico></Servicos>"#;
        let result = parse_response(body).unwrap();
        assert_eq!(result.error, -888);
        assert!(result.error_message.starts_with("Para este servico"));
        assert!(!result.is_success());
    }

    #[test]
    fn malformed_fields_default_to_zero() {
        let body = r#"<Servicos><cServico>
            <Codigo>41106</Codigo><Valor>abc</Valor><PrazoEntrega>x</PrazoEntrega>
        </cServico></Servicos>"#;
        let result = parse_response(body).unwrap();
        assert_eq!(result.price, Decimal::ZERO);
        assert_eq!(result.delivery_days, 0);
        assert_eq!(result.error, 0);
    }

    #[test]
    fn missing_service_is_invalid() {
        assert!(matches!(
            parse_response("<Servicos></Servicos>"),
            Err(CorreiosError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_response("not xml at all <"),
            Err(CorreiosError::InvalidResponse(_))
        ));
    }

    #[test]
    fn params_convert_units_and_flags() {
        let request = QuoteRequest {
            destination_postal_code: "89070210".to_string(),
            origin_postal_code: "89010000".to_string(),
            service_code: "40010".to_string(),
            company_code: Some("08082650".to_string()),
            password: None,
            hand_delivery: true,
            declared_value: dec!(150.50),
            receipt_notice: false,
            weight: 2500.0,
            width: 300.0,
            length: 200.0,
            height: 150.0,
        };
        let params = request_params(&request);
        let get = |name: &str| {
            params
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.clone())
                .unwrap()
        };
        assert_eq!(get("nCdEmpresa"), "08082650");
        assert_eq!(get("sDsSenha"), "");
        assert_eq!(get("nCdServico"), "40010");
        assert_eq!(get("nVlPeso"), "2.5");
        assert_eq!(get("nVlLargura"), "30");
        assert_eq!(get("nVlComprimento"), "20");
        assert_eq!(get("nVlAltura"), "15");
        assert_eq!(get("nCdFormato"), "1");
        assert_eq!(get("sCdMaoPropria"), "S");
        assert_eq!(get("sCdAvisoRecebimento"), "N");
        assert_eq!(get("nVlValorDeclarado"), "150.5");
        assert_eq!(get("strRetorno"), "xml");
    }

    #[test]
    fn timeout_is_distinguished() {
        assert!(CorreiosError::Timeout.is_timeout());
        assert!(
            !CorreiosError::Server {
                status: 500,
                body: String::new()
            }
            .is_timeout()
        );
    }
}

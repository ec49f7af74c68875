//! REST API for the Correios shipping service.
//!
//! Exposes packing and quoting over HTTP. Uses Axum as the web framework and
//! supports CORS.

use std::sync::{Arc, OnceLock};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

use crate::aggregator::DeliveryRange;
use crate::cache::MemoryQuoteStore;
use crate::carrier::{CarrierError, CorreiosCarrier, OrderQuote, OrderSource, UnavailabilityReason};
use crate::config::ApiConfig;
use crate::correios::CorreiosClient;
use crate::model::{Item, OrderLine, Package, PackageConstraint, ValidationError};
use crate::packer::{PackEvent, Packer, PackingError, expand_lines};

/// Carrier used by the HTTP handlers.
pub type SharedCarrier = Arc<CorreiosCarrier<CorreiosClient, Arc<MemoryQuoteStore>>>;

#[derive(Clone)]
struct ApiState {
    carrier: SharedCarrier,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>Correios Frete API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Package limits sent with a pack request, in millimeters and grams.
#[derive(Deserialize, Clone, ToSchema)]
pub struct ConstraintRequest {
    #[schema(value_type = [f64; 3], example = json!([1050.0, 1050.0, 1050.0]))]
    pub max_dims: (f64, f64, f64),
    /// `0` disables the weight check.
    #[serde(default)]
    pub max_weight: f64,
    /// `0` disables the edge sum check.
    #[serde(default)]
    pub max_edges_sum: f64,
    #[serde(default)]
    #[schema(value_type = [f64; 3], example = json!([160.0, 110.0, 20.0]))]
    pub min_dims: (f64, f64, f64),
}

impl ConstraintRequest {
    fn into_constraint(self) -> Result<PackageConstraint, ValidationError> {
        PackageConstraint::try_new(
            self.max_dims,
            self.max_weight,
            self.max_edges_sum,
            self.min_dims,
        )
    }
}

#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "lines": [
            { "item": { "id": 1, "dims": [300.0, 200.0, 100.0], "weight": 1500.0 }, "quantity": 2 }
        ],
        "constraint": {
            "max_dims": [1050.0, 1050.0, 1050.0],
            "max_weight": 30000.0,
            "max_edges_sum": 2000.0,
            "min_dims": [160.0, 110.0, 20.0]
        }
    })
)]
pub struct PackRequest {
    pub lines: Vec<OrderLine>,
    /// Limits to pack under; the carrier's configured limits when absent.
    #[serde(default)]
    #[schema(nullable = true)]
    pub constraint: Option<ConstraintRequest>,
}

#[derive(Debug)]
struct ValidatedPackRequest {
    items: Vec<Item>,
    constraint: Option<PackageConstraint>,
}

impl PackRequest {
    fn into_validated(self) -> Result<ValidatedPackRequest, ValidationError> {
        for line in &self.lines {
            line.item.validate()?;
        }
        let constraint = self
            .constraint
            .map(ConstraintRequest::into_constraint)
            .transpose()?;
        Ok(ValidatedPackRequest {
            items: expand_lines(&self.lines)?,
            constraint,
        })
    }
}

/// Every package of a packed order.
#[derive(Serialize, ToSchema)]
pub struct PackResponse {
    pub packages: Vec<PackageSummary>,
}

/// One package with its billable size.
///
/// `dims` are width, length and height after applying the minimum box size.
#[derive(Serialize, ToSchema)]
pub struct PackageSummary {
    pub id: usize,
    #[schema(value_type = [f64; 3], example = json!([300.0, 200.0, 200.0]))]
    pub dims: (f64, f64, f64),
    pub weight: f64,
    pub cubic_weight: f64,
    pub items: Vec<usize>,
}

impl PackageSummary {
    fn from_package(index: usize, package: &Package) -> Self {
        Self {
            id: index + 1,
            dims: package.dimensions().as_tuple(),
            weight: package.weight(),
            cubic_weight: package.cubic_weight(),
            items: package.items().iter().map(|item| item.id).collect(),
        }
    }
}

impl PackResponse {
    fn from_packages(packages: &[Package]) -> Self {
        Self {
            packages: packages
                .iter()
                .enumerate()
                .map(|(index, package)| PackageSummary::from_package(index, package))
                .collect(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "lines": [
            { "item": { "id": 1, "dims": [300.0, 200.0, 100.0], "weight": 1500.0 }, "quantity": 1 }
        ],
        "shipping_postal_code": "89070-210",
        "products_total": "129.90"
    })
)]
pub struct QuoteOrderRequest {
    pub lines: Vec<OrderLine>,
    #[serde(default)]
    pub shipping_postal_code: Option<String>,
    /// Used when the shipping postal code is missing.
    #[serde(default)]
    pub billing_postal_code: Option<String>,
    #[serde(default)]
    #[schema(value_type = String, example = "129.90")]
    pub products_total: Decimal,
}

impl From<QuoteOrderRequest> for OrderSource {
    fn from(request: QuoteOrderRequest) -> Self {
        Self {
            lines: request.lines,
            shipping_postal_code: request.shipping_postal_code,
            billing_postal_code: request.billing_postal_code,
            products_total: request.products_total,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UnavailabilityEntry {
    pub reason: UnavailabilityReason,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct QuoteOrderResponse {
    pub available: bool,
    #[schema(value_type = Option<String>, example = "27.50")]
    pub price: Option<Decimal>,
    pub delivery: Option<DeliveryRange>,
    pub packages: Vec<PackageSummary>,
    pub unavailability_reasons: Vec<UnavailabilityEntry>,
}

impl From<OrderQuote> for QuoteOrderResponse {
    fn from(quote: OrderQuote) -> Self {
        let available = quote.is_available();
        Self {
            available,
            price: quote.price,
            delivery: quote.delivery,
            packages: PackResponse::from_packages(&quote.packages).packages,
            unavailability_reasons: quote
                .unavailability_reasons
                .into_iter()
                .map(|reason| UnavailabilityEntry {
                    message: reason.to_string(),
                    reason,
                })
                .collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn packing_error(err: PackingError) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Packing impossible",
        err.to_string(),
    )
}

/// Status code for a completed quote.
fn quote_status(quote: &OrderQuote) -> StatusCode {
    if quote.is_temporarily_unavailable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

/// Status code for a failed quote. Timeouts never get here; they end up as
/// `ServiceUnreachable` in the quote.
fn carrier_error_status(err: &CarrierError) -> StatusCode {
    match err {
        CarrierError::Remote(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn carrier_error(err: CarrierError) -> Response {
    let status = carrier_error_status(&err);
    error!(%err, status = status.as_u16(), "quote request failed");
    error_response(status, "Quote failed", err.to_string())
}

fn parse_pack_request(
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> Result<ValidatedPackRequest, Response> {
    let Json(payload) = payload.map_err(json_deserialize_error)?;
    payload
        .into_validated()
        .map_err(|err| validation_error(err.to_string()))
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_pack, handle_pack_stream, handle_quote),
    components(
        schemas(
            PackRequest,
            ConstraintRequest,
            PackResponse,
            PackageSummary,
            QuoteOrderRequest,
            QuoteOrderResponse,
            UnavailabilityEntry,
            UnavailabilityReason,
            DeliveryRange,
            PackEvent,
            OrderLine,
            Item,
            ErrorResponse
        )
    ),
    tags(
        (name = "packing", description = "Endpoints for packing orders into Correios boxes"),
        (name = "quoting", description = "Endpoints for Correios price and delivery quotes")
    )
)]
struct ApiDoc;

fn router(carrier: SharedCarrier) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/pack", post(handle_pack))
        .route("/pack_stream", post(handle_pack_stream))
        .route("/quote", post(handle_quote))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(ApiState { carrier })
}

/// Starts the API server and serves until it terminates.
pub async fn start_api_server(config: ApiConfig, carrier: SharedCarrier) -> std::io::Result<()> {
    let app = router(carrier);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        "Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        info!("Local access: http://localhost:{}", config.port());
    }
    info!("API endpoints: POST /pack, POST /pack_stream, POST /quote");
    info!("Documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /pack endpoint.
///
/// Packs the order lines greedily into as few boxes as the limits allow.
#[utoipa::path(
    post,
    path = "/pack",
    request_body = PackRequest,
    responses(
        (status = 200, description = "Successfully packed order", body = PackResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or an item that fits no package",
            body = ErrorResponse
        )
    ),
    tag = "packing"
)]
async fn handle_pack(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_pack_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let constraint = request
        .constraint
        .unwrap_or_else(|| state.carrier.settings().constraint());
    info!(items = request.items.len(), "new pack request");

    match Packer::new(Some(constraint)).pack(request.items) {
        Ok(packages) => {
            info!(packages = packages.len(), "packed order");
            (StatusCode::OK, Json(PackResponse::from_packages(&packages))).into_response()
        }
        Err(err) => packing_error(err),
    }
}

/// Handler for POST /pack_stream endpoint (SSE).
///
/// Streams pack events in real-time as Server-Sent Events (text/event-stream).
#[utoipa::path(
    post,
    path = "/pack_stream",
    request_body = PackRequest,
    responses(
        (
            status = 200,
            description = "Streams pack events in real-time",
            content_type = "text/event-stream",
            body = PackEvent
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request",
            body = ErrorResponse
        )
    ),
    tag = "packing"
)]
async fn handle_pack_stream(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_pack_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let constraint = request
        .constraint
        .unwrap_or_else(|| state.carrier.settings().constraint());
    let items = request.items;

    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let mut receiver_open = true;
        // The error is already reported as a PackingImpossible event.
        let _ = Packer::new(Some(constraint)).pack_with_progress(items, |evt| {
            if !receiver_open {
                return;
            }
            if let Ok(json) = serde_json::to_string(evt) {
                receiver_open = tx.blocking_send(json).is_ok();
            }
        });
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Handler for POST /quote endpoint.
///
/// Packs the order, quotes every package with Correios and returns the total
/// price, the delivery range and any reason the carrier is unavailable.
#[utoipa::path(
    post,
    path = "/quote",
    request_body = QuoteOrderRequest,
    responses(
        (status = 200, description = "Order quoted", body = QuoteOrderResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid request", body = ErrorResponse),
        (status = BAD_GATEWAY, description = "Correios answered with an error", body = ErrorResponse),
        (status = SERVICE_UNAVAILABLE, description = "Correios did not answer in time", body = QuoteOrderResponse)
    ),
    tag = "quoting"
)]
async fn handle_quote(
    State(state): State<ApiState>,
    payload: Result<Json<QuoteOrderRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };
    let order = OrderSource::from(request);
    info!(lines = order.lines.len(), "new quote request");

    match state.carrier.quote_order(&order).await {
        Ok(quote) => {
            let status = quote_status(&quote);
            if status != StatusCode::OK {
                error!(status = status.as_u16(), "Correios unreachable; order not quoted");
            }
            (status, Json(QuoteOrderResponse::from(quote))).into_response()
        }
        Err(err) => carrier_error(err),
    }
}

async fn serve_openapi_json() -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

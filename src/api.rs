//! REST API for the packing service.
//!
//! Exposes the engine over HTTP with Axum: a one-shot pack endpoint, a
//! Server-Sent-Events stream of pack events and the OpenAPI documentation.

use std::convert::Infallible;
use std::sync::OnceLock;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, PackingSettings};
use crate::error::PackingError;
use crate::events::PackEvent;
use crate::model::{BoxType, Item, MaxPerBox, Rotation, ValidationError};
use crate::packed::{PackedBox, PackedItem};
use crate::packer::{Packer, PackingConfig, PackingOutcome, UnpackedItem};
use crate::types::{Dimensional, Positioned, Weighted};

#[derive(Clone)]
struct ApiState {
    packing: PackingSettings,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>boxstack API Docs</title>
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
        <script>
            window.onload = function () {
                window.ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                });
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// A box type offered to the packer.
#[derive(Deserialize, Clone, ToSchema)]
pub struct BoxRequest {
    pub reference: String,
    #[schema(value_type = [u32; 3], example = json!([300, 300, 10]))]
    pub outer: (u32, u32, u32),
    #[serde(default)]
    pub empty_weight: u32,
    #[schema(value_type = [u32; 3], example = json!([296, 296, 8]))]
    pub inner: (u32, u32, u32),
    /// Gross limit including the empty weight.
    pub max_weight: u32,
    /// Number of boxes of this type in stock; unlimited when absent.
    #[serde(default)]
    #[schema(nullable = true)]
    pub quantity: Option<usize>,
}

impl BoxRequest {
    fn into_box_type(self) -> Result<BoxType, ValidationError> {
        let box_type = BoxType::new(self.reference, self.outer, self.empty_weight, self.inner, self.max_weight)?;
        Ok(match self.quantity {
            Some(quantity) => box_type.with_quantity(quantity),
            None => box_type,
        })
    }
}

fn default_quantity() -> usize {
    1
}

/// An item to pack, repeated `quantity` times.
#[derive(Deserialize, Clone, ToSchema)]
pub struct ItemRequest {
    pub description: String,
    #[schema(value_type = [u32; 3], example = json!([250, 250, 2]))]
    pub dims: (u32, u32, u32),
    pub weight: u32,
    #[serde(default)]
    #[schema(value_type = String, example = "best_fit")]
    pub rotation: Rotation,
    #[serde(default = "default_quantity")]
    pub quantity: usize,
    /// At most this many items with the same description per box.
    #[serde(default)]
    #[schema(nullable = true)]
    pub max_per_box: Option<usize>,
}

impl ItemRequest {
    fn into_item(self) -> Result<(Item, usize), ValidationError> {
        let item = Item::new(self.description, self.dims, self.weight, self.rotation)?;
        let item = match self.max_per_box {
            Some(limit) => item.with_constraint(MaxPerBox::new(limit)),
            None => item,
        };
        Ok((item, self.quantity))
    }
}

#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "boxes": [
            {
                "reference": "Le petite box",
                "outer": [300, 300, 10],
                "empty_weight": 10,
                "inner": [296, 296, 8],
                "max_weight": 1000
            }
        ],
        "items": [
            { "description": "Item 1", "dims": [250, 250, 2], "weight": 200, "quantity": 3 }
        ]
    })
)]
pub struct PackRequest {
    pub boxes: Vec<BoxRequest>,
    pub items: Vec<ItemRequest>,
    /// Report unpackable items instead of failing the request.
    #[serde(default)]
    pub infallible: bool,
}

#[derive(Debug)]
struct ValidatedPackRequest {
    boxes: Vec<BoxType>,
    items: Vec<(Item, usize)>,
    infallible: bool,
}

impl ValidatedPackRequest {
    fn box_count(&self) -> usize {
        self.boxes.len()
    }

    fn item_count(&self) -> usize {
        self.items.iter().map(|(_, quantity)| quantity).sum()
    }

    fn into_packer(self, config: PackingConfig) -> (Packer, bool) {
        let mut packer = Packer::with_config(config);
        packer.set_boxes(self.boxes);
        for (item, quantity) in self.items {
            packer.add_item(item, quantity);
        }
        (packer, self.infallible)
    }
}

#[derive(Debug)]
enum PackRequestValidationError {
    MissingBoxes,
    InvalidBox(String, ValidationError),
    InvalidItem(String, ValidationError),
}

impl PackRequest {
    fn into_validated(self) -> Result<ValidatedPackRequest, PackRequestValidationError> {
        if self.boxes.is_empty() {
            return Err(PackRequestValidationError::MissingBoxes);
        }

        let boxes = self
            .boxes
            .into_iter()
            .map(|spec| {
                let reference = spec.reference.clone();
                spec.into_box_type()
                    .map_err(|err| PackRequestValidationError::InvalidBox(reference, err))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let items = self
            .items
            .into_iter()
            .map(|spec| {
                let description = spec.description.clone();
                spec.into_item()
                    .map_err(|err| PackRequestValidationError::InvalidItem(description, err))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ValidatedPackRequest {
            boxes,
            items,
            infallible: self.infallible,
        })
    }
}

/// Response with all packed boxes.
#[derive(Serialize, ToSchema)]
pub struct PackResponse {
    pub boxes: Vec<PackedBoxResponse>,
    pub unpacked: Vec<UnpackedItemResponse>,
    pub is_complete: bool,
    pub total_weight: u64,
    /// Used over inner volume across all boxes, in percent.
    pub volume_utilisation: f64,
}

/// One packed box with its placements.
#[derive(Serialize, ToSchema)]
pub struct PackedBoxResponse {
    /// Box number (1-based).
    pub index: usize,
    pub reference: String,
    #[schema(value_type = [u32; 3], example = json!([300, 300, 10]))]
    pub outer: (u32, u32, u32),
    #[schema(value_type = [u32; 3], example = json!([296, 296, 8]))]
    pub inner: (u32, u32, u32),
    /// Gross weight including the empty box.
    pub weight: u64,
    pub item_weight: u64,
    pub volume_utilisation: f64,
    pub items: Vec<PackedItemResponse>,
}

/// One placement. Coordinates are the lower-left-bottom corner.
#[derive(Serialize, ToSchema)]
pub struct PackedItemResponse {
    pub description: String,
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub length: u32,
    pub depth: u32,
    pub weight: u32,
}

#[derive(Serialize, ToSchema)]
pub struct UnpackedItemResponse {
    pub description: String,
    #[schema(value_type = [u32; 3], example = json!([400, 400, 400]))]
    pub dims: (u32, u32, u32),
    pub weight: u32,
    pub reason_code: String,
    pub reason: String,
}

impl From<&PackedItem> for PackedItemResponse {
    fn from(placed: &PackedItem) -> Self {
        let pos = placed.position();
        let dims = placed.dimensions();
        Self {
            description: placed.item().description().to_string(),
            x: pos.x,
            y: pos.y,
            z: pos.z,
            width: dims.width,
            length: dims.length,
            depth: dims.depth,
            weight: placed.weight(),
        }
    }
}

impl PackedBoxResponse {
    fn new(index: usize, packed: &PackedBox) -> Self {
        let container = packed.container();
        Self {
            index,
            reference: container.reference().to_string(),
            outer: container.outer().as_tuple(),
            inner: container.inner().as_tuple(),
            weight: packed.weight(),
            item_weight: packed.item_weight(),
            volume_utilisation: packed.volume_utilisation(),
            items: packed.items().iter().map(PackedItemResponse::from).collect(),
        }
    }
}

impl From<UnpackedItem> for UnpackedItemResponse {
    fn from(entry: UnpackedItem) -> Self {
        Self {
            description: entry.item.description().to_string(),
            dims: entry.item.dimensions().as_tuple(),
            weight: entry.item.weight(),
            reason_code: entry.reason.code().to_string(),
            reason: entry.reason.to_string(),
        }
    }
}

impl PackResponse {
    pub fn from_outcome(outcome: PackingOutcome) -> Self {
        let is_complete = outcome.is_complete();
        let PackingOutcome { packed, unpacked } = outcome;

        Self {
            boxes: packed
                .iter()
                .enumerate()
                .map(|(i, packed_box)| PackedBoxResponse::new(i + 1, packed_box))
                .collect(),
            unpacked: unpacked.into_iter().map(UnpackedItemResponse::from).collect(),
            is_complete,
            total_weight: packed.total_weight(),
            volume_utilisation: packed.volume_utilisation(),
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

    fn from_packing_error(err: &PackingError) -> Self {
        let details = match err {
            PackingError::Timeout { .. } => err.to_string(),
            _ => describe_items(err),
        };
        Self::new(err.to_string(), details)
    }
}

/// Comma-separated descriptions of the items an error refers to.
fn describe_items(err: &PackingError) -> String {
    err.affected_items()
        .iter()
        .map(|item| item.description())
        .collect::<Vec<_>>()
        .join(", ")
}

fn error_response(status: StatusCode, error: impl Into<String>, details: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(StatusCode::UNPROCESSABLE_ENTITY, "Invalid JSON data", err.to_string())
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(StatusCode::UNPROCESSABLE_ENTITY, "Invalid input data", details)
}

fn packing_error_response(err: &PackingError) -> Response {
    let status = match err {
        PackingError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
        PackingError::ItemTooLarge { .. } | PackingError::NoBoxesAvailable { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    };
    (status, Json(ErrorResponse::from_packing_error(err))).into_response()
}

fn parse_pack_request(payload: Result<Json<PackRequest>, JsonRejection>) -> Result<ValidatedPackRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    match payload.into_validated() {
        Ok(validated) => Ok(validated),
        Err(PackRequestValidationError::MissingBoxes) => {
            Err(validation_error("At least one box type must be specified"))
        }
        Err(PackRequestValidationError::InvalidBox(reference, err)) => {
            Err(validation_error(format!("Box '{reference}': {err}")))
        }
        Err(PackRequestValidationError::InvalidItem(description, err)) => {
            Err(validation_error(format!("Item '{description}': {err}")))
        }
    }
}

fn run_pack(packer: &Packer, infallible: bool) -> Result<PackingOutcome, PackingError> {
    if infallible {
        packer.pack_infallible()
    } else {
        packer.pack().map(|packed| PackingOutcome {
            packed,
            unpacked: Vec::new(),
        })
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_pack, handle_pack_stream),
    components(
        schemas(
            PackRequest,
            BoxRequest,
            ItemRequest,
            PackResponse,
            PackedBoxResponse,
            PackedItemResponse,
            UnpackedItemResponse,
            ErrorResponse
        )
    ),
    tags((name = "packing", description = "Endpoints for 3D box packing"))
)]
struct ApiDoc;

fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/pack", post(handle_pack))
        .route("/pack_stream", post(handle_pack_stream))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server and serves until it is terminated.
///
/// # Errors
/// Fails if the listener cannot be bound or the server stops with an error.
pub async fn start_api_server(config: ApiConfig, packing: PackingSettings) -> std::io::Result<()> {
    let app = router(ApiState { packing });

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    log::info!("Server running on http://{}:{}", config.display_host(), config.port());
    if config.binds_to_all_interfaces() {
        log::info!("Local access: http://localhost:{}", config.port());
    }
    log::info!("Endpoints: POST /pack, POST /pack_stream, GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /pack.
///
/// Packs the items into as few boxes as possible and answers with the full
/// layout.
#[utoipa::path(
    post,
    path = "/pack",
    request_body = PackRequest,
    responses(
        (status = 200, description = "Items packed", body = PackResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request, or items that cannot be packed",
            body = ErrorResponse
        ),
        (status = REQUEST_TIMEOUT, description = "Packing exceeded its time budget", body = ErrorResponse)
    ),
    tag = "packing"
)]
async fn handle_pack(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> Response {
    let request = match parse_pack_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    log::info!(
        "New pack request: {} items, {} box types",
        request.item_count(),
        request.box_count()
    );
    let (packer, infallible) = request.into_packer(state.packing.packing_config());

    match tokio::task::spawn_blocking(move || run_pack(&packer, infallible)).await {
        Ok(Ok(outcome)) => {
            log::info!(
                "Result: {} boxes, {} unpacked items",
                outcome.box_count(),
                outcome.unpacked_count()
            );
            (StatusCode::OK, Json(PackResponse::from_outcome(outcome))).into_response()
        }
        Ok(Err(err)) => {
            log::warn!("Pack request failed: {err}");
            packing_error_response(&err)
        }
        Err(err) => {
            log::error!("Packing task failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Packing task failed", err.to_string())
        }
    }
}

/// Handler for POST /pack_stream (SSE).
///
/// Streams `pack` events while the engine works, then one `result` event with
/// the same body as POST /pack, or one `error` event.
#[utoipa::path(
    post,
    path = "/pack_stream",
    request_body = PackRequest,
    responses(
        (
            status = 200,
            description = "Streams pack events in real-time",
            content_type = "text/event-stream",
            body = String
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
) -> Response {
    let request = match parse_pack_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::channel::<Event>(32);
    let (mut packer, infallible) = request.into_packer(state.packing.packing_config());

    let progress = tx.clone();
    packer.set_observer(move |event: &PackEvent| {
        if let Ok(json) = serde_json::to_string(event) {
            // Fails only once the client has gone away.
            let _ = progress.blocking_send(Event::default().event("pack").data(json));
        }
    });

    tokio::task::spawn_blocking(move || {
        let last = match run_pack(&packer, infallible) {
            Ok(outcome) => serde_json::to_string(&PackResponse::from_outcome(outcome))
                .map(|json| Event::default().event("result").data(json)),
            Err(err) => serde_json::to_string(&ErrorResponse::from_packing_error(&err))
                .map(|json| Event::default().event("error").data(json)),
        };
        match last {
            Ok(event) => {
                let _ = tx.blocking_send(event);
            }
            Err(err) => log::error!("Could not serialise the final event: {err}"),
        }
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

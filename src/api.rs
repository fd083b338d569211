//! REST API for the dispatch service.
//!
//! Thin HTTP layer over the [`Depot`]: request parsing, error mapping and
//! OpenAPI documentation. Uses Axum as the web framework and supports CORS.

use std::sync::{Arc, OnceLock};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, State};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

use crate::allocator::{AllocationError, AllocationOutcome, AllocationStrategy};
use crate::config::ApiConfig;
use crate::depot::{Depot, DepotError};
use crate::model::{Package, PackageId, PackageStatus, Truck, TruckId, TruckStatus};
use crate::types::Dimensions;

#[derive(Clone)]
struct ApiState {
    depot: Arc<Depot>,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>truck-dispatch API Docs</title>
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

/// Truck as returned by the API.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TruckRead {
    pub id: TruckId,
    #[schema(value_type = String, example = json!("12.00"))]
    pub length: Decimal,
    #[schema(value_type = String, example = json!("2.40"))]
    pub width: Decimal,
    #[schema(value_type = String, example = json!("2.60"))]
    pub height: Decimal,
    pub status: TruckStatus,
}

impl From<Truck> for TruckRead {
    fn from(truck: Truck) -> Self {
        let (length, width, height) = truck.dims.as_tuple();
        Self {
            id: truck.id,
            length,
            width,
            height,
            status: truck.status,
        }
    }
}

/// Package as returned by the API.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct PackageRead {
    pub id: PackageId,
    #[schema(value_type = String, example = json!("1.20"))]
    pub length: Decimal,
    #[schema(value_type = String, example = json!("0.80"))]
    pub width: Decimal,
    #[schema(value_type = String, example = json!("0.50"))]
    pub height: Decimal,
    pub status: PackageStatus,
    pub truck_id: Option<TruckId>,
}

impl From<Package> for PackageRead {
    fn from(pkg: Package) -> Self {
        let (length, width, height) = pkg.dims.as_tuple();
        Self {
            id: pkg.id,
            length,
            width,
            height,
            status: pkg.status,
            truck_id: pkg.truck_id,
        }
    }
}

/// Body for changing a truck's status outside an assignment run.
#[derive(Deserialize, ToSchema)]
#[schema(example = json!({ "status": "MAINTENANCE" }))]
pub struct TruckStatusUpdate {
    pub status: TruckStatus,
}

/// Request structure for the assignment endpoint.
#[derive(Deserialize, ToSchema)]
#[schema(example = json!({ "package_ids": [1, 2, 3], "use_bin_packing": true }))]
pub struct AssignRequest {
    pub package_ids: Vec<PackageId>,
    /// Falls back to the configured default strategy when omitted.
    #[serde(default)]
    #[schema(nullable = true)]
    pub use_bin_packing: Option<bool>,
}

/// Assigned and deferred package ids plus a status message.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AssignResponse {
    pub assigned: Vec<PackageId>,
    pub deferred: Vec<PackageId>,
    pub message: String,
}

impl From<AllocationOutcome> for AssignResponse {
    fn from(outcome: AllocationOutcome) -> Self {
        Self {
            assigned: outcome.assigned,
            deferred: outcome.deferred,
            message: outcome.message,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub details: String,
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

fn depot_error(err: DepotError) -> Response {
    let details = err.to_string();
    match err {
        DepotError::PackagesNotFound(_)
        | DepotError::TruckNotFound(_)
        | DepotError::PackageNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, "Not found", details)
        }
        DepotError::Allocation(AllocationError::NoCapacity) => {
            error_response(StatusCode::CONFLICT, "No capacity", details)
        }
        DepotError::PackagesNotPending(_) | DepotError::InvalidTransition(_) => {
            error_response(StatusCode::CONFLICT, "Invalid state", details)
        }
        DepotError::Validation(_) | DepotError::Allocation(AllocationError::VolumeOverflow) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, "Invalid input data", details)
        }
    }
}

fn parse_json<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload.map(|Json(value)| value).map_err(json_deserialize_error)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handle_add_truck,
        handle_list_trucks,
        handle_set_truck_status,
        handle_add_package,
        handle_list_packages,
        handle_get_package,
        handle_ship_package,
        handle_assign
    ),
    components(
        schemas(
            Dimensions,
            TruckRead,
            PackageRead,
            TruckStatus,
            PackageStatus,
            TruckStatusUpdate,
            AssignRequest,
            AssignResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "fleet", description = "Trucks and packages"),
        (name = "assignment", description = "Package-to-truck assignment")
    )
)]
struct ApiDoc;

/// Builds the router with all endpoints.
pub fn router(depot: Arc<Depot>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = ApiState { depot };

    Router::new()
        .route("/trucks", post(handle_add_truck).get(handle_list_trucks))
        .route("/trucks/{id}/status", put(handle_set_truck_status))
        .route("/packages", post(handle_add_package).get(handle_list_packages))
        .route("/packages/{id}", get(handle_get_package))
        .route("/packages/{id}/ship", post(handle_ship_package))
        .route("/assign", post(handle_assign))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the API server.
///
/// Blocks until the server is terminated.
pub async fn start_api_server(config: ApiConfig, depot: Arc<Depot>) -> std::io::Result<()> {
    let app = router(depot);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await.inspect_err(|err| {
        error!("❌ Could not bind API server to {}: {}", addr, err);
    })?;

    let display_host = config.display_host().to_string();
    info!(
        "🚀 Server running on http://{}:{}",
        display_host,
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        info!("💡 Local access: http://localhost:{}", config.port());
    }
    info!("🚚 API Endpoints: POST/GET /trucks, PUT /trucks/{{id}}/status, POST/GET /packages, GET /packages/{{id}}, POST /packages/{{id}}/ship, POST /assign");
    info!("📑 Documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await.inspect_err(|err| {
        error!("❌ API server terminated with an error: {err}");
    })
}

/// Handler for POST /trucks.
#[utoipa::path(
    post,
    path = "/trucks",
    request_body = Dimensions,
    responses(
        (status = CREATED, description = "Truck added and available", body = TruckRead),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid dimensions", body = ErrorResponse)
    ),
    tag = "fleet"
)]
async fn handle_add_truck(
    State(state): State<ApiState>,
    payload: Result<Json<Dimensions>, JsonRejection>,
) -> Response {
    let dims = match parse_json(payload) {
        Ok(dims) => dims,
        Err(response) => return response,
    };
    match state.depot.add_truck(dims).await {
        Ok(truck) => (StatusCode::CREATED, Json(TruckRead::from(truck))).into_response(),
        Err(err) => depot_error(err),
    }
}

/// Handler for GET /trucks.
#[utoipa::path(
    get,
    path = "/trucks",
    responses((status = OK, description = "All trucks in id order", body = [TruckRead])),
    tag = "fleet"
)]
async fn handle_list_trucks(State(state): State<ApiState>) -> Response {
    let trucks: Vec<TruckRead> = state
        .depot
        .trucks()
        .await
        .into_iter()
        .map(TruckRead::from)
        .collect();
    Json(trucks).into_response()
}

/// Handler for PUT /trucks/{id}/status.
///
/// Returns a truck to AVAILABLE or sends it to MAINTENANCE.
#[utoipa::path(
    put,
    path = "/trucks/{id}/status",
    params(("id" = u64, Path, description = "Truck id")),
    request_body = TruckStatusUpdate,
    responses(
        (status = OK, description = "Status changed", body = TruckRead),
        (status = NOT_FOUND, description = "Unknown truck", body = ErrorResponse),
        (status = CONFLICT, description = "Transition not allowed", body = ErrorResponse)
    ),
    tag = "fleet"
)]
async fn handle_set_truck_status(
    State(state): State<ApiState>,
    Path(id): Path<TruckId>,
    payload: Result<Json<TruckStatusUpdate>, JsonRejection>,
) -> Response {
    let update = match parse_json(payload) {
        Ok(update) => update,
        Err(response) => return response,
    };
    match state.depot.set_truck_status(id, update.status).await {
        Ok(truck) => Json(TruckRead::from(truck)).into_response(),
        Err(err) => depot_error(err),
    }
}

/// Handler for POST /packages.
#[utoipa::path(
    post,
    path = "/packages",
    request_body = Dimensions,
    responses(
        (status = CREATED, description = "Package added and pending", body = PackageRead),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid dimensions", body = ErrorResponse)
    ),
    tag = "fleet"
)]
async fn handle_add_package(
    State(state): State<ApiState>,
    payload: Result<Json<Dimensions>, JsonRejection>,
) -> Response {
    let dims = match parse_json(payload) {
        Ok(dims) => dims,
        Err(response) => return response,
    };
    match state.depot.add_package(dims).await {
        Ok(pkg) => (StatusCode::CREATED, Json(PackageRead::from(pkg))).into_response(),
        Err(err) => depot_error(err),
    }
}

/// Handler for GET /packages.
#[utoipa::path(
    get,
    path = "/packages",
    responses((status = OK, description = "All packages in id order", body = [PackageRead])),
    tag = "fleet"
)]
async fn handle_list_packages(State(state): State<ApiState>) -> Response {
    let packages: Vec<PackageRead> = state
        .depot
        .packages()
        .await
        .into_iter()
        .map(PackageRead::from)
        .collect();
    Json(packages).into_response()
}

/// Handler for GET /packages/{id}.
#[utoipa::path(
    get,
    path = "/packages/{id}",
    params(("id" = u64, Path, description = "Package id")),
    responses(
        (status = OK, description = "The package", body = PackageRead),
        (status = NOT_FOUND, description = "Unknown package", body = ErrorResponse)
    ),
    tag = "fleet"
)]
async fn handle_get_package(
    State(state): State<ApiState>,
    Path(id): Path<PackageId>,
) -> Response {
    match state.depot.package(id).await {
        Ok(pkg) => Json(PackageRead::from(pkg)).into_response(),
        Err(err) => depot_error(err),
    }
}

/// Handler for POST /packages/{id}/ship.
#[utoipa::path(
    post,
    path = "/packages/{id}/ship",
    params(("id" = u64, Path, description = "Package id")),
    responses(
        (status = OK, description = "Package shipped", body = PackageRead),
        (status = NOT_FOUND, description = "Unknown package", body = ErrorResponse),
        (status = CONFLICT, description = "Package is not assigned", body = ErrorResponse)
    ),
    tag = "fleet"
)]
async fn handle_ship_package(
    State(state): State<ApiState>,
    Path(id): Path<PackageId>,
) -> Response {
    match state.depot.ship_package(id).await {
        Ok(pkg) => Json(PackageRead::from(pkg)).into_response(),
        Err(err) => depot_error(err),
    }
}

/// Handler for POST /assign.
///
/// Assigns the requested packages to trucks. Deferrals are a normal outcome
/// and are reported in the response body.
#[utoipa::path(
    post,
    path = "/assign",
    request_body = AssignRequest,
    responses(
        (status = OK, description = "Assignment outcome", body = AssignResponse),
        (status = NOT_FOUND, description = "Unknown package ids", body = ErrorResponse),
        (status = CONFLICT, description = "No available trucks or packages not pending", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "assignment"
)]
async fn handle_assign(
    State(state): State<ApiState>,
    payload: Result<Json<AssignRequest>, JsonRejection>,
) -> Response {
    let request = match parse_json(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    info!(
        "📥 New assignment request: {} packages",
        request.package_ids.len()
    );
    let strategy = request
        .use_bin_packing
        .map(AllocationStrategy::from_bin_packing_flag);

    match state.depot.assign(&request.package_ids, strategy).await {
        Ok(outcome) => {
            info!("📦 {}", outcome.message);
            Json(AssignResponse::from(outcome)).into_response()
        }
        Err(err) => depot_error(err),
    }
}

async fn serve_openapi_json() -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, header};
    use tower::ServiceExt;

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn app() -> Router {
        router(Arc::new(Depot::default()))
    }

    async fn add(app: &Router, uri: &str, length: &str) {
        let body = format!(r#"{{"length": "{}", "width": "1.00", "height": "1.00"}}"#, length);
        let (status, _) = send(app, Method::POST, uri, Some(&body)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        for path in ["/trucks", "/trucks/{id}/status", "/packages", "/packages/{id}", "/assign"] {
            assert!(
                paths.contains_key(path),
                "OpenAPI documentation is missing the {} path",
                path
            );
        }
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        for name in ["AssignRequest", "AssignResponse", "ErrorResponse", "TruckRead"] {
            assert!(
                components.schemas.contains_key(name),
                "Expected schema '{}' is missing from the OpenAPI document",
                name
            );
        }
    }

    #[test]
    fn assign_request_parses_use_bin_packing_when_absent_or_null() {
        let request: AssignRequest = serde_json::from_str(r#"{"package_ids": [1, 2]}"#).unwrap();
        assert_eq!(request.use_bin_packing, None);
        let request: AssignRequest =
            serde_json::from_str(r#"{"package_ids": [], "use_bin_packing": null}"#).unwrap();
        assert_eq!(request.use_bin_packing, None);
        let request: AssignRequest =
            serde_json::from_str(r#"{"package_ids": [3], "use_bin_packing": true}"#).unwrap();
        assert_eq!(request.use_bin_packing, Some(true));
    }

    #[tokio::test]
    async fn add_truck_returns_created_truck() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/trucks",
            Some(r#"{"length": "12.00", "width": "2.50", "height": 3}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], 1);
        assert_eq!(body["length"], "12.00");
        assert_eq!(body["status"], "AVAILABLE");
    }

    #[tokio::test]
    async fn invalid_dimensions_are_unprocessable() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/packages",
            Some(r#"{"length": "-1", "width": "1", "height": "1"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Invalid input data");

        let (status, body) = send(&app, Method::POST, "/packages", Some("{")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Invalid JSON data");
    }

    #[tokio::test]
    async fn assign_with_bin_packing_reports_outcome() {
        let app = app();
        add(&app, "/trucks", "500.00").await;
        add(&app, "/trucks", "500.00").await;
        add(&app, "/packages", "400.00").await;
        add(&app, "/packages", "300.00").await;
        add(&app, "/packages", "100.00").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/assign",
            Some(r#"{"package_ids": [1, 2, 3], "use_bin_packing": true}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["assigned"], json!([1, 3]));
        assert_eq!(body["deferred"], json!([2]));
        assert_eq!(body["message"], "Assigned 2 pkg(s); 1 deferred.");

        let (_, pkg) = send(&app, Method::GET, "/packages/3", None).await;
        assert_eq!(pkg["status"], "ASSIGNED");
        assert_eq!(pkg["truck_id"], 1);

        let (_, trucks) = send(&app, Method::GET, "/trucks", None).await;
        assert_eq!(trucks[0]["status"], "LOADED");
        assert_eq!(trucks[1]["status"], "AVAILABLE");
    }

    #[tokio::test]
    async fn assign_defaults_to_single_truck() {
        let app = app();
        add(&app, "/trucks", "1000.00").await;
        add(&app, "/packages", "100.00").await;
        add(&app, "/packages", "200.00").await;

        let (status, body) = send(&app, Method::POST, "/assign", Some(r#"{"package_ids": [1, 2]}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["assigned"], json!([]));
        assert_eq!(body["deferred"], json!([1, 2]));
        assert_eq!(body["message"], "Load <80% of truck 1; 2 package(s) deferred.");
    }

    #[tokio::test]
    async fn assign_maps_errors_to_status_codes() {
        let app = app();
        add(&app, "/packages", "10.00").await;

        let (status, body) = send(&app, Method::POST, "/assign", Some(r#"{"package_ids": [1]}"#)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "No capacity");

        let (status, body) = send(&app, Method::POST, "/assign", Some(r#"{"package_ids": [1, 5]}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["details"], "Package(s) not found: 5");
    }

    #[test]
    fn volume_overflow_is_unprocessable() {
        let response = depot_error(DepotError::Allocation(AllocationError::VolumeOverflow));
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn truck_status_and_shipping_flow() {
        let app = app();
        add(&app, "/trucks", "100.00").await;
        add(&app, "/packages", "90.00").await;
        send(&app, Method::POST, "/assign", Some(r#"{"package_ids": [1]}"#)).await;

        let (status, _) = send(
            &app,
            Method::PUT,
            "/trucks/1/status",
            Some(r#"{"status": "AVAILABLE"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, pkg) = send(&app, Method::POST, "/packages/1/ship", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pkg["status"], "SHIPPED");

        let (status, truck) = send(
            &app,
            Method::PUT,
            "/trucks/1/status",
            Some(r#"{"status": "MAINTENANCE"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(truck["status"], "MAINTENANCE");

        let (status, _) = send(&app, Method::GET, "/packages/42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::{debug, error, info, instrument, warn};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::metrics::{self, Verdict};
use crate::normalize::Month;
use crate::services::{DashboardService, ServiceError};
use crate::session::SessionError;

pub mod views;

use views::*;

#[derive(Clone)]
pub struct AppState {
    pub dashboard: DashboardService,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_units,
        get_unit_records,
        get_unit_summary,
        create_session,
        end_session,
        select_unit,
        get_override,
        edit_cell,
        reset_session,
        get_projections,
        get_statistics,
        ratio,
        refresh_table,
    ),
    components(schemas(
        HealthResponse,
        UnitView,
        GoalView,
        WeightingView,
        ProjectionView,
        RecordView,
        OverrideRowView,
        OverrideView,
        RankedView,
        AggregateView,
        RowProjectionView,
        ProjectionsResponse,
        StatisticsView,
        StatisticsResponse,
        UnitSummaryView,
        SessionCreated,
        SelectUnitRequest,
        EditCellRequest,
        RatioResponse,
        RefreshResponse,
        Verdict,
    )),
    tags((name = "health-goals", description = "Health goal compliance dashboard API"))
)]
pub struct ApiDoc;

pub fn generate_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/openapi.json", get(openapi_json))
        .route("/units", get(list_units))
        .route("/units/{unit}/records", get(get_unit_records))
        .route("/units/{unit}/summary", get(get_unit_summary))
        .route("/sessions", post(create_session))
        .route("/sessions/{session_id}", delete(end_session))
        .route("/sessions/{session_id}/unit", put(select_unit))
        .route("/sessions/{session_id}/override", get(get_override))
        .route(
            "/sessions/{session_id}/rows/{row}/months/{month}",
            put(edit_cell),
        )
        .route("/sessions/{session_id}/reset", post(reset_session))
        .route("/sessions/{session_id}/projections", get(get_projections))
        .route("/sessions/{session_id}/statistics", get(get_statistics))
        .route("/ratio", get(ratio))
        .route("/table/refresh", post(refresh_table))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}

fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::UnknownUnit(_) | ServiceError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Session(SessionError::UnknownUnit(_))
        | ServiceError::Session(SessionError::RowOutOfRange { .. }) => StatusCode::NOT_FOUND,
        ServiceError::Session(SessionError::NoUnitSelected) => StatusCode::CONFLICT,
        ServiceError::Session(SessionError::InvalidValue(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Refresh(_) => StatusCode::BAD_GATEWAY,
    }
}

fn reject(context: &str, err: ServiceError) -> StatusCode {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("{}: {}", context, err);
    } else {
        warn!("{}: {}", context, err);
    }
    status
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service is up and the sheet is loaded", body = HealthResponse))
)]
#[instrument(skip(state))]
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");
    let table = state.dashboard.table();
    let response = HealthResponse {
        status: "healthy".to_string(),
        records: table.records().len(),
        units: table.units().len(),
        active_sessions: state.dashboard.session_count(),
        fetched_at: table.fetched_at(),
    };
    (StatusCode::OK, Json(response))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(generate_openapi_spec())
}

#[utoipa::path(
    get,
    path = "/api/v1/units",
    responses((status = 200, description = "Performance units in sheet order", body = [UnitView]))
)]
#[instrument(skip(state))]
async fn list_units(State(state): State<AppState>) -> Json<Vec<UnitView>> {
    let units: Vec<UnitView> = state
        .dashboard
        .units()
        .into_iter()
        .map(UnitView::from)
        .collect();
    info!("Listing {} units", units.len());
    Json(units)
}

#[utoipa::path(
    get,
    path = "/api/v1/units/{unit}/records",
    params(("unit" = String, Path, description = "Performance unit name")),
    responses(
        (status = 200, description = "Normalized indicator records of the unit", body = [RecordView]),
        (status = 404, description = "Unknown unit")
    )
)]
#[instrument(skip(state), fields(unit = %unit))]
async fn get_unit_records(
    State(state): State<AppState>,
    Path(unit): Path<String>,
) -> Result<Json<Vec<RecordView>>, StatusCode> {
    let records = state
        .dashboard
        .unit_records(&unit)
        .map_err(|e| reject("Failed to fetch unit records", e))?;

    info!("Retrieved {} records for unit {}", records.len(), unit);
    Ok(Json(records.iter().map(RecordView::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/units/{unit}/summary",
    params(("unit" = String, Path, description = "Performance unit name")),
    responses(
        (status = 200, description = "Headline numbers for the unit", body = UnitSummaryView),
        (status = 404, description = "Unknown unit")
    )
)]
#[instrument(skip(state), fields(unit = %unit))]
async fn get_unit_summary(
    State(state): State<AppState>,
    Path(unit): Path<String>,
) -> Result<Json<UnitSummaryView>, StatusCode> {
    let summary = state
        .dashboard
        .unit_summary(&unit)
        .map_err(|e| reject("Failed to summarize unit", e))?;
    Ok(Json(UnitSummaryView::new(&unit, summary)))
}

#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    responses((status = 201, description = "Session created", body = SessionCreated))
)]
#[instrument(skip(state))]
async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let session_id = state.dashboard.create_session();
    (StatusCode::CREATED, Json(SessionCreated { session_id }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/sessions/{session_id}",
    params(("session_id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session ended and its edits discarded"),
        (status = 404, description = "Unknown session")
    )
)]
#[instrument(skip(state), fields(session_id = %session_id))]
async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    state
        .dashboard
        .end_session(session_id)
        .map_err(|e| reject("Failed to end session", e))?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/v1/sessions/{session_id}/unit",
    params(("session_id" = Uuid, Path, description = "Session id")),
    request_body = SelectUnitRequest,
    responses(
        (status = 200, description = "Editable rows of the selected unit", body = OverrideView),
        (status = 404, description = "Unknown session or unit")
    )
)]
#[instrument(skip(state, request), fields(session_id = %session_id, unit = %request.unit))]
async fn select_unit(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SelectUnitRequest>,
) -> Result<Json<OverrideView>, StatusCode> {
    let session_override = state
        .dashboard
        .select_unit(session_id, &request.unit)
        .map_err(|e| reject("Failed to select unit", e))?;

    info!(
        "Session {} selected unit {} ({} rows)",
        session_id,
        request.unit,
        session_override.rows().len()
    );
    Ok(Json(OverrideView::from(&session_override)))
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions/{session_id}/override",
    params(("session_id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Editable rows of the selected unit", body = OverrideView),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "No unit selected yet")
    )
)]
#[instrument(skip(state), fields(session_id = %session_id))]
async fn get_override(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<OverrideView>, StatusCode> {
    let session_override = state
        .dashboard
        .current_override(session_id)
        .map_err(|e| reject("Failed to fetch override", e))?;
    Ok(Json(OverrideView::from(&session_override)))
}

#[utoipa::path(
    put,
    path = "/api/v1/sessions/{session_id}/rows/{row}/months/{month}",
    params(
        ("session_id" = Uuid, Path, description = "Session id"),
        ("row" = usize, Path, description = "Zero-based row within the selected unit"),
        ("month" = String, Path, description = "Month name (\"march\") or number (3)")
    ),
    request_body = EditCellRequest,
    responses(
        (status = 200, description = "Edited row with its new projection", body = OverrideRowView),
        (status = 400, description = "Unknown month"),
        (status = 404, description = "Unknown session or row"),
        (status = 409, description = "No unit selected yet"),
        (status = 422, description = "Value outside 0-100")
    )
)]
#[instrument(skip(state, request), fields(session_id = %session_id, row = %row, month = %month))]
async fn edit_cell(
    State(state): State<AppState>,
    Path((session_id, row, month)): Path<(Uuid, usize, String)>,
    Json(request): Json<EditCellRequest>,
) -> Result<Json<OverrideRowView>, StatusCode> {
    let month: Month = month.parse().map_err(|e| {
        warn!("Rejecting edit: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    let edited = state
        .dashboard
        .edit_cell(session_id, row, month, request.value)
        .map_err(|e| reject("Failed to edit cell", e))?;

    debug!(
        "Session {} set row {} {} to {:?}",
        session_id, row, month, request.value
    );
    Ok(Json(OverrideRowView::new(row, &edited)))
}

#[utoipa::path(
    post,
    path = "/api/v1/sessions/{session_id}/reset",
    params(("session_id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Rows of the selected unit restored from the sheet", body = OverrideView),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "No unit selected yet")
    )
)]
#[instrument(skip(state), fields(session_id = %session_id))]
async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<OverrideView>, StatusCode> {
    let session_override = state
        .dashboard
        .reset(session_id)
        .map_err(|e| reject("Failed to reset session", e))?;

    info!(
        "Session {} reset unit {}",
        session_id,
        session_override.unit()
    );
    Ok(Json(OverrideView::from(&session_override)))
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions/{session_id}/projections",
    params(("session_id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Projected value and verdict per row, plus aggregates", body = ProjectionsResponse),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "No unit selected yet")
    )
)]
#[instrument(skip(state), fields(session_id = %session_id))]
async fn get_projections(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ProjectionsResponse>, StatusCode> {
    let session_override = state
        .dashboard
        .current_override(session_id)
        .map_err(|e| reject("Failed to compute projections", e))?;
    Ok(Json(ProjectionsResponse::from(&session_override)))
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions/{session_id}/statistics",
    params(("session_id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Descriptive statistics per row", body = StatisticsResponse),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "No unit selected yet")
    )
)]
#[instrument(skip(state), fields(session_id = %session_id))]
async fn get_statistics(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<StatisticsResponse>, StatusCode> {
    let session_override = state
        .dashboard
        .current_override(session_id)
        .map_err(|e| reject("Failed to compute statistics", e))?;
    Ok(Json(StatisticsResponse::from(&session_override)))
}

#[utoipa::path(
    get,
    path = "/api/v1/ratio",
    params(RatioQuery),
    responses(
        (status = 200, description = "numerator / denominator as a percentage", body = RatioResponse),
        (status = 400, description = "Zero denominator or missing parameters")
    )
)]
#[instrument]
async fn ratio(Query(query): Query<RatioQuery>) -> Result<Json<RatioResponse>, StatusCode> {
    let percentage =
        metrics::ratio_percentage(query.numerator, query.denominator).ok_or_else(|| {
            warn!("Rejecting ratio with zero denominator");
            StatusCode::BAD_REQUEST
        })?;

    Ok(Json(RatioResponse {
        numerator: query.numerator,
        denominator: query.denominator,
        percentage,
        display: metrics::display_or_na(Some(percentage)),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/table/refresh",
    responses(
        (status = 200, description = "Sheet re-fetched; new sessions use the new table", body = RefreshResponse),
        (status = 502, description = "Sheet source unavailable or malformed; current table kept")
    )
)]
#[instrument(skip(state))]
async fn refresh_table(State(state): State<AppState>) -> Result<Json<RefreshResponse>, StatusCode> {
    let table = state
        .dashboard
        .refresh()
        .await
        .map_err(|e| reject("Failed to refresh sheet", e))?;
    Ok(Json(RefreshResponse::from(table.as_ref())))
}

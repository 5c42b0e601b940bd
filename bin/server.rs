// Tithe Ledger - Web Server
// REST API with Axum over the shared TitheService

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tithe_ledger::{
    logging, AggregateReportData, BialInfo, BulkRemoveOutcome, Config, ContributionImportReport,
    ContributionRow, Event, Family, FamilyImportReport, FamilyRow, FamilyUpdate, FamilyWithTithe,
    FamilyYearlyData, LedgerError, Session, TitheLog, TithePatch, TitheService, TransferOutcome,
    UserRole, Vawngtu, YearlyFamilyTotal,
};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tithe-server", version, about = "Tithe ledger REST server")]
struct Args {
    /// JSON config file
    #[arg(long, env = "TITHE_LEDGER_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    #[arg(long, default_value = "0.0.0.0:3000")]
    bind: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<TitheService>>,
}

impl AppState {
    fn lock(&self) -> MutexGuard<'_, TitheService> {
        // Writes are single SQLite transactions; a poisoned lock holds no partial state
        self.svc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// Responses & Errors
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError(e)
    }
}

fn status_for(e: &LedgerError) -> StatusCode {
    match e {
        LedgerError::DuplicateFamily { .. } => StatusCode::CONFLICT,
        LedgerError::LockedPeriod { .. } => StatusCode::LOCKED,
        LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::Permission(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if !self.0.is_user_error() {
            error!(code = self.0.code(), error = %self.0, "request failed");
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: self.0.code(),
                message: self.0.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

// ============================================================================
// Request helpers
// ============================================================================

/// Caller identity from the x-user-id header, resolved against user_roles
fn session(svc: &TitheService, headers: &HeaderMap) -> Result<Session, LedgerError> {
    let uid = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| LedgerError::permission("missing x-user-id header"))?;

    svc.resolve_session(uid)
}

/// Decode URL-encoded unit names ("Bial%201" → "Bial 1")
fn decode(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

#[derive(Deserialize)]
struct YearQuery {
    year: Option<i32>,
}

#[derive(Deserialize)]
struct NamesBody {
    names: Vec<String>,
}

#[derive(Deserialize)]
struct ArchiveBody {
    archived: bool,
}

#[derive(Deserialize)]
struct AddFamilyBody {
    name: String,
}

#[derive(Deserialize)]
struct FamilyRowsBody {
    rows: Vec<FamilyRow>,
}

#[derive(Deserialize)]
struct ContributionRowsBody {
    rows: Vec<ContributionRow>,
}

#[derive(Deserialize)]
struct TransferBody {
    destination: String,
    year: Option<i32>,
}

#[derive(Deserialize)]
struct BulkRemoveBody {
    ids: Vec<String>,
    year: Option<i32>,
}

#[derive(Deserialize)]
struct VawngtuBody {
    vawngtu: Vec<Vawngtu>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/years/:year/bials
async fn get_bials(State(state): State<AppState>, headers: HeaderMap, Path(year): Path<i32>) -> ApiResult<Vec<String>> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.fetch_upa_bials(&session, year)?)
}

/// PUT /api/years/:year/bials
async fn put_bials(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(year): Path<i32>,
    Json(body): Json<NamesBody>,
) -> ApiResult<Vec<String>> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.update_upa_bials_list(&session, year, &body.names)?)
}

/// GET /api/years/:year/bials/:bial/in-use
async fn get_bial_in_use(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((year, bial)): Path<(i32, String)>,
) -> ApiResult<bool> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.is_bial_in_use(&session, year, &decode(&bial))?)
}

/// GET /api/years/:year/bials/:bial/info
async fn get_bial_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((year, bial)): Path<(i32, String)>,
) -> ApiResult<BialInfo> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.fetch_bial_info(&session, year, &decode(&bial))?)
}

/// PUT /api/years/:year/bials/:bial/info
async fn put_bial_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((year, bial)): Path<(i32, String)>,
    Json(body): Json<VawngtuBody>,
) -> ApiResult<BialInfo> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.update_bial_info(&session, year, &decode(&bial), body.vawngtu)?)
}

/// GET /api/years/:year/archive
async fn get_archive(State(state): State<AppState>, headers: HeaderMap, Path(year): Path<i32>) -> ApiResult<bool> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.fetch_archive_status(&session, year)?)
}

/// PUT /api/years/:year/archive
async fn put_archive(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(year): Path<i32>,
    Json(body): Json<ArchiveBody>,
) -> ApiResult<bool> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    svc.update_archive_status(&session, year, body.archived)?;
    ok(body.archived)
}

/// GET /api/years/:year/months/:month/bials/:bial/families
async fn get_families(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((year, month, bial)): Path<(i32, u32, String)>,
) -> ApiResult<Vec<FamilyWithTithe>> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.fetch_families(&session, year, month, &decode(&bial))?)
}

/// POST /api/years/:year/bials/:bial/families
async fn post_family(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((year, bial)): Path<(i32, String)>,
    Json(body): Json<AddFamilyBody>,
) -> ApiResult<Family> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.add_family(&session, year, &decode(&bial), &body.name)?)
}

/// POST /api/years/:year/bials/:bial/families/import
async fn import_families(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((year, bial)): Path<(i32, String)>,
    Json(body): Json<FamilyRowsBody>,
) -> ApiResult<FamilyImportReport> {
    let mut svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.import_families(&session, year, &decode(&bial), body.rows)?)
}

/// POST /api/years/:year/months/:month/bials/:bial/contributions
async fn import_contributions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((year, month, bial)): Path<(i32, u32, String)>,
    Json(body): Json<ContributionRowsBody>,
) -> ApiResult<ContributionImportReport> {
    let mut svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.import_contributions(&session, year, month, &decode(&bial), body.rows)?)
}

/// PUT /api/years/:year/months/:month/bials/:bial/families/:family_id/tithe
async fn put_tithe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((year, month, bial, family_id)): Path<(i32, u32, String, String)>,
    Json(patch): Json<TithePatch>,
) -> ApiResult<TitheLog> {
    let mut svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.update_tithe(&session, year, month, &decode(&bial), &family_id, &patch)?)
}

/// GET /api/families/unassigned
async fn get_unassigned(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<Family>> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.fetch_unassigned_families(&session)?)
}

/// PATCH /api/families/:id?year=
async fn patch_family(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(family_id): Path<String>,
    Query(query): Query<YearQuery>,
    Json(update): Json<FamilyUpdate>,
) -> ApiResult<Family> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    let year = query.year.unwrap_or_else(|| svc.current_year());
    ok(svc.update_family_details(&session, year, &family_id, &update)?)
}

/// DELETE /api/families/:id?year=
async fn delete_family(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(family_id): Path<String>,
    Query(query): Query<YearQuery>,
) -> ApiResult<Family> {
    let mut svc = state.lock();
    let session = session(&svc, &headers)?;
    let year = query.year.unwrap_or_else(|| svc.current_year());
    ok(svc.remove_family(&session, &family_id, year)?)
}

/// POST /api/families/:id/transfer
async fn transfer_family(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(family_id): Path<String>,
    Json(body): Json<TransferBody>,
) -> ApiResult<TransferOutcome> {
    let mut svc = state.lock();
    let session = session(&svc, &headers)?;
    let year = body.year.unwrap_or_else(|| svc.current_year());
    ok(svc.transfer_family(&session, &family_id, &body.destination, year)?)
}

/// POST /api/families/:id/unassign?year=
async fn unassign_family(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(family_id): Path<String>,
    Query(query): Query<YearQuery>,
) -> ApiResult<Family> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    let year = query.year.unwrap_or_else(|| svc.current_year());
    ok(svc.unassign_family_from_bial(&session, &family_id, year)?)
}

/// POST /api/families/bulk-remove
async fn bulk_remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BulkRemoveBody>,
) -> ApiResult<BulkRemoveOutcome> {
    let mut svc = state.lock();
    let session = session(&svc, &headers)?;
    let year = body.year.unwrap_or_else(|| svc.current_year());
    ok(svc.bulk_remove_families(&session, &body.ids, year)?)
}

/// GET /api/reports/:year
async fn yearly_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(year): Path<i32>,
) -> ApiResult<AggregateReportData> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.fetch_yearly_report(&session, year)?)
}

/// GET /api/reports/:year/months/:month
async fn monthly_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((year, month)): Path<(i32, u32)>,
) -> ApiResult<AggregateReportData> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.fetch_monthly_report(&session, year, month)?)
}

/// GET /api/reports/:year/families/:family_id
async fn family_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((year, family_id)): Path<(i32, String)>,
) -> ApiResult<FamilyYearlyData> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.fetch_family_yearly_data(&session, year, &family_id)?)
}

/// GET /api/reports/:year/bials/:bial
async fn bial_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((year, bial)): Path<(i32, String)>,
) -> ApiResult<Vec<YearlyFamilyTotal>> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.fetch_bial_yearly_family_data(&session, year, &decode(&bial))?)
}

/// GET /api/users/:uid
async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
) -> ApiResult<Option<UserRole>> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.fetch_user_role(&session, &uid)?)
}

/// PUT /api/users/:uid
async fn put_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
    Json(mut role): Json<UserRole>,
) -> ApiResult<UserRole> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    role.uid = uid;
    svc.upsert_user_role(&session, &role)?;
    ok(role)
}

/// GET /api/events/:entity_type/:entity_id
async fn get_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> ApiResult<Vec<Event>> {
    let svc = state.lock();
    let session = session(&svc, &headers)?;
    ok(svc.events_for_entity(&session, &entity_type, &decode(&entity_id))?)
}

fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/years/:year/bials", get(get_bials).put(put_bials))
        .route("/years/:year/bials/:bial/in-use", get(get_bial_in_use))
        .route("/years/:year/bials/:bial/info", get(get_bial_info).put(put_bial_info))
        .route("/years/:year/bials/:bial/families", post(post_family))
        .route("/years/:year/bials/:bial/families/import", post(import_families))
        .route("/years/:year/archive", get(get_archive).put(put_archive))
        .route("/years/:year/months/:month/bials/:bial/families", get(get_families))
        .route("/years/:year/months/:month/bials/:bial/contributions", post(import_contributions))
        .route("/years/:year/months/:month/bials/:bial/families/:family_id/tithe", put(put_tithe))
        .route("/families/unassigned", get(get_unassigned))
        .route("/families/bulk-remove", post(bulk_remove))
        .route("/families/:id", axum::routing::patch(patch_family).delete(delete_family))
        .route("/families/:id/transfer", post(transfer_family))
        .route("/families/:id/unassign", post(unassign_family))
        .route("/reports/:year", get(yearly_report))
        .route("/reports/:year/months/:month", get(monthly_report))
        .route("/reports/:year/families/:family_id", get(family_report))
        .route("/reports/:year/bials/:bial", get(bial_report))
        .route("/users/:uid", get(get_user).put(put_user))
        .route("/events/:entity_type/:entity_id", get(get_events))
        .with_state(state)
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(db) = args.db {
        config.db_path = db;
    }
    logging::init(&config.log_filter, config.log_json);

    let svc = TitheService::open(&config)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;

    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
    };

    let app = Router::new().nest("/api", api_routes(state)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;

    info!(addr = %args.bind, db = %config.db_path.display(), "tithe server listening");
    println!("🚀 Server running on http://{}", args.bind);
    println!("   API: http://{}/api/health", args.bind);

    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}

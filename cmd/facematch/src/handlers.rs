//! REST handlers. Each one is a thin adapter over a fingerprint operation.

use axum::Json;
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use facematch_fingerprint::{
    ChartPoint, ClassificationResult, FingerprintError, FingerprintRecord, FingerprintSet,
    Page, PageRequest,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::server::AppState;

/// Body of every `(file, embedding)` request. Missing fields deserialize
/// empty and fail validation with 400.
#[derive(Debug, Deserialize)]
pub struct FingerprintRequest {
    #[serde(default)]
    pub file: String,
    #[serde(default, alias = "embeddings")]
    pub embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default, alias = "embeddings")]
    pub embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    /// Anything that is not a positive integer selects page 1.
    fn page(&self) -> usize {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse::<usize>().ok())
            .filter(|&p| p > 0)
            .unwrap_or(1)
    }
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: &'static str,
    created: bool,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    message: &'static str,
    deleted: usize,
}

/// Maps [`FingerprintError`] to an HTTP status with a `{"message"}` body.
#[derive(Debug)]
pub struct ApiError(FingerprintError);

impl From<FingerprintError> for ApiError {
    fn from(e: FingerprintError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FingerprintError::Validation(_) => StatusCode::BAD_REQUEST,
            FingerprintError::NotFound => StatusCode::NOT_FOUND,
            FingerprintError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            FingerprintError::Index(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "message": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// JSON body extractor whose rejections (bad syntax, wrong types, missing
/// content type) are validation errors like any other bad input.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError(FingerprintError::Validation(
                rejection.body_text(),
            ))),
        }
    }
}

pub async fn classify(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<QueryRequest>,
) -> ApiResult<Json<ClassificationResult>> {
    Ok(Json(state.classifier.classify(&req.embedding).await?))
}

pub async fn upload_unmatched(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<FingerprintRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state
        .machine
        .register_unmatched(&req.file, &req.embedding)
        .await?;
    let message = if outcome.is_created() {
        "New data uploaded to unmatched collection!!"
    } else {
        "Entry already exists in the unmatched collection!"
    };
    Ok(Json(UploadResponse {
        message,
        created: outcome.is_created(),
    }))
}

pub async fn upload_matched(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<FingerprintRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state
        .machine
        .promote_to_matched(&req.file, &req.embedding)
        .await?;
    let message = if outcome.is_created() {
        "New data uploaded to matched collection!!"
    } else {
        "Entry already exists in the matched collection!"
    };
    Ok(Json(UploadResponse {
        message,
        created: outcome.is_created(),
    }))
}

pub async fn delete_unmatched(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<FingerprintRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .machine
        .remove_unmatched(&req.file, &req.embedding)
        .await?;
    Ok(Json(json!({ "message": "Data deleted from unmatched" })))
}

pub async fn delete_matched(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<FingerprintRequest>,
) -> ApiResult<impl IntoResponse> {
    let deleted = state
        .machine
        .remove_matched(&req.file, &req.embedding)
        .await?;
    Ok(Json(DeleteResponse {
        message: "Entry deleted successfully",
        deleted,
    }))
}

pub async fn list_unmatched(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Json<Page<FingerprintRecord>>> {
    list(&state, FingerprintSet::Unmatched, &q).await
}

pub async fn list_matched(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Json<Page<FingerprintRecord>>> {
    list(&state, FingerprintSet::Matched, &q).await
}

async fn list(
    state: &AppState,
    set: FingerprintSet,
    q: &PageQuery,
) -> ApiResult<Json<Page<FingerprintRecord>>> {
    let req = PageRequest::new(q.page(), state.page_size);
    Ok(Json(state.store.list(set, req).await?))
}

pub async fn upload_chart(
    State(state): State<AppState>,
    ApiJson(point): ApiJson<ChartPoint>,
) -> ApiResult<Json<&'static str>> {
    state.chart.append(point).await?;
    Ok(Json("uploaded"))
}

pub async fn fetch_chart(State(state): State<AppState>) -> ApiResult<Json<Vec<ChartPoint>>> {
    Ok(Json(state.chart.all().await?))
}

pub async fn clear_chart(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let deleted = state.chart.clear().await?;
    Ok(Json(DeleteResponse {
        message: "All chart data deleted successfully!",
        deleted,
    }))
}

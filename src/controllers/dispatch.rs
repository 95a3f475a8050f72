/*
 * src/controllers/dispatch.rs
 *
 * File for Dispatch Controller API Endpoint
 *
 * Purpose:
 *   Serve the per-turn dispatch decision endpoint
 */

use axum::{Extension, Json, extract::rejection::JsonRejection, routing::post};
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;

use crate::controllers::AxumRouter;
use crate::dispatch::{self, AppState};
use crate::error::{ApiResult, AppError};
use crate::http_models::dispatch::{Decision, DispatchRequest};

#[derive(OpenApi)]
#[openapi(
	paths(api_process),
	info(
		title = "Dispatch Routes",
		description = "Per-turn conversational dispatch decisions."
	),
	tags((name = "Dispatch"))
)]
pub struct DispatchApiDoc;

/// Run one conversational turn and return the Decision.
///
/// # Method
/// `POST /dispatch/process`
///
/// # Request Body
/// - [DispatchRequest] - the full business configuration, calendar, and
///   conversation history; the dispatcher keeps nothing between calls
///
/// # Responses
/// - `200 OK` - [Decision]
/// - `400 BAD_REQUEST` - Body is not valid JSON (public error)
/// - `422 UNPROCESSABLE_ENTITY` - A field failed validation (public error)
/// - `500 INTERNAL_SERVER_ERROR` - Internal error (private)
///
/// # Examples
/// ```bash
/// curl -X POST http://localhost:3001/dispatch/process
///   -H "Content-Type: application/json"
///   -d @turn.json
/// ```
#[utoipa::path(
	post,
	path = "/process",
	summary = "Process one conversational dispatch turn",
	description = "Extracts intent, validates reachability and scheduling constraints, and returns the decision plus the SMS reply to send.",
	request_body(content = DispatchRequest, content_type = "application/json"),
	responses(
		(status = 200, description = "Turn processed", body = Decision, content_type = "application/json"),
		(status = 400, description = "Malformed JSON body"),
		(status = 422, description = "A request field failed validation"),
		(status = 500, description = "Internal Server Error")
	),
	tag = "Dispatch"
)]
pub async fn api_process(
	Extension(state): Extension<Arc<AppState>>,
	payload: Result<Json<DispatchRequest>, JsonRejection>,
) -> ApiResult<Json<Decision>> {
	let Json(request) = payload.map_err(AppError::from)?;
	info!(
		"HANDLER ->> /dispatch/process 'api_process' - conversation {}",
		request.conversation_sid
	);

	request.validate()?;

	Ok(Json(dispatch::process(&state, &request).await))
}

/// Create the dispatch routes.
///
/// # Routes
/// - `POST /process` - run one conversational turn (public)
pub fn dispatch_routes() -> AxumRouter {
	AxumRouter::new().route("/process", post(api_process))
}

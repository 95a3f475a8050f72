use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

pub type ApiResult<T> = std::result::Result<T, AppError>;

/// Errors that are safe to serialize back to the caller.
#[derive(Debug)]
pub enum PublicError {
	/// A request field failed validation. `field` names the offending field
	/// when one can be singled out.
	Validation {
		code: &'static str,
		message: String,
		field: Option<&'static str>,
	},
	/// The request body was not valid JSON at all.
	MalformedJson(String),
}

/// Errors that must never reach the caller in detail. Logged, then surfaced
/// as an opaque 500.
#[derive(Debug)]
pub enum PrivateError {
	Geocode(String),
	Llm(String),
	Traffic(String),
	Internal(String),
}

#[derive(Debug)]
pub enum AppError {
	Public(PublicError),
	Private(PrivateError),
}

impl AppError {
	pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
		AppError::Public(PublicError::Validation {
			code,
			message: message.into(),
			field: None,
		})
	}

	pub fn validation_field(
		code: &'static str,
		message: impl Into<String>,
		field: &'static str,
	) -> Self {
		AppError::Public(PublicError::Validation {
			code,
			message: message.into(),
			field: Some(field),
		})
	}

	pub fn internal(message: impl Into<String>) -> Self {
		AppError::Private(PrivateError::Internal(message.into()))
	}
}

impl From<PublicError> for AppError {
	fn from(e: PublicError) -> Self {
		AppError::Public(e)
	}
}

impl From<PrivateError> for AppError {
	fn from(e: PrivateError) -> Self {
		AppError::Private(e)
	}
}

impl From<JsonRejection> for AppError {
	fn from(rejection: JsonRejection) -> Self {
		match rejection {
			// Well-formed JSON that doesn't fit the request schema is a
			// field validation failure (422), not a malformed body (400)
			JsonRejection::JsonDataError(err) => AppError::Public(PublicError::Validation {
				code: "invalid_body",
				message: err.body_text(),
				field: None,
			}),
			other => AppError::Public(PublicError::MalformedJson(other.body_text())),
		}
	}
}

#[derive(Serialize)]
struct ErrorBody {
	error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
	code: &'static str,
	message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	field: Option<&'static str>,
}

impl IntoResponse for AppError {
	fn into_response(self) -> Response {
		match self {
			AppError::Public(PublicError::Validation {
				code,
				message,
				field,
			}) => (
				StatusCode::UNPROCESSABLE_ENTITY,
				Json(ErrorBody {
					error: ErrorDetail {
						code,
						message,
						field,
					},
				}),
			)
				.into_response(),
			AppError::Public(PublicError::MalformedJson(detail)) => (
				StatusCode::BAD_REQUEST,
				Json(ErrorBody {
					error: ErrorDetail {
						code: "malformed_json",
						message: detail,
						field: None,
					},
				}),
			)
				.into_response(),
			AppError::Private(private) => {
				error!("ERROR ->> internal failure REASON: {:?}", private);
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					Json(ErrorBody {
						error: ErrorDetail {
							code: "internal_error",
							message: String::from("internal error"),
							field: None,
						},
					}),
				)
					.into_response()
			}
		}
	}
}

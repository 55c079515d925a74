use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use job_broadcast::{JobError, RegistryError};
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
	#[error("Invalid YouTube URL")]
	InvalidUrl,

	#[error("Invalid video id")]
	InvalidVideoId,

	#[error("{0} is required")]
	MissingField(&'static str),

	#[error("{0} not found")]
	NotFound(&'static str),

	#[error("No job for this video id")]
	NoJob,

	#[error(transparent)]
	Registry(#[from] RegistryError),

	#[error(transparent)]
	Job(#[from] JobError),

	#[error("Provided data is not serializable to JSON: {0}")]
	NonSerializableData(#[from] serde_json::Error),

	#[error("an internal server error occurred")]
	Anyhow(#[from] anyhow::Error),
}

impl ApiError {
	const fn status_code(&self) -> StatusCode {
		match self {
			Self::InvalidUrl | Self::InvalidVideoId | Self::MissingField(_) => StatusCode::BAD_REQUEST,
			Self::NotFound(_) | Self::NoJob => StatusCode::NOT_FOUND,
			Self::Registry(RegistryError::AlreadyRunning(_)) | Self::Job(JobError::AlreadyResponding(_)) => StatusCode::CONFLICT,
			Self::Job(JobError::SubscriberLimit { .. }) => StatusCode::SERVICE_UNAVAILABLE,
			Self::Job(JobError::Closed(_)) => StatusCode::NOT_FOUND,
			Self::NonSerializableData(_) | Self::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response<Body> {
		if let Self::Anyhow(ref e) = self {
			tracing::error!("Generic error: {:?}", e);
		}

		(self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use job_broadcast::JobKey;

	#[test]
	fn conflicts_map_to_409() {
		let err = ApiError::from(RegistryError::AlreadyRunning(JobKey::from("abc")));
		assert_eq!(err.status_code(), StatusCode::CONFLICT);
		let err = ApiError::from(JobError::AlreadyResponding(JobKey::from("abc")));
		assert_eq!(err.status_code(), StatusCode::CONFLICT);
	}

	#[test]
	fn subscriber_limit_is_503() {
		let err = ApiError::from(JobError::SubscriberLimit { key: JobKey::from("abc"), limit: 1 });
		assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
	}

	#[test]
	fn input_errors_are_400() {
		assert_eq!(ApiError::InvalidUrl.into_response().status(), StatusCode::BAD_REQUEST);
		assert_eq!(ApiError::InvalidVideoId.into_response().status(), StatusCode::BAD_REQUEST);
		assert_eq!(ApiError::MissingField("question").to_string(), "question is required");
	}
}

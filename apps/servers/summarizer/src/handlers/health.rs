use crate::config::{LlmProvider, MaskedConfig};
use crate::services::{llm, ChatBackend};
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Serialize)]
pub struct HealthResponse {
	status: &'static str,
	version: &'static str,
	active_jobs: usize,
	active_chats: usize,
}

#[axum::debug_handler]
#[instrument(name = "health", skip(state))]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
	let response = HealthResponse {
		status: "healthy",
		version: env!("CARGO_PKG_VERSION"),
		active_jobs: state.jobs.len(),
		active_chats: state.chat.chats().len(),
	};

	(StatusCode::OK, Json(response))
}

#[derive(Serialize)]
pub struct ConfigResponse {
	success: bool,
	config: MaskedConfig,
}

/// Current configuration with secrets masked
#[axum::debug_handler]
#[instrument(name = "config", skip(state))]
pub async fn config(State(state): State<AppState>) -> Json<ConfigResponse> {
	Json(ConfigResponse {
		success: true,
		config: state.config.masked(),
	})
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectionTestRequest {
	/// Defaults to the configured provider
	pub provider: Option<LlmProvider>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionTestResponse {
	success: bool,
	provider: LlmProvider,
	#[serde(skip_serializing_if = "Option::is_none")]
	message: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<String>,
}

/// Check that an LLM provider is reachable and serves its configured model.
///
/// Failures are reported in the body, never as an error status.
#[axum::debug_handler]
#[instrument(name = "test_connection", skip(state, payload))]
pub async fn test_connection(State(state): State<AppState>, payload: Option<Json<ConnectionTestRequest>>) -> Json<ConnectionTestResponse> {
	let provider = payload.and_then(|Json(request)| request.provider).unwrap_or(state.config.llm_provider);

	let backend: anyhow::Result<Arc<dyn ChatBackend>> = if provider == state.config.llm_provider {
		Ok(Arc::clone(&state.llm))
	} else {
		llm::for_provider(&state.config, provider)
	};
	let checked = match backend {
		Ok(backend) => backend.check().await,
		Err(e) => Err(e),
	};

	let response = match checked {
		Ok(message) => {
			info!(?provider, "🔌 Provider reachable");
			ConnectionTestResponse {
				success: true,
				provider,
				message: Some(message),
				error: None,
			}
		}
		Err(e) => {
			warn!(?provider, error = %e, "Provider check failed");
			ConnectionTestResponse {
				success: false,
				provider,
				message: None,
				error: Some(format!("{e:#}")),
			}
		}
	};
	Json(response)
}

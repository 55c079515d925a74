use crate::handlers::health as routes;
use crate::AppState;
use axum::routing::{get, post};
use axum::{extract::FromRef, http::Method, Router};
use tower_http::cors::{Any, CorsLayer};

pub fn get_health<S>() -> Router<S>
where
	S: Clone + Send + Sync + 'static,
	AppState: FromRef<S>,
{
	let cors = CorsLayer::new().allow_origin(Any).allow_methods([Method::GET]).allow_headers(Any);

	Router::new().route("/health", get(routes::health)).layer(cors)
}

pub fn get_config<S>() -> Router<S>
where
	S: Clone + Send + Sync + 'static,
	AppState: FromRef<S>,
{
	let cors = CorsLayer::new().allow_origin(Any).allow_methods([Method::GET, Method::POST]).allow_headers(Any);

	Router::new()
		.route("/api/config", get(routes::config))
		.route("/api/config/test", post(routes::test_connection))
		.layer(cors)
}

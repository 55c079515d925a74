use crate::handlers::summarize as routes;
use crate::AppState;
use axum::routing::{get, post};
use axum::{
	extract::FromRef,
	http::{header::CONTENT_TYPE, Method},
	Router,
};
use tower_http::cors::{Any, CorsLayer};

pub fn summaries<S>() -> Router<S>
where
	S: Clone + Send + Sync + 'static,
	AppState: FromRef<S>,
{
	let cors = CorsLayer::new()
		.allow_origin(Any)
		.allow_methods([Method::GET, Method::POST])
		.allow_headers([CONTENT_TYPE]);

	Router::new()
		.route("/api/summarize", post(routes::start))
		.route("/api/summarize/:video_id/subscribe", get(routes::subscribe))
		.route("/api/summary/:video_id/status", get(routes::status))
		.route("/api/summary/:video_id", get(routes::summary))
		.route("/api/transcript/:video_id", get(routes::transcript))
		.layer(cors)
}

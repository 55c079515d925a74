use crate::handlers::videos as routes;
use crate::AppState;
use axum::routing::get;
use axum::{extract::FromRef, http::Method, Router};
use tower_http::cors::{Any, CorsLayer};

pub fn videos<S>() -> Router<S>
where
	S: Clone + Send + Sync + 'static,
	AppState: FromRef<S>,
{
	let cors = CorsLayer::new()
		.allow_origin(Any)
		.allow_methods([Method::GET, Method::DELETE])
		.allow_headers(Any);

	Router::new()
		.route("/api/videos", get(routes::list))
		.route("/api/videos/:video_id", get(routes::get).delete(routes::delete))
		.layer(cors)
}

use crate::handlers::chat as routes;
use crate::AppState;
use axum::routing::{get, post};
use axum::{
	extract::FromRef,
	http::{header::CONTENT_TYPE, Method},
	Router,
};
use tower_http::cors::{Any, CorsLayer};

pub fn chat<S>() -> Router<S>
where
	S: Clone + Send + Sync + 'static,
	AppState: FromRef<S>,
{
	let cors = CorsLayer::new()
		.allow_origin(Any)
		.allow_methods([Method::GET, Method::POST])
		.allow_headers([CONTENT_TYPE]);

	Router::new()
		.route("/api/chat/:video_id", get(routes::history))
		.route("/api/chat/:video_id/ask", post(routes::ask))
		.route("/api/chat/:video_id/subscribe", get(routes::subscribe))
		.layer(cors)
}

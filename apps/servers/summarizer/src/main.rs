use anyhow::{anyhow, Context, Result};
use clap::Parser;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{str::FromStr, sync::Arc};
use summarizer::services::transcription::RemoteWhisper;
use summarizer::services::{llm, ArtifactStore, SqliteMetadataStore, TranscriptionEngine, YtDlp};
use summarizer::{app, AppState, Backends, Config};
use tokio::{net::TcpListener, time::Duration};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{filter::EnvFilter, fmt::format::JsonFields, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() -> Result<()> {
	dotenv::dotenv().ok();
	let config = Config::parse();

	init_tracing(&config)?;
	config.validate().map_err(|e| anyhow!("invalid configuration: {e}"))?;
	tracing::info!(config = ?config.masked(), "Loaded configuration");

	let config = Arc::new(config);
	ArtifactStore::new(&config.content_dir).init().await?;

	let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
	let pool = SqlitePoolOptions::new()
		.connect_with(options)
		.await
		.with_context(|| format!("opening {}", config.database_url))?;
	let metadata = SqliteMetadataStore::new(pool.clone());
	metadata.migrate().await?;

	let backends = Backends {
		media: Arc::new(YtDlp::new(&config.ytdlp_path)),
		transcription: transcription_engine(&config)?,
		llm: llm::from_config(&config)?,
		metadata: Arc::new(metadata),
	};
	tracing::info!(transcription = backends.transcription.name(), llm = backends.llm.name(), "Backends ready");

	let state = AppState::build(config.clone(), backends);
	let app = app(state.clone()).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

	let listener = TcpListener::bind(config.bind_addr()).await?;
	tracing::info!("🎧 Listening on {}", listener.local_addr()?);

	let shutdown_token = CancellationToken::new();
	let signal_shutdown_token = shutdown_token.clone();
	tokio::spawn(async move {
		tokio::signal::ctrl_c().await.ok();
		tracing::info!("Received Ctrl+C, initiating shutdown...");
		signal_shutdown_token.cancel();
	});

	// Open event streams only end once their job closes
	let server_token = shutdown_token.clone();
	let streams = state.clone();
	axum::serve(listener, app)
		.with_graceful_shutdown(async move {
			server_token.cancelled().await;
			streams.shutdown().await;
		})
		.await?;
	tracing::info!("Server stopped");

	let cleanup = async {
		pool.close().await;
		tracing::info!("Database closed");
	};

	match tokio::time::timeout(Duration::from_secs(5), cleanup).await {
		Ok(()) => tracing::info!("Graceful shutdown completed"),
		Err(_) => tracing::error!("Shutdown timeout - forcing exit"),
	}

	Ok(())
}

fn transcription_engine(config: &Config) -> Result<Arc<dyn TranscriptionEngine>> {
	#[cfg(feature = "whisper")]
	if let Some(model_path) = &config.whisper_model_path {
		let engine = summarizer::services::transcription::whisper::LocalWhisper::load(model_path, config.whisper_threads)?;
		return Ok(Arc::new(engine));
	}

	Ok(Arc::new(RemoteWhisper::new(&config.whisper_url, &config.whisper_model, config.whisper_api_key.clone())))
}

fn init_tracing(config: &Config) -> Result<()> {
	use tracing_subscriber::layer::SubscriberExt;

	let filter = EnvFilter::from_str(&config.rust_log)?;

	tracing_subscriber::registry()
		.with(if config.log_json {
			Box::new(
				tracing_subscriber::fmt::layer()
					.fmt_fields(JsonFields::default())
					.event_format(tracing_subscriber::fmt::format().json().flatten_event(true).with_span_list(false))
					.with_filter(filter),
			) as Box<dyn Layer<_> + Send + Sync>
		} else {
			Box::new(
				tracing_subscriber::fmt::layer()
					.event_format(tracing_subscriber::fmt::format().pretty())
					.with_filter(filter),
			)
		})
		.try_init()?;
	Ok(())
}

use anyhow::Result;
use async_trait::async_trait;
use job_broadcast::VideoMetadata;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

const TRANSCRIBED: &str = "done";

/// Stored metadata of one video plus its processing markers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRecord {
	#[serde(flatten)]
	pub video: VideoMetadata,
	pub status: Option<String>,
	pub transcript_filepath: Option<String>,
	pub created_at: String,
}

impl VideoRecord {
	pub fn is_transcribed(&self) -> bool {
		self.status.as_deref() == Some(TRANSCRIBED)
	}
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
	async fn get(&self, video_id: &str) -> Result<Option<VideoRecord>>;

	async fn list(&self) -> Result<Vec<VideoRecord>>;

	/// Insert or refresh the descriptive fields of a video
	async fn insert(&self, video: &VideoMetadata) -> Result<()>;

	async fn mark_transcribed(&self, video_id: &str, transcript_path: &str) -> Result<()>;

	/// Returns whether a record was removed
	async fn remove(&self, video_id: &str) -> Result<bool>;
}

#[derive(FromRow)]
struct VideoRow {
	video_id: String,
	title: Option<String>,
	duration: Option<f64>,
	uploader: Option<String>,
	upload_date: Option<String>,
	thumbnail_url: Option<String>,
	webpage_url: Option<String>,
	status: Option<String>,
	transcript_filepath: Option<String>,
	created_at: String,
}

impl From<VideoRow> for VideoRecord {
	fn from(row: VideoRow) -> Self {
		Self {
			video: VideoMetadata {
				video_id: row.video_id,
				title: row.title,
				duration: row.duration,
				uploader: row.uploader,
				upload_date: row.upload_date,
				thumbnail_url: row.thumbnail_url,
				webpage_url: row.webpage_url,
			},
			status: row.status,
			transcript_filepath: row.transcript_filepath,
			created_at: row.created_at,
		}
	}
}

const SELECT_VIDEO: &str = r"
	SELECT video_id, title, duration, uploader, upload_date, thumbnail_url, webpage_url, status, transcript_filepath, created_at
	FROM videos
";

#[derive(Debug, Clone)]
pub struct SqliteMetadataStore {
	pool: SqlitePool,
}

impl SqliteMetadataStore {
	pub const fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Create the schema when missing
	pub async fn migrate(&self) -> Result<()> {
		sqlx::query(
			r"
			CREATE TABLE IF NOT EXISTS videos (
				video_id TEXT PRIMARY KEY NOT NULL,
				title TEXT,
				duration REAL,
				uploader TEXT,
				upload_date TEXT,
				thumbnail_url TEXT,
				webpage_url TEXT,
				status TEXT,
				transcript_filepath TEXT,
				created_at TEXT NOT NULL
			)
			",
		)
		.execute(&self.pool)
		.await?;
		Ok(())
	}
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
	async fn get(&self, video_id: &str) -> Result<Option<VideoRecord>> {
		let row = sqlx::query_as::<_, VideoRow>(&format!("{SELECT_VIDEO} WHERE video_id = ?"))
			.bind(video_id)
			.fetch_optional(&self.pool)
			.await?;
		Ok(row.map(VideoRecord::from))
	}

	async fn list(&self) -> Result<Vec<VideoRecord>> {
		let rows = sqlx::query_as::<_, VideoRow>(&format!("{SELECT_VIDEO} ORDER BY created_at DESC"))
			.fetch_all(&self.pool)
			.await?;
		Ok(rows.into_iter().map(VideoRecord::from).collect())
	}

	async fn insert(&self, video: &VideoMetadata) -> Result<()> {
		sqlx::query(
			r"
			INSERT INTO videos (video_id, title, duration, uploader, upload_date, thumbnail_url, webpage_url, created_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(video_id) DO UPDATE SET
				title = excluded.title,
				duration = excluded.duration,
				uploader = excluded.uploader,
				upload_date = excluded.upload_date,
				thumbnail_url = excluded.thumbnail_url,
				webpage_url = excluded.webpage_url
			",
		)
		.bind(&video.video_id)
		.bind(&video.title)
		.bind(video.duration)
		.bind(&video.uploader)
		.bind(&video.upload_date)
		.bind(&video.thumbnail_url)
		.bind(&video.webpage_url)
		.bind(chrono::Utc::now().to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	async fn mark_transcribed(&self, video_id: &str, transcript_path: &str) -> Result<()> {
		sqlx::query("UPDATE videos SET status = ?, transcript_filepath = ? WHERE video_id = ?")
			.bind(TRANSCRIBED)
			.bind(transcript_path)
			.bind(video_id)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	async fn remove(&self, video_id: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM videos WHERE video_id = ?").bind(video_id).execute(&self.pool).await?;
		Ok(result.rows_affected() > 0)
	}
}

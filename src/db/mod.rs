use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub mod comments;
pub mod projects;
pub mod tasks;
pub mod users;

pub async fn init(database_url: &str) -> anyhow::Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)
		.context("invalid DATABASE_URL")?
		.create_if_missing(true)
		.foreign_keys(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(10)
		.min_connections(1)
		.acquire_timeout(Duration::from_secs(10))
		.connect_with(options)
		.await
		.context("failed to connect to database")?;

	migrate(&pool).await?;

	Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
	sqlx::migrate!()
		.run(pool)
		.await
		.context("failed to run migrations")
}

pub(crate) fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, crate::errors::AppError> {
	serde_json::to_string(value).map_err(Into::into)
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
	column: &str,
	raw: &str,
) -> Result<T, crate::errors::AppError> {
	serde_json::from_str(raw)
		.map_err(|err| crate::errors::AppError::internal(format!("invalid {column} column: {err}")))
}

use std::{future::Future, time::Duration};

use diesel::{
    prelude::*,
    r2d2::{ConnectionManager, Pool, PooledConnection},
    MysqlConnection,
};

use crate::{
    config::DatabaseConfig,
    error::{StoreError, StoreResult},
    models::NewPost,
    schema::posts,
};

pub type DbPool = Pool<ConnectionManager<MysqlConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<MysqlConnection>>;

const CREATE_POSTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id INT AUTO_INCREMENT PRIMARY KEY,
    title VARCHAR(255) NOT NULL,
    content TEXT NOT NULL,
    author VARCHAR(100) NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    INDEX idx_author (author),
    INDEX idx_created_at (created_at)
) DEFAULT CHARSET = utf8mb4
"#;

pub fn get_connection_pool(config: &DatabaseConfig) -> StoreResult<DbPool> {
    let manager = ConnectionManager::<MysqlConnection>::new(config.url());
    let pool = Pool::builder()
        .max_size(config.pool_size.max(1))
        .connection_timeout(config.connect_timeout.max(Duration::from_millis(1)))
        .test_on_check_out(true)
        .build(manager)?;
    Ok(pool)
}

/// Builds the pool, retrying with a fixed delay until it succeeds or the
/// configured retry budget runs out.
pub async fn connect(config: &DatabaseConfig) -> StoreResult<DbPool> {
    let pool = retry_connect(config.max_retries, config.retry_delay, || {
        let db = config.clone();
        async move {
            tokio::task::spawn_blocking(move || get_connection_pool(&db))
                .await
                .map_err(StoreError::from)
                .and_then(|built| built)
        }
    })
    .await?;
    tracing::info!(database = %config.location(), "Connected to MySQL");
    Ok(pool)
}

/// Runs `attempt_once` until it succeeds. With `max_retries = Some(n)` it
/// gives up after `n + 1` failed attempts; `None` never gives up.
pub async fn retry_connect<T, F, Fut>(
    max_retries: Option<u32>,
    retry_delay: Duration,
    mut attempt_once: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match attempt_once().await {
            Ok(connected) => return Ok(connected),
            Err(e) => {
                attempt += 1;
                if max_retries.is_some_and(|max| attempt > max) {
                    tracing::error!(error = %e, attempts = attempt, "Giving up on database connection");
                    return Err(e);
                }
                tracing::warn!(
                    error = %e,
                    attempt,
                    retry_in_secs = retry_delay.as_secs(),
                    "Database connection failed, retrying"
                );
                tokio::time::sleep(retry_delay).await;
            }
        }
    }
}

pub fn get_connection(pool: &DbPool) -> StoreResult<DbConnection> {
    pool.get().map_err(StoreError::from)
}

pub fn sample_posts() -> Vec<NewPost> {
    let post = |title: &str, content: &str, author: &str| NewPost {
        title: title.to_string(),
        content: content.to_string(),
        author: Some(author.to_string()),
    };
    vec![
        post(
            "Welcome!",
            "A practice blog for Kubernetes ConfigMaps and Secrets.",
            "K8s admin",
        ),
        post(
            "Managing configuration",
            "ConfigMaps keep per-environment settings out of the image.",
            "Developer",
        ),
        post(
            "Managing secrets",
            "Secrets hold sensitive values separately from plain configuration.",
            "Security team",
        ),
    ]
}

/// Creates the `posts` table if needed and seeds it when empty.
/// Returns the number of seeded rows.
pub fn ensure_schema(conn: &mut MysqlConnection, seed: bool) -> StoreResult<usize> {
    diesel::sql_query(CREATE_POSTS_TABLE).execute(conn)?;

    let existing: i64 = posts::table.count().get_result(conn)?;
    if !should_seed(existing, seed) {
        return Ok(0);
    }

    let inserted = diesel::insert_into(posts::table)
        .values(&sample_posts())
        .execute(conn)?;
    tracing::info!(rows = inserted, "Seeded sample posts");
    Ok(inserted)
}

/// Sample rows go only into an empty table, and only when seeding is on.
pub fn should_seed(existing_rows: i64, seed: bool) -> bool {
    seed && existing_rows == 0
}

pub async fn init_schema(pool: &DbPool, seed: bool) -> StoreResult<usize> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = get_connection(&pool)?;
        ensure_schema(&mut conn, seed)
    })
    .await?
}

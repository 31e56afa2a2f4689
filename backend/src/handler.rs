use std::{collections::BTreeMap, num::IntErrorKind, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    config::{Config, Features},
    error::{ApiError, ApiResult},
    main_lib::AppState,
    models::{NewPost, Post},
};

const POST_NOT_FOUND: &str = "Post not found";

/// Ids outside the `posts.id` range cannot name a row, so they are a miss
/// rather than a malformed request.
pub fn parse_post_id(raw: &str) -> ApiResult<i32> {
    raw.parse::<i32>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
            tracing::warn!(post_id = raw, "Requested post id is out of range");
            ApiError::NotFound(POST_NOT_FOUND.to_string())
        }
        _ => ApiError::BadRequest(format!("Invalid post id: {raw}")),
    })
}

/// Standard success envelope.
#[derive(Serialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl<T> ApiResponse<T> {
    fn data(data: T) -> Self {
        ApiResponse {
            success: true,
            message: None,
            data: Some(data),
            count: None,
        }
    }

    fn list(items: Vec<T>) -> ApiResponse<Vec<T>> {
        ApiResponse {
            success: true,
            message: None,
            count: Some(items.len()),
            data: Some(items),
        }
    }
}

impl ApiResponse<()> {
    fn message(message: &str) -> Self {
        ApiResponse {
            success: true,
            message: Some(message.to_string()),
            data: None,
            count: None,
        }
    }
}

#[derive(Serialize)]
struct ConfigSummary<'a> {
    log_level: &'a str,
    timezone: &'a str,
    db_host: &'a str,
    features: Features,
    app_properties: &'a BTreeMap<String, String>,
}

impl<'a> ConfigSummary<'a> {
    fn from_config(config: &'a Config) -> Self {
        ConfigSummary {
            log_level: &config.log_level,
            timezone: &config.timezone,
            db_host: &config.database.host,
            features: config.features,
            app_properties: &config.app_properties,
        }
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = &state.config;
    match state.posts.count().await {
        Ok(posts_count) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "OK",
                "message": "API server is running",
                "environment": config.environment,
                "timestamp": Utc::now().to_rfc3339(),
                "database": "connected",
                "posts_count": posts_count,
                "config": ConfigSummary::from_config(config),
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "ERROR",
                    "message": "Database connection failed",
                    "error": e.to_string(),
                })),
            )
        }
    }
}

#[derive(Serialize)]
struct DatabaseInfo<'a> {
    host: &'a str,
    port: u16,
    database: &'a str,
    user: &'a str,
}

#[derive(Serialize)]
struct ConfigResponse<'a> {
    environment: &'a str,
    log_level: &'a str,
    timezone: &'a str,
    features: Features,
    app_properties: &'a BTreeMap<String, String>,
    database: DatabaseInfo<'a>,
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Response {
    let config = &state.config;
    let db = &config.database;
    Json(ConfigResponse {
        environment: &config.environment,
        log_level: &config.log_level,
        timezone: &config.timezone,
        features: config.features,
        app_properties: &config.app_properties,
        database: DatabaseInfo {
            host: &db.host,
            port: db.port,
            database: &db.name,
            user: &db.user,
        },
    })
    .into_response()
}

pub async fn get_posts(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ApiResponse<Vec<Post>>>> {
    let posts = state
        .posts
        .list()
        .await
        .map_err(ApiError::store("Failed to load posts"))?;
    Ok(Json(ApiResponse::list(posts)))
}

pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<ApiResponse<Post>>> {
    let post_id = parse_post_id(&raw_id)?;
    let post = state
        .posts
        .find(post_id)
        .await
        .map_err(ApiError::store("Failed to load post"))?;

    match post {
        Some(post) => Ok(Json(ApiResponse::data(post))),
        None => {
            tracing::warn!(post_id, "Requested post does not exist");
            Err(ApiError::NotFound(POST_NOT_FOUND.to_string()))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PostRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

impl PostRequest {
    /// Trims every field and checks the required ones are present.
    pub fn validate(self, require_author: bool) -> ApiResult<NewPost> {
        let trimmed = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let title = trimmed(self.title);
        let content = trimmed(self.content);
        let author = trimmed(self.author);

        match (title, content) {
            (Some(title), Some(content)) if author.is_some() || !require_author => Ok(NewPost {
                title,
                content,
                author,
            }),
            _ if require_author => Err(ApiError::BadRequest(
                "Title, content and author are required".to_string(),
            )),
            _ => Err(ApiError::BadRequest(
                "Title and content are required".to_string(),
            )),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct CreatedResponse {
    pub success: bool,
    pub message: String,
    pub data: Post,
    pub features: Features,
}

pub async fn create_post(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PostRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    let Json(request) = payload?;
    let new_post = request.validate(state.config.features.require_author)?;

    let post = state
        .posts
        .create(new_post)
        .await
        .map_err(ApiError::store("Failed to create post"))?;
    tracing::info!(post_id = post.id, author = ?post.author, "Post created");

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            success: true,
            message: "Post created".to_string(),
            data: post,
            features: state.config.features,
        }),
    ))
}

pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let post_id = parse_post_id(&raw_id)?;
    let deleted = state
        .posts
        .delete(post_id)
        .await
        .map_err(ApiError::store("Failed to delete post"))?;

    if !deleted {
        tracing::warn!(post_id, "Delete requested for missing post");
        return Err(ApiError::NotFound(POST_NOT_FOUND.to_string()));
    }
    tracing::info!(post_id, "Post deleted");
    Ok(Json(ApiResponse::message("Post deleted")))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub keyword: String,
}

pub async fn search_posts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Post>>>> {
    let keyword = query.keyword.trim();
    if keyword.is_empty() {
        return Err(ApiError::BadRequest("Keyword is required".to_string()));
    }

    let posts = state
        .posts
        .search(keyword.to_string())
        .await
        .map_err(ApiError::store("Failed to search posts"))?;
    Ok(Json(ApiResponse::list(posts)))
}

pub async fn get_posts_by_author(
    State(state): State<Arc<AppState>>,
    Path(author): Path<String>,
) -> ApiResult<Json<ApiResponse<Vec<Post>>>> {
    let posts = state
        .posts
        .list_by_author(author)
        .await
        .map_err(ApiError::store("Failed to load posts by author"))?;
    Ok(Json(ApiResponse::list(posts)))
}

#[derive(Serialize, Debug)]
pub struct AuthorStats {
    pub author: String,
    pub total_posts: i64,
}

pub async fn get_author_stats(
    State(state): State<Arc<AppState>>,
    Path(author): Path<String>,
) -> ApiResult<Json<AuthorStats>> {
    let total_posts = state
        .posts
        .count_by_author(author.clone())
        .await
        .map_err(ApiError::store("Failed to load author stats"))?;
    Ok(Json(AuthorStats { author, total_posts }))
}

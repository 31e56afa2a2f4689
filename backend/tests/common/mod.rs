#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use blog_backend::{
    config::Config,
    configure_routes,
    error::{StoreError, StoreResult},
    models::{NewPost, Post},
    repository::PostRepositoryTrait,
    AppState,
};
use chrono::Utc;
use tower::ServiceExt;

/// Keeps posts in a vector, mirroring the ordering the MySQL repository uses.
#[derive(Default)]
pub struct InMemoryPostRepository {
    posts: Mutex<Vec<Post>>,
    next_id: Mutex<i32>,
}

impl InMemoryPostRepository {
    fn sorted(mut posts: Vec<Post>) -> Vec<Post> {
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        posts
    }

    pub fn len(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

#[async_trait]
impl PostRepositoryTrait for InMemoryPostRepository {
    async fn count(&self) -> StoreResult<i64> {
        Ok(self.posts.lock().unwrap().len() as i64)
    }

    async fn list(&self) -> StoreResult<Vec<Post>> {
        Ok(Self::sorted(self.posts.lock().unwrap().clone()))
    }

    async fn create(&self, new_post: NewPost) -> StoreResult<Post> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let post = Post {
            id: *next_id,
            title: new_post.title,
            content: new_post.content,
            author: new_post.author,
            created_at: Utc::now().naive_utc(),
        };
        self.posts.lock().unwrap().push(post.clone());
        Ok(post)
    }

    async fn find(&self, post_id: i32) -> StoreResult<Option<Post>> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == post_id)
            .cloned())
    }

    async fn delete(&self, post_id: i32) -> StoreResult<bool> {
        let mut posts = self.posts.lock().unwrap();
        let before = posts.len();
        posts.retain(|p| p.id != post_id);
        Ok(posts.len() < before)
    }

    async fn search(&self, keyword: String) -> StoreResult<Vec<Post>> {
        let keyword = keyword.to_lowercase();
        let matches = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| {
                p.title.to_lowercase().contains(&keyword)
                    || p.content.to_lowercase().contains(&keyword)
            })
            .cloned()
            .collect();
        Ok(Self::sorted(matches))
    }

    async fn list_by_author(&self, author: String) -> StoreResult<Vec<Post>> {
        let matches = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.author.as_deref() == Some(author.as_str()))
            .cloned()
            .collect();
        Ok(Self::sorted(matches))
    }

    async fn count_by_author(&self, author: String) -> StoreResult<i64> {
        Ok(self.list_by_author(author).await?.len() as i64)
    }
}

/// Every call fails the way a dropped MySQL connection would.
pub struct FailingPostRepository;

fn broken() -> StoreError {
    StoreError::Query(diesel::result::Error::BrokenTransactionManager)
}

#[async_trait]
impl PostRepositoryTrait for FailingPostRepository {
    async fn count(&self) -> StoreResult<i64> {
        Err(broken())
    }
    async fn list(&self) -> StoreResult<Vec<Post>> {
        Err(broken())
    }
    async fn create(&self, _new_post: NewPost) -> StoreResult<Post> {
        Err(broken())
    }
    async fn find(&self, _post_id: i32) -> StoreResult<Option<Post>> {
        Err(broken())
    }
    async fn delete(&self, _post_id: i32) -> StoreResult<bool> {
        Err(broken())
    }
    async fn search(&self, _keyword: String) -> StoreResult<Vec<Post>> {
        Err(broken())
    }
    async fn list_by_author(&self, _author: String) -> StoreResult<Vec<Post>> {
        Err(broken())
    }
    async fn count_by_author(&self, _author: String) -> StoreResult<i64> {
        Err(broken())
    }
}

pub fn test_config(vars: &[(&str, &str)]) -> Config {
    let vars: Vec<(String, String)> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap()
}

pub fn test_app(repo: Arc<dyn PostRepositoryTrait>, config: Config) -> Router {
    configure_routes(AppState::new(config, repo))
}

pub fn memory_app() -> (Router, Arc<InMemoryPostRepository>) {
    let repo = Arc::new(InMemoryPostRepository::default());
    let app = test_app(repo.clone(), test_config(&[]));
    (app, repo)
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    read_json(app, request).await
}

/// Sends `body` as-is, with a content type only when one is given.
pub async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    content_type: Option<&str>,
    body: &str,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    read_json(app, request).await
}

async fn read_json(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

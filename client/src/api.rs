use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
pub trait PostsApi: Send + Sync {
    async fn list_posts(&self) -> Result<Vec<Post>, ClientError>;
    async fn create_post(&self, post: &NewPost) -> Result<Post, ClientError>;
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    #[serde(default)]
    data: Option<T>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

pub struct HttpPostsApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPostsApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpPostsApi {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn posts_url(&self) -> String {
        format!("{}/posts", self.base_url)
    }

    async fn read_data<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, response).await);
        }
        let envelope: Envelope<T> = response.json().await?;
        envelope
            .data
            .ok_or_else(|| ClientError::Decode("response carried no data".to_string()))
    }
}

async fn api_error(status: StatusCode, response: reqwest::Response) -> ClientError {
    let body = response.json::<ErrorBody>().await.ok();
    let message = body
        .and_then(|b| b.message.or(b.error))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl PostsApi for HttpPostsApi {
    async fn list_posts(&self) -> Result<Vec<Post>, ClientError> {
        tracing::debug!(url = %self.posts_url(), "Fetching posts");
        let response = self.client.get(self.posts_url()).send().await?;
        Self::read_data(response).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post, ClientError> {
        tracing::debug!(title = %post.title, "Creating post");
        let response = self.client.post(self.posts_url()).json(post).send().await?;
        Self::read_data(response).await
    }
}

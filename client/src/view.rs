//! Form-and-list view over the posts API.
//!
//! The view is a small state machine: every async action moves it to
//! [`ViewState::Loading`] and then to either [`ViewState::Idle`] or
//! [`ViewState::Error`]. There is no retry, optimistic update or caching;
//! the list shown is always the last one the server returned.

use std::fmt::Write as _;

use crate::api::{NewPost, Post, PostsApi};

const FORM_INCOMPLETE: &str = "Please fill in every field.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewState {
    #[default]
    Idle,
    Loading,
    Error(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostForm {
    pub title: String,
    pub content: String,
    pub author: String,
}

impl PostForm {
    /// Trimmed post, or `None` when any field is blank.
    pub fn to_new_post(&self) -> Option<NewPost> {
        let title = self.title.trim();
        let content = self.content.trim();
        let author = self.author.trim();
        if title.is_empty() || content.is_empty() || author.is_empty() {
            return None;
        }
        Some(NewPost {
            title: title.to_string(),
            content: content.to_string(),
            author: Some(author.to_string()),
        })
    }

    pub fn clear(&mut self) {
        *self = PostForm::default();
    }
}

pub struct PostsView<A: PostsApi> {
    api: A,
    posts: Vec<Post>,
    pub form: PostForm,
    state: ViewState,
}

impl<A: PostsApi> PostsView<A> {
    pub fn new(api: A) -> Self {
        PostsView {
            api,
            posts: Vec::new(),
            form: PostForm::default(),
            state: ViewState::Idle,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub async fn refresh(&mut self) {
        self.state = ViewState::Loading;
        match self.api.list_posts().await {
            Ok(posts) => {
                self.posts = posts;
                self.state = ViewState::Idle;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load posts");
                self.state =
                    ViewState::Error(format!("Failed to load posts: {}", e.user_message()));
            }
        }
    }

    /// Sends the form. Returns the created post when the server accepted it.
    pub async fn submit(&mut self) -> Option<Post> {
        let Some(new_post) = self.form.to_new_post() else {
            self.state = ViewState::Error(FORM_INCOMPLETE.to_string());
            return None;
        };

        self.state = ViewState::Loading;
        match self.api.create_post(&new_post).await {
            Ok(post) => {
                self.form.clear();
                self.refresh().await;
                Some(post)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create post");
                self.state = ViewState::Error(e.user_message());
                None
            }
        }
    }

    pub fn dismiss_error(&mut self) {
        if matches!(self.state, ViewState::Error(_)) {
            self.state = ViewState::Idle;
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::from("Simple Blog\n===========\n");

        if let ViewState::Error(message) = &self.state {
            let _ = writeln!(out, "! {message}");
        }

        if self.posts.is_empty() {
            if self.state == ViewState::Loading {
                out.push_str("Loading posts...\n");
            } else {
                out.push_str("No posts yet.\n");
            }
            return out;
        }

        for post in &self.posts {
            let _ = writeln!(out, "\n#{} {}", post.id, post.title);
            let _ = writeln!(
                out,
                "   by {} at {}",
                post.author.as_deref().unwrap_or("anonymous"),
                post.created_at.format("%Y-%m-%d %H:%M")
            );
            let _ = writeln!(out, "   {}", post.content);
        }
        out
    }
}

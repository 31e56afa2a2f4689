pub mod api;
pub mod view;

pub use api::{ClientError, HttpPostsApi, NewPost, Post, PostsApi};
pub use view::{PostForm, PostsView, ViewState};

use anyhow::{bail, Result};
use blog_client::{HttpPostsApi, PostForm, PostsView, ViewState};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blog-client", about = "Terminal front-end for the blog API")]
struct Cli {
    /// Base URL of the blog API
    #[arg(long, env = "BLOG_API_URL", default_value = "http://localhost:3000")]
    base_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show every post, newest first
    List,
    /// Write a new post, then show the refreshed list
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long)]
        author: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut view = PostsView::new(HttpPostsApi::new(cli.base_url));

    match cli.command {
        Command::List => view.refresh().await,
        Command::Create {
            title,
            content,
            author,
        } => {
            view.form = PostForm {
                title,
                content,
                author,
            };
            if let Some(post) = view.submit().await {
                println!("Post #{} created.\n", post.id);
            }
        }
    }

    print!("{}", view.render());
    if let ViewState::Error(message) = view.state() {
        bail!("{message}");
    }
    Ok(())
}

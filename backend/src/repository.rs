use async_trait::async_trait;
use diesel::{
    define_sql_function,
    prelude::*,
    sql_types::{BigInt, Unsigned},
    MysqlConnection,
};

use crate::{
    db::{get_connection, DbPool},
    error::{StoreError, StoreResult},
    models::{NewPost, Post},
    schema::posts::{self, dsl},
};

define_sql_function! {
    fn last_insert_id() -> Unsigned<BigInt>;
}

/// Storage operations the HTTP handlers depend on.
#[async_trait]
pub trait PostRepositoryTrait: Send + Sync {
    async fn count(&self) -> StoreResult<i64>;
    /// All posts, newest first.
    async fn list(&self) -> StoreResult<Vec<Post>>;
    async fn create(&self, new_post: NewPost) -> StoreResult<Post>;
    async fn find(&self, post_id: i32) -> StoreResult<Option<Post>>;
    /// Returns `false` when no row had that id.
    async fn delete(&self, post_id: i32) -> StoreResult<bool>;
    /// Posts whose title or content contains `keyword`, newest first.
    async fn search(&self, keyword: String) -> StoreResult<Vec<Post>>;
    async fn list_by_author(&self, author: String) -> StoreResult<Vec<Post>>;
    async fn count_by_author(&self, author: String) -> StoreResult<i64>;
}

pub struct MysqlPostRepository {
    pool: DbPool,
}

impl MysqlPostRepository {
    pub fn new(pool: DbPool) -> Self {
        MysqlPostRepository { pool }
    }

    async fn run<F, T>(&self, job: F) -> StoreResult<T>
    where
        F: FnOnce(&mut MysqlConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = get_connection(&pool)?;
            job(&mut *conn)
        })
        .await?
    }
}

#[async_trait]
impl PostRepositoryTrait for MysqlPostRepository {
    async fn count(&self) -> StoreResult<i64> {
        self.run(|conn| Ok(dsl::posts.count().get_result::<i64>(conn)?))
            .await
    }

    async fn list(&self) -> StoreResult<Vec<Post>> {
        self.run(|conn| {
            Ok(dsl::posts
                .order((dsl::created_at.desc(), dsl::id.desc()))
                .select(Post::as_select())
                .load(conn)?)
        })
        .await
    }

    async fn create(&self, new_post: NewPost) -> StoreResult<Post> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                diesel::insert_into(posts::table)
                    .values(&new_post)
                    .execute(conn)?;
                let new_id: u64 = diesel::select(last_insert_id()).get_result(conn)?;
                let post: Post = dsl::posts
                    .find(inserted_post_id(new_id)?)
                    .select(Post::as_select())
                    .first(conn)?;
                Ok(post)
            })
        })
        .await
    }

    async fn find(&self, post_id: i32) -> StoreResult<Option<Post>> {
        self.run(move |conn| {
            Ok(dsl::posts
                .find(post_id)
                .select(Post::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    async fn delete(&self, post_id: i32) -> StoreResult<bool> {
        self.run(move |conn| {
            let affected = diesel::delete(dsl::posts.find(post_id)).execute(conn)?;
            Ok(affected > 0)
        })
        .await
    }

    async fn search(&self, keyword: String) -> StoreResult<Vec<Post>> {
        self.run(move |conn| {
            let pattern = like_pattern(&keyword);
            Ok(dsl::posts
                .filter(
                    dsl::title
                        .like(pattern.clone())
                        .escape(LIKE_ESCAPE)
                        .or(dsl::content.like(pattern).escape(LIKE_ESCAPE)),
                )
                .order((dsl::created_at.desc(), dsl::id.desc()))
                .select(Post::as_select())
                .load(conn)?)
        })
        .await
    }

    async fn list_by_author(&self, author: String) -> StoreResult<Vec<Post>> {
        self.run(move |conn| {
            Ok(dsl::posts
                .filter(dsl::author.eq(author))
                .order((dsl::created_at.desc(), dsl::id.desc()))
                .select(Post::as_select())
                .load(conn)?)
        })
        .await
    }

    async fn count_by_author(&self, author: String) -> StoreResult<i64> {
        self.run(move |conn| {
            Ok(dsl::posts
                .filter(dsl::author.eq(author))
                .count()
                .get_result::<i64>(conn)?)
        })
        .await
    }
}

/// `LAST_INSERT_ID()` is unsigned 64-bit while `posts.id` is a signed INT.
fn inserted_post_id(new_id: u64) -> StoreResult<i32> {
    i32::try_from(new_id).map_err(|_| StoreError::IdOutOfRange(new_id))
}

// MySQL treats a backslash in a string literal as an escape itself.
const LIKE_ESCAPE: char = '!';

/// `%keyword%` with LIKE wildcards in the keyword escaped.
pub fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, LIKE_ESCAPE | '%' | '_') {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

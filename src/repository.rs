use crate::{
    error::StoreError,
    models::{CreatePostRequest, Post, PostFilter, Principal, UpdatePostRequest},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// PostRepository Trait
///
/// The content store contract. Every write is a single-document operation and
/// advances `updated_at` atomically with the change; that is the only
/// consistency boundary the rest of the crate relies on.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Posts matching the filter, ordered `created_at DESC`.
    async fn query_posts(&self, filter: PostFilter) -> Result<Vec<Post>, StoreError>;
    /// Any post by id, published or not. Visibility is the caller's job.
    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, StoreError>;

    async fn create_post(&self, author: &Principal, req: CreatePostRequest) -> Result<Post, StoreError>;
    /// Partial update. `Ok(None)` when the post does not exist.
    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> Result<Option<Post>, StoreError>;
    async fn set_published(&self, id: Uuid, published: bool) -> Result<Option<Post>, StoreError>;
    /// `Ok(false)` when nothing was deleted.
    async fn delete_post(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the content store across the application state.
pub type RepositoryState = Arc<dyn PostRepository>;

const POST_COLUMNS: &str =
    "id, title, content, author_id, author_name, published, created_at, updated_at";

/// PostgresRepository
///
/// The `PostRepository` backed by the `posts` table.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostRepository for PostgresRepository {
    async fn query_posts(&self, filter: PostFilter) -> Result<Vec<Post>, StoreError> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts"));
        if filter.published_only {
            builder.push(" WHERE published = true");
        }
        builder.push(" ORDER BY created_at DESC, id ASC");

        let posts = builder
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await?;
        Ok(posts)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, StoreError> {
        let post = sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn create_post(&self, author: &Principal, req: CreatePostRequest) -> Result<Post, StoreError> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "INSERT INTO posts (id, title, content, author_id, author_name, published, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) RETURNING {POST_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(req.title)
        .bind(req.content)
        .bind(author.identity)
        .bind(author.author_name())
        .bind(req.published)
        .fetch_one(&self.pool)
        .await?;
        Ok(post)
    }

    /// Uses COALESCE so only the provided fields change. `updated_at` moves
    /// strictly forward even if the clock has not ticked since the last write.
    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> Result<Option<Post>, StoreError> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "UPDATE posts \
             SET title = COALESCE($2, title), \
                 content = COALESCE($3, content), \
                 published = COALESCE($4, published), \
                 updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond') \
             WHERE id = $1 RETURNING {POST_COLUMNS}"
        ))
        .bind(id)
        .bind(req.title)
        .bind(req.content)
        .bind(req.published)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    async fn set_published(&self, id: Uuid, published: bool) -> Result<Option<Post>, StoreError> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "UPDATE posts \
             SET published = $2, \
                 updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond') \
             WHERE id = $1 RETURNING {POST_COLUMNS}"
        ))
        .bind(id)
        .bind(published)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

/// MemoryRepository
///
/// In-process content store for local development and tests. Every write
/// happens under one write lock, so readers see a post either before or after
/// a change, never halfway.
#[derive(Default)]
pub struct MemoryRepository {
    posts: RwLock<Vec<Post>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(posts: Vec<Post>) -> Self {
        Self {
            posts: RwLock::new(posts),
        }
    }

    /// Four demo posts, the oldest one unpublished.
    pub fn seeded() -> Self {
        Self::with_posts(demo_posts())
    }
}

fn advance(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous + Duration::microseconds(1))
}

#[async_trait]
impl PostRepository for MemoryRepository {
    async fn query_posts(&self, filter: PostFilter) -> Result<Vec<Post>, StoreError> {
        let posts = self.posts.read().await;
        let mut matching: Vec<Post> = posts
            .iter()
            .filter(|p| !filter.published_only || p.published)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, StoreError> {
        Ok(self.posts.read().await.iter().find(|p| p.id == id).cloned())
    }

    async fn create_post(&self, author: &Principal, req: CreatePostRequest) -> Result<Post, StoreError> {
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            title: req.title,
            content: req.content,
            author_id: author.identity,
            author_name: author.author_name(),
            published: req.published,
            created_at: now,
            updated_at: now,
        };
        self.posts.write().await.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> Result<Option<Post>, StoreError> {
        let mut posts = self.posts.write().await;
        let Some(post) = posts.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        if let Some(title) = req.title {
            post.title = title;
        }
        if let Some(content) = req.content {
            post.content = content;
        }
        if let Some(published) = req.published {
            post.published = published;
        }
        post.updated_at = advance(post.updated_at);
        Ok(Some(post.clone()))
    }

    async fn set_published(&self, id: Uuid, published: bool) -> Result<Option<Post>, StoreError> {
        let mut posts = self.posts.write().await;
        let Some(post) = posts.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        post.published = published;
        post.updated_at = advance(post.updated_at);
        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut posts = self.posts.write().await;
        let before = posts.len();
        posts.retain(|p| p.id != id);
        Ok(posts.len() < before)
    }
}

fn demo_posts() -> Vec<Post> {
    let seed = [
        (1, "Getting Started with Axum", "Alice Johnson", 101, true, 25),
        (2, "Sharing State Between Handlers", "Bob Williams", 102, true, 20),
        (3, "Structured Logging with tracing", "Alice Johnson", 101, true, 15),
        (4, "Future of Web Development", "Charlie Brown", 103, false, 10),
    ];
    seed.into_iter()
        .map(|(id, title, author, author_id, published, day)| {
            let at = Utc
                .with_ymd_and_hms(2025, 6, day, 10, 0, 0)
                .single()
                .unwrap_or_else(Utc::now);
            Post {
                id: Uuid::from_u128(id),
                title: title.to_string(),
                content: format!("{title}. Placeholder body for local development."),
                author_id: Uuid::from_u128(author_id),
                author_name: author.to_string(),
                published,
                created_at: at,
                updated_at: at,
            }
        })
        .collect()
}

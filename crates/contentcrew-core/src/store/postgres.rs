use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Executor, Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use super::{ArticlePage, ArticleRecord, ArticleStore, DraftRecord};
use crate::pipeline::{PLACEHOLDER_CONTENT, PLACEHOLDER_TITLE, PipelineArtifact};
use crate::{ContentError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    id UUID PRIMARY KEY,
    category TEXT NOT NULL,
    topic TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT 'Untitled Article',
    content TEXT NOT NULL,
    fact_check_report TEXT NOT NULL DEFAULT '',
    research_info TEXT NOT NULL DEFAULT '',
    final_content TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS article_drafts (
    article_id UUID NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    draft_number INTEGER NOT NULL,
    content TEXT NOT NULL,
    feedback TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (article_id, draft_number)
);
"#;

const ARTICLE_COLUMNS: &str = "id, category, topic, title, content, fact_check_report, \
     research_info, final_content, created_at, updated_at";

/// Postgres-backed store. Each operation checks a connection out of the pool
/// for its own duration only.
#[derive(Clone)]
pub struct PostgresArticleStore {
    pool: Pool<Postgres>,
}

impl PostgresArticleStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        info!(max_connections, "connected to postgres article store");
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        self.pool.execute(SCHEMA).await?;
        Ok(())
    }
}

fn article_from_row(row: &PgRow) -> Result<ArticleRecord> {
    Ok(ArticleRecord {
        id: row.try_get("id")?,
        category: row.try_get("category")?,
        topic: row.try_get("topic")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        fact_check_report: row.try_get("fact_check_report")?,
        research_info: row.try_get("research_info")?,
        final_content: row.try_get("final_content")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn draft_from_row(row: &PgRow) -> Result<DraftRecord> {
    Ok(DraftRecord {
        article_id: row.try_get("article_id")?,
        draft_number: row.try_get("draft_number")?,
        content: row.try_get("content")?,
        feedback: row.try_get("feedback")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ArticleStore for PostgresArticleStore {
    async fn create_article(&self, category: &str, topic: &str) -> Result<ArticleRecord> {
        let row = sqlx::query(&format!(
            "INSERT INTO articles (id, category, topic, title, content) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(category)
        .bind(topic)
        .bind(PLACEHOLDER_TITLE)
        .bind(PLACEHOLDER_CONTENT)
        .fetch_one(&self.pool)
        .await?;
        article_from_row(&row)
    }

    async fn update_article(&self, id: Uuid, artifact: &PipelineArtifact) -> Result<ArticleRecord> {
        let row = sqlx::query(&format!(
            "UPDATE articles SET title = $2, content = $3, fact_check_report = $4, \
             research_info = $5, final_content = $6, updated_at = now() \
             WHERE id = $1 RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(id)
        .bind(&artifact.title)
        .bind(&artifact.draft_content)
        .bind(&artifact.fact_check_report)
        .bind(&artifact.research_info)
        .bind(&artifact.final_content)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ContentError::NotFound(format!("article {id}")))?;
        article_from_row(&row)
    }

    async fn get_article(&self, id: Uuid) -> Result<Option<ArticleRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(article_from_row).transpose()
    }

    async fn list_articles(&self, page: u32, page_size: u32) -> Result<ArticlePage> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM articles")
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);
        let rows = sqlx::query(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             ORDER BY created_at DESC, id LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let articles = rows
            .iter()
            .map(article_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(ArticlePage::new(articles, total.max(0) as u64, page, page_size))
    }

    async fn append_draft(
        &self,
        article_id: Uuid,
        content: &str,
        feedback: Option<&str>,
    ) -> Result<DraftRecord> {
        let mut tx = self.pool.begin().await?;

        // Lock the parent row so concurrent appends serialize on it.
        sqlx::query("SELECT id FROM articles WHERE id = $1 FOR UPDATE")
            .bind(article_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ContentError::NotFound(format!("article {article_id}")))?;

        let row = sqlx::query(
            r#"
            INSERT INTO article_drafts (article_id, draft_number, content, feedback)
            SELECT $1, COALESCE(MAX(draft_number), 0) + 1, $2, $3
            FROM article_drafts WHERE article_id = $1
            RETURNING article_id, draft_number, content, feedback, created_at
            "#,
        )
        .bind(article_id)
        .bind(content)
        .bind(feedback)
        .fetch_one(&mut *tx)
        .await?;
        let draft = draft_from_row(&row)?;

        tx.commit().await?;
        Ok(draft)
    }

    async fn list_drafts(&self, article_id: Uuid) -> Result<Vec<DraftRecord>> {
        let rows = sqlx::query(
            "SELECT article_id, draft_number, content, feedback, created_at \
             FROM article_drafts WHERE article_id = $1 ORDER BY draft_number",
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(draft_from_row).collect()
    }

    async fn latest_draft(&self, article_id: Uuid) -> Result<Option<DraftRecord>> {
        let row = sqlx::query(
            "SELECT article_id, draft_number, content, feedback, created_at \
             FROM article_drafts WHERE article_id = $1 \
             ORDER BY draft_number DESC LIMIT 1",
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(draft_from_row).transpose()
    }
}

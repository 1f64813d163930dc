//! Article persistence.
//!
//! The article row is the mutable "current" view of a pipeline run; drafts are
//! an append-only history keyed by `(article_id, draft_number)`.

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;
use crate::pipeline::PipelineArtifact;

pub use memory::MemoryArticleStore;
pub use postgres::PostgresArticleStore;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: Uuid,
    pub category: String,
    pub topic: String,
    pub title: String,
    pub content: String,
    pub fact_check_report: String,
    pub research_info: String,
    pub final_content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArticleRecord {
    /// Apply the fields a pipeline run produced.
    pub(crate) fn apply(&mut self, artifact: &PipelineArtifact) {
        self.title = artifact.title.clone();
        self.content = artifact.draft_content.clone();
        self.fact_check_report = artifact.fact_check_report.clone();
        self.research_info = artifact.research_info.clone();
        self.final_content = artifact.final_content.clone();
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRecord {
    pub article_id: Uuid,
    pub draft_number: i32,
    pub content: String,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticlePage {
    pub articles: Vec<ArticleRecord>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl ArticlePage {
    pub(crate) fn new(articles: Vec<ArticleRecord>, total: u64, page: u32, page_size: u32) -> Self {
        let total_pages = total.div_ceil(u64::from(page_size)) as u32;
        Self {
            articles,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}

/// Clamp caller-supplied paging to `page >= 1` and `1..=MAX_PAGE_SIZE`.
pub fn normalize_paging(page: Option<u32>, page_size: Option<u32>) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    (page, page_size)
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert a placeholder row for a run that is about to start.
    async fn create_article(&self, category: &str, topic: &str) -> Result<ArticleRecord>;

    async fn update_article(&self, id: Uuid, artifact: &PipelineArtifact) -> Result<ArticleRecord>;

    async fn get_article(&self, id: Uuid) -> Result<Option<ArticleRecord>>;

    /// Newest first. `page` starts at 1.
    async fn list_articles(&self, page: u32, page_size: u32) -> Result<ArticlePage>;

    /// Append a draft numbered one past the current maximum for the article.
    async fn append_draft(
        &self,
        article_id: Uuid,
        content: &str,
        feedback: Option<&str>,
    ) -> Result<DraftRecord>;

    /// Drafts in ascending `draft_number` order.
    async fn list_drafts(&self, article_id: Uuid) -> Result<Vec<DraftRecord>>;

    async fn latest_draft(&self, article_id: Uuid) -> Result<Option<DraftRecord>> {
        Ok(self.list_drafts(article_id).await?.pop())
    }
}

pub type DynArticleStore = Arc<dyn ArticleStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_is_clamped() {
        assert_eq!(normalize_paging(None, None), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(normalize_paging(Some(0), Some(0)), (1, 1));
        assert_eq!(normalize_paging(Some(3), Some(1_000)), (3, MAX_PAGE_SIZE));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(ArticlePage::new(Vec::new(), 0, 1, 10).total_pages, 0);
        assert_eq!(ArticlePage::new(Vec::new(), 10, 1, 10).total_pages, 1);
        assert_eq!(ArticlePage::new(Vec::new(), 11, 1, 10).total_pages, 2);
    }
}

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{ArticlePage, ArticleRecord, ArticleStore, DraftRecord};
use crate::pipeline::{PLACEHOLDER_CONTENT, PLACEHOLDER_TITLE, PipelineArtifact};
use crate::{ContentError, Result};

/// Process-local store used by tests and the `memory` storage mode.
#[derive(Debug, Default)]
pub struct MemoryArticleStore {
    articles: DashMap<Uuid, ArticleRecord>,
    drafts: DashMap<Uuid, Vec<DraftRecord>>,
}

impl MemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: Uuid) -> ContentError {
    ContentError::NotFound(format!("article {id}"))
}

#[async_trait]
impl ArticleStore for MemoryArticleStore {
    async fn create_article(&self, category: &str, topic: &str) -> Result<ArticleRecord> {
        let now = Utc::now();
        let record = ArticleRecord {
            id: Uuid::new_v4(),
            category: category.to_string(),
            topic: topic.to_string(),
            title: PLACEHOLDER_TITLE.to_string(),
            content: PLACEHOLDER_CONTENT.to_string(),
            fact_check_report: String::new(),
            research_info: String::new(),
            final_content: String::new(),
            created_at: now,
            updated_at: now,
        };
        self.articles.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_article(&self, id: Uuid, artifact: &PipelineArtifact) -> Result<ArticleRecord> {
        let mut entry = self.articles.get_mut(&id).ok_or_else(|| not_found(id))?;
        entry.apply(artifact);
        Ok(entry.clone())
    }

    async fn get_article(&self, id: Uuid) -> Result<Option<ArticleRecord>> {
        Ok(self.articles.get(&id).map(|entry| entry.clone()))
    }

    async fn list_articles(&self, page: u32, page_size: u32) -> Result<ArticlePage> {
        let mut all: Vec<ArticleRecord> = self
            .articles
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = all.len() as u64;
        let offset = (page.saturating_sub(1) as usize).saturating_mul(page_size as usize);
        let articles = all
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .collect();
        Ok(ArticlePage::new(articles, total, page, page_size))
    }

    async fn append_draft(
        &self,
        article_id: Uuid,
        content: &str,
        feedback: Option<&str>,
    ) -> Result<DraftRecord> {
        if !self.articles.contains_key(&article_id) {
            return Err(not_found(article_id));
        }

        // The entry guard holds the shard lock across read-max and push.
        let mut drafts = self.drafts.entry(article_id).or_default();
        let next = drafts
            .iter()
            .map(|draft| draft.draft_number)
            .max()
            .unwrap_or(0)
            + 1;
        let record = DraftRecord {
            article_id,
            draft_number: next,
            content: content.to_string(),
            feedback: feedback.map(str::to_string),
            created_at: Utc::now(),
        };
        drafts.push(record.clone());
        Ok(record)
    }

    async fn list_drafts(&self, article_id: Uuid) -> Result<Vec<DraftRecord>> {
        let mut drafts = self
            .drafts
            .get(&article_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        drafts.sort_by_key(|draft| draft.draft_number);
        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn create_then_update_replaces_placeholders() {
        let store = MemoryArticleStore::new();
        let record = store.create_article("Tech", "Rust").await.unwrap();
        assert_eq!(record.title, PLACEHOLDER_TITLE);
        assert_eq!(record.content, PLACEHOLDER_CONTENT);

        let mut artifact = PipelineArtifact::new("Tech", "Rust");
        artifact.title = "Why Rust".into();
        artifact.draft_content = "draft".into();
        artifact.final_content = "final".into();
        let updated = store.update_article(record.id, &artifact).await.unwrap();

        assert_eq!(updated.title, "Why Rust");
        assert_eq!(updated.content, "draft");
        assert_eq!(updated.final_content, "final");
        assert!(updated.updated_at >= record.updated_at);
    }

    #[tokio::test]
    async fn concurrent_appends_never_reuse_numbers() {
        let store = Arc::new(MemoryArticleStore::new());
        let article = store.create_article("Tech", "Rust").await.unwrap();

        let mut handles = Vec::new();
        for idx in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_draft(article.id, &format!("draft {idx}"), None)
                    .await
                    .unwrap()
                    .draft_number
            }));
        }
        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap());
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn drafts_for_unknown_article_are_rejected() {
        let store = MemoryArticleStore::new();
        let err = store
            .append_draft(Uuid::new_v4(), "text", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::NotFound(_)));
        assert!(store.get_article(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listing_pages_newest_first() {
        let store = MemoryArticleStore::new();
        for topic in ["a", "b", "c"] {
            store.create_article("Tech", topic).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let first = store.list_articles(1, 2).await.unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.total_pages, 2);
        assert_eq!(first.articles[0].topic, "c");

        let second = store.list_articles(2, 2).await.unwrap();
        assert_eq!(second.articles.len(), 1);
        assert_eq!(second.articles[0].topic, "a");
    }
}

use crate::config::{AppConfig, StorageBackend};
use crate::error::AppError;
use crate::metrics;
use anyhow::{Result, anyhow};
use axum::http::StatusCode;
use axum::response::sse::Event;
use contentcrew_core::{
    ArticleRecord, Config, ContentPipeline, DynArticleStore, FeedbackRequest, GenerationRequest,
    MemoryArticleStore, PLACEHOLDER_CONTENT, PipelineArtifact, PostgresArticleStore,
    is_error_sentinel, run_feedback_revision, run_generation,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_stream::Stream;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    job_service: Arc<JobService>,
    store: DynArticleStore,
}

impl AppState {
    pub async fn try_new(config: &AppConfig, settings: &Config) -> Result<Self> {
        let store: DynArticleStore = match &config.storage {
            StorageBackend::InMemory => Arc::new(MemoryArticleStore::new()),
            StorageBackend::Postgres {
                url,
                max_connections,
            } => Arc::new(PostgresArticleStore::connect(url, *max_connections).await?),
        };
        let pipeline = Arc::new(ContentPipeline::from_config(settings));

        Ok(Self::from_parts(
            store,
            pipeline,
            JobSettings {
                max_concurrency: config.max_concurrency,
                status_interval: config.status_interval,
                job_retention: config.job_retention,
                default_category: settings.pipeline.default_category.clone(),
            },
        ))
    }

    pub fn from_parts(
        store: DynArticleStore,
        pipeline: Arc<ContentPipeline>,
        settings: JobSettings,
    ) -> Self {
        let service = JobService::new(store.clone(), pipeline, settings);
        Self {
            job_service: Arc::new(service),
            store,
        }
    }

    pub fn job_service(&self) -> Arc<JobService> {
        self.job_service.clone()
    }

    pub fn store(&self) -> DynArticleStore {
        self.store.clone()
    }

    pub fn metrics(&self) -> JobMetrics {
        self.job_service.metrics()
    }
}

#[derive(Clone, Debug)]
pub struct JobSettings {
    pub max_concurrency: usize,
    pub status_interval: Duration,
    /// How long a finished job's status stays queryable.
    pub job_retention: Duration,
    pub default_category: String,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            status_interval: Duration::from_secs(1),
            job_retention: Duration::from_secs(600),
            default_category: "Technology".to_string(),
        }
    }
}

/// Runs generation and feedback jobs in the background, one tokio task per
/// job, bounded by a semaphore. Jobs are keyed by article id.
#[derive(Clone)]
pub struct JobService {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    store: DynArticleStore,
    pipeline: Arc<ContentPipeline>,
    jobs: Arc<DashMap<Uuid, JobRecord>>,
    status_interval: Duration,
    job_retention: Duration,
    default_category: String,
}

impl JobService {
    pub fn new(
        store: DynArticleStore,
        pipeline: Arc<ContentPipeline>,
        settings: JobSettings,
    ) -> Self {
        let max_concurrency = settings.max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            store,
            pipeline,
            jobs: Arc::new(DashMap::new()),
            status_interval: settings.status_interval,
            job_retention: settings.job_retention,
            default_category: settings.default_category,
        }
    }

    /// Creates the placeholder article and schedules the full pipeline for it.
    pub async fn start_generation(
        &self,
        category: Option<String>,
        topic: String,
    ) -> Result<ArticleRecord, AppError> {
        let category = category
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.default_category.clone());
        let topic = topic.trim().to_string();
        self.prune_finished();

        let article = self.store.create_article(&category, &topic).await?;
        self.jobs.insert(article.id, JobRecord::Running);

        let request = GenerationRequest { category, topic };
        let service = self.clone();
        let article_id = article.id;
        tokio::spawn(async move {
            service
                .run_job(JobKind::Generation, article_id, |service| async move {
                    service.generate(article_id, request).await
                })
                .await;
        });

        Ok(article)
    }

    /// Schedules a revision of the article's latest draft driven by `feedback`.
    ///
    /// The job slot is claimed before the store is read, so concurrent
    /// submissions for one article cannot both start a revision.
    pub async fn start_feedback(&self, article_id: Uuid, feedback: String) -> Result<(), AppError> {
        self.prune_finished();
        let previous = self.claim(article_id)?;

        let (article, request) = match self.prepare_feedback(article_id, feedback).await {
            Ok(prepared) => prepared,
            Err(err) => {
                self.release(article_id, previous);
                return Err(err);
            }
        };

        let service = self.clone();
        tokio::spawn(async move {
            service
                .run_job(JobKind::Feedback, article_id, |service| async move {
                    service.revise(article, request).await
                })
                .await;
        });

        Ok(())
    }

    async fn prepare_feedback(
        &self,
        article_id: Uuid,
        feedback: String,
    ) -> Result<(ArticleRecord, FeedbackRequest), AppError> {
        let article = self
            .store
            .get_article(article_id)
            .await?
            .ok_or_else(|| AppError::not_found("article not found"))?;

        let previous_draft = match self.store.latest_draft(article_id).await? {
            Some(draft) => draft.content,
            None => current_text(&article).to_string(),
        };
        if previous_draft.is_empty()
            || previous_draft == PLACEHOLDER_CONTENT
            || is_error_sentinel(&previous_draft)
        {
            return Err(AppError::new(
                StatusCode::CONFLICT,
                "article has no draft to revise yet",
            ));
        }

        let request = FeedbackRequest {
            category: article.category.clone(),
            topic: article.topic.clone(),
            previous_draft,
            feedback,
            current_title: Some(article.title.clone()),
        };
        Ok((article, request))
    }

    /// Marks the article's job slot as running, returning what it replaced.
    fn claim(&self, article_id: Uuid) -> Result<Option<JobRecord>, AppError> {
        match self.jobs.entry(article_id) {
            Entry::Occupied(mut entry) => {
                if matches!(entry.get(), JobRecord::Running) {
                    return Err(AppError::new(
                        StatusCode::CONFLICT,
                        "a job is already running for this article",
                    ));
                }
                Ok(Some(entry.insert(JobRecord::Running)))
            }
            Entry::Vacant(entry) => {
                entry.insert(JobRecord::Running);
                Ok(None)
            }
        }
    }

    fn release(&self, article_id: Uuid, previous: Option<JobRecord>) {
        match previous {
            Some(record) => {
                self.jobs.insert(article_id, record);
            }
            None => {
                self.jobs.remove(&article_id);
            }
        }
    }

    /// Drops finished jobs older than the retention window.
    fn prune_finished(&self) {
        let retention = self.job_retention;
        self.jobs.retain(|_, record| !record.expired(retention));
    }

    async fn run_job<F, Fut>(&self, kind: JobKind, article_id: Uuid, job: F)
    where
        F: FnOnce(JobService) -> Fut,
        Fut: Future<Output = Result<JobReport>>,
    {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(err) => {
                self.fail(kind, article_id, err.to_string());
                return;
            }
        };

        let snapshot = self.metrics();
        metrics::job_started(
            kind.as_str(),
            article_id,
            snapshot.running_jobs,
            snapshot.available_permits,
        );

        let result = job(self.clone()).await;
        drop(permit);

        match result {
            Ok(report) => {
                info!(article_id = %article_id, kind = kind.as_str(), "job completed");
                metrics::job_completed(
                    kind.as_str(),
                    article_id,
                    report.trace_events,
                    report.draft_number,
                );
                self.jobs.insert(
                    article_id,
                    JobRecord::Completed {
                        finished_at: Instant::now(),
                    },
                );
            }
            Err(err) => {
                error!(article_id = %article_id, kind = kind.as_str(), error = %err, "job failed");
                self.fail(kind, article_id, err.to_string());
            }
        }
    }

    fn fail(&self, kind: JobKind, article_id: Uuid, error: String) {
        metrics::job_failed(kind.as_str(), article_id, &error);
        self.jobs.insert(
            article_id,
            JobRecord::Failed {
                error,
                finished_at: Instant::now(),
            },
        );
    }

    async fn generate(&self, article_id: Uuid, request: GenerationRequest) -> Result<JobReport> {
        let outcome = run_generation(self.pipeline.clone(), request).await?;
        let artifact = outcome.artifact;
        self.store.update_article(article_id, &artifact).await?;

        if artifact.failed() {
            return Err(anyhow!(artifact.draft_content));
        }

        let draft = self
            .store
            .append_draft(article_id, artifact.publishable_content(), None)
            .await?;
        Ok(JobReport {
            trace_events: outcome.trace_events.len(),
            draft_number: Some(draft.draft_number),
        })
    }

    async fn revise(&self, article: ArticleRecord, request: FeedbackRequest) -> Result<JobReport> {
        let feedback = request.feedback.clone();
        let outcome = run_feedback_revision(self.pipeline.clone(), request).await?;
        let revised = outcome.artifact;

        if revised.final_content.is_empty() || is_error_sentinel(&revised.final_content) {
            return Err(anyhow!(revised.final_content));
        }

        // The research and fact-check columns belong to the generation run.
        let update = PipelineArtifact {
            draft_content: article.content.clone(),
            fact_check_report: article.fact_check_report.clone(),
            research_info: article.research_info.clone(),
            ..revised.clone()
        };
        self.store.update_article(article.id, &update).await?;

        let draft = self
            .store
            .append_draft(article.id, &revised.final_content, Some(&feedback))
            .await?;
        Ok(JobReport {
            trace_events: outcome.trace_events.len(),
            draft_number: Some(draft.draft_number),
        })
    }

    pub fn is_running(&self, article_id: Uuid) -> bool {
        matches!(
            self.jobs.get(&article_id).as_deref(),
            Some(JobRecord::Running)
        )
    }

    pub fn status(&self, article_id: Uuid) -> Option<JobStatus> {
        let record = self.jobs.get(&article_id)?.value().clone();
        Some(match record {
            JobRecord::Running => JobStatus {
                article_id,
                state: JobState::Running,
                error: None,
            },
            JobRecord::Completed { .. } => JobStatus {
                article_id,
                state: JobState::Completed,
                error: None,
            },
            JobRecord::Failed { error, .. } => JobStatus {
                article_id,
                state: JobState::Failed,
                error: Some(error),
            },
        })
    }

    /// Polls the job every `status_interval`, emitting `processing` pings
    /// until a terminal `article_ready` or `article_failed` event.
    pub fn status_stream(&self, article_id: Uuid) -> SseStream {
        metrics::stream_opened(article_id);
        let stream = futures::stream::unfold(
            Some((self.clone(), true)),
            move |cursor| async move {
                let (service, first_poll) = cursor?;
                if !first_poll {
                    tokio::time::sleep(service.status_interval).await;
                }

                let update = service.poll(article_id).await;
                let next = if update.is_terminal() {
                    None
                } else {
                    Some((service, false))
                };
                Some((Ok::<Event, Infallible>(update.into_sse_event()), next))
            },
        );
        Box::pin(stream)
    }

    async fn poll(&self, article_id: Uuid) -> StatusUpdate {
        let record = self.jobs.get(&article_id).map(|entry| entry.value().clone());
        let tracked = record.is_some();
        match record {
            Some(JobRecord::Running) => StatusUpdate::Processing,
            Some(JobRecord::Failed { error, .. }) => StatusUpdate::Failed(error),
            Some(JobRecord::Completed { .. }) | None => match self.store.get_article(article_id).await {
                Ok(Some(article)) if tracked || article.content != PLACEHOLDER_CONTENT => {
                    StatusUpdate::Ready(Box::new(article))
                }
                Ok(Some(_)) => StatusUpdate::Failed("no job is running for this article".into()),
                Ok(None) => StatusUpdate::Failed("article not found".into()),
                Err(err) => StatusUpdate::Failed(err.to_string()),
            },
        }
    }

    pub fn metrics(&self) -> JobMetrics {
        let mut running = 0;
        for entry in self.jobs.iter() {
            if matches!(entry.value(), JobRecord::Running) {
                running += 1;
            }
        }

        JobMetrics {
            max_concurrency: self.max_concurrency,
            available_permits: self.semaphore.available_permits(),
            running_jobs: running,
            total_jobs: self.jobs.len(),
        }
    }
}

fn current_text(article: &ArticleRecord) -> &str {
    if article.final_content.is_empty() || is_error_sentinel(&article.final_content) {
        &article.content
    } else {
        &article.final_content
    }
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

#[derive(Clone, Copy, Debug)]
enum JobKind {
    Generation,
    Feedback,
}

impl JobKind {
    fn as_str(self) -> &'static str {
        match self {
            JobKind::Generation => "generation",
            JobKind::Feedback => "feedback",
        }
    }
}

struct JobReport {
    trace_events: usize,
    draft_number: Option<i32>,
}

#[derive(Clone, Debug)]
pub enum JobRecord {
    Running,
    Completed { finished_at: Instant },
    Failed { error: String, finished_at: Instant },
}

impl JobRecord {
    fn expired(&self, retention: Duration) -> bool {
        match self {
            JobRecord::Running => false,
            JobRecord::Completed { finished_at } | JobRecord::Failed { finished_at, .. } => {
                finished_at.elapsed() >= retention
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize)]
pub struct JobStatus {
    pub article_id: Uuid,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct JobMetrics {
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub running_jobs: usize,
    pub total_jobs: usize,
}

enum StatusUpdate {
    Processing,
    Ready(Box<ArticleRecord>),
    Failed(String),
}

impl StatusUpdate {
    fn is_terminal(&self) -> bool {
        !matches!(self, StatusUpdate::Processing)
    }

    fn into_sse_event(self) -> Event {
        match self {
            StatusUpdate::Processing => Event::default().data("processing"),
            StatusUpdate::Ready(article) => {
                let data = serde_json::to_string(&article).unwrap_or_else(|err| {
                    serde_json::json!({ "error": format!("failed to serialize article: {err}") })
                        .to_string()
                });
                Event::default().event("article_ready").data(data)
            }
            StatusUpdate::Failed(error) => {
                let data = serde_json::json!({ "error": error }).to_string();
                Event::default().event("article_failed").data(data)
            }
        }
    }
}

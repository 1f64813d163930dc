use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{KeepAlive, Sse},
    routing::{get, post},
};
use contentcrew_core::{ArticlePage, ArticleRecord, DraftRecord, normalize_paging};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::{AppState, JobMetrics, JobState, SseStream};

#[derive(Debug, Deserialize)]
pub struct GenerateArticleRequest {
    #[serde(default)]
    pub category: Option<String>,
    pub topic: String,
}

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub article_id: Uuid,
    pub state: JobState,
    pub capacity: JobMetrics,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackPayload {
    pub feedback: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

pub fn article_router() -> Router<AppState> {
    Router::new()
        .route("/generate-article", post(generate_article))
        .route("/article-status/:id", get(article_status))
        .route("/article/:id", get(get_article))
        .route("/article/:id/feedback", post(submit_feedback))
        .route("/article/:id/drafts", get(list_drafts))
        .route("/articles", get(list_articles))
}

#[instrument(skip_all, fields(topic = %payload.topic))]
async fn generate_article(
    State(state): State<AppState>,
    Json(payload): Json<GenerateArticleRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    if payload.topic.trim().is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "topic must not be empty",
        ));
    }

    let service = state.job_service();
    let article = service
        .start_generation(payload.category, payload.topic)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            article_id: article.id,
            state: JobState::Running,
            capacity: service.metrics(),
        }),
    ))
}

async fn article_status(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> Result<Sse<SseStream>, AppError> {
    ensure_article(&state, article_id).await?;
    let stream = state.job_service().status_stream(article_id);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new()))
}

async fn get_article(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> Result<Json<ArticleRecord>, AppError> {
    ensure_article(&state, article_id).await.map(Json)
}

#[instrument(skip_all, fields(article_id = %article_id))]
async fn submit_feedback(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
    Json(payload): Json<FeedbackPayload>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    let feedback = payload.feedback.trim();
    if feedback.is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "feedback must not be empty",
        ));
    }

    let service = state.job_service();
    service
        .start_feedback(article_id, feedback.to_string())
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            article_id,
            state: JobState::Running,
            capacity: service.metrics(),
        }),
    ))
}

async fn list_drafts(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> Result<Json<Vec<DraftRecord>>, AppError> {
    ensure_article(&state, article_id).await?;
    let drafts = state.store().list_drafts(article_id).await?;
    Ok(Json(drafts))
}

async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ArticlePage>, AppError> {
    let (page, page_size) = normalize_paging(query.page, query.page_size);
    let listing = state.store().list_articles(page, page_size).await?;
    Ok(Json(listing))
}

async fn ensure_article(state: &AppState, article_id: Uuid) -> Result<ArticleRecord, AppError> {
    state
        .store()
        .get_article(article_id)
        .await?
        .ok_or_else(|| AppError::not_found("article not found"))
}

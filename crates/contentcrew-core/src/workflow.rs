use std::sync::Arc;

use anyhow::{Result, anyhow};
use graph_flow::{
    ExecutionStatus, FlowRunner, GraphBuilder, InMemorySessionStorage, Session, SessionStorage,
    Task,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::pipeline::{ContentPipeline, PipelineArtifact};
use crate::tasks::{
    DraftTask, FactCheckTask, FeedbackReviseTask, KEY_ARTIFACT, KEY_CATEGORY, KEY_FEEDBACK,
    KEY_PREVIOUS_DRAFT, KEY_TOPIC, KEY_TRACE, ResearchTask, ReviseTask, TitleTask,
};
use crate::trace::TraceEvent;

/// Input for a full research-to-revision run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub category: String,
    pub topic: String,
}

/// Input for revising an existing draft with reader feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub category: String,
    pub topic: String,
    pub previous_draft: String,
    pub feedback: String,
    /// Title kept when the revised title cannot be generated.
    #[serde(default)]
    pub current_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub artifact: PipelineArtifact,
    pub trace_events: Vec<TraceEvent>,
}

struct ContentGraphTasks {
    research: Arc<ResearchTask>,
    draft: Arc<DraftTask>,
    title: Arc<TitleTask>,
    fact_check: Arc<FactCheckTask>,
    revise: Arc<ReviseTask>,
    feedback_revise: Arc<FeedbackReviseTask>,
    feedback_title: Arc<TitleTask>,
}

impl ContentGraphTasks {
    fn new(pipeline: Arc<ContentPipeline>) -> Self {
        Self {
            research: Arc::new(ResearchTask::new(pipeline.clone())),
            draft: Arc::new(DraftTask::new(pipeline.clone())),
            title: Arc::new(TitleTask::initial(pipeline.clone())),
            fact_check: Arc::new(FactCheckTask::new(pipeline.clone())),
            revise: Arc::new(ReviseTask::new(pipeline.clone())),
            feedback_revise: Arc::new(FeedbackReviseTask::new(pipeline.clone())),
            feedback_title: Arc::new(TitleTask::revised(pipeline)),
        }
    }
}

fn build_graph(pipeline: Arc<ContentPipeline>) -> (Arc<graph_flow::Graph>, ContentGraphTasks) {
    let tasks = ContentGraphTasks::new(pipeline);

    let builder = GraphBuilder::new("contentcrew_workflow")
        .add_task(tasks.research.clone())
        .add_task(tasks.draft.clone())
        .add_task(tasks.title.clone())
        .add_task(tasks.fact_check.clone())
        .add_task(tasks.revise.clone())
        .add_task(tasks.feedback_revise.clone())
        .add_task(tasks.feedback_title.clone())
        .add_edge(tasks.research.id(), tasks.draft.id())
        .add_edge(tasks.draft.id(), tasks.title.id())
        .add_edge(tasks.title.id(), tasks.fact_check.id())
        .add_edge(tasks.fact_check.id(), tasks.revise.id())
        .add_edge(tasks.feedback_revise.id(), tasks.feedback_title.id())
        .set_start_task(tasks.research.id());

    (Arc::new(builder.build()), tasks)
}

/// Research, draft, title, fact-check and revise an article.
#[instrument(skip(pipeline), fields(category = %request.category, topic = %request.topic))]
pub async fn run_generation(
    pipeline: Arc<ContentPipeline>,
    request: GenerationRequest,
) -> Result<GenerationOutcome> {
    let (graph, tasks) = build_graph(pipeline);
    let session = Session::new_from_task(new_session_id(), tasks.research.id());
    session.context.set(KEY_CATEGORY, request.category.clone()).await;
    session.context.set(KEY_TOPIC, request.topic.clone()).await;
    session
        .context
        .set(
            KEY_ARTIFACT,
            PipelineArtifact::new(request.category, request.topic),
        )
        .await;

    execute(graph, session).await
}

/// Revise `previous_draft` with `feedback` and regenerate the title.
#[instrument(skip(pipeline, request), fields(category = %request.category, topic = %request.topic))]
pub async fn run_feedback_revision(
    pipeline: Arc<ContentPipeline>,
    request: FeedbackRequest,
) -> Result<GenerationOutcome> {
    let (graph, tasks) = build_graph(pipeline);
    let session = Session::new_from_task(new_session_id(), tasks.feedback_revise.id());
    session.context.set(KEY_CATEGORY, request.category.clone()).await;
    session.context.set(KEY_TOPIC, request.topic.clone()).await;
    session
        .context
        .set(KEY_PREVIOUS_DRAFT, request.previous_draft)
        .await;
    session.context.set(KEY_FEEDBACK, request.feedback).await;

    let mut artifact = PipelineArtifact::new(request.category, request.topic);
    if let Some(title) = request.current_title.filter(|title| !title.trim().is_empty()) {
        artifact.title = title;
    }
    session.context.set(KEY_ARTIFACT, artifact).await;

    execute(graph, session).await
}

fn new_session_id() -> String {
    format!("session-{}", Uuid::new_v4())
}

async fn execute(graph: Arc<graph_flow::Graph>, session: Session) -> Result<GenerationOutcome> {
    let storage = Arc::new(InMemorySessionStorage::new());
    let runner = FlowRunner::new(graph, storage.clone());
    let session_id = session.id.clone();

    storage
        .save(session)
        .await
        .map_err(|err| anyhow!("failed to persist session: {err}"))?;

    loop {
        let result = runner
            .run(&session_id)
            .await
            .map_err(|err| anyhow!("graph execution failure: {err}"))?;

        match result.status {
            ExecutionStatus::Completed => break,
            ExecutionStatus::WaitingForInput => continue,
            ExecutionStatus::Error(message) => return Err(anyhow!(message)),
        }
    }

    let session = storage
        .get(&session_id)
        .await
        .map_err(|err| anyhow!("failed to reload session: {err}"))?
        .ok_or_else(|| anyhow!("session missing after execution"))?;

    let artifact: PipelineArtifact = session
        .context
        .get(KEY_ARTIFACT)
        .await
        .ok_or_else(|| anyhow!("pipeline artifact missing after execution"))?;
    let trace_events: Vec<TraceEvent> = session.context.get(KEY_TRACE).await.unwrap_or_default();

    info!(
        session = %session_id,
        stages = trace_events.len(),
        failed = artifact.failed(),
        "pipeline run finished"
    );

    Ok(GenerationOutcome {
        artifact,
        trace_events,
    })
}

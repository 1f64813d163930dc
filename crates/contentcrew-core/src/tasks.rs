use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, NextAction, Task, TaskResult};
use tracing::{debug, info, instrument, warn};

use crate::pipeline::{ContentPipeline, PipelineArtifact};
use crate::trace::TraceEvent;
use crate::{TraceCollector, is_error_sentinel};

pub(crate) const KEY_CATEGORY: &str = "request.category";
pub(crate) const KEY_TOPIC: &str = "request.topic";
pub(crate) const KEY_PREVIOUS_DRAFT: &str = "request.previous_draft";
pub(crate) const KEY_FEEDBACK: &str = "request.feedback";
pub(crate) const KEY_ARTIFACT: &str = "artifact";
pub(crate) const KEY_TRACE: &str = "trace.events";

async fn load_artifact(context: &Context) -> PipelineArtifact {
    if let Some(artifact) = context.get::<PipelineArtifact>(KEY_ARTIFACT).await {
        return artifact;
    }
    let category: String = context.get(KEY_CATEGORY).await.unwrap_or_default();
    let topic: String = context.get(KEY_TOPIC).await.unwrap_or_default();
    PipelineArtifact::new(category, topic)
}

async fn store_artifact(context: &Context, artifact: &PipelineArtifact) {
    context.set(KEY_ARTIFACT, artifact).await;
}

async fn push_trace(context: &Context, event: TraceEvent) {
    let events: Vec<TraceEvent> = context.get(KEY_TRACE).await.unwrap_or_default();
    let mut collector = TraceCollector::from_events(events);
    collector.push(event);
    context.set(KEY_TRACE, collector.into_events()).await;
}

/// Research stage. A failed research run ends the graph and copies the
/// failure into every downstream field.
pub struct ResearchTask {
    pipeline: Arc<ContentPipeline>,
}

impl ResearchTask {
    pub fn new(pipeline: Arc<ContentPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Task for ResearchTask {
    fn id(&self) -> &str {
        "research"
    }

    #[instrument(name = "task.research", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let mut artifact = load_artifact(&context).await;
        let research = self
            .pipeline
            .research(&artifact.category, &artifact.topic)
            .await;

        if is_error_sentinel(&research) {
            warn!(error = %research, "research failed; skipping remaining stages");
            artifact.research_info = research.clone();
            artifact.draft_content = research.clone();
            artifact.fact_check_report = research.clone();
            artifact.final_content = research.clone();
            store_artifact(&context, &artifact).await;
            push_trace(&context, TraceEvent::failure(self.id(), research.clone())).await;
            return Ok(TaskResult::new(Some(research), NextAction::End));
        }

        let sources = research
            .rsplit_once("\n\nSources:\n")
            .map(|(_, links)| links.lines().filter(|line| !line.is_empty()).count())
            .unwrap_or(0);
        artifact.research_info = research;
        store_artifact(&context, &artifact).await;
        push_trace(
            &context,
            TraceEvent::new(self.id(), format!("research gathered with {sources} sources")),
        )
        .await;

        info!(sources, "research task populated context");
        Ok(TaskResult::new(
            Some("Research complete".to_string()),
            NextAction::ContinueAndExecute,
        ))
    }
}

pub struct DraftTask {
    pipeline: Arc<ContentPipeline>,
}

impl DraftTask {
    pub fn new(pipeline: Arc<ContentPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Task for DraftTask {
    fn id(&self) -> &str {
        "draft"
    }

    #[instrument(name = "task.draft", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let mut artifact = load_artifact(&context).await;
        let draft = self
            .pipeline
            .draft(&artifact.category, &artifact.topic, &artifact.research_info)
            .await;

        artifact.draft_content = draft.clone();
        store_artifact(&context, &artifact).await;

        if is_error_sentinel(&draft) {
            warn!(error = %draft, "draft generation failed; skipping remaining stages");
            push_trace(&context, TraceEvent::failure(self.id(), draft.clone())).await;
            return Ok(TaskResult::new(Some(draft), NextAction::End));
        }

        push_trace(
            &context,
            TraceEvent::new(self.id(), format!("draft written ({} chars)", draft.len())),
        )
        .await;
        debug!(chars = draft.len(), "draft stored in context");

        Ok(TaskResult::new(
            Some("Draft generated".to_string()),
            NextAction::ContinueAndExecute,
        ))
    }
}

/// Which title prompt a [`TitleTask`] sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleMode {
    Initial,
    Revised,
}

/// Single-turn title generation. A failure keeps the current title and never
/// stops the graph.
pub struct TitleTask {
    id: &'static str,
    mode: TitleMode,
    pipeline: Arc<ContentPipeline>,
}

impl TitleTask {
    pub fn initial(pipeline: Arc<ContentPipeline>) -> Self {
        Self {
            id: "title",
            mode: TitleMode::Initial,
            pipeline,
        }
    }

    pub fn revised(pipeline: Arc<ContentPipeline>) -> Self {
        Self {
            id: "feedback_title",
            mode: TitleMode::Revised,
            pipeline,
        }
    }
}

#[async_trait]
impl Task for TitleTask {
    fn id(&self) -> &str {
        self.id
    }

    #[instrument(name = "task.title", skip(self, context), fields(mode = ?self.mode))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let mut artifact = load_artifact(&context).await;
        let title = match self.mode {
            TitleMode::Initial => {
                self.pipeline
                    .generate_title(&artifact.category, &artifact.topic)
                    .await
            }
            TitleMode::Revised => {
                self.pipeline
                    .generate_revised_title(&artifact.category, &artifact.topic)
                    .await
            }
        };

        match title {
            Some(title) => {
                info!(%title, "title generated");
                artifact.title = title.clone();
                push_trace(&context, TraceEvent::new(self.id, format!("title: {title}"))).await;
            }
            None => {
                push_trace(
                    &context,
                    TraceEvent::failure(self.id, format!("kept title \"{}\"", artifact.title)),
                )
                .await;
            }
        }
        store_artifact(&context, &artifact).await;

        let next = match self.mode {
            TitleMode::Initial => NextAction::ContinueAndExecute,
            TitleMode::Revised => NextAction::End,
        };
        Ok(TaskResult::new(Some(artifact.title), next))
    }
}

pub struct FactCheckTask {
    pipeline: Arc<ContentPipeline>,
}

impl FactCheckTask {
    pub fn new(pipeline: Arc<ContentPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Task for FactCheckTask {
    fn id(&self) -> &str {
        "fact_check"
    }

    #[instrument(name = "task.fact_check", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let mut artifact = load_artifact(&context).await;
        let report = self
            .pipeline
            .fact_check(&artifact.category, &artifact.draft_content)
            .await;

        let event = if is_error_sentinel(&report) {
            TraceEvent::failure(self.id(), report.clone())
        } else {
            TraceEvent::new(self.id(), "fact-check report generated")
        };
        artifact.fact_check_report = report;
        store_artifact(&context, &artifact).await;
        push_trace(&context, event).await;

        Ok(TaskResult::new(
            Some("Fact-check complete".to_string()),
            NextAction::ContinueAndExecute,
        ))
    }
}

pub struct ReviseTask {
    pipeline: Arc<ContentPipeline>,
}

impl ReviseTask {
    pub fn new(pipeline: Arc<ContentPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Task for ReviseTask {
    fn id(&self) -> &str {
        "revise"
    }

    #[instrument(name = "task.revise", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let mut artifact = load_artifact(&context).await;
        let revised = self
            .pipeline
            .revise(
                &artifact.category,
                &artifact.draft_content,
                &artifact.fact_check_report,
            )
            .await;

        let event = if is_error_sentinel(&revised) {
            TraceEvent::failure(self.id(), revised.clone())
        } else {
            TraceEvent::new(self.id(), "revised article generated")
        };
        artifact.final_content = revised.clone();
        store_artifact(&context, &artifact).await;
        push_trace(&context, event).await;

        Ok(TaskResult::new(Some(revised), NextAction::End))
    }
}

/// Entry point of the feedback path: revises a previous draft instead of
/// researching again.
pub struct FeedbackReviseTask {
    pipeline: Arc<ContentPipeline>,
}

impl FeedbackReviseTask {
    pub fn new(pipeline: Arc<ContentPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Task for FeedbackReviseTask {
    fn id(&self) -> &str {
        "feedback_revise"
    }

    #[instrument(name = "task.feedback_revise", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let mut artifact = load_artifact(&context).await;
        let previous: String = context.get(KEY_PREVIOUS_DRAFT).await.unwrap_or_default();
        let feedback: String = context.get(KEY_FEEDBACK).await.unwrap_or_default();

        let revised = self
            .pipeline
            .revise_with_feedback(&artifact.category, &previous, &feedback)
            .await;

        let event = if is_error_sentinel(&revised) {
            TraceEvent::failure(self.id(), revised.clone())
        } else {
            TraceEvent::new(self.id(), "feedback incorporated")
        };
        artifact.draft_content = previous;
        artifact.fact_check_report.clear();
        artifact.research_info.clear();
        artifact.final_content = revised;
        artifact.feedback = Some(feedback);
        store_artifact(&context, &artifact).await;
        push_trace(&context, event).await;

        Ok(TaskResult::new(
            Some("Feedback revision complete".to_string()),
            NextAction::ContinueAndExecute,
        ))
    }
}

//! Stage functions of the article pipeline.
//!
//! Every stage returns plain text. Failures are reported in-band as strings
//! starting with `"Error"` so the graph tasks can branch on
//! [`is_error_sentinel`] instead of unwinding.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::agents::{Agent, AgentFactory, Conversational, ToolLoop};
use crate::config::Config;
use crate::llm::{ConversationMessage, OpenAiChatModel, Reply};
use crate::metrics::record_stage;
use crate::search::{SerpApiClient, WebSearch};
use crate::{Result, is_error_sentinel, prompts};

pub const PLACEHOLDER_TITLE: &str = "Untitled Article";
pub const PLACEHOLDER_CONTENT: &str = "Generating...";

pub const NO_RESEARCH: &str = "Error: No research information gathered";
pub const NO_ARTICLE: &str = "Error: No article generated";
pub const NO_FACT_CHECK: &str = "Error: No fact-check report generated";
pub const REVISION_FAILED: &str = "Error: Unable to generate revised article.";

/// Accumulated output of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineArtifact {
    pub category: String,
    pub topic: String,
    pub title: String,
    pub draft_content: String,
    pub fact_check_report: String,
    pub research_info: String,
    pub final_content: String,
    #[serde(default)]
    pub draft_number: Option<i32>,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl PipelineArtifact {
    pub fn new(category: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            topic: topic.into(),
            title: PLACEHOLDER_TITLE.to_string(),
            ..Self::default()
        }
    }

    /// True when no usable article came out of the run.
    pub fn failed(&self) -> bool {
        self.draft_content.is_empty() || is_error_sentinel(&self.draft_content)
    }

    /// The text to publish: the revision when it succeeded, otherwise the draft.
    pub fn publishable_content(&self) -> &str {
        if self.final_content.is_empty() || is_error_sentinel(&self.final_content) {
            &self.draft_content
        } else {
            &self.final_content
        }
    }
}

/// Research, draft, title, fact-check and revision stages over one set of
/// collaborators.
#[derive(Clone)]
pub struct ContentPipeline {
    factory: AgentFactory,
    search: Arc<dyn WebSearch>,
    tool_loop: ToolLoop,
}

impl ContentPipeline {
    pub fn new(factory: AgentFactory, search: Arc<dyn WebSearch>) -> Self {
        let tool_loop = ToolLoop::new(search.clone());
        Self {
            factory,
            search,
            tool_loop,
        }
    }

    /// Production wiring: OpenAI-compatible model and SerpAPI search.
    pub fn from_config(config: &Config) -> Self {
        let factory = AgentFactory::new(config.model_config(), Arc::new(OpenAiChatModel::new()));
        let search = Arc::new(SerpApiClient::new(&config.search, config.search_api_key()));
        Self::new(factory, search).with_max_turns(config.pipeline.max_turns)
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.tool_loop = self.tool_loop.with_max_turns(max_turns);
        self
    }

    /// Research `"{category}: {topic}"` and append the collected sources.
    pub async fn research(&self, category: &str, topic: &str) -> String {
        if let Err(failure) = self.search.ensure_ready() {
            error!(error = %failure, "search client is not ready; research aborted");
            record_stage("research", "error");
            return failure.to_string();
        }

        let subject = format!("{category}: {topic}");
        info!(%subject, "conducting research");

        let researcher = self.factory.researcher(category);
        let outcome = self
            .tool_loop
            .run(&researcher, &prompts::research(&subject))
            .await;

        if outcome.text.is_empty() {
            error!("no research content generated");
            record_stage("research", "error");
            return NO_RESEARCH.to_string();
        }

        record_stage("research", "ok");
        info!(sources = outcome.sources.len(), "research information gathered");
        with_sources(outcome.text, &outcome.sources)
    }

    pub async fn draft(&self, category: &str, topic: &str, research_info: &str) -> String {
        info!("requesting article draft");
        let writer = self.factory.writer(category);
        let prompt = prompts::draft(category, topic, research_info);

        match single_exchange(&writer, &prompt).await {
            Ok(Some(content)) if !is_error_sentinel(&content) => {
                record_stage("draft", "ok");
                info!("article generated");
                content
            }
            Ok(_) => {
                error!("no article generated or error in generation");
                record_stage("draft", "error");
                NO_ARTICLE.to_string()
            }
            Err(err) => {
                error!(error = %err, "draft generation failed");
                record_stage("draft", "error");
                format!("Error: Draft generation failed: {err}")
            }
        }
    }

    pub async fn generate_title(&self, category: &str, topic: &str) -> Option<String> {
        self.title_exchange(category, &prompts::title(topic)).await
    }

    pub async fn generate_revised_title(&self, category: &str, topic: &str) -> Option<String> {
        self.title_exchange(category, &prompts::revised_title(topic))
            .await
    }

    pub async fn fact_check(&self, category: &str, article: &str) -> String {
        info!("sending article to fact checker");
        let checker = self.factory.fact_checker(category);
        let outcome = self
            .tool_loop
            .run(&checker, &prompts::fact_check(article))
            .await;

        if outcome.text.is_empty() {
            error!("no fact-check report generated");
            record_stage("fact_check", "error");
            return NO_FACT_CHECK.to_string();
        }

        record_stage("fact_check", "ok");
        with_sources(outcome.text, &outcome.sources)
    }

    pub async fn revise(&self, category: &str, article: &str, fact_check_report: &str) -> String {
        info!("revising article based on fact-check report");
        let writer = self.factory.writer(category);
        let prompt = prompts::revision(article, fact_check_report);
        normalize_revision("revise", single_exchange(&writer, &prompt).await)
    }

    pub async fn revise_with_feedback(
        &self,
        category: &str,
        previous_draft: &str,
        feedback: &str,
    ) -> String {
        info!("revising article based on feedback");
        let writer = self.factory.writer(category);
        let prompt = prompts::feedback_revision(previous_draft, feedback);
        normalize_revision("feedback_revise", single_exchange(&writer, &prompt).await)
    }

    async fn title_exchange(&self, category: &str, prompt: &str) -> Option<String> {
        let writer = self.factory.writer(category);
        match single_exchange(&writer, prompt).await {
            Ok(Some(raw)) => {
                let title = clean_title(&raw);
                if title.is_empty() || is_error_sentinel(&title) {
                    warn!("title reply was unusable");
                    record_stage("title", "error");
                    None
                } else {
                    record_stage("title", "ok");
                    Some(title)
                }
            }
            Ok(None) => {
                warn!("no title generated");
                record_stage("title", "error");
                None
            }
            Err(err) => {
                warn!(error = %err, "title generation failed");
                record_stage("title", "error");
                None
            }
        }
    }
}

/// One request/response turn with no tool execution.
async fn single_exchange(agent: &Agent, prompt: &str) -> Result<Option<String>> {
    let history = [ConversationMessage::user(prompt)];
    match agent.reply(&history).await? {
        Some(Reply::Text(content)) if !content.trim().is_empty() => Ok(Some(content)),
        Some(Reply::ToolCall(call)) => {
            warn!(agent = agent.name(), function = %call.function_name, "unexpected tool call in single exchange");
            Ok(None)
        }
        _ => Ok(None),
    }
}

fn normalize_revision(stage: &str, reply: Result<Option<String>>) -> String {
    match reply {
        Ok(Some(content)) if !is_error_sentinel(&content) => {
            record_stage(stage, "ok");
            info!(stage, "revised article generated");
            content
        }
        Ok(_) => {
            error!(stage, "failed to generate revised article");
            record_stage(stage, "error");
            REVISION_FAILED.to_string()
        }
        Err(err) => {
            error!(stage, error = %err, "revision call failed");
            record_stage(stage, "error");
            REVISION_FAILED.to_string()
        }
    }
}

fn with_sources(mut text: String, sources: &[String]) -> String {
    text.push_str("\n\nSources:\n");
    text.push_str(&sources.join("\n"));
    text
}

fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_section_is_appended_even_when_empty() {
        assert_eq!(
            with_sources("Summary".into(), &[]),
            "Summary\n\nSources:\n"
        );
        assert_eq!(
            with_sources("Summary".into(), &["https://a".into(), "https://b".into()]),
            "Summary\n\nSources:\nhttps://a\nhttps://b"
        );
    }

    #[test]
    fn titles_lose_wrapping_quotes() {
        assert_eq!(clean_title("  \"The Rise of DeFi\"\n"), "The Rise of DeFi");
        assert_eq!(clean_title("**Bold Moves**"), "Bold Moves");
    }

    #[test]
    fn publishable_content_falls_back_to_draft() {
        let mut artifact = PipelineArtifact::new("Tech", "Rust");
        artifact.draft_content = "draft".into();
        artifact.final_content = REVISION_FAILED.into();
        assert_eq!(artifact.publishable_content(), "draft");
        assert!(!artifact.failed());

        artifact.final_content = "final".into();
        assert_eq!(artifact.publishable_content(), "final");
    }

    #[test]
    fn new_artifact_carries_placeholder_title() {
        let artifact = PipelineArtifact::new("Tech", "Rust");
        assert_eq!(artifact.title, PLACEHOLDER_TITLE);
        assert!(artifact.failed());
    }
}

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stage-level entry recorded while a pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub stage: String,
    pub message: String,
    #[serde(default)]
    pub failed: bool,
    pub recorded_at: DateTime<Utc>,
}

impl TraceEvent {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            failed: false,
            recorded_at: Utc::now(),
        }
    }

    pub fn failure(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            failed: true,
            ..Self::new(stage, message)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceCollector {
    events: Vec<TraceEvent>,
}

impl TraceCollector {
    pub fn from_events(events: Vec<TraceEvent>) -> Self {
        Self { events }
    }

    pub fn push(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub index: usize,
    pub stage: String,
    pub message: String,
    pub failed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSummary {
    pub steps: Vec<TraceStep>,
}

impl TraceSummary {
    pub fn from_events(events: &[TraceEvent]) -> Self {
        let steps = events
            .iter()
            .enumerate()
            .map(|(idx, event)| TraceStep {
                index: idx + 1,
                stage: event.stage.clone(),
                message: event.message.clone(),
                failed: event.failed,
            })
            .collect();
        Self { steps }
    }

    pub fn has_failures(&self) -> bool {
        self.steps.iter().any(|step| step.failed)
    }

    pub fn render_markdown(&self) -> String {
        if self.steps.is_empty() {
            return "No trace events recorded.".to_string();
        }
        let mut output = String::from("### Pipeline Trace\n");
        for step in &self.steps {
            let marker = if step.failed { " (failed)" } else { "" };
            let _ = writeln!(
                output,
                "{}. {}{} -> {}",
                step.index, step.stage, marker, step.message
            );
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collected(events: Vec<TraceEvent>) -> TraceSummary {
        let mut collector = TraceCollector::default();
        for event in events {
            collector.push(event);
        }
        TraceSummary::from_events(&collector.into_events())
    }

    #[test]
    fn markdown_renders_steps_and_failures() {
        let summary = collected(vec![
            TraceEvent::new("research", "gathered 3 sources"),
            TraceEvent::failure("draft", "Error: No article generated"),
        ]);
        assert!(summary.has_failures());

        let markdown = summary.render_markdown();
        assert!(markdown.contains("1. research -> gathered 3 sources"));
        assert!(markdown.contains("2. draft (failed) -> Error: No article generated"));
    }

    #[test]
    fn generation_trace_snapshot() {
        let summary = collected(vec![
            TraceEvent::new("research", "research gathered with 2 sources"),
            TraceEvent::new("draft", "draft written (120 chars)"),
            TraceEvent::failure("title", "kept title \"Untitled Article\""),
        ]);

        insta::assert_snapshot!(summary.render_markdown(), @r###"
        ### Pipeline Trace
        1. research -> research gathered with 2 sources
        2. draft -> draft written (120 chars)
        3. title (failed) -> kept title "Untitled Article"
        "###);
    }

    #[test]
    fn clean_run_has_no_failures() {
        let summary = collected(vec![TraceEvent::new("research", "ok")]);
        assert!(!summary.has_failures());
        assert_eq!(
            TraceSummary::default().render_markdown(),
            "No trace events recorded."
        );
    }
}

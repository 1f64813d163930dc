//! Writes a finished run to markdown files under
//! `{root}/{category}/{topic}_{kind}.md`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::pipeline::{NO_FACT_CHECK, PipelineArtifact};
use crate::{ContentError, Result};

const NO_DRAFT: &str = "Error: No article draft generated";
const NO_RESEARCH_FILE: &str = "Error: No research information generated";
const NO_FINAL: &str = "Error: No final article generated";

/// Paths of the four files written by [`save_artifact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub draft: PathBuf,
    pub fact_check: PathBuf,
    pub research: PathBuf,
    pub final_article: PathBuf,
}

pub fn save_artifact(root: &Path, artifact: &PipelineArtifact) -> Result<SavedArtifact> {
    let dir = root.join(slug(&artifact.category));
    fs::create_dir_all(&dir).map_err(|err| ContentError::io(dir.clone(), err))?;

    let stem = slug(&artifact.topic);
    let saved = SavedArtifact {
        draft: dir.join(format!("{stem}_draft.md")),
        fact_check: dir.join(format!("{stem}_fact_check.md")),
        research: dir.join(format!("{stem}_research.md")),
        final_article: dir.join(format!("{stem}_final.md")),
    };

    write_or(&saved.draft, &artifact.draft_content, NO_DRAFT)?;
    write_or(&saved.fact_check, &artifact.fact_check_report, NO_FACT_CHECK)?;
    write_or(&saved.research, &artifact.research_info, NO_RESEARCH_FILE)?;
    write_or(&saved.final_article, &artifact.final_content, NO_FINAL)?;

    info!(dir = %dir.display(), "article files saved");
    Ok(saved)
}

fn write_or(path: &Path, content: &str, fallback: &str) -> Result<()> {
    let body = if content.is_empty() { fallback } else { content };
    fs::write(path, body).map_err(|err| ContentError::io(path.to_path_buf(), err))
}

/// File-name-safe form of `value`. Separators, dots and anything else that
/// is not alphanumeric, `-` or `_` become `_`, so the result never leaves `root`.
fn slug(value: &str) -> String {
    let slug: String = value
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>()
        .to_lowercase();
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_file_per_section() -> Result<()> {
        let root = tempfile::tempdir().map_err(|err| ContentError::Other(err.into()))?;
        let mut artifact = PipelineArtifact::new("Personal Finance", "Index Funds 101");
        artifact.draft_content = "draft".into();
        artifact.research_info = "notes".into();
        artifact.final_content = "final".into();

        let saved = save_artifact(root.path(), &artifact)?;

        assert_eq!(
            saved.draft,
            root.path().join("personal_finance").join("index_funds_101_draft.md")
        );
        assert_eq!(fs::read_to_string(&saved.final_article).unwrap(), "final");
        assert_eq!(
            fs::read_to_string(&saved.fact_check).unwrap(),
            "Error: No fact-check report generated"
        );
        Ok(())
    }

    #[test]
    fn path_like_names_stay_under_root() -> Result<()> {
        let root = tempfile::tempdir().map_err(|err| ContentError::Other(err.into()))?;
        let artifact = PipelineArtifact::new("../escape", "a/b\\..");

        let saved = save_artifact(root.path(), &artifact)?;

        let dir = root.path().join("___escape");
        assert_eq!(saved.draft, dir.join("a_b____draft.md"));
        assert!(saved.final_article.starts_with(root.path()));
        assert!(saved.final_article.exists());
        Ok(())
    }

    #[test]
    fn slug_keeps_words_and_dashes() {
        assert_eq!(slug("Index Funds 101"), "index_funds_101");
        assert_eq!(slug("AI-driven care"), "ai-driven_care");
        assert_eq!(slug("  "), "untitled");
    }
}

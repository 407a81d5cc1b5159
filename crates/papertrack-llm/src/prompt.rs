//! Analysis prompt assembly

use papertrack_core::Paper;

/// Appended when the paper text was cut to fit the content limit
pub const TRUNCATION_MARKER: &str = "\n\n[content truncated...]";

const INSTRUCTIONS: &str = "\
Write a detailed technical reading report in Markdown with these sections:

## 1. Overview
The core problem, the proposed method and its key idea, headline results, main contributions.

## 2. Background and Motivation
What problem is addressed, why it matters, and where existing approaches fall short.

## 3. Method
Overall architecture, key algorithmic steps, important equations (LaTeX), loss terms,
inputs and outputs, and what is new compared to prior work.

## 4. Experiments
Datasets, metrics, baselines, main quantitative results (tables welcome), ablations.

## 5. Contributions
Three to five concrete contributions and their significance.

## 6. Limitations
Theoretical or practical limits, gaps in the evaluation, open questions.

Stay accurate and objective. Do not add claims the paper does not make.";

/// Cut `content` to `limit` chars (when set), marking the cut.
pub fn truncate_content(content: &str, limit: Option<usize>) -> String {
    match limit {
        Some(max) if content.chars().count() > max => {
            log::warn!(
                "Content length ({} chars) exceeds limit, truncating to {max} chars",
                content.chars().count()
            );
            let mut cut: String = content.chars().take(max).collect();
            cut.push_str(TRUNCATION_MARKER);
            cut
        }
        _ => content.to_string(),
    }
}

/// Full request text: paper metadata, the (possibly truncated) text, instructions.
pub fn build_prompt(paper: &Paper, content: &str, limit: Option<usize>) -> String {
    let content = truncate_content(content, limit);
    format!(
        "You are an experienced academic researcher. Read the paper below carefully.\n\n\
         Paper information:\n\
         - Title: {title}\n\
         - Authors: {authors}\n\
         - Published: {published}\n\
         - arXiv ID: {id}\n\
         - Categories: {categories}\n\n\
         Paper content:\n{content}\n\n{INSTRUCTIONS}\n",
        title = paper.title,
        authors = paper.authors.join(", "),
        published = paper.published.format("%Y-%m-%d"),
        id = paper.id,
        categories = paper.categories.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn paper() -> Paper {
        let ts = DateTime::parse_from_rfc3339("2024-02-29T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Paper {
            id: "2402.99999v1".to_string(),
            title: "Leap Day Learning".to_string(),
            authors: vec!["A. Author".to_string(), "B. Author".to_string()],
            published: ts,
            updated: ts,
            summary: String::new(),
            categories: vec!["cs.LG".to_string(), "stat.ML".to_string()],
            locator: String::new(),
            comment: None,
            journal_ref: None,
        }
    }

    #[test]
    fn prompt_carries_metadata_and_text() {
        let prompt = build_prompt(&paper(), "BODY TEXT", None);
        assert!(prompt.contains("- Title: Leap Day Learning"));
        assert!(prompt.contains("- Authors: A. Author, B. Author"));
        assert!(prompt.contains("- Published: 2024-02-29"));
        assert!(prompt.contains("- arXiv ID: 2402.99999v1"));
        assert!(prompt.contains("- Categories: cs.LG, stat.ML"));
        assert!(prompt.contains("BODY TEXT"));
        assert!(!prompt.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn truncates_on_chars_with_marker() {
        let out = truncate_content("αβγδε", Some(3));
        assert_eq!(out, format!("αβγ{TRUNCATION_MARKER}"));
        assert_eq!(truncate_content("short", Some(10)), "short");
        assert_eq!(truncate_content("unbounded", None), "unbounded");
    }
}

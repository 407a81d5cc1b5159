//! Live arXiv tests. Run with `cargo test -p papertrack-arxiv -- --ignored`.

use chrono::Utc;
use papertrack_arxiv::{ArxivSource, PdfRetriever};
use papertrack_core::{PaperSource, Retriever, SearchQuery, SortOrder, TimeWindow};

#[test]
#[ignore]
fn recent_cs_ai_search() {
    let query = SearchQuery {
        category: "cs.AI".to_string(),
        window: TimeWindow::last_days(Utc::now(), 30),
        keywords: vec![],
        sort: SortOrder::SubmittedDate,
        limit: 5,
    };
    let papers = ArxivSource::default().search(&query).expect("search");
    assert!(!papers.is_empty());
    assert!(papers.len() <= 5);
    for p in &papers {
        assert!(!p.id.is_empty());
        assert!(p.categories.iter().any(|c| c == "cs.AI"));
    }
}

#[test]
#[ignore]
fn download_known_pdf() {
    let query = SearchQuery {
        category: "cs.CL".to_string(),
        window: TimeWindow::last_days(Utc::now(), 3650),
        keywords: vec!["attention".to_string()],
        sort: SortOrder::Relevance,
        limit: 1,
    };
    let papers = ArxivSource::default().search(&query).expect("search");
    let bytes = PdfRetriever::default().fetch(&papers[0]).expect("download");
    assert!(bytes.starts_with(b"%PDF"));
}

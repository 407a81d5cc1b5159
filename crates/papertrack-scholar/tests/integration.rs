//! Live Semantic Scholar tests. Run with `cargo test -p papertrack-scholar -- --ignored`.

use papertrack_core::CitationLookup;
use papertrack_scholar::ScholarClient;

#[test]
#[ignore]
fn well_known_paper_is_highly_cited() {
    let signal = ScholarClient::default()
        .lookup("Attention Is All You Need")
        .expect("lookup")
        .expect("found");
    assert!(signal.total() > 1000);
    assert!(signal.influential() <= signal.total());
}

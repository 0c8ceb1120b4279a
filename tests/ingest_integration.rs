//! Loading an extraction directory with its sources.json sidecar

use prodcite::ingest::{load_corpus, DocType};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_load_corpus_with_sidecar() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    write(
        &root.join("garmin_forerunner_970_2025/manual.json"),
        r#"[{"page_number": 1, "text": "Hold LIGHT to power on."},
            {"page_number": 2, "text": "Battery lasts 12 hours in GPS mode."}]"#,
    );
    write(
        &root.join("garmin_forerunner_970_2025/reviews/dcrainmaker_review.json"),
        r#"[{"page_number": 1, "text": "The best Forerunner yet."}]"#,
    );
    write(
        &root.join("apple_watch_series11_2025/tech_specs.json"),
        r#"[{"page_number": 1, "text": "Up to 24 hours of battery life."}]"#,
    );
    write(
        &root.join("sources.json"),
        r#"{
            "garmin_forerunner_970_2025": {
                "reviews/dcrainmaker_review.pdf": {
                    "source_url": "https://www.dcrainmaker.com/forerunner-970",
                    "source_name": "DC Rainmaker"
                },
                "manual.pdf": {
                    "source_url": "https://www8.garmin.com/manuals/forerunner970.pdf",
                    "source_name": null
                }
            }
        }"#,
    );

    let corpus = load_corpus(root).unwrap();
    assert!(corpus.skipped.is_empty());
    assert_eq!(corpus.documents.len(), 3);

    // Product directories in name order
    let apple = &corpus.documents[0];
    assert_eq!(apple.product_id, "apple_watch_series11_2025");
    assert_eq!(apple.doc_type, DocType::Specification);
    assert_eq!(apple.source_file, "tech_specs.json");
    assert_eq!(apple.source_url, None);

    let manual = corpus
        .documents
        .iter()
        .find(|d| d.doc_type == DocType::Manual)
        .unwrap();
    assert_eq!(manual.pages.len(), 2);
    assert_eq!(manual.source_file, "manual.pdf");
    assert_eq!(
        manual.source_url.as_deref(),
        Some("https://www8.garmin.com/manuals/forerunner970.pdf")
    );

    let review = corpus
        .documents
        .iter()
        .find(|d| d.doc_type == DocType::Review)
        .unwrap();
    assert_eq!(review.source_file, "reviews/dcrainmaker_review.pdf");
    assert_eq!(review.source_name.as_deref(), Some("DC Rainmaker"));
}

#[test]
fn test_bad_files_are_skipped() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    write(
        &root.join("A/manual.json"),
        r#"[{"page_number": 1, "text": "ok"}]"#,
    );
    write(&root.join("A/specs.json"), "{not json");
    write(
        &root.join("A/brochure.json"),
        r#"[{"page_number": 1, "text": "unknown type"}]"#,
    );
    write(&root.join("sources.json"), "[broken");

    let corpus = load_corpus(root).unwrap();
    assert_eq!(corpus.documents.len(), 1);
    assert_eq!(corpus.skipped.len(), 2);
    assert!(corpus
        .skipped
        .iter()
        .any(|s| s.path.ends_with("brochure.json") && s.reason.contains("document type")));
    assert!(corpus
        .skipped
        .iter()
        .any(|s| s.path.ends_with("specs.json") && s.reason.contains("malformed")));
}

#[test]
fn test_missing_input_dir_is_an_error() {
    assert!(load_corpus(Path::new("/definitely/not/a/corpus")).is_err());
}

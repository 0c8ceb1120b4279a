//! Chunking over realistic product pages

use prodcite::chunking::{Chunker, TokenCounter};
use prodcite::config::ChunkingConfig;
use prodcite::ingest::{DocType, Document, PageText};

fn sensor_log(sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("Sensor {} reads pulse data.", i))
        .collect::<Vec<_>>()
        .join(" ")
}

fn manual_page(sentences: usize, topic: &str) -> String {
    (0..sentences)
        .map(|i| {
            format!(
                "Step {} of the {} procedure: hold the lower button for two seconds, \
                 then confirm on the touchscreen.",
                i + 1,
                topic
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn test_two_page_manual_default_sizes() {
    let chunker = Chunker::from_config(&ChunkingConfig::default()).unwrap();
    let document = Document::new(
        "A",
        DocType::Manual,
        "A/manual.pdf",
        vec![
            PageText {
                page_number: 1,
                text: manual_page(12, "pairing"),
            },
            PageText {
                page_number: 2,
                text: manual_page(12, "charging"),
            },
        ],
    );

    let chunks = chunker.chunk_document(&document);

    assert!(chunks.iter().any(|c| c.page_number == 1));
    assert!(chunks.iter().any(|c| c.page_number == 2));
    assert_eq!(chunks[0].chunk_id, "A_manual_p1_c0");
    assert!(chunks.iter().any(|c| c.chunk_id == "A_manual_p2_c0"));

    for chunk in &chunks {
        assert_eq!(chunk.product_id, "A");
        assert_eq!(chunk.doc_type, DocType::Manual);
        assert_eq!(chunk.source_file, "A/manual.pdf");
        assert!(chunker.counter().count(&chunk.text) <= 1000);
    }
}

#[test]
fn test_long_page_overlaps_and_stays_bounded() {
    let config = ChunkingConfig {
        chunk_target_tokens: 120,
        chunk_overlap_tokens: 30,
        chunk_max_tokens: 150,
        tokenizer_file: None,
    };
    let chunker = Chunker::from_config(&config).unwrap();
    let document = Document::new(
        "garmin_forerunner_970_2025",
        DocType::Specification,
        "specs.pdf",
        vec![PageText {
            page_number: 3,
            text: sensor_log(40),
        }],
    );

    let chunks = chunker.chunk_document(&document);
    assert!(chunks.len() > 2);

    for (index, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index as usize, index);
        assert_eq!(
            chunk.chunk_id,
            format!("garmin_forerunner_970_2025_specification_p3_c{}", index)
        );
        assert!(chunker.counter().count(&chunk.text) <= 150);
    }

    // Consecutive chunks share text at the boundary
    for pair in chunks.windows(2) {
        let tail: String = pair[0]
            .text
            .split_whitespace()
            .rev()
            .take(3)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join(" ");
        assert!(
            pair[1].text.contains(&tail),
            "expected '{}' at the start of the next chunk",
            tail
        );
    }
}

#[test]
fn test_chunking_is_deterministic() {
    let chunker = Chunker::from_config(&ChunkingConfig {
        chunk_target_tokens: 60,
        chunk_overlap_tokens: 10,
        chunk_max_tokens: 80,
        tokenizer_file: None,
    })
    .unwrap();
    let document = Document::new(
        "apple_watch_series11_2025",
        DocType::Review,
        "review.pdf",
        vec![PageText {
            page_number: 1,
            text: manual_page(20, "workout"),
        }],
    );

    assert_eq!(chunker.chunk_document(&document), chunker.chunk_document(&document));
}

#[tokio::test]
async fn test_chunk_documents_keeps_document_order() {
    let chunker = Chunker::from_config(&ChunkingConfig::default()).unwrap();
    let documents = vec![
        Document::new(
            "B",
            DocType::Review,
            "review.pdf",
            vec![PageText {
                page_number: 1,
                text: "Great battery, average display.".to_string(),
            }],
        ),
        Document::new(
            "A",
            DocType::Manual,
            "manual.pdf",
            vec![PageText {
                page_number: 1,
                text: "Press and hold to power on.".to_string(),
            }],
        ),
    ];

    let chunks = chunker.chunk_documents(&documents).await.unwrap();
    let ids: Vec<_> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["B_review_p1_c0", "A_manual_p1_c0"]);
}

//! SQLite chunk table: text and citation metadata for every chunk
//!
//! Written once per generation and only ever opened read-only afterwards,
//! so the file bytes stay stable for checksumming.

use super::IndexError;
use crate::chunking::Chunk;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;

const SCHEMA: &str = "
    CREATE TABLE meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE chunks (
        ordinal INTEGER PRIMARY KEY,
        chunk_id TEXT NOT NULL UNIQUE,
        product_id TEXT NOT NULL,
        doc_type TEXT NOT NULL,
        page_number INTEGER NOT NULL,
        chunk_index INTEGER NOT NULL,
        source_file TEXT NOT NULL,
        source_url TEXT,
        source_name TEXT,
        text TEXT NOT NULL
    );

    CREATE INDEX idx_chunks_product ON chunks(product_id);
";

pub(crate) fn write(path: &Path, generation_id: &str, chunks: &[Chunk]) -> Result<(), IndexError> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO meta (key, value) VALUES ('generation_id', ?1)",
        params![generation_id],
    )?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO chunks (ordinal, chunk_id, product_id, doc_type, page_number,
                                 chunk_index, source_file, source_url, source_name, text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for (ordinal, chunk) in chunks.iter().enumerate() {
            stmt.execute(params![
                ordinal as i64,
                chunk.chunk_id,
                chunk.product_id,
                chunk.doc_type.as_str(),
                chunk.page_number,
                chunk.chunk_index,
                chunk.source_file,
                chunk.source_url,
                chunk.source_name,
                chunk.text,
            ])?;
        }
    }
    tx.commit()?;

    Ok(())
}

/// Read the generation stamp and chunks in their original order
pub(crate) fn read(path: &Path) -> Result<(String, Vec<Chunk>), IndexError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let generation_id: String = conn.query_row(
        "SELECT value FROM meta WHERE key = 'generation_id'",
        [],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT chunk_id, product_id, doc_type, page_number, chunk_index,
                source_file, source_url, source_name, text
         FROM chunks ORDER BY ordinal",
    )?;

    let chunks = stmt
        .query_map([], |row| {
            let doc_type: String = row.get(2)?;
            let doc_type = doc_type
                .parse()
                .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;

            Ok(Chunk {
                chunk_id: row.get(0)?,
                product_id: row.get(1)?,
                doc_type,
                page_number: row.get(3)?,
                chunk_index: row.get(4)?,
                source_file: row.get(5)?,
                source_url: row.get(6)?,
                source_name: row.get(7)?,
                text: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((generation_id, chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::DocType;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_preserves_order_and_metadata() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("chunks.sqlite");

        let chunks = vec![
            Chunk {
                chunk_id: "z_review_p2_c0".to_string(),
                text: "Great battery".to_string(),
                product_id: "z".to_string(),
                doc_type: DocType::Review,
                page_number: 2,
                chunk_index: 0,
                source_file: "reviews/site.pdf".to_string(),
                source_url: Some("https://example.com/review".to_string()),
                source_name: Some("Example Reviews".to_string()),
            },
            Chunk {
                chunk_id: "a_manual_p1_c0".to_string(),
                text: "Press the button".to_string(),
                product_id: "a".to_string(),
                doc_type: DocType::Manual,
                page_number: 1,
                chunk_index: 0,
                source_file: "manual.pdf".to_string(),
                source_url: None,
                source_name: None,
            },
        ];

        write(&path, "gen-test", &chunks).unwrap();
        let (generation_id, loaded) = read(&path).unwrap();

        assert_eq!(generation_id, "gen-test");
        assert_eq!(loaded, chunks);
    }
}

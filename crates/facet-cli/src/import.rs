//! JSON Lines ingestion of upstream face records.

use anyhow::{Context, Result};
use facet_core::{ClusterStore, Face, StoreError};
use serde::Serialize;
use std::io::BufRead;

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub duplicates: usize,
    pub without_embedding: usize,
}

/// Parse one face record per non-blank line.
pub fn parse_faces(reader: impl BufRead) -> Result<Vec<Face>> {
    let mut faces = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let face: Face = serde_json::from_str(&line)
            .with_context(|| format!("invalid face record on line {}", index + 1))?;
        faces.push(face);
    }
    Ok(faces)
}

/// Insert faces as unclustered detections. Faces already known are skipped.
pub fn import_faces(store: &dyn ClusterStore, faces: Vec<Face>) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    for mut face in faces {
        // Imported faces always start unclustered; assignment is the engine's job.
        face.cluster_id = None;
        let has_embedding = face.usable_embedding().is_some();
        match store.add_face(face) {
            Ok(()) => {
                summary.imported += 1;
                if !has_embedding {
                    summary.without_embedding += 1;
                }
            }
            Err(StoreError::DuplicateFace(id)) => {
                tracing::debug!(face = %id, "face already imported");
                summary.duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    tracing::info!(
        imported = summary.imported,
        duplicates = summary.duplicates,
        without_embedding = summary.without_embedding,
        "import finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_core::{MemoryStore, Scope};

    const RECORDS: &str = r#"
{"id":"6f1c7d4e-3b0a-4c47-9d1e-2a5b8c9d0e11","picture_id":"0b6d1a52-9c3e-4f70-8a21-5d4e3c2b1a00","owner_user_id":"alice","embedding":[1.0,0.0,0.0],"bounding_box":{"x":10.0,"y":20.0,"width":64.0,"height":64.0},"detection_confidence":0.98}

{"id":"8a2e4f10-5c6d-4e7f-8091-a2b3c4d5e6f7","picture_id":"0b6d1a52-9c3e-4f70-8a21-5d4e3c2b1a00","cluster_id":"11111111-2222-4333-8444-555555555555"}
"#;

    #[test]
    fn parses_records_and_skips_blank_lines() {
        let faces = parse_faces(RECORDS.as_bytes()).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].owner_user_id.as_deref(), Some("alice"));
        assert_eq!(faces[0].bounding_box.width, 64.0);
        assert!(faces[1].embedding.is_none());
        assert!(faces[1].owner_user_id.is_none());
    }

    #[test]
    fn reports_bad_line_number() {
        let err = parse_faces("\n{\"id\": 3}\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn import_clears_assignment_and_counts_duplicates() {
        let store = MemoryStore::new();
        let faces = parse_faces(RECORDS.as_bytes()).unwrap();

        let first = import_faces(&store, faces.clone()).unwrap();
        assert_eq!(
            first,
            ImportSummary {
                imported: 2,
                duplicates: 0,
                without_embedding: 1,
            }
        );
        assert_eq!(store.unclustered_faces(&Scope::Global).unwrap().len(), 2);

        let again = import_faces(&store, faces).unwrap();
        assert_eq!(
            again,
            ImportSummary {
                imported: 0,
                duplicates: 2,
                without_embedding: 0,
            }
        );
    }
}

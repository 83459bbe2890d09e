//! Database schema. Applied idempotently on every open.

pub const SCHEMA: &str = r#"
-- Identity clusters. Membership lives on faces.cluster_id.
CREATE TABLE IF NOT EXISTS clusters (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    person_name TEXT,
    description TEXT,
    created_at TEXT NOT NULL,
    last_updated_at TEXT NOT NULL
);

-- Faces written by the upstream detector; only cluster_id is mutated here.
-- Embeddings are little-endian f32 BLOBs.
CREATE TABLE IF NOT EXISTS faces (
    id TEXT PRIMARY KEY,
    picture_id TEXT NOT NULL,
    owner_user_id TEXT,
    embedding BLOB,
    bbox_x REAL NOT NULL DEFAULT 0,
    bbox_y REAL NOT NULL DEFAULT 0,
    bbox_w REAL NOT NULL DEFAULT 0,
    bbox_h REAL NOT NULL DEFAULT 0,
    detection_confidence REAL NOT NULL DEFAULT 0,
    cluster_id TEXT REFERENCES clusters(id),
    detected_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_faces_cluster ON faces(cluster_id);
CREATE INDEX IF NOT EXISTS idx_faces_owner ON faces(owner_user_id);
CREATE INDEX IF NOT EXISTS idx_faces_unclustered ON faces(detected_at) WHERE cluster_id IS NULL;
CREATE INDEX IF NOT EXISTS idx_clusters_created ON clusters(created_at);
"#;

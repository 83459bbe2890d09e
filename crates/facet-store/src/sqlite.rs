//! SQLite-backed [`ClusterStore`].

use crate::schema::SCHEMA;
use chrono::{DateTime, SecondsFormat, Utc};
use facet_core::{
    BoundingBox, Cluster, ClusterId, ClusterMetadata, ClusterSample, ClusterStore, ClusterSummary,
    Embedding, Face, FaceId, Scope, StoreError,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;

const FACE_COLUMNS: &str = "f.id, f.picture_id, f.owner_user_id, f.embedding, \
     f.bbox_x, f.bbox_y, f.bbox_w, f.bbox_h, f.detection_confidence, f.cluster_id, f.detected_at";

const CLUSTER_COLUMNS: &str =
    "c.id, c.name, c.person_name, c.description, c.created_at, c.last_updated_at";

/// Matches faces of the scope bound to `?1`; a NULL owner filter is global.
const IN_SCOPE: &str = "(?1 IS NULL OR f.owner_user_id = ?1)";

#[derive(Error, Debug)]
enum Error {
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<Error> for StoreError {
    fn from(err: Error) -> Self {
        match err {
            Error::Sql(e) => StoreError::Backend(Box::new(e)),
            Error::Store(e) => e,
        }
    }
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// SQLite face/cluster store. One connection, serialized behind a mutex;
/// every mutating call runs in its own transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(Box::new(e)))?;
            }
        }
        let conn = Connection::open(path).map_err(Error::from)?;
        tracing::info!(path = %path.display(), "opened face store");
        Self::initialize(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(Error::from)?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(Error::from)?;
        conn.execute_batch(SCHEMA).map_err(Error::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T, StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut conn).map_err(StoreError::from)
    }
}

fn owner_filter(scope: &Scope) -> Option<&str> {
    match scope {
        Scope::Global => None,
        Scope::User(id) => Some(id.as_str()),
    }
}

fn timestamp(t: &DateTime<Utc>) -> String {
    // Fixed-width UTC keeps lexical order equal to time order.
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn embedding_to_bytes(embedding: &Embedding) -> Vec<u8> {
    embedding
        .values
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Embedding {
    Embedding::new(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

fn conversion_error(
    idx: usize,
    ty: Type,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, err.into())
}

fn get_id<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = uuid::Error>,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, Type::Text, e))
}

fn get_opt_id<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = uuid::Error>,
{
    let text: Option<String> = row.get(idx)?;
    text.map(|t| t.parse().map_err(|e| conversion_error(idx, Type::Text, e)))
        .transpose()
}

fn get_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, Type::Text, e))
}

fn get_embedding(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Embedding>> {
    let bytes: Option<Vec<u8>> = row.get(idx)?;
    match bytes {
        None => Ok(None),
        Some(b) if b.len() % 4 != 0 => Err(conversion_error(
            idx,
            Type::Blob,
            format!("embedding blob length {} is not a multiple of 4", b.len()),
        )),
        Some(b) => Ok(Some(bytes_to_embedding(&b))),
    }
}

fn face_from_row(row: &Row<'_>) -> rusqlite::Result<Face> {
    Ok(Face {
        id: get_id(row, 0)?,
        picture_id: get_id(row, 1)?,
        owner_user_id: row.get(2)?,
        embedding: get_embedding(row, 3)?,
        bounding_box: BoundingBox {
            x: row.get(4)?,
            y: row.get(5)?,
            width: row.get(6)?,
            height: row.get(7)?,
        },
        detection_confidence: row.get(8)?,
        cluster_id: get_opt_id(row, 9)?,
        detected_at: get_time(row, 10)?,
    })
}

fn cluster_from_row(row: &Row<'_>) -> rusqlite::Result<Cluster> {
    Ok(Cluster {
        id: get_id(row, 0)?,
        name: row.get(1)?,
        person_name: row.get(2)?,
        description: row.get(3)?,
        created_at: get_time(row, 4)?,
        last_updated_at: get_time(row, 5)?,
    })
}

fn load_cluster(conn: &Connection, id: ClusterId) -> Result<Option<Cluster>> {
    let cluster = conn
        .query_row(
            &format!("SELECT {CLUSTER_COLUMNS} FROM clusters c WHERE c.id = ?1"),
            [id.to_string()],
            cluster_from_row,
        )
        .optional()?;
    Ok(cluster)
}

fn touch_cluster(conn: &Connection, id: ClusterId, now: &DateTime<Utc>) -> Result<()> {
    let updated = conn.execute(
        "UPDATE clusters SET last_updated_at = ?2 WHERE id = ?1",
        params![id.to_string(), timestamp(now)],
    )?;
    if updated == 0 {
        return Err(StoreError::ClusterNotFound(id).into());
    }
    Ok(())
}

impl ClusterStore for SqliteStore {
    fn add_face(&self, face: Face) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM faces WHERE id = ?1)",
                [face.id.to_string()],
                |row| row.get(0),
            )?;
            if exists {
                return Err(StoreError::DuplicateFace(face.id).into());
            }
            if let Some(cluster) = face.cluster_id {
                if load_cluster(&tx, cluster)?.is_none() {
                    return Err(StoreError::ClusterNotFound(cluster).into());
                }
            }

            tx.execute(
                r#"
                INSERT INTO faces (id, picture_id, owner_user_id, embedding,
                                   bbox_x, bbox_y, bbox_w, bbox_h,
                                   detection_confidence, cluster_id, detected_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    face.id.to_string(),
                    face.picture_id.to_string(),
                    face.owner_user_id,
                    face.embedding.as_ref().map(embedding_to_bytes),
                    face.bounding_box.x,
                    face.bounding_box.y,
                    face.bounding_box.width,
                    face.bounding_box.height,
                    face.detection_confidence,
                    face.cluster_id.map(|c| c.to_string()),
                    timestamp(&face.detected_at),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    fn face(&self, id: FaceId) -> Result<Option<Face>, StoreError> {
        self.with_conn(|conn| {
            let face = conn
                .query_row(
                    &format!("SELECT {FACE_COLUMNS} FROM faces f WHERE f.id = ?1"),
                    [id.to_string()],
                    face_from_row,
                )
                .optional()?;
            Ok(face)
        })
    }

    fn cluster(&self, id: ClusterId) -> Result<Option<Cluster>, StoreError> {
        self.with_conn(|conn| load_cluster(conn, id))
    }

    fn unclustered_faces(&self, scope: &Scope) -> Result<Vec<Face>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FACE_COLUMNS} FROM faces f
                 WHERE f.cluster_id IS NULL AND {IN_SCOPE}
                 ORDER BY f.detected_at, f.rowid"
            ))?;
            let faces = stmt
                .query_map(params![owner_filter(scope)], face_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(faces)
        })
    }

    fn cluster_samples(
        &self,
        scope: &Scope,
        limit: Option<usize>,
    ) -> Result<Vec<ClusterSample>, StoreError> {
        let owner = owner_filter(scope);
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));

        self.with_conn(|conn| {
            let mut clusters = conn.prepare(&format!(
                "SELECT c.id FROM clusters c
                 WHERE EXISTS (SELECT 1 FROM faces f WHERE f.cluster_id = c.id AND {IN_SCOPE})
                 ORDER BY c.created_at, c.rowid"
            ))?;
            let ids = clusters
                .query_map(params![owner], |row| get_id::<ClusterId>(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut members = conn.prepare(&format!(
                "SELECT f.embedding FROM faces f
                 WHERE f.cluster_id = ?2 AND {IN_SCOPE}
                   AND f.embedding IS NOT NULL AND length(f.embedding) > 0
                 ORDER BY f.detection_confidence DESC, f.rowid
                 LIMIT ?3"
            ))?;

            let mut samples = Vec::with_capacity(ids.len());
            for cluster_id in ids {
                let embeddings = members
                    .query_map(params![owner, cluster_id.to_string(), limit], |row| {
                        get_embedding(row, 0)
                    })?
                    .filter_map(|r| r.transpose())
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                samples.push(ClusterSample {
                    cluster_id,
                    embeddings,
                });
            }
            Ok(samples)
        })
    }

    fn cluster_members(&self, cluster: ClusterId, scope: &Scope) -> Result<Vec<Face>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FACE_COLUMNS} FROM faces f
                 WHERE f.cluster_id = ?2 AND {IN_SCOPE}
                 ORDER BY f.detected_at, f.rowid"
            ))?;
            let faces = stmt
                .query_map(params![owner_filter(scope), cluster.to_string()], face_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(faces)
        })
    }

    fn member_count(&self, cluster: ClusterId, scope: &Scope) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM faces f WHERE f.cluster_id = ?2 AND {IN_SCOPE}"),
                params![owner_filter(scope), cluster.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    fn cluster_count(&self, scope: &Scope) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM clusters c
                     WHERE EXISTS (SELECT 1 FROM faces f WHERE f.cluster_id = c.id AND {IN_SCOPE})"
                ),
                params![owner_filter(scope)],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    fn list_clusters(&self, scope: &Scope) -> Result<Vec<ClusterSummary>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CLUSTER_COLUMNS}, COUNT(f.id) FROM clusters c
                 JOIN faces f ON f.cluster_id = c.id
                 WHERE {IN_SCOPE}
                 GROUP BY c.id
                 ORDER BY c.created_at, c.rowid"
            ))?;
            let clusters = stmt
                .query_map(params![owner_filter(scope)], |row| {
                    let face_count: i64 = row.get(6)?;
                    Ok(ClusterSummary {
                        cluster: cluster_from_row(row)?,
                        face_count: face_count as usize,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(clusters)
        })
    }

    fn create_cluster_with_face(&self, cluster: &Cluster, face: FaceId) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                r#"
                INSERT INTO clusters
                    (id, name, person_name, description, created_at, last_updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    cluster.id.to_string(),
                    cluster.name,
                    cluster.person_name,
                    cluster.description,
                    timestamp(&cluster.created_at),
                    timestamp(&cluster.last_updated_at),
                ],
            )?;
            let updated = tx.execute(
                "UPDATE faces SET cluster_id = ?1 WHERE id = ?2",
                params![cluster.id.to_string(), face.to_string()],
            )?;
            if updated == 0 {
                return Err(StoreError::FaceNotFound(face).into());
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn assign_face(
        &self,
        face: FaceId,
        cluster: ClusterId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            touch_cluster(&tx, cluster, &now)?;
            let updated = tx.execute(
                "UPDATE faces SET cluster_id = ?1 WHERE id = ?2",
                params![cluster.to_string(), face.to_string()],
            )?;
            if updated == 0 {
                return Err(StoreError::FaceNotFound(face).into());
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn detach_face(&self, face: FaceId) -> Result<Option<ClusterId>, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let previous: Option<ClusterId> = tx
                .query_row(
                    "SELECT cluster_id FROM faces WHERE id = ?1",
                    [face.to_string()],
                    |row| get_opt_id(row, 0),
                )
                .optional()?
                .ok_or(StoreError::FaceNotFound(face))?;
            if previous.is_some() {
                tx.execute(
                    "UPDATE faces SET cluster_id = NULL WHERE id = ?1",
                    [face.to_string()],
                )?;
            }
            tx.commit()?;
            Ok(previous)
        })
    }

    fn reassign_faces(
        &self,
        source: ClusterId,
        target: ClusterId,
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            if load_cluster(&tx, source)?.is_none() {
                return Err(StoreError::ClusterNotFound(source).into());
            }
            touch_cluster(&tx, target, &now)?;
            let moved = tx.execute(
                "UPDATE faces SET cluster_id = ?3
                 WHERE cluster_id = ?2 AND (?1 IS NULL OR owner_user_id = ?1)",
                params![owner_filter(scope), source.to_string(), target.to_string()],
            )?;
            tx.commit()?;
            Ok(moved)
        })
    }

    fn delete_cluster_if_empty(&self, cluster: ClusterId) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM clusters WHERE id = ?1
                 AND NOT EXISTS (SELECT 1 FROM faces WHERE cluster_id = ?1)",
                [cluster.to_string()],
            )?;
            Ok(deleted > 0)
        })
    }

    fn delete_cluster(&self, cluster: ClusterId) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let detached = tx.execute(
                "UPDATE faces SET cluster_id = NULL WHERE cluster_id = ?1",
                [cluster.to_string()],
            )?;
            let deleted = tx.execute("DELETE FROM clusters WHERE id = ?1", [cluster.to_string()])?;
            if deleted == 0 {
                return Err(StoreError::ClusterNotFound(cluster).into());
            }
            tx.commit()?;
            Ok(detached)
        })
    }

    fn update_cluster_metadata(
        &self,
        cluster: ClusterId,
        patch: &ClusterMetadata,
        now: DateTime<Utc>,
    ) -> Result<Cluster, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut current =
                load_cluster(&tx, cluster)?.ok_or(StoreError::ClusterNotFound(cluster))?;
            patch.apply(&mut current);
            current.last_updated_at = now;

            tx.execute(
                "UPDATE clusters SET name = ?2, person_name = ?3, description = ?4,
                        last_updated_at = ?5
                 WHERE id = ?1",
                params![
                    cluster.to_string(),
                    current.name,
                    current.person_name,
                    current.description,
                    timestamp(&current.last_updated_at),
                ],
            )?;
            tx.commit()?;
            Ok(current)
        })
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a detected face (assigned by the upstream detection pipeline).
    FaceId
);
uuid_id!(
    /// Identifier of an identity cluster.
    ClusterId
);
uuid_id!(
    /// Identifier of the picture a face was detected in.
    PictureId
);

/// Opaque owner identifier. Anonymous uploads carry no owner.
pub type UserId = String;

/// Bounding box of a detected face, in source-image pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Face embedding vector. The dimension is fixed by the upstream model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cosine similarity in [-1, 1]. Zero when either vector has zero norm.
    pub fn cosine(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            (dot / denom).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }

    /// Euclidean (L2) distance.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Mean absolute per-dimension difference (Manhattan distance / dim).
    pub fn mean_absolute_difference(&self, other: &Embedding) -> f32 {
        let n = self.values.len().min(other.values.len());
        if n == 0 {
            return 0.0;
        }
        let total: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        total / n as f32
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// A face produced by the upstream detector.
///
/// `cluster_id` is the only field this crate mutates; a face belongs to at
/// most one cluster at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    pub id: FaceId,
    pub picture_id: PictureId,
    #[serde(default)]
    pub owner_user_id: Option<UserId>,
    #[serde(default)]
    pub embedding: Option<Embedding>,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub detection_confidence: f32,
    #[serde(default)]
    pub cluster_id: Option<ClusterId>,
    #[serde(default = "Utc::now")]
    pub detected_at: DateTime<Utc>,
}

impl Face {
    /// The embedding, if present and non-empty.
    pub fn usable_embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref().filter(|e| !e.is_empty())
    }
}

/// An identity cluster. Membership is derived from faces pointing at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub name: String,
    pub person_name: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: ClusterId::new(),
            name: name.into(),
            person_name: None,
            description: None,
            created_at: now,
            last_updated_at: now,
        }
    }
}

/// A cluster together with its member count in some scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    #[serde(flatten)]
    pub cluster: Cluster,
    pub face_count: usize,
}

/// A cluster with a capped, representative set of member embeddings.
#[derive(Debug, Clone)]
pub struct ClusterSample {
    pub cluster_id: ClusterId,
    pub embeddings: Vec<Embedding>,
}

/// Metadata patch for a cluster. `None` leaves a field untouched;
/// `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct ClusterMetadata {
    pub name: Option<String>,
    pub person_name: Option<Option<String>>,
    pub description: Option<Option<String>>,
}

impl ClusterMetadata {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn person_name(person_name: Option<String>) -> Self {
        Self {
            person_name: Some(person_name),
            ..Self::default()
        }
    }

    pub fn description(description: Option<String>) -> Self {
        Self {
            description: Some(description),
            ..Self::default()
        }
    }

    /// Apply the patch to a cluster in place.
    pub fn apply(&self, cluster: &mut Cluster) {
        if let Some(name) = &self.name {
            cluster.name = name.clone();
        }
        if let Some(person_name) = &self.person_name {
            cluster.person_name = person_name.clone();
        }
        if let Some(description) = &self.description {
            cluster.description = description.clone();
        }
    }
}

/// Face population considered by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    User(UserId),
}

impl Scope {
    pub fn user(id: impl Into<UserId>) -> Self {
        Scope::User(id.into())
    }

    /// Whether a face owned by `owner` belongs to this scope.
    /// Faces without an owner only belong to the global scope.
    pub fn contains(&self, owner: Option<&str>) -> bool {
        match self {
            Scope::Global => true,
            Scope::User(id) => owner == Some(id.as_str()),
        }
    }

    /// Whether two scopes can touch the same faces.
    pub fn overlaps(&self, other: &Scope) -> bool {
        match (self, other) {
            (Scope::Global, _) | (_, Scope::Global) => true,
            (Scope::User(a), Scope::User(b)) => a == b,
        }
    }
}

impl From<Option<UserId>> for Scope {
    fn from(user: Option<UserId>) -> Self {
        match user {
            Some(id) => Scope::User(id),
            None => Scope::Global,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::User(id) => write!(f, "user:{id}"),
        }
    }
}

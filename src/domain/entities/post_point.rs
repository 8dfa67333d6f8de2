use serde::Serialize;
use uuid::Uuid;

use super::post::Post;

pub type Embeddings = Vec<f32>;

/// One embedding of one modality of a post, as stored in the vector index.
///
/// Points coming from the same post share an identical payload but nothing else:
/// there is no key linking them together.
#[derive(Debug, Clone, PartialEq)]
pub struct PostPoint {
    /// Always freshly generated, never derived from the content
    pub id: Uuid,
    pub vector: Embeddings,
    pub payload: Post,
}

impl PostPoint {
    pub fn new(vector: Embeddings, payload: Post) -> Self {
        Self {
            id: Uuid::new_v4(),
            vector,
            payload,
        }
    }
}

/// A stored post returned by a similarity query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPost {
    pub payload: Post,
    pub score: f32,
}

/// Acknowledgement of a durable write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreReceipt {
    pub points: usize,
    /// `true` once the index confirmed the write was applied
    pub completed: bool,
}

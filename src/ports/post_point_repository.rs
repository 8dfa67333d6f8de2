use async_trait::async_trait;

use crate::{
    domain::entities::{
        modality::FailureKind,
        post_point::{PostPoint, ScoredPost, StoreReceipt},
    },
    helper::error_chain_fmt,
};

/// Vector index holding the embeddings of every ingested post
#[async_trait]
pub trait PostPointRepository: Send + Sync {
    /// Creates the collection if it does not exist yet.
    ///
    /// A failure is logged and leaves the index unusable for writes until it is fixed
    /// externally: it is never fatal to the caller.
    async fn ensure_collection(&self);

    /// Writes every point in one batch and waits until the index acknowledged it as durable
    async fn upsert(
        &self,
        points: Vec<PostPoint>,
    ) -> Result<StoreReceipt, PostPointRepositoryError>;

    /// The `limit` nearest points to `vector`, most similar first.
    ///
    /// Any failure results in an empty list.
    async fn query(&self, vector: Vec<f32>, limit: u64) -> Vec<ScoredPost>;
}

#[derive(thiserror::Error)]
pub enum PostPointRepositoryError {
    #[error("Error from the vector index: {0}")]
    Store(String),
    #[error("Invalid vector index configuration: {0}")]
    Configuration(String),
}

impl PostPointRepositoryError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::Store
    }
}

impl std::fmt::Debug for PostPointRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

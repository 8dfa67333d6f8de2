use async_trait::async_trait;
use image::DynamicImage;

use crate::{
    domain::entities::{modality::FailureKind, post_point::Embeddings},
    helper::error_chain_fmt,
};

/// Maps text and images into one shared vector space.
///
/// Implementations are expensive to build: one instance is created at startup and shared
/// for the lifetime of the process. Identical inputs must give identical vectors.
#[async_trait]
pub trait EmbeddingsService: Send + Sync {
    async fn encode_text(&self, text: &str) -> Result<Embeddings, EmbeddingsServiceError>;

    async fn encode_image(
        &self,
        image: DynamicImage,
    ) -> Result<Embeddings, EmbeddingsServiceError>;
}

#[derive(thiserror::Error)]
pub enum EmbeddingsServiceError {
    #[error("Embeddings model could not be loaded: {0}")]
    ModelLoading(String),
    #[error("Encoding failed: {0}")]
    Encoding(String),
    #[error("Embeddings model produced {actual} dimensions instead of {expected}")]
    UnexpectedDimension { expected: usize, actual: usize },
    #[error("Embeddings runner is not running anymore")]
    RunnerUnavailable,
}

impl EmbeddingsServiceError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::Encoding
    }
}

impl std::fmt::Debug for EmbeddingsServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

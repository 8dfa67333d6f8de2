use qdrant_client::prelude::{QdrantClient, QdrantClientConfig};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::info;

use crate::{
    configuration::{QdrantSettings, Settings},
    domain::{
        entities::{post::Post, post_point::ScoredPost},
        services::{
            clip_embedding::ClipEmbeddingsService, http_image_loader::HttpImageLoader,
        },
    },
    helper::error_chain_fmt,
    ports::{
        embeddings_service::{EmbeddingsService, EmbeddingsServiceError},
        image_loader::ImageLoader,
        post_point_repository::{PostPointRepository, PostPointRepositoryError},
    },
    repositories::post_point_qdrant_repository::PostPointQdrantRepository,
    use_cases::{
        ingest_post::{IngestPostUseCase, IngestSummary},
        search_posts::SearchPostsUseCase,
    },
};

/// Holds the long-lived handles (model, index client) and the use cases built on them.
///
/// Built once per process: loading the model is expensive.
pub struct Application {
    ingest_post: IngestPostUseCase,
    search_posts: SearchPostsUseCase,
}

impl Application {
    #[tracing::instrument(name = "Building application", skip(settings))]
    pub async fn build(settings: Settings) -> Result<Self, ApplicationError> {
        let qdrant_client = get_qdrant_client(&settings.qdrant)?;
        let post_point_repository = PostPointQdrantRepository::try_new(
            qdrant_client,
            &settings.qdrant.collection,
            &settings.qdrant.collection_distance,
            settings.qdrant.collection_vector_size,
        )
        .await?;

        // Loading the weights blocks: kept off the async workers
        let embedding_settings = settings.embedding.clone();
        let embeddings_service = tokio::task::spawn_blocking(move || {
            ClipEmbeddingsService::try_new(&embedding_settings)
        })
        .await
        .map_err(|e| ApplicationError::StartupTaskError(e.to_string()))??;

        let image_loader = HttpImageLoader::try_new(&settings.image_loader)?;

        Ok(Self::from_parts(
            Arc::new(embeddings_service),
            Arc::new(image_loader),
            Arc::new(post_point_repository),
            settings,
        ))
    }

    /// Wires the use cases on already built components.
    ///
    /// Every use case shares the same model, loader and index handles.
    pub fn from_parts(
        embeddings_service: Arc<dyn EmbeddingsService>,
        image_loader: Arc<dyn ImageLoader>,
        post_point_repository: Arc<dyn PostPointRepository>,
        settings: Settings,
    ) -> Self {
        let ingest_post = IngestPostUseCase::new(
            embeddings_service.clone(),
            image_loader,
            post_point_repository.clone(),
        );
        let search_posts =
            SearchPostsUseCase::new(embeddings_service, post_point_repository, settings.search);

        info!("Application ready");
        Self {
            ingest_post,
            search_posts,
        }
    }

    pub async fn ingest(&self, posts: &[Post]) -> IngestSummary {
        self.ingest_post.execute_all(posts).await
    }

    pub async fn search(&self, query: &str, limit: Option<usize>) -> Vec<ScoredPost> {
        self.search_posts.execute(query, limit).await
    }
}

/// Set up a client to Qdrant (gRPC)
pub fn get_qdrant_client(config: &QdrantSettings) -> Result<QdrantClient, ApplicationError> {
    let mut qdrant_config = QdrantClientConfig::from_url(&config.url);
    qdrant_config.timeout = config.timeout();
    qdrant_config.api_key = config
        .api_key
        .as_ref()
        .map(|api_key| api_key.expose_secret().to_string());

    QdrantClient::new(Some(qdrant_config)).map_err(|e| ApplicationError::QdrantError(e.to_string()))
}

#[derive(thiserror::Error)]
pub enum ApplicationError {
    #[error("Error from Qdrant: {0}")]
    QdrantError(String),
    #[error(transparent)]
    PostPointRepositoryError(#[from] PostPointRepositoryError),
    #[error(transparent)]
    EmbeddingsServiceError(#[from] EmbeddingsServiceError),
    #[error("Failed to build the HTTP client: {0}")]
    HttpClientError(#[from] reqwest::Error),
    #[error("A startup task did not complete: {0}")]
    StartupTaskError(String),
}

impl std::fmt::Debug for ApplicationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

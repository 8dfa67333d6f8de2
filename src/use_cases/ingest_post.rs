use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    domain::entities::{
        modality::{FailureKind, Modality, SkippedModality},
        post::Post,
        post_point::{Embeddings, PostPoint, StoreReceipt},
    },
    helper::error_chain_fmt,
    ports::{
        embeddings_service::{EmbeddingsService, EmbeddingsServiceError},
        image_loader::ImageLoader,
        post_point_repository::{PostPointRepository, PostPointRepositoryError},
    },
};

/// Embeds every modality of a post and stores the surviving embeddings in one write.
///
/// - the title is mandatory: failing to encode it aborts the post and nothing is stored
/// - the selftext (when not blank) and the image (when the post has an `image_url`) are
///   optional: a failure drops only that embedding
///
/// Holds no state between posts: the same use case can ingest posts concurrently.
pub struct IngestPostUseCase {
    embeddings_service: Arc<dyn EmbeddingsService>,
    image_loader: Arc<dyn ImageLoader>,
    post_point_repository: Arc<dyn PostPointRepository>,
}

/// Result of one optional stage
#[derive(Debug)]
pub enum ModalityOutcome {
    Embedded(Modality, Embeddings),
    Skipped(SkippedModality),
}

#[derive(Debug, Serialize)]
pub struct IngestReport {
    /// One id per stored point, freshly generated at each ingestion
    pub point_ids: Vec<Uuid>,
    pub embedded: Vec<Modality>,
    pub skipped: Vec<SkippedModality>,
    pub receipt: StoreReceipt,
}

/// Outcome of a batch of posts
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub stored_posts: usize,
    pub failed_posts: usize,
    pub stored_points: usize,
}

impl IngestPostUseCase {
    pub fn new(
        embeddings_service: Arc<dyn EmbeddingsService>,
        image_loader: Arc<dyn ImageLoader>,
        post_point_repository: Arc<dyn PostPointRepository>,
    ) -> Self {
        Self {
            embeddings_service,
            image_loader,
            post_point_repository,
        }
    }

    #[tracing::instrument(name = "Ingesting post", skip(self, post), fields(permalink = %post.permalink))]
    pub async fn execute(&self, post: &Post) -> Result<IngestReport, IngestPostError> {
        let title_embeddings = self
            .embeddings_service
            .encode_text(&post.title)
            .await
            .map_err(|error| {
                error!(?error, modality = %Modality::Title, "Failed to encode title, nothing stored");
                IngestPostError::TitleEncoding(error)
            })?;

        let mut embeddings = vec![(Modality::Title, title_embeddings)];
        let mut skipped = vec![];

        let optional_outcomes = [self.embed_selftext(post).await, self.embed_image(post).await];
        for outcome in optional_outcomes.into_iter().flatten() {
            match outcome {
                ModalityOutcome::Embedded(modality, vector) => embeddings.push((modality, vector)),
                ModalityOutcome::Skipped(skipped_modality) => skipped.push(skipped_modality),
            }
        }

        let embedded: Vec<Modality> = embeddings.iter().map(|(modality, _)| *modality).collect();
        let points: Vec<PostPoint> = embeddings
            .into_iter()
            .map(|(_, vector)| PostPoint::new(vector, post.clone()))
            .collect();
        let point_ids: Vec<Uuid> = points.iter().map(|point| point.id).collect();

        let receipt = self
            .post_point_repository
            .upsert(points)
            .await
            .map_err(|error| {
                error!(?error, "Failed to store post points");
                IngestPostError::Store(error)
            })?;
        if !receipt.completed {
            error!(?receipt, "Post points write was not acknowledged as durable");
            return Err(IngestPostError::Store(PostPointRepositoryError::Store(
                "write not acknowledged as completed".into(),
            )));
        }

        info!(?embedded, nb_skipped = skipped.len(), "Post ingested");
        Ok(IngestReport {
            point_ids,
            embedded,
            skipped,
            receipt,
        })
    }

    /// Ingests posts one after the other. A failing post is logged and does not stop the batch.
    #[tracing::instrument(name = "Ingesting posts", skip_all, fields(nb_posts = posts.len()))]
    pub async fn execute_all(&self, posts: &[Post]) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for post in posts {
            match self.execute(post).await {
                Ok(report) => {
                    summary.stored_posts += 1;
                    summary.stored_points += report.point_ids.len();
                }
                Err(error) => {
                    warn!(?error, permalink = %post.permalink, "Post not stored");
                    summary.failed_posts += 1;
                }
            }
        }

        info!(?summary, "Finished ingesting posts");
        summary
    }

    async fn embed_selftext(&self, post: &Post) -> Option<ModalityOutcome> {
        let selftext = post.embeddable_selftext()?;

        let outcome = match self.embeddings_service.encode_text(selftext).await {
            Ok(vector) => ModalityOutcome::Embedded(Modality::Selftext, vector),
            Err(error) => {
                warn!(?error, modality = %Modality::Selftext, "Dropping selftext embedding");
                ModalityOutcome::Skipped(SkippedModality {
                    modality: Modality::Selftext,
                    kind: error.kind(),
                    reason: error.to_string(),
                })
            }
        };

        Some(outcome)
    }

    async fn embed_image(&self, post: &Post) -> Option<ModalityOutcome> {
        let image_url = post.image_url()?;

        let image = match self.image_loader.load(image_url).await {
            Ok(image) => image,
            Err(error) => {
                warn!(?error, modality = %Modality::Image, image_url, "Dropping image embedding");
                return Some(ModalityOutcome::Skipped(SkippedModality {
                    modality: Modality::Image,
                    kind: error.kind(),
                    reason: error.to_string(),
                }));
            }
        };

        let outcome = match self.embeddings_service.encode_image(image).await {
            Ok(vector) => ModalityOutcome::Embedded(Modality::Image, vector),
            Err(error) => {
                warn!(?error, modality = %Modality::Image, image_url, "Dropping image embedding");
                ModalityOutcome::Skipped(SkippedModality {
                    modality: Modality::Image,
                    kind: error.kind(),
                    reason: error.to_string(),
                })
            }
        };

        Some(outcome)
    }
}

#[derive(thiserror::Error)]
pub enum IngestPostError {
    #[error("Failed to encode the title, the post has no searchable content")]
    TitleEncoding(#[source] EmbeddingsServiceError),
    #[error("Failed to store the post embeddings")]
    Store(#[source] PostPointRepositoryError),
}

impl IngestPostError {
    pub fn kind(&self) -> FailureKind {
        match self {
            IngestPostError::TitleEncoding(error) => error.kind(),
            IngestPostError::Store(error) => error.kind(),
        }
    }
}

impl std::fmt::Debug for IngestPostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

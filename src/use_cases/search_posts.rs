use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    configuration::SearchSettings,
    domain::entities::post_point::ScoredPost,
    ports::{embeddings_service::EmbeddingsService, post_point_repository::PostPointRepository},
};

/// Free-text search over every stored modality.
///
/// The query goes through the same text tower as the titles, so it can match image
/// embeddings as well. Never fails: the read path degrades to an empty list.
pub struct SearchPostsUseCase {
    embeddings_service: Arc<dyn EmbeddingsService>,
    post_point_repository: Arc<dyn PostPointRepository>,
    settings: SearchSettings,
}

impl SearchPostsUseCase {
    pub fn new(
        embeddings_service: Arc<dyn EmbeddingsService>,
        post_point_repository: Arc<dyn PostPointRepository>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            embeddings_service,
            post_point_repository,
            settings,
        }
    }

    /// At most `limit` posts (`default_limit` if `None`), most similar first.
    ///
    /// `limit` is capped to `max_limit`.
    #[tracing::instrument(name = "Searching posts", skip(self))]
    pub async fn execute(&self, query: &str, limit: Option<usize>) -> Vec<ScoredPost> {
        let limit = self.effective_limit(limit);
        if limit == 0 || query.trim().is_empty() {
            return vec![];
        }

        let vector = match self.embeddings_service.encode_text(query).await {
            Ok(vector) => vector,
            Err(error) => {
                warn!(?error, "Failed to encode search query");
                return vec![];
            }
        };

        let mut results = self
            .post_point_repository
            .query(vector, limit as u64)
            .await;
        results.truncate(limit);

        info!(nb_results = results.len(), "Searched posts");
        results
    }

    fn effective_limit(&self, limit: Option<usize>) -> usize {
        let limit = limit.unwrap_or(self.settings.default_limit);
        if limit > self.settings.max_limit {
            warn!(
                limit,
                max_limit = self.settings.max_limit,
                "Search limit capped"
            );
            return self.settings.max_limit;
        }
        limit
    }
}

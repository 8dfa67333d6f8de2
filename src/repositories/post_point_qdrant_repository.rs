use async_trait::async_trait;
use qdrant_client::{
    prelude::QdrantClient,
    qdrant::{
        self, value::Kind, vectors_config::Config, CreateCollection, Distance, PointStruct,
        ScoredPoint, SearchPoints, UpdateStatus, VectorParams, VectorsConfig,
    },
};
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::{
    domain::entities::{
        post::{Post, PostError, PostLink},
        post_point::{PostPoint, ScoredPost, StoreReceipt},
    },
    ports::post_point_repository::{PostPointRepository, PostPointRepositoryError},
};

/// Repository for post embeddings (`PostPoint`) persisted in a Qdrant collection
pub struct PostPointQdrantRepository {
    client: QdrantClient,
    collection_name: String,
    collection_distance: Distance,
    collection_vector_size: u64,
}

impl PostPointQdrantRepository {
    /// Builds the repository and makes sure the collection exists.
    ///
    /// Only an invalid configuration is an error: a collection that could not be created is
    /// logged by `ensure_collection` and left to be fixed on the Qdrant side.
    #[tracing::instrument(
        name = "Initializing Qdrant and the associated collection",
        skip(client)
    )]
    pub async fn try_new(
        client: QdrantClient,
        collection_name: &str,
        collection_distance: &str,
        collection_vector_size: u64,
    ) -> Result<Self, PostPointRepositoryError> {
        let collection_distance = parse_distance(collection_distance)?;

        let repository = Self {
            client,
            collection_name: collection_name.to_string(),
            collection_distance,
            collection_vector_size,
        };
        repository.ensure_collection().await;

        Ok(repository)
    }
}

#[async_trait]
impl PostPointRepository for PostPointQdrantRepository {
    #[tracing::instrument(name = "Ensuring Qdrant collection", skip(self), fields(collection = %self.collection_name))]
    async fn ensure_collection(&self) {
        match self.client.has_collection(&self.collection_name).await {
            Ok(true) => {
                info!("Collection already exists");
                return;
            }
            Ok(false) => (),
            Err(error) => {
                // Creation below reports the actual state of the backend
                warn!(?error, "Could not check whether the collection exists");
            }
        }

        let creation = self
            .client
            .create_collection(&CreateCollection {
                collection_name: self.collection_name.clone(),
                vectors_config: Some(VectorsConfig {
                    config: Some(Config::Params(VectorParams {
                        size: self.collection_vector_size,
                        distance: self.collection_distance as i32,
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            })
            .await;

        match creation {
            Ok(_) => info!(
                size = self.collection_vector_size,
                distance = self.collection_distance.as_str_name(),
                "Created collection"
            ),
            // Another process may have created it in between
            Err(error) if error.to_string().contains("already exists") => {
                info!("Collection already exists")
            }
            Err(error) => error!(
                ?error,
                "Failed to create collection, writes will fail until it is created"
            ),
        }
    }

    #[tracing::instrument(
        name = "Saving post points to Qdrant",
        skip(self, points),
        fields(nb_points = points.len())
    )]
    async fn upsert(
        &self,
        points: Vec<PostPoint>,
    ) -> Result<StoreReceipt, PostPointRepositoryError> {
        let nb_points = points.len();

        // Blocking: waits until the points are durably applied
        let response = self
            .client
            .upsert_points_blocking(
                &self.collection_name,
                points.into_iter().map(PointStruct::from).collect(),
                None,
            )
            .await
            .map_err(|e| PostPointRepositoryError::Store(e.to_string()))?;

        // Only a `Completed` status means the points are durably applied
        let status = response.result.map(|result| result.status);
        if status != Some(UpdateStatus::Completed as i32) {
            let status = status
                .and_then(UpdateStatus::from_i32)
                .map(|status| status.as_str_name())
                .unwrap_or("missing");
            return Err(PostPointRepositoryError::Store(format!(
                "write not completed: status {status}"
            )));
        }

        info!("Saved post points");
        Ok(StoreReceipt {
            points: nb_points,
            completed: true,
        })
    }

    #[tracing::instrument(name = "Querying post points from Qdrant", skip(self, vector))]
    async fn query(&self, vector: Vec<f32>, limit: u64) -> Vec<ScoredPost> {
        let response = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection_name.clone(),
                vector,
                limit,
                with_payload: Some(true.into()),
                ..Default::default()
            })
            .await;

        let scored_points = match response {
            Ok(response) => response.result,
            Err(error) => {
                error!(?error, "Failed to query post points");
                return vec![];
            }
        };

        let scored_posts: Vec<ScoredPost> = scored_points
            .into_iter()
            .filter_map(|scored_point| match ScoredPost::try_from(scored_point) {
                Ok(scored_post) => Some(scored_post),
                Err(error) => {
                    warn!(?error, "Skipping a point whose payload is not a post");
                    None
                }
            })
            .collect();

        info!(nb_results = scored_posts.len(), "Queried post points");
        scored_posts
    }
}

/// Reads a Qdrant distance from its name, ex: `Dot`
pub fn parse_distance(name: &str) -> Result<Distance, PostPointRepositoryError> {
    Distance::from_str_name(name).ok_or_else(|| {
        PostPointRepositoryError::Configuration(format!(
            "Invalid Qdrant distance `{name}`, expected one of `Dot`, `Cosine` or `Euclid`"
        ))
    })
}

impl From<PostPoint> for PointStruct {
    fn from(post_point: PostPoint) -> Self {
        Self {
            id: Some(post_point.id.to_string().into()),
            vectors: Some(post_point.vector.into()),
            payload: post_point.payload.into(),
        }
    }
}

impl From<Post> for HashMap<String, qdrant::Value> {
    fn from(post: Post) -> Self {
        let link = match post.link {
            PostLink::ImageUrl(image_url) => ("image_url".to_string(), image_url),
            PostLink::Url(url) => ("url".to_string(), url),
        };

        HashMap::from([
            ("title".into(), qdrant::Value::from(post.title)),
            ("selftext".into(), qdrant::Value::from(post.selftext)),
            ("permalink".into(), qdrant::Value::from(post.permalink)),
            (link.0, qdrant::Value::from(link.1)),
        ])
    }
}

impl TryFrom<HashMap<String, qdrant::Value>> for Post {
    type Error = PostError;

    fn try_from(mut payload: HashMap<String, qdrant::Value>) -> Result<Self, Self::Error> {
        let mut take = |key: &str| payload.remove(key).and_then(string_value);

        let title = take("title").unwrap_or_default();
        let selftext = take("selftext").unwrap_or_default();
        let permalink = take("permalink").unwrap_or_default();
        let link = match (take("image_url"), take("url")) {
            (Some(image_url), None) => PostLink::ImageUrl(image_url),
            (None, Some(url)) => PostLink::Url(url),
            (Some(_), Some(_)) => return Err(PostError::AmbiguousLink),
            (None, None) => return Err(PostError::MissingLink),
        };

        Post::try_new(title, selftext, permalink, link)
    }
}

impl TryFrom<ScoredPoint> for ScoredPost {
    type Error = PostError;

    fn try_from(scored_point: ScoredPoint) -> Result<Self, Self::Error> {
        Ok(Self {
            payload: Post::try_from(scored_point.payload)?,
            score: scored_point.score,
        })
    }
}

fn string_value(value: qdrant::Value) -> Option<String> {
    match value.kind {
        Some(Kind::StringValue(value)) => Some(value),
        _ => None,
    }
}

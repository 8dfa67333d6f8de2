use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, RgbImage};
use multimodal_search_service::{
    configuration::SearchSettings,
    domain::{
        entities::post_point::{Embeddings, PostPoint, ScoredPost, StoreReceipt},
        services::helpers::l2_normalize,
    },
    ports::{
        embeddings_service::{EmbeddingsService, EmbeddingsServiceError},
        image_loader::{ImageLoader, ImageLoaderError},
        post_point_repository::{PostPointRepository, PostPointRepositoryError},
    },
    telemetry::{get_tracing_subscriber, init_tracing_subscriber},
    use_cases::{ingest_post::IngestPostUseCase, search_posts::SearchPostsUseCase},
};
use once_cell::sync::Lazy;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

pub const DIMENSION: usize = 768;

// Ensures that the `tracing` stack is only initialized once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    // The sink is part of the subscriber type: one branch per sink
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_tracing_subscriber(subscriber).expect("Failed to set up tracing");
    } else {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_tracing_subscriber(subscriber).expect("Failed to set up tracing");
    };
});

/// Deterministic stand-in for the CLIP towers.
///
/// Texts are hashed into a bag of bytes, images into their mean color: similar inputs get
/// similar unit vectors, which is all the ranking tests need.
#[derive(Default)]
pub struct FakeEmbeddingsService {
    pub failing_texts: HashSet<String>,
    pub failing_images: bool,
    pub encoded_texts: Mutex<Vec<String>>,
    pub nb_encoded_images: Mutex<usize>,
}

impl FakeEmbeddingsService {
    pub fn failing_on(texts: &[&str]) -> Self {
        Self {
            failing_texts: texts.iter().map(|text| text.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_on_images() -> Self {
        Self {
            failing_images: true,
            ..Self::default()
        }
    }

    pub fn encoded_texts(&self) -> Vec<String> {
        self.encoded_texts.lock().unwrap().clone()
    }

    pub fn nb_encoded_images(&self) -> usize {
        *self.nb_encoded_images.lock().unwrap()
    }
}

pub fn fake_text_embeddings(text: &str) -> Embeddings {
    let mut vector = vec![0.0; DIMENSION];
    for word in text.to_lowercase().split_whitespace() {
        for (position, byte) in word.bytes().enumerate() {
            vector[(byte as usize * 7 + position) % DIMENSION] += 1.0;
        }
    }
    l2_normalize(&mut vector);
    vector
}

#[async_trait]
impl EmbeddingsService for FakeEmbeddingsService {
    async fn encode_text(&self, text: &str) -> Result<Embeddings, EmbeddingsServiceError> {
        self.encoded_texts.lock().unwrap().push(text.to_string());

        if self.failing_texts.contains(text) {
            return Err(EmbeddingsServiceError::Encoding(format!(
                "cannot encode `{text}`"
            )));
        }
        Ok(fake_text_embeddings(text))
    }

    async fn encode_image(
        &self,
        image: DynamicImage,
    ) -> Result<Embeddings, EmbeddingsServiceError> {
        *self.nb_encoded_images.lock().unwrap() += 1;

        if self.failing_images {
            return Err(EmbeddingsServiceError::Encoding("cannot encode image".into()));
        }

        let (width, height) = image.dimensions();
        let mut vector = vec![0.0; DIMENSION];
        for pixel in image.to_rgb8().pixels() {
            for channel in 0..3 {
                vector[channel] += pixel[channel] as f32;
            }
        }
        vector[3] = (width * height) as f32;
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

/// Serves images from memory. Unknown URLs answer like a 404.
#[derive(Default)]
pub struct FakeImageLoader {
    pub images: HashMap<String, DynamicImage>,
    pub undecodable: HashSet<String>,
}

impl FakeImageLoader {
    pub fn with_image(url: &str) -> Self {
        let mut loader = Self::default();
        loader.images.insert(
            url.to_string(),
            DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([200, 80, 20]))),
        );
        loader
    }

    pub fn with_undecodable(url: &str) -> Self {
        let mut loader = Self::default();
        loader.undecodable.insert(url.to_string());
        loader
    }
}

#[async_trait]
impl ImageLoader for FakeImageLoader {
    async fn load(&self, url: &str) -> Result<DynamicImage, ImageLoaderError> {
        if self.undecodable.contains(url) {
            return Err(ImageLoaderError::Decode {
                url: url.to_string(),
                reason: "not an image".into(),
            });
        }

        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| ImageLoaderError::UnsuccessfulStatus {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Exact nearest neighbours by dot product, in memory
#[derive(Default)]
pub struct InMemoryPostPointRepository {
    pub points: Mutex<Vec<PostPoint>>,
    pub upsert_batches: Mutex<Vec<usize>>,
    pub failing_upserts: bool,
    pub unacknowledged_upserts: bool,
    pub unreachable: bool,
}

impl InMemoryPostPointRepository {
    pub fn failing_upserts() -> Self {
        Self {
            failing_upserts: true,
            ..Self::default()
        }
    }

    /// Accepts writes without confirming they were applied
    pub fn unacknowledged_upserts() -> Self {
        Self {
            unacknowledged_upserts: true,
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn stored_points(&self) -> Vec<PostPoint> {
        self.points.lock().unwrap().clone()
    }

    /// Size of each upsert call, in call order
    pub fn upsert_batches(&self) -> Vec<usize> {
        self.upsert_batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostPointRepository for InMemoryPostPointRepository {
    async fn ensure_collection(&self) {}

    async fn upsert(
        &self,
        points: Vec<PostPoint>,
    ) -> Result<StoreReceipt, PostPointRepositoryError> {
        self.upsert_batches.lock().unwrap().push(points.len());

        if self.failing_upserts || self.unreachable {
            return Err(PostPointRepositoryError::Store(
                "service unavailable".into(),
            ));
        }

        let nb_points = points.len();
        if self.unacknowledged_upserts {
            return Ok(StoreReceipt {
                points: nb_points,
                completed: false,
            });
        }

        self.points.lock().unwrap().extend(points);
        Ok(StoreReceipt {
            points: nb_points,
            completed: true,
        })
    }

    async fn query(&self, vector: Vec<f32>, limit: u64) -> Vec<ScoredPost> {
        if self.unreachable {
            return vec![];
        }

        let mut scored: Vec<ScoredPost> = self
            .points
            .lock()
            .unwrap()
            .iter()
            .map(|point| ScoredPost {
                payload: point.payload.clone(),
                score: point.vector.iter().zip(&vector).map(|(a, b)| a * b).sum(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit as usize);
        scored
    }
}

/// Use cases wired on fakes, with handles kept to assert on their state
pub struct TestApp {
    pub embeddings_service: Arc<FakeEmbeddingsService>,
    pub repository: Arc<InMemoryPostPointRepository>,
    pub ingest_post: IngestPostUseCase,
    pub search_posts: SearchPostsUseCase,
}

pub fn spawn_app(
    embeddings_service: FakeEmbeddingsService,
    image_loader: FakeImageLoader,
    repository: InMemoryPostPointRepository,
) -> TestApp {
    // The first time `initialize` is invoked the code in `TRACING` is executed.
    // All other invocations will instead skip execution.
    Lazy::force(&TRACING);

    let embeddings_service = Arc::new(embeddings_service);
    let repository = Arc::new(repository);

    let ingest_post = IngestPostUseCase::new(
        embeddings_service.clone(),
        Arc::new(image_loader),
        repository.clone(),
    );
    let search_posts = SearchPostsUseCase::new(
        embeddings_service.clone(),
        repository.clone(),
        SearchSettings::default(),
    );

    TestApp {
        embeddings_service,
        repository,
        ingest_post,
        search_posts,
    }
}

pub fn spawn_default_app() -> TestApp {
    spawn_app(
        FakeEmbeddingsService::default(),
        FakeImageLoader::default(),
        InMemoryPostPointRepository::default(),
    )
}

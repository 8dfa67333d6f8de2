use multimodal_search_service::domain::entities::post::{Post, PostLink};

use crate::helpers::{
    spawn_app, spawn_default_app, FakeEmbeddingsService, FakeImageLoader,
    InMemoryPostPointRepository, TestApp,
};

const TITLES: [&str; 5] = [
    "fire",
    "forest fire at night",
    "a cat sleeping",
    "snow on the mountains",
    "campfire songs",
];

async fn ingest_titles(app: &TestApp, titles: &[&str]) {
    for (i, title) in titles.iter().enumerate() {
        let post = Post::try_new(
            *title,
            "",
            format!("https://reddit.com/p{i}"),
            PostLink::Url(format!("https://x/{i}")),
        )
        .unwrap();
        app.ingest_post.execute(&post).await.unwrap();
    }
}

fn assert_non_increasing(scores: &[f32]) {
    assert!(
        scores.windows(2).all(|pair| pair[0] >= pair[1]),
        "scores are not sorted: {scores:?}"
    );
}

#[tokio::test]
async fn search_returns_exactly_the_requested_number_of_results_best_first() {
    // Arrange
    let app = spawn_default_app();
    ingest_titles(&app, &TITLES).await;
    assert_eq!(app.repository.stored_points().len(), 5);

    // Act
    let results = app.search_posts.execute("fire", Some(2)).await;

    // Assert
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].payload.title, "fire");
    assert_non_increasing(&results.iter().map(|r| r.score).collect::<Vec<_>>());
}

#[tokio::test]
async fn search_uses_the_default_limit_when_none_is_given() {
    let app = spawn_default_app();
    ingest_titles(&app, &TITLES).await;

    let results = app.search_posts.execute("snow", None).await;

    assert_eq!(results.len(), 3);
    assert_non_increasing(&results.iter().map(|r| r.score).collect::<Vec<_>>());
}

#[tokio::test]
async fn search_caps_large_limits() {
    let app = spawn_default_app();
    let titles: Vec<String> = (0..10).map(|i| format!("post number {i}")).collect();
    let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
    ingest_titles(&app, &titles).await;

    let results = app.search_posts.execute("post", Some(100)).await;

    assert_eq!(results.len(), 6);
}

#[tokio::test]
async fn search_on_an_empty_index_returns_nothing() {
    let app = spawn_default_app();

    let results = app.search_posts.execute("fire", Some(3)).await;

    assert!(results.is_empty());
}

#[tokio::test]
async fn search_on_an_unreachable_index_returns_nothing() {
    let app = spawn_app(
        FakeEmbeddingsService::default(),
        FakeImageLoader::default(),
        InMemoryPostPointRepository::unreachable(),
    );

    let results = app.search_posts.execute("fire", Some(3)).await;

    assert!(results.is_empty());
    assert_eq!(app.embeddings_service.encoded_texts(), vec!["fire".to_string()]);
}

#[tokio::test]
async fn search_returns_nothing_when_the_query_cannot_be_encoded() {
    let app = spawn_app(
        FakeEmbeddingsService::failing_on(&["fire"]),
        FakeImageLoader::default(),
        InMemoryPostPointRepository::default(),
    );
    ingest_titles(&app, &["forest fire at night"]).await;

    let results = app.search_posts.execute("fire", Some(3)).await;

    assert!(results.is_empty());
}

#[tokio::test]
async fn search_with_a_zero_limit_or_a_blank_query_does_not_hit_the_encoder() {
    let app = spawn_default_app();

    assert!(app.search_posts.execute("fire", Some(0)).await.is_empty());
    assert!(app.search_posts.execute("   ", Some(3)).await.is_empty());
    assert!(app.embeddings_service.encoded_texts().is_empty());
}

#[tokio::test]
async fn search_matches_image_embeddings_with_text_queries() {
    let image_url = "https://x/img.jpg";
    let app = spawn_app(
        FakeEmbeddingsService::default(),
        FakeImageLoader::with_image(image_url),
        InMemoryPostPointRepository::default(),
    );
    let post = Post::try_new(
        "Sunset",
        "",
        "https://reddit.com/p1",
        PostLink::ImageUrl(image_url.into()),
    )
    .unwrap();
    app.ingest_post.execute(&post).await.unwrap();

    let results = app.search_posts.execute("sunset", Some(5)).await;

    // Title and image points share the payload: the post comes back once per modality
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|result| result.payload == post));
}

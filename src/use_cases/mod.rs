pub mod ingest_post;
pub mod search_posts;

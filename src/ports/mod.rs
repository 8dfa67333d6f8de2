pub mod embeddings_service;
pub mod image_loader;
pub mod post_point_repository;

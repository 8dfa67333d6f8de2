pub mod post_point_qdrant_repository;

pub mod clip_embedding;
pub mod helpers;
pub mod http_image_loader;

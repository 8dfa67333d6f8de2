use async_trait::async_trait;
use image::DynamicImage;

use crate::{domain::entities::modality::FailureKind, helper::error_chain_fmt};

/// Fetches an image and hands it back as 3-channel RGB, ready to be encoded
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<DynamicImage, ImageLoaderError>;
}

#[derive(thiserror::Error)]
pub enum ImageLoaderError {
    #[error("Failed to fetch image from {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("Fetching image from {url} answered with status {status}")]
    UnsuccessfulStatus { url: String, status: u16 },
    #[error("Could not decode image from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl ImageLoaderError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ImageLoaderError::Network { .. } | ImageLoaderError::UnsuccessfulStatus { .. } => {
                FailureKind::Network
            }
            ImageLoaderError::Decode { .. } => FailureKind::Decode,
        }
    }
}

impl std::fmt::Debug for ImageLoaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

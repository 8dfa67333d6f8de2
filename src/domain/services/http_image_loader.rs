use async_trait::async_trait;
use image::{ColorType, DynamicImage, GenericImageView};
use tracing::{info, warn};

use crate::{
    configuration::ImageLoaderSettings,
    ports::image_loader::{ImageLoader, ImageLoaderError},
};

/// Downloads images over HTTP(S).
///
/// The underlying client is built once with a bounded timeout: a slow remote host can
/// delay an ingestion by at most that timeout. There are no retries.
pub struct HttpImageLoader {
    client: reqwest::Client,
}

impl HttpImageLoader {
    pub fn try_new(settings: &ImageLoaderSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(&settings.user_agent)
            .build()?;

        Ok(Self { client })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageLoaderError> {
        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|error| ImageLoaderError::Network {
                    url: url.to_string(),
                    reason: error.to_string(),
                })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageLoaderError::UnsuccessfulStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|error| ImageLoaderError::Network {
                url: url.to_string(),
                reason: error.to_string(),
            })?;

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    #[tracing::instrument(name = "Loading image", skip(self))]
    async fn load(&self, url: &str) -> Result<DynamicImage, ImageLoaderError> {
        let result = match self.fetch(url).await {
            Ok(bytes) => decode_image(url, &bytes),
            Err(error) => Err(error),
        };

        match &result {
            Ok(image) => info!(
                width = image.width(),
                height = image.height(),
                "Loaded image"
            ),
            Err(error) => warn!(?error, url, kind = ?error.kind(), "Failed to load image"),
        }

        result
    }
}

/// Decodes `bytes` (any supported format) into an 8-bit RGB image.
///
/// Alpha channels, grayscale, palettes and higher bit depths are all flattened to `Rgb8` as
/// the vision encoder expects three channels. `url` is only used for error reporting.
pub fn decode_image(url: &str, bytes: &[u8]) -> Result<DynamicImage, ImageLoaderError> {
    let image = image::load_from_memory(bytes).map_err(|error| ImageLoaderError::Decode {
        url: url.to_string(),
        reason: error.to_string(),
    })?;

    let image = match image.color() {
        ColorType::Rgb8 => image,
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    };

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageLoaderError::Decode {
            url: url.to_string(),
            reason: format!("invalid dimensions {width}x{height}"),
        });
    }

    Ok(image)
}

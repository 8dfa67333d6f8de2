use image::{ColorType, DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use multimodal_search_service::{
    domain::entities::modality::FailureKind,
    ports::image_loader::{ImageLoader, ImageLoaderError},
};
use std::io::Cursor;

use crate::helpers::{closed_address, image_loader, spawn_http_stub, spawn_silent_server};

fn png_with_alpha() -> Vec<u8> {
    let image = RgbaImage::from_pixel(6, 3, Rgba([255, 0, 0, 128]));
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut bytes, ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

#[tokio::test]
async fn load_returns_an_rgb_image_from_a_transparent_png() {
    // Arrange
    let base_url = spawn_http_stub("200 OK", png_with_alpha()).await;
    let loader = image_loader(10);

    // Act
    let image = loader.load(&format!("{base_url}/img.png")).await.unwrap();

    // Assert
    assert_eq!(image.color(), ColorType::Rgb8);
    assert_eq!(image.dimensions(), (6, 3));
}

#[tokio::test]
async fn load_fails_with_a_network_error_on_a_404() {
    let base_url = spawn_http_stub("404 Not Found", b"not found".to_vec()).await;
    let loader = image_loader(10);

    let error = loader.load(&format!("{base_url}/img.jpg")).await.unwrap_err();

    assert_eq!(error.kind(), FailureKind::Network);
    assert!(matches!(
        error,
        ImageLoaderError::UnsuccessfulStatus { status: 404, .. }
    ));
}

#[tokio::test]
async fn load_fails_with_a_decode_error_on_a_page_that_is_not_an_image() {
    let base_url = spawn_http_stub("200 OK", b"<html><body>hello</body></html>".to_vec()).await;
    let loader = image_loader(10);

    let error = loader.load(&format!("{base_url}/page")).await.unwrap_err();

    assert_eq!(error.kind(), FailureKind::Decode);
}

#[tokio::test]
async fn load_fails_with_a_network_error_when_nothing_listens() {
    let base_url = closed_address().await;
    let loader = image_loader(10);

    let error = loader.load(&format!("{base_url}/img.jpg")).await.unwrap_err();

    assert_eq!(error.kind(), FailureKind::Network);
}

#[tokio::test]
async fn load_gives_up_after_the_timeout() {
    let base_url = spawn_silent_server().await;
    let loader = image_loader(1);

    let started = std::time::Instant::now();
    let error = loader.load(&format!("{base_url}/img.jpg")).await.unwrap_err();

    assert_eq!(error.kind(), FailureKind::Network);
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}

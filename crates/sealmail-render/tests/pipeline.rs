//! Integration tests for the embedded image renderer.
//!
//! Images are real PNG files written to a temporary directory; the
//! renderer runs on the test runtime with a short debounce window.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use sealmail_render::{EmbeddedImage, Error, ImageRenderer, RenderedMessage, RendererConfig};

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

const HTML: &str = concat!(
    r#"<html><body><p>Hello</p>"#,
    r#"<img src="cid:logo@example.com" alt="logo">"#,
    r#"<img src="cid:photo@example.com">"#,
    r#"<img rel="banner">"#,
    r#"</body></html>"#,
);

fn config() -> RendererConfig {
    RendererConfig::builder()
        .debounce(Duration::from_millis(20))
        .workers(2)
        .build()
}

fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> std::path::PathBuf {
    let img = RgbaImage::from_pixel(width, height, Rgba([10, 120, 200, 255]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    let path = dir.join(name);
    std::fs::write(&path, out.into_inner()).unwrap();
    path
}

fn embedded(cid: &str, path: impl Into<std::path::PathBuf>) -> EmbeddedImage {
    EmbeddedImage::new(cid, path, "binary", "image/png", "msg-1")
}

async fn next(rx: &mut mpsc::Receiver<RenderedMessage>) -> RenderedMessage {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for render pass")
        .expect("renderer stopped")
}

async fn assert_quiet(rx: &mut mpsc::Receiver<RenderedMessage>) {
    assert!(
        timeout(QUIET, rx.recv()).await.is_err(),
        "unexpected render pass"
    );
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sealmail_render=debug")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_inlines_referenced_images() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let logo = write_png(dir.path(), "logo.png", 32, 16);
    let banner = write_png(dir.path(), "banner.png", 8, 8);

    let (renderer, mut rx) = ImageRenderer::builder("msg-1", HTML).config(config()).spawn();
    renderer
        .submit(vec![
            embedded("<logo@example.com>", &logo),
            embedded("banner", &banner),
        ])
        .unwrap();

    let rendered = next(&mut rx).await;
    assert_eq!(rendered.message_id, "msg-1");
    assert!(!rendered.html.contains("cid:logo@example.com"));
    assert!(rendered.html.contains("cid:photo@example.com"));
    assert!(!rendered.html.contains(r#"<img rel="banner">"#));
    assert_eq!(
        rendered.html.matches(r#"src="data:image/jpeg;base64,"#).count(),
        2
    );
    assert!(rendered.html.starts_with("<html><body><p>Hello</p>"));

    let stats = renderer.stats();
    assert_eq!(stats.decoded, 2);
    assert_eq!(stats.spliced, 2);
    assert_eq!(stats.passes, 1);
}

#[tokio::test]
async fn test_resubmitting_inlined_images_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let logo = write_png(dir.path(), "logo.png", 16, 16);

    let (renderer, mut rx) = ImageRenderer::builder("msg-1", HTML).config(config()).spawn();
    renderer.submit(vec![embedded("logo@example.com", &logo)]).unwrap();
    let first = next(&mut rx).await;

    renderer.submit(vec![embedded("<logo@example.com>", &logo)]).unwrap();
    assert_quiet(&mut rx).await;

    let stats = renderer.stats();
    assert_eq!(stats.decoded, 1);
    assert_eq!(stats.passes, 1);
    assert_eq!(stats.skipped, 1);

    // A new image renders on top of the previous document.
    let photo = write_png(dir.path(), "photo.png", 16, 16);
    renderer.submit(vec![embedded("photo@example.com", &photo)]).unwrap();
    let second = next(&mut rx).await;
    assert_ne!(first.html, second.html);
    assert!(!second.html.contains("cid:"));
    assert_eq!(renderer.stats().passes, 2);
}

#[tokio::test]
async fn test_bad_images_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let logo = write_png(dir.path(), "logo.png", 16, 16);
    let corrupt = dir.path().join("photo.png");
    std::fs::write(&corrupt, b"not a png").unwrap();

    let (renderer, mut rx) = ImageRenderer::builder("msg-1", HTML).config(config()).spawn();
    renderer
        .submit(vec![
            embedded("logo@example.com", &logo),
            embedded("photo@example.com", &corrupt),
            embedded("banner", dir.path().join("missing.png")),
            embedded("   ", &logo),
        ])
        .unwrap();

    let rendered = next(&mut rx).await;
    assert!(!rendered.html.contains("cid:logo@example.com"));
    assert!(rendered.html.contains("cid:photo@example.com"));
    assert!(rendered.html.contains(r#"<img rel="banner">"#));

    let stats = renderer.stats();
    assert_eq!(stats.decoded, 1);
    assert_eq!(stats.skipped, 3);

    // Failed images are not remembered and can be retried.
    write_png(dir.path(), "photo.png", 16, 16);
    renderer.submit(vec![embedded("photo@example.com", &corrupt)]).unwrap();
    let retried = next(&mut rx).await;
    assert!(!retried.html.contains("cid:photo@example.com"));
}

#[tokio::test]
async fn test_burst_of_batches_renders_once() {
    let dir = tempfile::tempdir().unwrap();
    let logo = write_png(dir.path(), "logo.png", 16, 16);
    let photo = write_png(dir.path(), "photo.png", 16, 16);
    let banner = write_png(dir.path(), "banner.png", 16, 16);

    let config = RendererConfig::builder()
        .debounce(Duration::from_millis(150))
        .build();
    let (renderer, mut rx) = ImageRenderer::builder("msg-1", HTML).config(config).spawn();
    renderer.submit(vec![embedded("logo@example.com", &logo)]).unwrap();
    renderer.submit(vec![embedded("photo@example.com", &photo)]).unwrap();
    renderer
        .submit(vec![embedded("banner", &banner), embedded("logo@example.com", &logo)])
        .unwrap();

    let rendered = next(&mut rx).await;
    assert!(!rendered.html.contains("cid:"));
    assert!(!rendered.html.contains(r#"<img rel="banner">"#));
    assert_quiet(&mut rx).await;

    let stats = renderer.stats();
    assert_eq!(stats.passes, 1);
    assert_eq!(stats.decoded, 3);
    assert_eq!(stats.skipped, 1);
}

#[tokio::test]
async fn test_unreferenced_image_still_emits_document() {
    let dir = tempfile::tempdir().unwrap();
    let other = write_png(dir.path(), "other.png", 4, 4);

    let (renderer, mut rx) = ImageRenderer::builder("msg-1", HTML).config(config()).spawn();
    renderer.submit(vec![embedded("unused@example.com", &other)]).unwrap();

    let rendered = next(&mut rx).await;
    assert_eq!(rendered.html, HTML);
    assert_eq!(renderer.stats().spliced, 0);

    renderer.submit(vec![embedded("unused@example.com", &other)]).unwrap();
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn test_parent_cancellation_stops_renderer() {
    let dir = tempfile::tempdir().unwrap();
    let logo = write_png(dir.path(), "logo.png", 16, 16);
    let parent = CancellationToken::new();

    let (renderer, mut rx) = ImageRenderer::builder("msg-1", HTML)
        .config(config())
        .cancel_on(&parent)
        .spawn();
    assert!(!renderer.is_closed());

    parent.cancel();
    let closed = timeout(WAIT, rx.recv()).await.unwrap();
    assert!(closed.is_none());
    assert!(renderer.is_closed());
    assert!(matches!(
        renderer.submit(vec![embedded("logo@example.com", &logo)]),
        Err(Error::Closed)
    ));
}

#[tokio::test]
async fn test_close_and_drop() {
    let (renderer, mut rx) = ImageRenderer::builder("msg-1", HTML).config(config()).spawn();
    assert_eq!(renderer.message_id(), "msg-1");
    renderer.close();
    assert!(matches!(renderer.submit(Vec::new()), Err(Error::Closed)));
    assert!(timeout(WAIT, rx.recv()).await.unwrap().is_none());

    let (renderer, mut rx) = ImageRenderer::builder("msg-2", HTML).config(config()).spawn();
    drop(renderer);
    assert!(timeout(WAIT, rx.recv()).await.unwrap().is_none());
}

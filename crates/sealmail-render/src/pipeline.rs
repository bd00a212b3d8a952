//! The embedded image render pipeline.
//!
//! One renderer exists per displayed message. Each submitted batch goes
//! through five stages:
//!
//! 1. **Selection**: after a debounce window, drop images whose Content-ID
//!    is blank or already inlined
//! 2. **Compression**: a pool of workers decodes, downsamples and re-encodes
//!    the selected images on the blocking thread pool
//! 3. **Encoding**: compressed bytes become `data:` URIs
//! 4. **Splicing**: matching `<img>` elements get the URI as `src`
//! 5. **Serialization**: the document is emitted as a [`RenderedMessage`]
//!
//! The document and the set of inlined Content-IDs are owned by the
//! renderer task; only that task mutates them.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, info, warn};

use crate::compress::{OUTPUT_MIME_TYPE, compress};
use crate::config::RendererConfig;
use crate::document::HtmlDocument;
use crate::embedded::EmbeddedImage;
use crate::error::{Error, Result};

/// Capacity of the rendered output channel.
const OUTPUT_CAPACITY: usize = 8;

/// Result of one render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Message the HTML belongs to.
    pub message_id: String,
    /// Document with all images of the pass inlined.
    pub html: String,
}

/// Counters describing the work done by a renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Images decoded and re-encoded.
    pub decoded: usize,
    /// Images spliced into at least one `<img>` element.
    pub spliced: usize,
    /// Images dropped by selection or because they failed to decode.
    pub skipped: usize,
    /// Passes that emitted a document.
    pub passes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    decoded: AtomicUsize,
    spliced: AtomicUsize,
    skipped: AtomicUsize,
    passes: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> RenderStats {
        RenderStats {
            decoded: self.decoded.load(Ordering::Relaxed),
            spliced: self.spliced.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
        }
    }

    fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Handle to a running renderer.
///
/// Dropping the handle stops the pipeline.
#[derive(Debug)]
pub struct ImageRenderer {
    message_id: String,
    requests: mpsc::UnboundedSender<Vec<EmbeddedImage>>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
}

/// Builder for [`ImageRenderer`].
#[derive(Debug)]
pub struct ImageRendererBuilder {
    message_id: String,
    document: String,
    config: RendererConfig,
    parent: Option<CancellationToken>,
}

impl ImageRendererBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: RendererConfig) -> Self {
        self.config = config;
        self
    }

    /// Stops the renderer when `token` is cancelled.
    #[must_use]
    pub fn cancel_on(mut self, token: &CancellationToken) -> Self {
        self.parent = Some(token.clone());
        self
    }

    /// Starts the renderer task on the current Tokio runtime.
    ///
    /// Returns the handle and the receiver of rendered documents.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn spawn(self) -> (ImageRenderer, mpsc::Receiver<RenderedMessage>) {
        let cancel = self
            .parent
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        let counters = Arc::new(Counters::default());
        let (requests, request_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CAPACITY);

        let task = RenderTask {
            message_id: self.message_id.clone(),
            document: HtmlDocument::parse(self.document),
            inlined: HashSet::new(),
            config: self.config,
            counters: Arc::clone(&counters),
            cancel: cancel.clone(),
            requests: request_rx,
            output: output_tx,
        };
        let span = debug_span!("image_renderer", message_id = %self.message_id);
        tokio::spawn(task.run().instrument(span));

        let renderer = ImageRenderer {
            message_id: self.message_id,
            requests,
            counters,
            cancel,
        };
        (renderer, output_rx)
    }
}

impl ImageRenderer {
    /// Starts building a renderer for one message body.
    #[must_use]
    pub fn builder(message_id: impl Into<String>, html: impl Into<String>) -> ImageRendererBuilder {
        ImageRendererBuilder {
            message_id: message_id.into(),
            document: html.into(),
            config: RendererConfig::default(),
            parent: None,
        }
    }

    /// Returns the message id.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Queues a batch of images.
    ///
    /// Batches arriving within the debounce window are merged into one pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the renderer has stopped.
    pub fn submit(&self, images: Vec<EmbeddedImage>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Closed);
        }
        self.requests.send(images).map_err(|_| Error::Closed)
    }

    /// Returns a snapshot of the work counters.
    #[must_use]
    pub fn stats(&self) -> RenderStats {
        self.counters.snapshot()
    }

    /// Returns true once the pipeline has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.requests.is_closed()
    }

    /// Stops the pipeline.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ImageRenderer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Compressed {
    content_id: String,
    bytes: Vec<u8>,
}

struct Encoded {
    content_id: String,
    data_uri: String,
}

struct RenderTask {
    message_id: String,
    document: HtmlDocument,
    inlined: HashSet<String>,
    config: RendererConfig,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    requests: mpsc::UnboundedReceiver<Vec<EmbeddedImage>>,
    output: mpsc::Sender<RenderedMessage>,
}

impl RenderTask {
    async fn run(mut self) {
        debug!("Renderer started");
        while let Some(batch) = self.next_batch().await {
            if !self.render_pass(batch).await {
                break;
            }
        }
        self.cancel.cancel();
        debug!("Renderer stopped");
    }

    /// Waits for a batch, then keeps merging batches until the debounce
    /// window passes without a new one.
    async fn next_batch(&mut self) -> Option<Vec<EmbeddedImage>> {
        let cancel = self.cancel.clone();
        let mut pending = tokio::select! {
            () = cancel.cancelled() => return None,
            batch = self.requests.recv() => batch?,
        };

        let debounce = self.config.debounce();
        loop {
            tokio::select! {
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(debounce) => return Some(pending),
                batch = self.requests.recv() => match batch {
                    Some(batch) => pending.extend(batch),
                    None => return Some(pending),
                },
            }
        }
    }

    /// Runs one pass. Returns false when the renderer should stop.
    async fn render_pass(&mut self, batch: Vec<EmbeddedImage>) -> bool {
        let selected = self.select(batch);
        if selected.is_empty() {
            debug!("Nothing new to inline");
            return true;
        }

        let budget = self.config.byte_budget(selected.len());
        let workers = self.config.worker_count(selected.len());
        debug!(images = selected.len(), workers, budget, "Starting render pass");

        let (compressed_tx, compressed_rx) = mpsc::channel(workers);
        let (encoded_tx, mut encoded_rx) = mpsc::channel(workers);
        let mut stages = JoinSet::new();

        let queue = Arc::new(Mutex::new(VecDeque::from(selected)));
        for _ in 0..workers {
            stages.spawn(compress_worker(
                Arc::clone(&queue),
                compressed_tx.clone(),
                budget,
                self.config.jpeg_quality,
                Arc::clone(&self.counters),
                self.cancel.clone(),
            ));
        }
        drop(compressed_tx);
        stages.spawn(encode_stage(compressed_rx, encoded_tx));

        let cancel = self.cancel.clone();
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    stages.abort_all();
                    return false;
                }
                encoded = encoded_rx.recv() => match encoded {
                    Some(encoded) => self.splice(encoded),
                    None => break,
                },
            }
        }
        while stages.join_next().await.is_some() {}

        let rendered = RenderedMessage {
            message_id: self.message_id.clone(),
            html: self.document.serialize(),
        };
        Counters::add(&self.counters.passes, 1);
        info!(inlined = self.inlined.len(), "Render pass complete");

        tokio::select! {
            () = cancel.cancelled() => false,
            sent = self.output.send(rendered) => sent.is_ok(),
        }
    }

    fn select(&self, batch: Vec<EmbeddedImage>) -> Vec<EmbeddedImage> {
        let mut seen = HashSet::new();
        let mut selected = Vec::with_capacity(batch.len());
        for mut image in batch {
            image.content_id = image.normalized_content_id();
            if image.content_id.is_empty()
                || self.inlined.contains(&image.content_id)
                || !seen.insert(image.content_id.clone())
            {
                Counters::add(&self.counters.skipped, 1);
                continue;
            }
            selected.push(image);
        }
        selected
    }

    fn splice(&mut self, encoded: Encoded) {
        let replaced = self.document.splice(&encoded.content_id, &encoded.data_uri);
        if replaced > 0 {
            Counters::add(&self.counters.spliced, 1);
        } else {
            debug!(content_id = %encoded.content_id, "No <img> element references image");
        }
        self.inlined.insert(encoded.content_id);
    }
}

async fn compress_worker(
    queue: Arc<Mutex<VecDeque<EmbeddedImage>>>,
    output: mpsc::Sender<Compressed>,
    budget: usize,
    quality: u8,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let Some(image) = queue.lock().await.pop_front() else {
            return;
        };

        let content_id = image.content_id.clone();
        let result = tokio::task::spawn_blocking(move || compress(&image, budget, quality)).await;
        match result {
            Ok(Ok(bytes)) => {
                Counters::add(&counters.decoded, 1);
                if output.send(Compressed { content_id, bytes }).await.is_err() {
                    return;
                }
            }
            Ok(Err(e)) => {
                Counters::add(&counters.skipped, 1);
                warn!(%content_id, error = %e, "Skipping embedded image");
            }
            Err(e) => {
                Counters::add(&counters.skipped, 1);
                warn!(%content_id, error = %e, "Image compression task failed");
            }
        }
    }
}

async fn encode_stage(mut input: mpsc::Receiver<Compressed>, output: mpsc::Sender<Encoded>) {
    while let Some(compressed) = input.recv().await {
        let data_uri = format!(
            "data:{OUTPUT_MIME_TYPE};base64,{}",
            STANDARD.encode(&compressed.bytes)
        );
        let encoded = Encoded {
            content_id: compressed.content_id,
            data_uri,
        };
        if output.send(encoded).await.is_err() {
            return;
        }
    }
}

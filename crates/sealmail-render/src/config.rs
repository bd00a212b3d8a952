//! Renderer configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default quiescence window before a render pass starts.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Default decoded-pixel budget shared by all images of one pass.
pub const DEFAULT_TOTAL_BUDGET_BYTES: usize = 24 * 1024 * 1024;

/// Default decoded-pixel budget for a single image.
pub const DEFAULT_PER_IMAGE_CAP_BYTES: usize = 4 * 1024 * 1024;

/// Default JPEG quality of re-encoded images.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Embedded image renderer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Quiescence window in milliseconds; new batches reset it.
    pub debounce_ms: u64,
    /// Decoded size budget shared by the images of one pass.
    pub total_budget_bytes: usize,
    /// Upper bound of the decoded size of one image.
    pub per_image_cap_bytes: usize,
    /// Compression workers; `0` means one per CPU core.
    pub workers: usize,
    /// JPEG quality, 1 to 100.
    pub jpeg_quality: u8,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            debounce_ms: u64::try_from(DEFAULT_DEBOUNCE.as_millis()).unwrap_or(500),
            total_budget_bytes: DEFAULT_TOTAL_BUDGET_BYTES,
            per_image_cap_bytes: DEFAULT_PER_IMAGE_CAP_BYTES,
            workers: 0,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl RendererConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> RendererConfigBuilder {
        RendererConfigBuilder::default()
    }

    /// Returns the debounce window.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Decoded size budget of each image in a batch of `batch_size`.
    ///
    /// `min(total / batch_size, per_image_cap)`.
    #[must_use]
    pub fn byte_budget(&self, batch_size: usize) -> usize {
        (self.total_budget_bytes / batch_size.max(1)).min(self.per_image_cap_bytes)
    }

    /// Number of compression workers for a batch of `batch_size`.
    #[must_use]
    pub fn worker_count(&self, batch_size: usize) -> usize {
        let configured = if self.workers == 0 {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        } else {
            self.workers
        };
        configured.min(batch_size).max(1)
    }
}

/// Builder for [`RendererConfig`].
#[derive(Debug, Clone, Default)]
pub struct RendererConfigBuilder {
    config: RendererConfig,
}

impl RendererConfigBuilder {
    /// Sets the debounce window.
    #[must_use]
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.config.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the budget shared by one pass.
    #[must_use]
    pub const fn total_budget_bytes(mut self, bytes: usize) -> Self {
        self.config.total_budget_bytes = bytes;
        self
    }

    /// Sets the per-image cap.
    #[must_use]
    pub const fn per_image_cap_bytes(mut self, bytes: usize) -> Self {
        self.config.per_image_cap_bytes = bytes;
        self
    }

    /// Sets the number of compression workers (`0` for one per core).
    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Sets the JPEG quality, clamped to 1..=100.
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> RendererConfig {
        self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.workers, 0);
    }

    #[test]
    fn test_byte_budget() {
        let config = RendererConfig::builder()
            .total_budget_bytes(1000)
            .per_image_cap_bytes(300)
            .build();
        assert_eq!(config.byte_budget(1), 300);
        assert_eq!(config.byte_budget(4), 250);
        assert_eq!(config.byte_budget(0), 300);
    }

    #[test]
    fn test_worker_count() {
        let config = RendererConfig::builder().workers(4).build();
        assert_eq!(config.worker_count(10), 4);
        assert_eq!(config.worker_count(2), 2);
        assert_eq!(config.worker_count(0), 1);

        let auto = RendererConfig::default();
        assert!(auto.worker_count(64) >= 1);
    }

    #[test]
    fn test_builder_clamps_quality() {
        let config = RendererConfig::builder()
            .jpeg_quality(0)
            .debounce(Duration::from_millis(20))
            .build();
        assert_eq!(config.jpeg_quality, 1);
        assert_eq!(config.debounce_ms, 20);
    }
}

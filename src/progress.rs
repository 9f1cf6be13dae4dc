//! Progress-callback trait for page rendering.
//!
//! Inject an `Arc<dyn RenderProgress>` into
//! [`crate::pipeline::render::PdfRenderer::render_pages`] to observe each
//! page as it is rasterised. The callback is invoked inline from the
//! rendering thread, synchronously, after each page — there is no
//! concurrency to account for, pages render strictly in order.
//!
//! The trait (rather than a closure parameter) lets the same implementation
//! feed a terminal progress display, a polled task registry, or a WebSocket
//! without the renderer knowing which.

use std::sync::Arc;

/// Called by the renderer as pages are rasterised.
pub trait RenderProgress: Send + Sync {
    /// Called after each page finishes rendering.
    ///
    /// # Arguments
    /// * `completed` — number of pages rendered so far (1-based)
    /// * `total`     — total pages in the document
    fn on_page_rendered(&self, completed: usize, total: usize) {
        let _ = (completed, total);
    }
}

/// No-op implementation for callers that don't need progress events.
pub struct NoopRenderProgress;

impl RenderProgress for NoopRenderProgress {}

/// Convenience alias matching the renderer's parameter type.
pub type ProgressCallback = Arc<dyn RenderProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProgress {
        pages: AtomicUsize,
        last_total: AtomicUsize,
    }

    impl RenderProgress for CountingProgress {
        fn on_page_rendered(&self, completed: usize, total: usize) {
            self.pages.store(completed, Ordering::SeqCst);
            self.last_total.store(total, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_does_not_panic() {
        NoopRenderProgress.on_page_rendered(1, 3);
    }

    #[test]
    fn counting_progress_tracks_pages() {
        let p = CountingProgress {
            pages: AtomicUsize::new(0),
            last_total: AtomicUsize::new(0),
        };
        p.on_page_rendered(1, 3);
        p.on_page_rendered(2, 3);
        assert_eq!(p.pages.load(Ordering::SeqCst), 2);
        assert_eq!(p.last_total.load(Ordering::SeqCst), 3);
    }
}

//! Encoded frame sources
//!
//! An [`EncodedSource`] is the application's end of the passthrough: frames
//! pushed into it wait in a FIFO until the host pipeline pulls the encoder
//! bound to it. Each push also emits one placeholder raw frame through the
//! source's [`FramePump`], which is what makes the host pull at all.

mod pump;

pub use pump::{FramePump, TimestampAligner};

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::config::SourceConfig;
use crate::frame::EncodedFrame;
use crate::host::RawFrameSource;
use crate::registry::SourceRegistry;
use crate::types::{Codec, Resolution, RoutingId};

/// What a passthrough encoder needs from its source
pub trait FrameProvider: Send + Sync {
    /// Pop the oldest queued frame
    fn take_next_frame(&self) -> Option<EncodedFrame>;

    /// Ask the producer for a keyframe
    fn request_keyframe(&self);
}

/// Notified when the pipeline asks for a keyframe
///
/// Runs synchronously on the encode thread. Implementations must not push
/// frames from inside the callback; set a flag and push from the producer.
pub trait KeyframeRequestObserver: Send + Sync {
    fn on_keyframe_request(&self);
}

impl<F> KeyframeRequestObserver for F
where
    F: Fn() + Send + Sync,
{
    fn on_keyframe_request(&self) {
        self()
    }
}

/// Shared state of one encoded source
///
/// Owned jointly by the application handle and the registry. Encoders hold
/// it as a [`FrameProvider`].
pub struct SourceCore {
    id: RoutingId,
    codec: Codec,
    resolution: Resolution,
    queue: Mutex<VecDeque<EncodedFrame>>,
    keyframe_requested: AtomicBool,
    observer: Mutex<Option<Arc<dyn KeyframeRequestObserver>>>,
    pump: Arc<FramePump>,
    /// Queue depth that triggers a warning (0 = never)
    warn_depth: usize,
    closed: AtomicBool,
}

impl SourceCore {
    fn new(config: &SourceConfig) -> Self {
        let id = RoutingId::next();
        Self {
            id,
            codec: config.codec,
            resolution: config.resolution,
            queue: Mutex::new(VecDeque::new()),
            keyframe_requested: AtomicBool::new(false),
            observer: Mutex::new(None),
            pump: Arc::new(FramePump::new(id, config.pump)),
            warn_depth: config.queue_warn_depth,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> RoutingId {
        self.id
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn pump(&self) -> &Arc<FramePump> {
        &self.pump
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Enqueue a frame and push its placeholder
    pub fn capture_frame(&self, frame: EncodedFrame) -> bool {
        if self.is_closed() {
            debug!("Source {} is closed, dropping frame", self.id);
            return false;
        }

        let capture_time_us = frame.capture_time_us();
        let depth = {
            let mut queue = self.queue.lock();
            queue.push_back(frame);
            queue.len()
        };

        if self.warn_depth > 0 && depth == self.warn_depth + 1 {
            warn!(
                "Source {} queue grew past {} frames; is the pipeline pulling?",
                self.id, self.warn_depth
            );
        }

        self.pump.emit(capture_time_us);
        true
    }

    /// Read and clear the pending keyframe request
    pub fn consume_keyframe_request(&self) -> bool {
        self.keyframe_requested.swap(false, Ordering::SeqCst)
    }

    pub fn keyframe_requested(&self) -> bool {
        self.keyframe_requested.load(Ordering::SeqCst)
    }

    fn set_observer(&self, observer: Option<Arc<dyn KeyframeRequestObserver>>) {
        *self.observer.lock() = observer;
    }

    /// Drop queued frames, end the pump and detach its sinks
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let dropped = {
            let mut queue = self.queue.lock();
            let n = queue.len();
            queue.clear();
            n
        };
        self.set_observer(None);
        self.pump.shutdown();
        debug!("Closed source {} ({} queued frame(s) dropped)", self.id, dropped);
    }
}

impl FrameProvider for SourceCore {
    fn take_next_frame(&self) -> Option<EncodedFrame> {
        if self.is_closed() {
            return None;
        }
        self.queue.lock().pop_front()
    }

    fn request_keyframe(&self) {
        self.keyframe_requested.store(true, Ordering::SeqCst);
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            observer.on_keyframe_request();
        }
    }
}

impl std::fmt::Debug for SourceCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCore")
            .field("id", &self.id)
            .field("codec", &self.codec)
            .field("resolution", &self.resolution)
            .field("queued", &self.queue_len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Deregisters and closes the source when the last handle goes away
struct SourceGuard {
    registry: Arc<SourceRegistry>,
    core: Arc<SourceCore>,
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.core.id());
        self.core.close();
    }
}

/// Application handle to an encoded source
///
/// Cloning shares the same source. Dropping the last clone removes it from
/// its registry; encoders still holding it see an empty queue from then on.
#[derive(Clone)]
pub struct EncodedSource {
    inner: Arc<SourceGuard>,
}

impl EncodedSource {
    /// Create a source and register it
    pub fn new(registry: &Arc<SourceRegistry>, config: &SourceConfig) -> Self {
        let core = Arc::new(SourceCore::new(config));
        registry.register(core.id(), core.clone());
        debug!(
            "Created {} source {} at {}",
            core.codec(),
            core.id(),
            core.resolution()
        );
        Self {
            inner: Arc::new(SourceGuard {
                registry: registry.clone(),
                core,
            }),
        }
    }

    /// Create a source in the process-wide registry
    pub fn new_global(config: &SourceConfig) -> Self {
        Self::new(&SourceRegistry::global(), config)
    }

    pub fn id(&self) -> RoutingId {
        self.inner.core.id()
    }

    pub fn codec(&self) -> Codec {
        self.inner.core.codec()
    }

    pub fn resolution(&self) -> Resolution {
        self.inner.core.resolution()
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.inner.registry
    }

    /// Push one encoded frame
    ///
    /// Copies `data`, queues the frame and emits one placeholder. Returns
    /// false without side effects if `data` is empty.
    #[allow(clippy::too_many_arguments)]
    pub fn capture_encoded_frame(
        &self,
        data: &[u8],
        capture_time_us: i64,
        rtp_timestamp: u32,
        width: u32,
        height: u32,
        is_keyframe: bool,
        has_parameter_sets: bool,
    ) -> bool {
        if data.is_empty() {
            warn!("Ignoring empty encoded frame on source {}", self.id());
            return false;
        }

        let frame = match EncodedFrame::new(Bytes::copy_from_slice(data), width, height) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Rejected encoded frame on source {}: {}", self.id(), e);
                return false;
            }
        };

        self.capture_frame(
            frame
                .with_capture_time_us(capture_time_us)
                .with_rtp_timestamp(rtp_timestamp)
                .with_keyframe(is_keyframe)
                .with_parameter_sets(has_parameter_sets),
        )
    }

    /// Push an already-built frame without copying its payload
    pub fn capture_frame(&self, frame: EncodedFrame) -> bool {
        trace!(
            "Source {} capture: {} bytes, key={}",
            self.id(),
            frame.len(),
            frame.is_keyframe()
        );
        self.inner.core.capture_frame(frame)
    }

    pub fn take_next_frame(&self) -> Option<EncodedFrame> {
        self.inner.core.take_next_frame()
    }

    pub fn request_keyframe(&self) {
        self.inner.core.request_keyframe()
    }

    /// Read and clear the pending keyframe request
    pub fn consume_keyframe_request(&self) -> bool {
        self.inner.core.consume_keyframe_request()
    }

    pub fn keyframe_requested(&self) -> bool {
        self.inner.core.keyframe_requested()
    }

    pub fn set_keyframe_request_observer(&self, observer: Arc<dyn KeyframeRequestObserver>) {
        self.inner.core.set_observer(Some(observer));
    }

    pub fn clear_keyframe_request_observer(&self) {
        self.inner.core.set_observer(None);
    }

    pub fn queue_len(&self) -> usize {
        self.inner.core.queue_len()
    }

    /// The raw-frame source the host pipeline should capture from
    pub fn raw_source(&self) -> Arc<dyn RawFrameSource> {
        self.inner.core.pump().clone()
    }

    /// The provider a bound encoder pulls from
    pub fn provider(&self) -> Arc<dyn FrameProvider> {
        self.inner.core.clone()
    }

    pub(crate) fn core(&self) -> &Arc<SourceCore> {
        &self.inner.core
    }
}

impl std::fmt::Debug for EncodedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EncodedSource").field(&self.inner.core).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn source() -> (Arc<SourceRegistry>, EncodedSource) {
        let registry = Arc::new(SourceRegistry::new());
        let source = EncodedSource::new(&registry, &SourceConfig::new(Codec::H264, 640, 480));
        (registry, source)
    }

    #[test]
    fn test_empty_capture_is_noop() {
        let (_registry, source) = source();
        assert!(!source.capture_encoded_frame(&[], 0, 0, 640, 480, false, false));
        assert_eq!(source.queue_len(), 0);
    }

    #[test]
    fn test_keyframe_flag_collapses_observer_sees_each_request() {
        let (_registry, source) = source();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        source.set_keyframe_request_observer(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        source.request_keyframe();
        source.request_keyframe();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(source.consume_keyframe_request());
        assert!(!source.consume_keyframe_request());
    }

    #[test]
    fn test_clone_keeps_source_registered() {
        let (registry, source) = source();
        let id = source.id();
        let clone = source.clone();

        drop(source);
        assert!(registry.contains(id));

        drop(clone);
        assert!(!registry.contains(id));
    }

    #[test]
    fn test_drop_closes_core() {
        let (registry, source) = source();
        source.capture_encoded_frame(&[1, 2, 3], 1, 0, 640, 480, true, false);
        let provider = source.provider();
        let raw = source.raw_source();

        drop(source);

        assert!(registry.is_empty());
        assert!(provider.take_next_frame().is_none());
        assert_eq!(raw.state(), crate::types::SourceState::Ended);
    }
}

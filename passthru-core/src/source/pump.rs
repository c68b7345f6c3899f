//! Placeholder raw-frame pump
//!
//! The host pipeline only pulls an encoder when a raw frame arrives, so every
//! injected encoded frame is shadowed by one tiny black placeholder pushed
//! through here. The placeholder carries the source's routing id and a
//! monotonic timestamp; its pixels are never encoded.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

use crate::config::PumpConfig;
use crate::frame::{I420Buffer, RawFrame};
use crate::host::{RawFrameSink, RawFrameSource, SinkId};
use crate::types::{RoutingId, SourceState};

/// Keeps placeholder timestamps strictly increasing
#[derive(Debug, Default)]
pub struct TimestampAligner {
    last_us: Option<i64>,
}

impl TimestampAligner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp for a frame captured at `capture_time_us` (0 = now)
    pub fn align(&mut self, capture_time_us: i64) -> i64 {
        let candidate = if capture_time_us > 0 {
            capture_time_us
        } else {
            wall_clock_us()
        };

        let ts = match self.last_us {
            Some(last) if candidate <= last => last + 1,
            _ => candidate,
        };
        self.last_us = Some(ts);
        ts
    }
}

fn wall_clock_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or_default()
}

/// Raw-frame source the host pipeline captures from
pub struct FramePump {
    /// Routing id stamped on every raw frame
    source_id: RoutingId,
    /// Shared black placeholder
    placeholder: Arc<I420Buffer>,
    /// Timestamp monotonicity
    aligner: Mutex<TimestampAligner>,
    /// Registered pipeline sinks
    sinks: RwLock<Vec<(SinkId, Arc<dyn RawFrameSink>)>>,
    next_sink_id: AtomicU64,
    /// Set once the owning source is torn down
    ended: AtomicBool,
}

impl FramePump {
    pub(crate) fn new(source_id: RoutingId, config: PumpConfig) -> Self {
        Self {
            source_id,
            placeholder: Arc::new(I420Buffer::black(
                config.placeholder_width,
                config.placeholder_height,
            )),
            aligner: Mutex::new(TimestampAligner::new()),
            sinks: RwLock::new(Vec::new()),
            next_sink_id: AtomicU64::new(1),
            ended: AtomicBool::new(false),
        }
    }

    pub fn source_id(&self) -> RoutingId {
        self.source_id
    }

    pub fn placeholder(&self) -> &Arc<I420Buffer> {
        &self.placeholder
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }

    /// Push one placeholder for a frame captured at `capture_time_us`
    ///
    /// Returns the timestamp the placeholder was stamped with.
    pub fn emit(&self, capture_time_us: i64) -> i64 {
        let timestamp_us = self.aligner.lock().align(capture_time_us);
        self.push_raw_frame(self.placeholder.clone(), timestamp_us);
        timestamp_us
    }

    /// Mark the pump ended and drop every sink
    pub(crate) fn shutdown(&self) {
        self.ended.store(true, Ordering::SeqCst);
        let sinks = std::mem::take(&mut *self.sinks.write());
        if !sinks.is_empty() {
            debug!("Pump for {} dropped {} sink(s)", self.source_id, sinks.len());
        }
    }
}

impl RawFrameSource for FramePump {
    fn is_screencast(&self) -> bool {
        false
    }

    fn needs_denoising(&self) -> Option<bool> {
        Some(false)
    }

    fn state(&self) -> SourceState {
        if self.ended.load(Ordering::SeqCst) {
            SourceState::Ended
        } else {
            SourceState::Live
        }
    }

    fn remote(&self) -> bool {
        false
    }

    fn push_raw_frame(&self, buffer: Arc<I420Buffer>, timestamp_us: i64) {
        if self.ended.load(Ordering::SeqCst) {
            return;
        }

        let frame = RawFrame::new(buffer, timestamp_us).with_source_id(self.source_id);

        // Sinks may re-enter the pump, so deliver from a snapshot
        let sinks: Vec<Arc<dyn RawFrameSink>> =
            self.sinks.read().iter().map(|(_, s)| s.clone()).collect();

        trace!(
            "Pump {} delivering placeholder @{}us to {} sink(s)",
            self.source_id,
            timestamp_us,
            sinks.len()
        );

        for sink in sinks {
            sink.on_frame(&frame);
        }
    }

    fn add_sink(&self, sink: Arc<dyn RawFrameSink>) -> SinkId {
        let id = SinkId(self.next_sink_id.fetch_add(1, Ordering::SeqCst));
        self.sinks.write().push((id, sink));
        id
    }

    fn remove_sink(&self, id: SinkId) -> bool {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|(sink_id, _)| *sink_id != id);
        sinks.len() != before
    }
}

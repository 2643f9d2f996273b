use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters shared by the producer side and the worker.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub submitted: AtomicU64,
    pub throttled: AtomicU64,
    pub replaced: AtomicU64,
    pub processed: AtomicU64,
    pub preprocess_failures: AtomicU64,
    pub inference_failures: AtomicU64,
    pub with_detections: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStats {
            submitted: get(&self.submitted),
            throttled: get(&self.throttled),
            replaced: get(&self.replaced),
            processed: get(&self.processed),
            preprocess_failures: get(&self.preprocess_failures),
            inference_failures: get(&self.inference_failures),
            frames_with_detections: get(&self.with_detections),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PipelineStats {
    /// Every frame handed to `submit`.
    pub submitted: u64,
    /// Skipped by the every-Nth-frame throttle.
    pub throttled: u64,
    /// Pending frames evicted by a newer one.
    pub replaced: u64,
    /// Frames the worker picked up.
    pub processed: u64,
    pub preprocess_failures: u64,
    pub inference_failures: u64,
    pub frames_with_detections: u64,
}

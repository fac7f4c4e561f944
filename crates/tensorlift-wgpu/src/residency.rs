//! Buffer residency pool and submission tracking.
//!
//! Storage buffers are pooled by usage class and element count. A buffer that
//! was bound to an in-flight submission is parked until the queue reports the
//! submission complete; only then does it rejoin the free pool.

use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BufferUsageClass {
    Generic,
    PoolValues,
    PoolIndices,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct ResidencyKey {
    usage: BufferUsageClass,
    len: usize,
}

impl ResidencyKey {
    fn new(usage: BufferUsageClass, len: usize) -> Self {
        Self { usage, len }
    }
}

impl Hash for ResidencyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.usage.hash(state);
        self.len.hash(state);
    }
}

/// Monotonic submission ids with a completed watermark. Ids are handed out
/// in order and the queue completes them in order, so a single high-water
/// mark is enough.
pub struct SubmissionTracker {
    next: AtomicU64,
    completed: AtomicU64,
}

impl Default for SubmissionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionTracker {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            completed: AtomicU64::new(0),
        }
    }

    pub fn begin(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    pub fn mark_complete(&self, id: u64) {
        self.completed.fetch_max(id, Ordering::SeqCst);
    }

    pub fn is_complete(&self, id: u64) -> bool {
        self.completed.load(Ordering::SeqCst) >= id
    }

    pub fn completed_watermark(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }
}

struct PendingReturn {
    key: ResidencyKey,
    buffer: Arc<wgpu::Buffer>,
    submission: u64,
}

pub struct BufferResidency {
    pools: Mutex<HashMap<ResidencyKey, VecDeque<Arc<wgpu::Buffer>>>>,
    pending: Mutex<Vec<PendingReturn>>,
    max_per_key: usize,
}

impl BufferResidency {
    pub fn new(max_per_key: usize) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            max_per_key,
        }
    }

    pub fn acquire(
        &self,
        device: &wgpu::Device,
        usage: BufferUsageClass,
        len: usize,
        element_size: usize,
        label: &str,
    ) -> Arc<wgpu::Buffer> {
        if len == 0 {
            return Arc::new(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: element_size.max(1) as u64,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }

        let key = ResidencyKey::new(usage, len);
        if let Ok(mut guard) = self.pools.lock() {
            if let Some(queue) = guard.get_mut(&key) {
                if let Some(buffer) = queue.pop_front() {
                    log::trace!(
                        "buffer_residency: reuse {:?} len={} ptr={:p}",
                        usage,
                        len,
                        Arc::as_ptr(&buffer)
                    );
                    return buffer;
                }
            }
        }

        let size_bytes = (len as u64).max(1) * element_size as u64;
        let buffer = Arc::new(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size_bytes,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        log::trace!(
            "buffer_residency: new {:?} len={} ptr={:p}",
            usage,
            len,
            Arc::as_ptr(&buffer)
        );
        buffer
    }

    /// Return a buffer whose last submission is already known complete.
    pub fn release(&self, usage: BufferUsageClass, len: usize, buffer: Arc<wgpu::Buffer>) {
        if len == 0 {
            return;
        }

        let key = ResidencyKey::new(usage, len);
        self.push_free(key, buffer);
    }

    /// Return a buffer that may still be bound to an in-flight submission.
    /// Parked until [`BufferResidency::reclaim`] observes the submission
    /// complete.
    pub fn release_after(
        &self,
        usage: BufferUsageClass,
        len: usize,
        buffer: Arc<wgpu::Buffer>,
        submission: u64,
        tracker: &SubmissionTracker,
    ) {
        if len == 0 {
            return;
        }
        if tracker.is_complete(submission) {
            self.release(usage, len, buffer);
            return;
        }
        if let Ok(mut guard) = self.pending.lock() {
            log::trace!(
                "buffer_residency: park {:?} len={} submission={}",
                usage,
                len,
                submission
            );
            guard.push(PendingReturn {
                key: ResidencyKey::new(usage, len),
                buffer,
                submission,
            });
        }
    }

    /// Move parked buffers whose submissions have completed into the free
    /// pools.
    pub fn reclaim(&self, tracker: &SubmissionTracker) {
        let ready: Vec<PendingReturn> = {
            let Ok(mut guard) = self.pending.lock() else {
                return;
            };
            let mut ready = Vec::new();
            let mut i = 0;
            while i < guard.len() {
                if tracker.is_complete(guard[i].submission) {
                    ready.push(guard.swap_remove(i));
                } else {
                    i += 1;
                }
            }
            ready
        };
        for item in ready {
            self.push_free(item.key, item.buffer);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().map(|g| g.len()).unwrap_or(0)
    }

    fn push_free(&self, key: ResidencyKey, buffer: Arc<wgpu::Buffer>) {
        if let Ok(mut guard) = self.pools.lock() {
            let queue = guard.entry(key).or_default();
            if queue.len() < self.max_per_key {
                log::trace!(
                    "buffer_residency: release {:?} len={} ptr={:p}",
                    key.usage,
                    key.len,
                    Arc::as_ptr(&buffer)
                );
                queue.push_back(buffer);
            } else {
                log::trace!(
                    "buffer_residency: drop {:?} len={} ptr={:p} (pool full)",
                    key.usage,
                    key.len,
                    Arc::as_ptr(&buffer)
                );
            }
        }
    }
}

/// Scoped checkout of a pooled buffer. Unless [`CheckoutGuard::commit`] is
/// called, the buffer goes straight back to the free pool on drop, so error
/// returns cannot leak pool capacity.
pub struct CheckoutGuard<'a> {
    residency: &'a BufferResidency,
    usage: BufferUsageClass,
    len: usize,
    buffer: Option<Arc<wgpu::Buffer>>,
}

impl<'a> CheckoutGuard<'a> {
    pub fn new(
        residency: &'a BufferResidency,
        usage: BufferUsageClass,
        len: usize,
        buffer: Arc<wgpu::Buffer>,
    ) -> Self {
        Self {
            residency,
            usage,
            len,
            buffer: Some(buffer),
        }
    }

    pub fn buffer(&self) -> &Arc<wgpu::Buffer> {
        self.buffer.as_ref().expect("checked out buffer")
    }

    /// Keep the buffer out of the pool; the caller now owns its lifecycle.
    pub fn commit(mut self) -> Arc<wgpu::Buffer> {
        self.buffer.take().expect("checked out buffer")
    }
}

impl Drop for CheckoutGuard<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.residency.release(self.usage, self.len, buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_ids_are_monotonic() {
        let tracker = SubmissionTracker::new();
        let a = tracker.begin();
        let b = tracker.begin();
        assert!(b > a);
        assert!(!tracker.is_complete(a));
        tracker.mark_complete(b);
        assert!(tracker.is_complete(a));
        assert!(tracker.is_complete(b));
    }

    #[test]
    fn watermark_never_regresses() {
        let tracker = SubmissionTracker::new();
        let a = tracker.begin();
        let b = tracker.begin();
        tracker.mark_complete(b);
        tracker.mark_complete(a);
        assert_eq!(tracker.completed_watermark(), b);
    }
}

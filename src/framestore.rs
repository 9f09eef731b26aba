//! Shared frame stores connecting the pipeline stages.
//!
//! The raw RGB raster and the decoder's display raster are plain guarded
//! byte buffers. The composite frame uses a published-Arc swap instead of a
//! reader-writer lock across whole-frame generation: the synthesizer fills a
//! buffer nobody else holds and swaps it in, and the TX callback clones the
//! Arc once and reads it lock-free for the callback's duration.

use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use crate::RAW_FRAME_BYTES;

/// Latest raw RGB24 frame from the capture subprocess.
pub struct RawFrameStore {
    pixels: RwLock<Vec<u8>>,
}

impl RawFrameStore {
    pub fn new() -> Self {
        Self {
            pixels: RwLock::new(vec![0u8; RAW_FRAME_BYTES]),
        }
    }

    /// Overwrites the whole raster. Called by the capture reader with a frame
    /// it has already pulled off the pipe, so the write guard is short.
    pub fn write_frame(&self, frame: &[u8]) {
        let mut pixels = self.pixels.write().unwrap();
        pixels.copy_from_slice(frame);
    }

    /// Mutates the raster in place (test pattern fill).
    pub fn fill_with(&self, f: impl FnOnce(&mut [u8])) {
        let mut pixels = self.pixels.write().unwrap();
        f(&mut pixels);
    }

    /// Shared-read guard held by the synthesizer for one full frame.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.pixels.read().unwrap()
    }
}

impl Default for RawFrameStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Most recently published composite frame, in IRE.
pub struct CompositeFrameStore {
    published: Mutex<Arc<Vec<f64>>>,
}

impl CompositeFrameStore {
    /// Creates the store with an all-blanking frame of `frame_samples` values.
    pub fn new(frame_samples: usize) -> Self {
        Self {
            published: Mutex::new(Arc::new(vec![0.0; frame_samples])),
        }
    }

    /// Clones the current frame handle. The TX callback calls this once per
    /// buffer and keeps the Arc for the whole fill.
    pub fn latest(&self) -> Arc<Vec<f64>> {
        self.published.lock().unwrap().clone()
    }

    /// Publishes a freshly generated frame, returning the previous one so the
    /// synthesizer can recycle it.
    pub fn publish(&self, frame: Arc<Vec<f64>>) -> Arc<Vec<f64>> {
        let mut published = self.published.lock().unwrap();
        std::mem::replace(&mut *published, frame)
    }
}

/// Latest completed grayscale raster on the receive side.
pub struct DisplayFrameStore {
    pixels: Mutex<Vec<u8>>,
}

impl DisplayFrameStore {
    pub fn new() -> Self {
        Self {
            pixels: Mutex::new(vec![0u8; RAW_FRAME_BYTES]),
        }
    }

    /// Called by the decoder when the raster wraps at the bottom.
    pub fn store(&self, frame: &[u8]) {
        let mut pixels = self.pixels.lock().unwrap();
        pixels.copy_from_slice(frame);
    }

    /// Copies the latest frame into `out`, reusable by the display pacer.
    pub fn copy_to(&self, out: &mut [u8]) {
        let pixels = self.pixels.lock().unwrap();
        out.copy_from_slice(&pixels);
    }

    /// Returns a fresh copy of the latest frame.
    pub fn snapshot(&self) -> Vec<u8> {
        self.pixels.lock().unwrap().clone()
    }
}

impl Default for DisplayFrameStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_publish_returns_previous() {
        let store = CompositeFrameStore::new(4);
        let first = store.latest();
        assert_eq!(first.len(), 4);

        let frame = Arc::new(vec![1.0, 2.0, 3.0, 4.0]);
        let old = store.publish(frame.clone());
        assert!(Arc::ptr_eq(&old, &first));
        assert_eq!(*store.latest(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn composite_reader_keeps_old_frame_across_publish() {
        let store = CompositeFrameStore::new(2);
        let held = store.latest();
        store.publish(Arc::new(vec![9.0, 9.0]));
        // The held handle still sees the frame it acquired
        assert_eq!(*held, vec![0.0, 0.0]);
        assert_eq!(*store.latest(), vec![9.0, 9.0]);
    }

    #[test]
    fn raw_store_round_trip() {
        let store = RawFrameStore::new();
        let frame = vec![7u8; RAW_FRAME_BYTES];
        store.write_frame(&frame);
        assert_eq!(store.read()[0], 7);
        store.fill_with(|buf| buf[0] = 1);
        assert_eq!(store.read()[0], 1);
    }

    #[test]
    fn display_store_round_trip() {
        let store = DisplayFrameStore::new();
        let frame = vec![42u8; RAW_FRAME_BYTES];
        store.store(&frame);
        let mut out = vec![0u8; RAW_FRAME_BYTES];
        store.copy_to(&mut out);
        assert_eq!(out, frame);
        assert_eq!(store.snapshot()[100], 42);
    }
}

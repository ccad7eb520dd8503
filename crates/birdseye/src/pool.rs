//! Reusable frame-buffer pool.
//!
//! Rectified images and feature maps are reallocated every frame in the
//! naive formulation; the pool hands out buffers keyed by their dimensions
//! and takes them back when the scoped handle drops. Buffers whose size no
//! longer matches (after a geometry change) are simply dropped.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

type Key = (u32, u32);

struct Shelves<T> {
    shelves: Mutex<HashMap<Key, Vec<Vec<T>>>>,
}

impl<T: Clone + Default> Shelves<T> {
    fn new() -> Self {
        Self {
            shelves: Mutex::new(HashMap::new()),
        }
    }

    fn take(&self, key: Key, len: usize) -> Vec<T> {
        let reused = self
            .shelves
            .lock()
            .expect("pool mutex")
            .get_mut(&key)
            .and_then(Vec::pop);
        match reused {
            Some(mut buffer) => {
                buffer.fill(T::default());
                buffer
            }
            None => vec![T::default(); len],
        }
    }

    fn put(&self, key: Key, buffer: Vec<T>) {
        self.shelves
            .lock()
            .expect("pool mutex")
            .entry(key)
            .or_default()
            .push(buffer);
    }
}

/// Pool of per-frame working buffers.
#[derive(Clone)]
pub struct FramePool {
    bytes: Arc<Shelves<u8>>,
    floats: Arc<Shelves<f32>>,
}

impl Default for FramePool {
    fn default() -> Self {
        Self {
            bytes: Arc::new(Shelves::new()),
            floats: Arc::new(Shelves::new()),
        }
    }
}

impl FramePool {
    /// A zeroed RGBA buffer of `width * height` pixels.
    pub fn rgba(&self, width: u32, height: u32) -> Pooled<u8> {
        let len = width as usize * height as usize * 4;
        Pooled {
            key: (width, height),
            buffer: Some(self.bytes.take((width, height), len)),
            shelves: Arc::clone(&self.bytes),
        }
    }

    /// A zeroed f32 map of `width * height` values.
    pub fn map_f32(&self, width: u32, height: u32) -> Pooled<f32> {
        let len = width as usize * height as usize;
        Pooled {
            key: (width, height),
            buffer: Some(self.floats.take((width, height), len)),
            shelves: Arc::clone(&self.floats),
        }
    }

    /// Return a buffer that was detached with [`Pooled::into_inner`], e.g.
    /// after an image type gave it back.
    pub fn reclaim_rgba(&self, width: u32, height: u32, buffer: Vec<u8>) {
        self.bytes.put((width, height), buffer);
    }

    /// f32 counterpart of [`FramePool::reclaim_rgba`].
    pub fn reclaim_f32(&self, width: u32, height: u32, buffer: Vec<f32>) {
        self.floats.put((width, height), buffer);
    }
}

/// Scoped buffer handle; returns the buffer to its shelf on drop.
pub struct Pooled<T: Clone + Default> {
    key: Key,
    buffer: Option<Vec<T>>,
    shelves: Arc<Shelves<T>>,
}

impl<T: Clone + Default> Pooled<T> {
    /// Detach the buffer from the pool, e.g. to hand it to an image type.
    pub fn into_inner(mut self) -> Vec<T> {
        self.buffer.take().expect("buffer present until drop")
    }
}

impl<T: Clone + Default> Deref for Pooled<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        self.buffer.as_ref().expect("buffer present until drop")
    }
}

impl<T: Clone + Default> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer.as_mut().expect("buffer present until drop")
    }
}

impl<T: Clone + Default> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.shelves.put(self.key, buffer);
        }
    }
}

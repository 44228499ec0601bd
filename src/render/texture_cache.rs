// SPDX-License-Identifier: GPL-3.0-only

//! Texture cache keyed by pixel-buffer identity
//!
//! A fixed number of slots, like a driver texture cache. A slot is reused only
//! when nothing but the cache references it: the current frame and every
//! pending draw hold an `Arc` to their slot, so an in-flight texture is never
//! overwritten. There is no other eviction policy.

use crate::backends::camera::{PixelBuffer, PixelBufferId, PixelFormat};
use crate::errors::{RenderError, RenderResult};
use std::sync::Arc;
use tracing::{debug, trace};

/// A cache slot: a GPU texture plus the buffer it was last filled from
#[derive(Debug)]
pub struct CachedTexture<T> {
    texture: T,
    key: PixelBufferId,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl<T> CachedTexture<T> {
    pub fn texture(&self) -> &T {
        &self.texture
    }

    /// Identity of the pixel buffer last uploaded into this slot
    pub fn key(&self) -> PixelBufferId {
        self.key
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    fn fits(&self, buffer: &PixelBuffer) -> bool {
        self.width == buffer.width()
            && self.height == buffer.height()
            && self.format == buffer.format()
    }
}

/// Counters for cache behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Same buffer identity found in a free slot
    pub hits: u64,
    /// Free slot of matching size re-keyed to a new buffer
    pub reuses: u64,
    /// New textures allocated
    pub allocations: u64,
    /// Lookups refused because every slot was in use
    pub exhausted: u64,
}

/// Fixed-capacity pool of textures
pub struct TextureCache<T> {
    slots: Vec<Arc<CachedTexture<T>>>,
    capacity: usize,
    stats: CacheStats,
}

impl<T> TextureCache<T> {
    pub fn new(capacity: usize) -> RenderResult<Self> {
        if capacity == 0 {
            return Err(RenderError::TextureCacheInit(
                "texture cache needs at least one slot".to_string(),
            ));
        }
        debug!(capacity, "Texture cache created");
        Ok(Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            stats: CacheStats::default(),
        })
    }

    /// Texture for `buffer`, filled by `upload`
    ///
    /// `create` allocates a texture when no free slot fits. The returned `Arc`
    /// keeps the slot busy until it is dropped.
    pub fn acquire<C, U>(
        &mut self,
        buffer: &PixelBuffer,
        create: C,
        upload: U,
    ) -> RenderResult<Arc<CachedTexture<T>>>
    where
        C: FnOnce(u32, u32, PixelFormat) -> RenderResult<T>,
        U: FnOnce(&T, &PixelBuffer) -> RenderResult<()>,
    {
        let index = self.find_slot(buffer, create)?;
        let len = self.slots.len();
        let slot = &mut self.slots[index];

        // find_slot only returns slots nothing else references
        let Some(entry) = Arc::get_mut(slot) else {
            return Err(RenderError::CacheExhausted(len));
        };
        entry.key = buffer.id();
        upload(&entry.texture, buffer)?;

        Ok(Arc::clone(slot))
    }

    fn find_slot<C>(&mut self, buffer: &PixelBuffer, create: C) -> RenderResult<usize>
    where
        C: FnOnce(u32, u32, PixelFormat) -> RenderResult<T>,
    {
        let key = buffer.id();

        if let Some(index) = self.free_slot(|slot| slot.key == key && slot.fits(buffer)) {
            trace!(buffer = %key, slot = index, "Texture cache hit");
            self.stats.hits += 1;
            return Ok(index);
        }

        if let Some(index) = self.free_slot(|slot| slot.fits(buffer)) {
            trace!(buffer = %key, slot = index, "Texture cache slot reused");
            self.stats.reuses += 1;
            return Ok(index);
        }

        let replace = if self.slots.len() < self.capacity {
            None
        } else {
            match self.free_slot(|_| true) {
                Some(index) => Some(index),
                None => {
                    self.stats.exhausted += 1;
                    return Err(RenderError::CacheExhausted(self.slots.len()));
                }
            }
        };

        let texture = create(buffer.width(), buffer.height(), buffer.format())?;
        let entry = Arc::new(CachedTexture {
            texture,
            key,
            width: buffer.width(),
            height: buffer.height(),
            format: buffer.format(),
        });
        self.stats.allocations += 1;

        match replace {
            Some(index) => {
                debug!(
                    buffer = %key,
                    slot = index,
                    width = buffer.width(),
                    height = buffer.height(),
                    "Texture cache slot reallocated"
                );
                self.slots[index] = entry;
                Ok(index)
            }
            None => {
                debug!(
                    buffer = %key,
                    slot = self.slots.len(),
                    width = buffer.width(),
                    height = buffer.height(),
                    "Texture cache slot allocated"
                );
                self.slots.push(entry);
                Ok(self.slots.len() - 1)
            }
        }
    }

    fn free_slot(&mut self, matches: impl Fn(&CachedTexture<T>) -> bool) -> Option<usize> {
        self.slots
            .iter_mut()
            .position(|slot| matches(&**slot) && Arc::get_mut(slot).is_some())
    }

    /// Slots currently referenced outside the cache
    pub fn in_use(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Drop every slot nothing references (e.g. after a resolution change)
    pub fn purge_unused(&mut self) {
        let before = self.slots.len();
        self.slots.retain(|slot| Arc::strong_count(slot) > 1);
        debug!(
            released = before - self.slots.len(),
            "Texture cache purged"
        );
    }
}

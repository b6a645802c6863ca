use crate::error::{ResoundError, Result};
use crate::source::{AudioSource, WaveFormat};
use std::sync::Arc;
use std::time::Duration;

/// One decoded chunk ready for submission to a device voice.
///
/// The bytes live in a ring slot shared through an `Arc`; a buffer counts as
/// "in flight" for as long as any clone of it is alive (typically while the
/// device voice holds it in its queue).
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    data: Arc<Vec<u8>>,
    len: usize,
    /// Last buffer of the stream.
    pub end_of_stream: bool,
    /// Times the device should replay this buffer; zero plays it once.
    pub loop_count: u32,
}

impl AudioBuffer {
    /// Wraps bytes that do not belong to a ring.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            data: Arc::new(bytes),
            len,
            end_of_stream: false,
            loop_count: 0,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity of the backing allocation.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }
}

/// Fixed-capacity set of reusable buffers fed by an [`AudioSource`].
///
/// Slots are handed out round-robin. A slot's allocation grows to fit the
/// largest chunk it has held and never shrinks.
pub struct StreamingBufferRing<S: AudioSource> {
    source: S,
    slots: Vec<Arc<Vec<u8>>>,
    next_index: usize,
}

impl<S: AudioSource> StreamingBufferRing<S> {
    /// Creates a ring of `capacity` empty slots (at least one).
    pub fn new(source: S, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            source,
            slots: (0..capacity).map(|_| Arc::new(Vec::new())).collect(),
            next_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn format(&self) -> WaveFormat {
        self.source.format()
    }

    pub fn duration(&self) -> Duration {
        self.source.duration()
    }

    /// Index of the slot the next successful `try_get_next` fills.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Current allocation size of slot `index`.
    pub fn slot_capacity(&self, index: usize) -> usize {
        self.slots.get(index).map_or(0, |slot| slot.capacity())
    }

    /// Buffers handed out by this ring that are still referenced elsewhere.
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }

    /// Moves the decode cursor to `position`.
    ///
    /// Invalidating buffers already queued from the old position is the
    /// caller's job (see the generation counter in the playback engine).
    pub fn set_position(&mut self, position: Duration) -> Result<()> {
        log::trace!("Ring seeking source to {:?}", position);
        self.source.seek(position)
    }

    /// Decodes the next chunk into the next slot.
    ///
    /// Returns `Ok(None)` at end of stream. Decode errors are returned unchanged.
    pub fn try_get_next(&mut self) -> Result<Option<AudioBuffer>> {
        let Some(chunk) = self.source.next_chunk()? else {
            return Ok(None);
        };

        let index = self.next_index;
        self.next_index = (self.next_index + 1) % self.slots.len();

        let slot = &mut self.slots[index];
        let reallocate = match Arc::get_mut(slot) {
            Some(storage) if storage.capacity() >= chunk.data.len() => false,
            Some(storage) => {
                log::trace!(
                    "Growing ring slot {} from {} to {} bytes",
                    index,
                    storage.capacity(),
                    chunk.data.len()
                );
                true
            }
            None => {
                // The device still holds this slot; never overwrite bytes it may be reading
                log::warn!(
                    "Ring slot {} is still in flight; allocating a replacement",
                    index
                );
                true
            }
        };
        if reallocate {
            *slot = Arc::new(Vec::with_capacity(chunk.data.len()));
        }
        let Some(storage) = Arc::get_mut(slot) else {
            return Err(ResoundError::Engine(format!(
                "Ring slot {} is shared after reallocation",
                index
            )));
        };
        storage.clear();
        storage.extend_from_slice(chunk.data);
        let len = storage.len();

        Ok(Some(AudioBuffer {
            data: Arc::clone(slot),
            len,
            end_of_stream: chunk.is_last,
            loop_count: 0,
        }))
    }
}

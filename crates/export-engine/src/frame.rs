//! Decoded frames and encoded chunks.
//!
//! A [`Frame`] is a leased handle: the [`FrameLedger`] that issued it counts it
//! as outstanding until it is closed or dropped. Closing consumes the frame,
//! so a released frame cannot be touched again.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Raw decoder output before the pipeline takes ownership of it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPicture {
    pub timestamp_secs: f64,
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA.
    pub pixels: Vec<u8>,
}

/// Issues frames and tracks how many are still alive.
#[derive(Debug, Clone, Default)]
pub struct FrameLedger {
    outstanding: Arc<AtomicUsize>,
    issued: Arc<AtomicU64>,
}

impl FrameLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a decoded picture.
    pub fn issue(&self, picture: DecodedPicture) -> Frame {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.issued.fetch_add(1, Ordering::SeqCst);
        Frame {
            timestamp_secs: picture.timestamp_secs,
            width: picture.width,
            height: picture.height,
            pixels: picture.pixels,
            lease: FrameLease {
                outstanding: Arc::clone(&self.outstanding),
            },
        }
    }

    /// Frames issued and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Frames issued over the ledger's lifetime.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct FrameLease {
    outstanding: Arc<AtomicUsize>,
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A single decoded picture owned by the pipeline.
#[derive(Debug)]
pub struct Frame {
    timestamp_secs: f64,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    lease: FrameLease,
}

impl Frame {
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp_secs
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Release the frame back to its ledger.
    pub fn close(self) {
        let Frame { lease, .. } = self;
        drop(lease);
    }
}

/// Encoder output before it is sequenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub data: Vec<u8>,
    pub is_key_frame: bool,
}

/// One encoded chunk, in strictly increasing `sequence_index` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub bytes: Vec<u8>,
    pub is_key_frame: bool,
    pub sequence_index: u64,
}

/// Append-only chunk list; assigns sequence indices in arrival order.
#[derive(Debug, Default)]
pub struct ChunkSink {
    chunks: Vec<EncodedChunk>,
    total_bytes: usize,
}

impl ChunkSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, payload: EncodedPayload) {
        if payload.data.is_empty() {
            return;
        }
        let sequence_index = self.chunks.len() as u64;
        self.total_bytes += payload.data.len();
        self.chunks.push(EncodedChunk {
            bytes: payload.data,
            is_key_frame: payload.is_key_frame,
            sequence_index,
        });
    }

    pub fn extend(&mut self, payloads: impl IntoIterator<Item = EncodedPayload>) {
        for payload in payloads {
            self.push(payload);
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn into_chunks(self) -> Vec<EncodedChunk> {
        self.chunks
    }
}

use std::sync::Arc;
use std::time::Instant;

/// One timestamped, sequenced unit of encoded audio.
///
/// The payload is shared and immutable, so cloning a fragment (as every
/// snapshot does) never copies audio bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub sequence: u64,
    pub timestamp: Instant,
    pub payload: Arc<[u8]>,
    pub is_header: bool,
}

impl Fragment {
    /// Sequence number reserved for the container header.
    pub const HEADER_SEQUENCE: u64 = 0;

    /// Build a fragment. Sequence 0 is always the header.
    pub fn new(sequence: u64, timestamp: Instant, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            sequence,
            timestamp,
            payload: payload.into(),
            is_header: sequence == Self::HEADER_SEQUENCE,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

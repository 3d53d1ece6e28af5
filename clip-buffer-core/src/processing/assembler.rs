use std::time::{Duration, Instant};

use crate::models::error::ClipError;
use crate::models::fragment::Fragment;
use crate::processing::container::ContainerBuffer;
use crate::storage::fragment_store::FragmentStore;

/// Builds standalone containers from fragment snapshots.
///
/// The header fragment must come first: it is the only fragment carrying
/// the container metadata, and data fragments are undecodable without it.
/// The store is never mutated.
pub struct ClipAssembler;

impl ClipAssembler {
    /// Assemble the trailing `requested_duration_secs` ending at `now`.
    ///
    /// If less history is retained than requested, the result is whatever
    /// remains. Fails with `InsufficientData` when no data fragment qualifies.
    pub fn assemble(
        store: &FragmentStore,
        requested_duration_secs: u32,
        now: Instant,
    ) -> Result<ContainerBuffer, ClipError> {
        Self::concatenate(Self::snapshot_for(store, requested_duration_secs, now))
    }

    /// Assemble everything the store holds.
    pub fn assemble_all(store: &FragmentStore) -> Result<ContainerBuffer, ClipError> {
        Self::concatenate(store.snapshot_all())
    }

    /// The snapshot `assemble` concatenates.
    ///
    /// Split out so callers holding a lock can copy under it and concatenate
    /// after releasing it.
    pub fn snapshot_for(store: &FragmentStore, requested_duration_secs: u32, now: Instant) -> Vec<Fragment> {
        let lookback = Duration::from_secs(u64::from(requested_duration_secs));
        match now.checked_sub(lookback) {
            Some(cutoff) => store.snapshot_since(cutoff),
            None => store.snapshot_all(),
        }
    }

    /// Concatenate a header-first snapshot into one container buffer.
    pub fn concatenate(fragments: Vec<Fragment>) -> Result<ContainerBuffer, ClipError> {
        let Some((header, data)) = fragments.split_first() else {
            return Err(ClipError::InsufficientData);
        };
        if !header.is_header {
            log::error!("snapshot starts at sequence {} instead of the header", header.sequence);
            return Err(ClipError::InsufficientData);
        }
        let (Some(first), Some(last)) = (data.first(), data.last()) else {
            return Err(ClipError::InsufficientData);
        };

        let total: usize = fragments.iter().map(Fragment::len).sum();
        let mut buffer = Vec::with_capacity(total);
        for fragment in &fragments {
            buffer.extend_from_slice(&fragment.payload);
        }

        let covered = last.timestamp.saturating_duration_since(first.timestamp);
        log::debug!(
            "assembled {} bytes from header + {} fragments (seq {}..={})",
            buffer.len(),
            data.len(),
            first.sequence,
            last.sequence
        );
        Ok(ContainerBuffer::new(buffer, data.len(), first.sequence, last.sequence, covered))
    }
}

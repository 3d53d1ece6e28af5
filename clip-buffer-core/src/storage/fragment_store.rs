use std::collections::VecDeque;
use std::time::Instant;

use crate::models::error::ClipError;
use crate::models::fragment::Fragment;

/// Append-only, time-indexed store of encoded fragments.
///
/// The header fragment (sequence 0) is held apart from the data fragments and
/// is never evicted. Data fragments are kept in ascending sequence order, which
/// is also non-decreasing timestamp order, so eviction pops from the front and
/// cutoff lookups are a binary search.
///
/// Not synchronized. The owning session wraps it in
/// `Arc<parking_lot::Mutex<FragmentStore>>`; snapshots return owned copies so
/// readers never hold references into the live store.
#[derive(Debug, Default)]
pub struct FragmentStore {
    header: Option<Fragment>,
    fragments: VecDeque<Fragment>,
    next_sequence: u64,
    last_timestamp: Option<Instant>,
    byte_len: usize,
}

impl FragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next fragment.
    ///
    /// The fragment must carry the next expected sequence number, be flagged as
    /// header exactly when it is sequence 0, and not be older than the previous
    /// fragment. Eviction never happens here.
    pub fn append(&mut self, fragment: Fragment) -> Result<(), ClipError> {
        let out_of_order = ClipError::OutOfOrderFragment {
            expected: self.next_sequence,
            actual: fragment.sequence,
        };

        if fragment.sequence != self.next_sequence {
            return Err(out_of_order);
        }
        if fragment.is_header != (fragment.sequence == Fragment::HEADER_SEQUENCE) {
            return Err(out_of_order);
        }
        if self.last_timestamp.is_some_and(|last| fragment.timestamp < last) {
            return Err(out_of_order);
        }

        self.next_sequence += 1;
        self.last_timestamp = Some(fragment.timestamp);
        self.byte_len += fragment.len();

        if fragment.is_header {
            self.header = Some(fragment);
        } else {
            self.fragments.push_back(fragment);
        }
        Ok(())
    }

    /// Remove every data fragment with `timestamp < cutoff`.
    ///
    /// Returns the number of fragments removed.
    pub fn evict_older_than(&mut self, cutoff: Instant) -> usize {
        let count = self.fragments.partition_point(|f| f.timestamp < cutoff);
        for fragment in self.fragments.drain(..count) {
            self.byte_len -= fragment.len();
        }
        count
    }

    /// Header followed by every data fragment with `timestamp >= cutoff`.
    pub fn snapshot_since(&self, cutoff: Instant) -> Vec<Fragment> {
        let start = self.fragments.partition_point(|f| f.timestamp < cutoff);
        self.collect_from(start)
    }

    /// Header followed by every retained data fragment.
    pub fn snapshot_all(&self) -> Vec<Fragment> {
        self.collect_from(0)
    }

    /// Total number of retained fragments, header included.
    pub fn len(&self) -> usize {
        self.fragments.len() + usize::from(self.header.is_some())
    }

    /// Number of retained data (non-header) fragments.
    pub fn data_len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_none() && self.fragments.is_empty()
    }

    pub fn has_header(&self) -> bool {
        self.header.is_some()
    }

    /// Sum of retained payload sizes.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Sequence number the next appended fragment must carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Drop everything, including the header, and start over at sequence 0.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn collect_from(&self, start: usize) -> Vec<Fragment> {
        let mut out = Vec::with_capacity(self.fragments.len() - start + 1);
        if let Some(header) = &self.header {
            out.push(header.clone());
        }
        out.extend(self.fragments.range(start..).cloned());
        out
    }
}

// Copyright 2025 sPyNNaker developers
// SPDX-License-Identifier: Apache-2.0

//! EventRegion - time-ordered key schedule for one (core, region) pair.
//!
//! Key semantics:
//! - Append-only while loading: timestamps never go backwards.
//! - Drain-only while running: keys leave from the earliest bucket, one at a time.
//! - A drained bucket is gone for good; the region remembers its timestamp so late
//!   appends cannot sneak in behind the cursor.

use std::collections::VecDeque;

use spynnaker_eieio::{EieioDataHeader, EieioType};

use crate::BufferError;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TimestampBucket {
    timestamp: u32,
    keys: VecDeque<u32>, // insertion order
}

/// Ordered collection of timestamp buckets, earliest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRegion {
    buckets: VecDeque<TimestampBucket>,
    last_drained: Option<u32>,
    n_keys: usize,
}

impl EventRegion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a region from `(timestamp, key)` pairs in schedule order.
    ///
    /// # Example
    /// ```
    /// use spynnaker_buffers::EventRegion;
    ///
    /// let region = EventRegion::from_schedule([(0, 1), (0, 2), (3, 7)]).unwrap();
    /// assert_eq!(region.n_keys(), 3);
    /// assert_eq!(region.n_timestamps(), 2);
    /// assert!(EventRegion::from_schedule([(3, 7), (0, 1)]).is_err());
    /// ```
    pub fn from_schedule<I>(schedule: I) -> Result<Self, BufferError>
    where
        I: IntoIterator<Item = (u32, u32)>,
    {
        let mut region = Self::new();
        for (timestamp, key) in schedule {
            region.add_key(timestamp, key)?;
        }
        Ok(region)
    }

    /// Appends `key` to the bucket for `timestamp`, creating the bucket if needed.
    ///
    /// Fails with `OutOfOrderKey` (leaving the region untouched) if `timestamp` is older
    /// than the newest bucket, or not newer than a bucket that has already been drained.
    pub fn add_key(&mut self, timestamp: u32, key: u32) -> Result<(), BufferError> {
        self.check_append(timestamp)?;
        self.bucket_for_append(timestamp).keys.push_back(key);
        self.n_keys += 1;
        Ok(())
    }

    /// Appends every key in `keys` at `timestamp`.
    pub fn add_keys<I>(&mut self, timestamp: u32, keys: I) -> Result<(), BufferError>
    where
        I: IntoIterator<Item = u32>,
    {
        self.check_append(timestamp)?;
        let mut keys = keys.into_iter().peekable();
        if keys.peek().is_none() {
            return Ok(());
        }
        let bucket = self.bucket_for_append(timestamp);
        let before = bucket.keys.len();
        bucket.keys.extend(keys);
        let added = bucket.keys.len() - before;
        self.n_keys += added;
        Ok(())
    }

    pub fn has_more(&self) -> bool {
        !self.buckets.is_empty()
    }

    /// Timestamp of the earliest remaining bucket.
    pub fn peek_timestamp(&self) -> Option<u32> {
        self.buckets.front().map(|bucket| bucket.timestamp)
    }

    /// Keys remaining at `timestamp` (0 when the bucket is absent or consumed).
    pub fn bucket_size(&self, timestamp: u32) -> usize {
        match self
            .buckets
            .binary_search_by_key(&timestamp, |bucket| bucket.timestamp)
        {
            Ok(index) => self.buckets[index].keys.len(),
            Err(_) => 0,
        }
    }

    /// Removes one key from the earliest bucket, discarding the bucket once empty.
    pub fn take_key(&mut self) -> Option<u32> {
        let bucket = self.buckets.front_mut()?;
        let key = bucket.keys.pop_front();
        if bucket.keys.is_empty() {
            let timestamp = bucket.timestamp;
            self.buckets.pop_front();
            self.last_drained = Some(timestamp);
        }
        if key.is_some() {
            self.n_keys -= 1;
        }
        key
    }

    pub fn n_keys(&self) -> usize {
        self.n_keys
    }

    pub fn n_timestamps(&self) -> usize {
        self.buckets.len()
    }

    pub fn max_key(&self) -> Option<u32> {
        self.buckets
            .iter()
            .filter_map(|bucket| bucket.keys.iter().copied().max())
            .max()
    }

    /// Timestamp of the newest bucket.
    pub fn last_timestamp(&self) -> Option<u32> {
        self.buckets.back().map(|bucket| bucket.timestamp)
    }

    /// Drops every bucket and forgets the drain cursor, ready for the next run.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.last_drained = None;
        self.n_keys = 0;
    }

    /// Bytes needed to stream the remaining schedule as timestamped packets of at most
    /// `max_packet_bytes` each.
    pub fn encoded_size(
        &self,
        eieio_type: EieioType,
        max_packet_bytes: usize,
    ) -> Result<usize, BufferError> {
        let header_bytes = EieioDataHeader::timestamped(eieio_type, 0).byte_count();
        let per_packet = EieioDataHeader::timestamped(eieio_type, 0).max_entries(max_packet_bytes);
        if per_packet == 0 {
            return Err(BufferError::InvalidSettings(format!(
                "{} bytes cannot hold a single {} entry",
                max_packet_bytes, eieio_type
            )));
        }

        Ok(self
            .buckets
            .iter()
            .map(|bucket| {
                let n = bucket.keys.len();
                n.div_ceil(per_packet) * header_bytes + n * eieio_type.element_size()
            })
            .sum())
    }

    fn check_append(&self, timestamp: u32) -> Result<(), BufferError> {
        if let Some(latest) = self.last_timestamp() {
            if timestamp < latest {
                return Err(BufferError::OutOfOrderKey {
                    latest,
                    requested: timestamp,
                });
            }
        }
        if let Some(drained) = self.last_drained {
            if timestamp <= drained {
                return Err(BufferError::OutOfOrderKey {
                    latest: drained,
                    requested: timestamp,
                });
            }
        }
        Ok(())
    }

    // Caller has already run check_append
    fn bucket_for_append(&mut self, timestamp: u32) -> &mut TimestampBucket {
        if self.last_timestamp() != Some(timestamp) {
            self.buckets.push_back(TimestampBucket {
                timestamp,
                keys: VecDeque::new(),
            });
        }
        let last = self.buckets.len() - 1;
        &mut self.buckets[last]
    }
}

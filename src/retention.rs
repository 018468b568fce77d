//! Retention Counters and ring-buffer enforcement.
//!
//! Counters are seeded once at startup from aggregate queries — `SELECT
//! COUNT(*)` scans are too slow to run on every insert, so the hot path only
//! ever touches these in-memory maps, and the Store only on an actual
//! eviction.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::ids::{ChannelId, GroupId};
use crate::store::Store;

#[derive(Default)]
pub struct RetentionCounters {
    by_channel: HashMap<ChannelId, i64>,
    by_group: HashMap<GroupId, i64>,
}

impl RetentionCounters {
    pub fn load(store: &Store) -> Result<Self, EngineError> {
        Ok(Self {
            by_channel: store.count_by_channel()?,
            by_group: store.count_by_group()?,
        })
    }

    /// Record one newly-inserted sample's effect on both counters.
    pub fn record_insert(&mut self, channel: ChannelId, group: GroupId) {
        *self.by_channel.entry(channel).or_insert(0) += 1;
        *self.by_group.entry(group).or_insert(0) += 1;
    }

    pub fn channel_count(&self, channel: ChannelId) -> i64 {
        *self.by_channel.get(&channel).unwrap_or(&0)
    }

    pub fn group_count(&self, group: GroupId) -> i64 {
        *self.by_group.get(&group).unwrap_or(&0)
    }

    /// Enforce the per-channel ring-buffer cap, if configured. On success,
    /// sets the counter to exactly `limit`. On a failed delete, the counter
    /// is left untouched so the next insertion on this channel re-attempts
    /// the eviction.
    pub fn enforce_channel_limit(
        &mut self,
        store: &Store,
        channel: ChannelId,
        limit: u32,
    ) -> Result<(), EngineError> {
        if limit == 0 {
            return Ok(());
        }
        let count = self.channel_count(channel);
        if (count as f64) > Store::ring_buffer_threshold(limit) {
            let to_delete = count - i64::from(limit);
            store.evict_oldest_by_channel(channel, to_delete)?;
            self.by_channel.insert(channel, i64::from(limit));
        }
        Ok(())
    }

    /// Same as `enforce_channel_limit` but for a group's `ValuesTotal` cap.
    pub fn enforce_group_limit(
        &mut self,
        store: &Store,
        group: GroupId,
        limit: u32,
    ) -> Result<(), EngineError> {
        if limit == 0 {
            return Ok(());
        }
        let count = self.group_count(group);
        if (count as f64) > Store::ring_buffer_threshold(limit) {
            let to_delete = count - i64::from(limit);
            store.evict_oldest_by_group(group, to_delete)?;
            self.by_group.insert(group, i64::from(limit));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_stays_within_epsilon_bound_until_threshold() {
        let store = Store::open_in_memory().unwrap();
        let device = store.insert_device("d").unwrap();
        let channel = store.insert_channel("d", "c").unwrap();
        let group = store.insert_group("g").unwrap();
        let mut counters = RetentionCounters::load(&store).unwrap();

        // Values = 100; below the ε=0.02 threshold (102) nothing is evicted.
        for i in 0..102 {
            store.insert_sample(device, channel, &i.to_string(), group).unwrap();
            counters.record_insert(channel, group);
            counters.enforce_channel_limit(&store, channel, 100).unwrap();
        }
        assert_eq!(counters.channel_count(channel), 102);
        assert_eq!(store.live_count_for_channel(channel).unwrap(), 102);

        // The 103rd insertion pushes the post-increment counter to 103,
        // which exceeds 102: eviction fires within this same call, deleting
        // the oldest 3 rows and resetting the counter to exactly 100.
        store.insert_sample(device, channel, "102", group).unwrap();
        counters.record_insert(channel, group);
        counters.enforce_channel_limit(&store, channel, 100).unwrap();
        assert_eq!(counters.channel_count(channel), 100);
        assert_eq!(store.live_count_for_channel(channel).unwrap(), 100);

        // Further insertions stay within the bound on every call.
        for i in 0..10 {
            store.insert_sample(device, channel, &format!("post-{i}"), group).unwrap();
            counters.record_insert(channel, group);
            counters.enforce_channel_limit(&store, channel, 100).unwrap();
            assert!((counters.channel_count(channel) as f64) <= Store::ring_buffer_threshold(100));
        }
    }

    #[test]
    fn group_limit_enforced_independently_of_channel_limit() {
        let store = Store::open_in_memory().unwrap();
        let device = store.insert_device("d").unwrap();
        let c1 = store.insert_channel("d", "c1").unwrap();
        let c2 = store.insert_channel("d", "c2").unwrap();
        let group = store.insert_group("g").unwrap();
        let mut counters = RetentionCounters::load(&store).unwrap();

        for i in 0..60 {
            store.insert_sample(device, c1, &i.to_string(), group).unwrap();
            counters.record_insert(c1, group);
            counters.enforce_group_limit(&store, group, 100).unwrap();
        }
        for i in 0..60 {
            store.insert_sample(device, c2, &i.to_string(), group).unwrap();
            counters.record_insert(c2, group);
            counters.enforce_group_limit(&store, group, 100).unwrap();
        }

        assert_eq!(counters.group_count(group), 100);
    }

    #[test]
    fn zero_limit_means_unbounded() {
        let store = Store::open_in_memory().unwrap();
        let device = store.insert_device("d").unwrap();
        let channel = store.insert_channel("d", "c").unwrap();
        let group = store.insert_group("g").unwrap();
        let mut counters = RetentionCounters::load(&store).unwrap();

        for i in 0..500 {
            store.insert_sample(device, channel, &i.to_string(), group).unwrap();
            counters.record_insert(channel, group);
            counters.enforce_channel_limit(&store, channel, 0).unwrap();
        }
        assert_eq!(counters.channel_count(channel), 500);
    }
}

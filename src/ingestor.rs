//! Ingestor: turns one incoming `(topic, payload)` pair into a persisted
//! sample, applying group matching, the Rate Gate, and ring-buffer
//! enforcement.

use crate::config::GroupConfig;
use crate::error::EngineError;
use crate::ids::GroupId;
use crate::rate_gate::{Clock, RateGate};
use crate::registry::Registry;
use crate::retention::RetentionCounters;
use crate::store::Store;
use crate::topic::topic_matches;

/// A configured group paired with the int id the Registry resolved for it
/// at startup.
pub struct GroupRuntime {
    pub config: GroupConfig,
    pub id: GroupId,
}

/// Split a topic into `/`-separated tokens and pull out the device name
/// (token 2) and control name (token 4), e.g. `/devices/wb-adc/controls/A1`.
/// Returns `None` if the topic is too short to contain both.
fn parse_device_control(topic: &str) -> Option<(&str, &str)> {
    let tokens: Vec<&str> = topic.split('/').collect();
    if tokens.len() < 5 {
        return None;
    }
    Some((tokens[2], tokens[4]))
}

/// Handle one incoming message end to end. Returns `Ok(())` for messages
/// that don't match any group, are too short to parse, or are suppressed by
/// the Rate Gate — none of those are errors, just no-ops. Returns `Err` only
/// when the Store itself fails, in which case the caller should surface the
/// failure upstream without having mutated the Rate Gate or counters for
/// this message.
pub fn ingest(
    store: &Store,
    groups: &[GroupRuntime],
    registry: &mut Registry,
    rate_gate: &mut RateGate,
    counters: &mut RetentionCounters,
    clock: &dyn Clock,
    topic: &str,
    payload: &str,
) -> Result<(), EngineError> {
    let Some(group) = groups
        .iter()
        .find(|g| g.config.patterns.iter().any(|pattern| topic_matches(pattern, topic)))
    else {
        return Ok(());
    };

    let Some((device_name, control_name)) = parse_device_control(topic) else {
        tracing::debug!(topic, "topic too short to contain device/control, discarding");
        return Ok(());
    };

    let channel_id = registry.resolve_channel(store, device_name, control_name)?;
    let device_id = registry.resolve_device(store, device_name)?;

    let now = clock.now();
    if rate_gate.check(
        now,
        channel_id,
        payload,
        group.config.min_interval_secs,
        group.config.min_unchanged_interval_secs,
    ) {
        return Ok(());
    }

    store.insert_sample(device_id, channel_id, payload, group.id)?;
    rate_gate.record(now, channel_id, payload);
    counters.record_insert(channel_id, group.id);

    if let Err(e) = counters.enforce_channel_limit(store, channel_id, group.config.values) {
        tracing::warn!(error = %e, %channel_id, "ring-buffer eviction failed for channel");
    }
    if let Err(e) = counters.enforce_group_limit(store, group.id, group.config.values_total) {
        tracing::warn!(error = %e, group = %group.id, "ring-buffer eviction failed for group");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_gate::SystemClock;

    fn group(name: &str, patterns: &[&str], values: u32, min_interval_secs: u32) -> GroupRuntime {
        GroupRuntime {
            config: GroupConfig {
                name: name.to_string(),
                patterns: patterns.iter().map(|s| s.to_string()).collect(),
                values,
                values_total: 0,
                min_interval_secs,
                min_unchanged_interval_secs: 0,
            },
            id: GroupId(0),
        }
    }

    fn setup(groups: &mut [GroupRuntime]) -> (Store, Registry, RateGate, RetentionCounters) {
        let store = Store::open_in_memory().unwrap();
        let (mut registry, ids) = Registry::load(&store, &groups.iter().map(|g| g.config.name.clone()).collect::<Vec<_>>()).unwrap();
        for g in groups.iter_mut() {
            g.id = ids[&g.config.name];
        }
        let rate_gate = RateGate::new();
        let counters = RetentionCounters::load(&store).unwrap();
        (store, registry, rate_gate, counters)
    }

    #[test]
    fn matching_topic_is_persisted() {
        let mut groups = vec![group("default", &["/devices/+/controls/+"], 0, 0)];
        let (store, mut registry, mut rate_gate, mut counters) = setup(&mut groups);

        ingest(
            &store,
            &groups,
            &mut registry,
            &mut rate_gate,
            &mut counters,
            &SystemClock,
            "/devices/wb-adc/controls/A1",
            "3.3",
        )
        .unwrap();

        assert_eq!(store.scan_channels().unwrap().len(), 1);
    }

    #[test]
    fn non_matching_topic_is_ignored() {
        let mut groups = vec![group("default", &["/devices/+/controls/+"], 0, 0)];
        let (store, mut registry, mut rate_gate, mut counters) = setup(&mut groups);

        ingest(
            &store,
            &groups,
            &mut registry,
            &mut rate_gate,
            &mut counters,
            &SystemClock,
            "/unrelated/topic",
            "x",
        )
        .unwrap();

        assert!(store.scan_channels().unwrap().is_empty());
    }

    #[test]
    fn too_short_topic_is_discarded_even_if_pattern_matches() {
        let mut groups = vec![group("default", &["/devices/#"], 0, 0)];
        let (store, mut registry, mut rate_gate, mut counters) = setup(&mut groups);

        ingest(
            &store,
            &groups,
            &mut registry,
            &mut rate_gate,
            &mut counters,
            &SystemClock,
            "/devices",
            "x",
        )
        .unwrap();

        assert!(store.scan_channels().unwrap().is_empty());
    }

    #[test]
    fn first_matching_group_wins() {
        let mut groups = vec![
            group("specific", &["/devices/wb-adc/controls/A1"], 0, 0),
            group("catchall", &["/devices/+/controls/+"], 0, 0),
        ];
        let (store, mut registry, mut rate_gate, mut counters) = setup(&mut groups);

        ingest(
            &store,
            &groups,
            &mut registry,
            &mut rate_gate,
            &mut counters,
            &SystemClock,
            "/devices/wb-adc/controls/A1",
            "1",
        )
        .unwrap();

        let counts = store.count_by_group().unwrap();
        assert_eq!(counts[&groups[0].id], 1);
        assert!(!counts.contains_key(&groups[1].id));
    }

    #[test]
    fn rate_gated_message_is_not_persisted() {
        let mut groups = vec![group("default", &["/devices/+/controls/+"], 0, 3600)];
        let (store, mut registry, mut rate_gate, mut counters) = setup(&mut groups);

        for _ in 0..3 {
            ingest(
                &store,
                &groups,
                &mut registry,
                &mut rate_gate,
                &mut counters,
                &SystemClock,
                "/devices/wb-adc/controls/A1",
                "1",
            )
            .unwrap();
        }

        let counts = store.count_by_group().unwrap();
        assert_eq!(counts[&groups[0].id], 1);
    }

    #[test]
    fn ring_buffer_limit_is_enforced_after_insert() {
        let mut groups = vec![group("default", &["/devices/+/controls/+"], 5, 0)];
        let (store, mut registry, mut rate_gate, mut counters) = setup(&mut groups);

        for i in 0..10 {
            ingest(
                &store,
                &groups,
                &mut registry,
                &mut rate_gate,
                &mut counters,
                &SystemClock,
                "/devices/wb-adc/controls/A1",
                &i.to_string(),
            )
            .unwrap();
        }

        let counts = store.count_by_channel().unwrap();
        let (_, channel_id) = &store.scan_channels().unwrap()[0];
        assert!(counts[channel_id] <= 5);
    }
}

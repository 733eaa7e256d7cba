//! Peak-preserving downsampling of container metric series.
//!
//! Samples are grouped per `(pod, container)`. Within a group, each window
//! of `min_interval` collapses into the single sample with the highest CPU
//! or memory seen in that window, so short spikes survive the reduction.
//! Input is expected in ascending timestamp order; see [`sort_by_timestamp`].

use crate::models::ContainerMetric;
use std::collections::HashMap;
use std::time::Duration;

/// Sort samples ascending by timestamp. Stable, so equal timestamps keep
/// their relative order.
pub fn sort_by_timestamp(samples: &mut [ContainerMetric]) {
    samples.sort_by_key(|s| s.timestamp);
}

/// Reduce `samples` to at most one sample per `min_interval` window and
/// container. Groups appear in the output in order of first appearance.
pub fn reduce_metrics(samples: &[ContainerMetric], min_interval: Duration) -> Vec<ContainerMetric> {
    let interval_ms = i64::try_from(min_interval.as_millis()).unwrap_or(i64::MAX);

    let mut order: Vec<(&str, &str)> = Vec::new();
    let mut groups: HashMap<(&str, &str), Vec<&ContainerMetric>> = HashMap::new();
    for sample in samples {
        let id = (sample.pod_name.as_str(), sample.container_name.as_str());
        groups
            .entry(id)
            .or_insert_with(|| {
                order.push(id);
                Vec::new()
            })
            .push(sample);
    }

    let mut reduced = Vec::new();
    for id in order {
        let Some((first, rest)) = groups.get(&id).and_then(|g| g.split_first()) else {
            continue;
        };

        let mut window_start = first.timestamp;
        let mut candidate = *first;
        for &sample in rest {
            let elapsed_ms = (sample.timestamp - window_start).num_milliseconds();
            if elapsed_ms > interval_ms {
                reduced.push(candidate.clone());
                window_start = sample.timestamp;
                candidate = sample;
            } else if sample.cpu_usage > candidate.cpu_usage
                || sample.memory_usage > candidate.memory_usage
            {
                candidate = sample;
            }
        }
        reduced.push(candidate.clone());
    }

    reduced
}

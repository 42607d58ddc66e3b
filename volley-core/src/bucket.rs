use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use crate::aggregate::SecondAggregate;
use crate::instances::InstanceCounts;
use crate::record::RequestRecord;

/// Groups request records into per-second buckets keyed by completion time.
///
/// Seconds are held back until more than `buffered_seconds` are pending, so
/// records that arrive slightly out of order still land in the right bucket.
/// Keys in the pending queue are strictly increasing.
#[derive(Debug)]
pub struct SecondBucketAggregator {
    buffered_seconds: usize,
    queue: VecDeque<i64>,
    buckets: HashMap<i64, Vec<RequestRecord>>,
    instances: InstanceCounts,
    last_key: Option<i64>,
    first_request_time: Option<f64>,
    late_records: u64,
}

impl SecondBucketAggregator {
    pub fn new(buffered_seconds: usize) -> Self {
        Self {
            buffered_seconds,
            queue: VecDeque::new(),
            buckets: HashMap::new(),
            instances: InstanceCounts::new(),
            last_key: None,
            first_request_time: None,
            late_records: 0,
        }
    }

    pub fn buffered_seconds(&self) -> usize {
        self.buffered_seconds
    }

    pub fn instances_mut(&mut self) -> &mut InstanceCounts {
        &mut self.instances
    }

    pub fn pending_seconds(&self) -> usize {
        self.queue.len()
    }

    /// Earliest request start seen so far.
    pub fn first_request_time(&self) -> Option<f64> {
        self.first_request_time
    }

    /// Records attributed to a later second than their completion time.
    pub fn late_records(&self) -> u64 {
        self.late_records
    }

    pub fn push(&mut self, mut record: RequestRecord) {
        let completed = record.completion_second();
        record.active_instances = self.instances.get(completed).unwrap_or(0);

        self.first_request_time = Some(match self.first_request_time {
            Some(t) => t.min(record.start_epoch),
            None => record.start_epoch,
        });

        let Some(key) = self.bucket_for(completed) else {
            return;
        };
        self.buckets.entry(key).or_default().push(record);
    }

    fn bucket_for(&mut self, completed: i64) -> Option<i64> {
        if self.buckets.contains_key(&completed) {
            return Some(completed);
        }

        match self.last_key {
            Some(last) if completed <= last => {
                self.late_records += 1;
                match self.queue.back() {
                    Some(&open) => {
                        warn!(
                            second = completed,
                            bucket = open,
                            "record arrived after its second; attributing it to the newest open second"
                        );
                        Some(open)
                    }
                    None => {
                        // Every second up to `last` has already been emitted.
                        let Some(next) = last.checked_add(1) else {
                            warn!(
                                second = completed,
                                last_emitted = last,
                                "record arrived after the last representable second; dropped"
                            );
                            return None;
                        };
                        warn!(
                            second = completed,
                            bucket = next,
                            "record arrived after its second was emitted; opening the next second"
                        );
                        self.open(next);
                        Some(next)
                    }
                }
            }
            _ => {
                self.open(completed);
                Some(completed)
            }
        }
    }

    fn open(&mut self, key: i64) {
        self.queue.push_back(key);
        self.buckets.insert(key, Vec::new());
        self.last_key = Some(key);
    }

    /// Finalizes the oldest pending second once the stabilization window is
    /// exceeded, or unconditionally when `force` is set.
    pub fn pop_ready(&mut self, force: bool) -> Option<SecondAggregate> {
        if self.queue.len() <= self.buffered_seconds && !force {
            return None;
        }

        let key = self.queue.pop_front()?;
        let records = self.buckets.remove(&key).unwrap_or_default();
        let active = match self.instances.get(key) {
            Some(v) => v,
            None => {
                debug!(second = key, "no active instances info for second");
                0
            }
        };
        self.instances.forget_before(key);

        debug!(second = key, rps = records.len(), "second finalized");
        Some(SecondAggregate::from_records(key, &records, active))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: f64, overall_us: u64) -> RequestRecord {
        RequestRecord {
            start_epoch: start,
            tag: String::new(),
            overall_us,
            connect_us: 0,
            send_us: 0,
            latency_us: 0,
            receive_us: 0,
            interval_event_us: overall_us,
            bytes_sent: 0,
            bytes_received: 0,
            net_code: 0,
            http_code: 200,
            active_instances: 0,
        }
    }

    fn drain(agg: &mut SecondBucketAggregator, force: bool) -> Vec<(i64, u64)> {
        let mut out = Vec::new();
        while let Some(s) = agg.pop_ready(force) {
            out.push((s.timestamp, s.overall.rps));
        }
        out
    }

    #[test]
    fn withholds_until_window_exceeded() {
        let mut agg = SecondBucketAggregator::new(2);
        agg.push(record(10.0, 0));
        agg.push(record(11.0, 0));
        assert!(agg.pop_ready(false).is_none());

        agg.push(record(12.0, 0));
        assert_eq!(drain(&mut agg, false), vec![(10, 1)]);
        assert_eq!(agg.pending_seconds(), 2);

        assert_eq!(drain(&mut agg, true), vec![(11, 1), (12, 1)]);
        assert!(agg.pop_ready(true).is_none());
    }

    #[test]
    fn buckets_by_completion_time() {
        let mut agg = SecondBucketAggregator::new(0);
        agg.push(record(10.9, 200_000));
        agg.push(record(11.5, 0));
        assert_eq!(drain(&mut agg, true), vec![(11, 2)]);
    }

    #[test]
    fn out_of_order_within_window_keeps_its_bucket() {
        let mut agg = SecondBucketAggregator::new(3);
        agg.push(record(10.0, 0));
        agg.push(record(11.0, 0));
        agg.push(record(10.5, 0));
        assert_eq!(agg.late_records(), 0);
        assert_eq!(drain(&mut agg, true), vec![(10, 2), (11, 1)]);
    }

    #[test]
    fn late_record_is_clamped_to_newest_open_second() {
        let mut agg = SecondBucketAggregator::new(0);
        agg.push(record(10.0, 0));
        agg.push(record(12.0, 0));
        assert_eq!(agg.pop_ready(false).map(|s| s.timestamp), Some(10));

        agg.push(record(11.0, 0));
        assert_eq!(agg.late_records(), 1);
        assert_eq!(drain(&mut agg, true), vec![(12, 2)]);
    }

    #[test]
    fn late_record_after_everything_emitted_opens_next_second() {
        let mut agg = SecondBucketAggregator::new(0);
        agg.push(record(10.0, 0));
        assert_eq!(drain(&mut agg, true), vec![(10, 1)]);

        agg.push(record(9.0, 0));
        assert_eq!(drain(&mut agg, true), vec![(11, 1)]);
    }

    #[test]
    fn late_record_after_last_representable_second_is_dropped() {
        let mut agg = SecondBucketAggregator::new(0);
        agg.push(record(1e30, 0));
        assert_eq!(drain(&mut agg, true), vec![(i64::MAX, 1)]);

        agg.push(record(9.0, 0));
        assert_eq!(agg.late_records(), 1);
        assert_eq!(agg.pending_seconds(), 0);
        assert!(agg.pop_ready(true).is_none());
    }

    #[test]
    fn emitted_keys_strictly_increase_for_shuffled_input() {
        let starts = [5.0, 3.0, 7.0, 7.5, 2.0, 9.0, 8.0, 8.9, 12.0, 4.0, 13.0, 12.5];
        let mut agg = SecondBucketAggregator::new(1);
        let mut keys = Vec::new();
        let mut total = 0;
        for s in starts {
            agg.push(record(s, 0));
            while let Some(sec) = agg.pop_ready(false) {
                keys.push(sec.timestamp);
                total += sec.overall.rps;
            }
        }
        while let Some(sec) = agg.pop_ready(true) {
            keys.push(sec.timestamp);
            total += sec.overall.rps;
        }

        assert!(keys.windows(2).all(|w| w[0] < w[1]), "{keys:?}");
        assert_eq!(total, starts.len() as u64);
    }

    #[test]
    fn merges_active_instances() {
        let mut agg = SecondBucketAggregator::new(0);
        for line in ["time\t10", "tasks\t4", "tasks\t5"] {
            agg.instances_mut()
                .feed_line(line)
                .unwrap_or_else(|e| panic!("{e}"));
        }
        agg.push(record(10.0, 0));
        agg.push(record(11.0, 0));

        let first = agg.pop_ready(true).unwrap_or_else(|| panic!("expected a second"));
        assert_eq!(first.overall.active_instances, 9);
        let second = agg.pop_ready(true).unwrap_or_else(|| panic!("expected a second"));
        assert_eq!(second.overall.active_instances, 0);
    }

    #[test]
    fn tracks_first_request_time() {
        let mut agg = SecondBucketAggregator::new(5);
        agg.push(record(12.5, 0));
        agg.push(record(11.25, 0));
        assert_eq!(agg.first_request_time(), Some(11.25));
    }
}

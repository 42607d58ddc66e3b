use std::collections::BTreeMap;

use crate::record::RequestRecord;

/// Second-level figures shared by every consumer of the aggregate stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverallStats {
    /// Requests completed in this second.
    pub rps: u64,
    /// Mean accuracy ratio, percent.
    pub selfload: f64,
    pub active_instances: u64,
    /// Requests the load schedule planned for this second.
    pub planned_requests: u64,

    pub avg_response_ms: f64,
    pub avg_connect_ms: f64,
    pub avg_send_ms: f64,
    pub avg_latency_ms: f64,
    pub avg_receive_ms: f64,
    pub max_response_ms: u64,

    pub bytes_sent: u64,
    pub bytes_received: u64,

    pub http_codes: BTreeMap<i32, u64>,
    pub net_codes: BTreeMap<i32, u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecondAggregate {
    /// Epoch second.
    pub timestamp: i64,
    pub overall: OverallStats,
    /// Requests per tag.
    pub tags: BTreeMap<String, u64>,
    /// Inserted to keep the stream gap-free; no requests completed in it.
    pub synthetic: bool,
}

impl SecondAggregate {
    pub fn from_records(timestamp: i64, records: &[RequestRecord], active_instances: u64) -> Self {
        let mut overall = OverallStats {
            rps: records.len() as u64,
            active_instances,
            ..OverallStats::default()
        };
        let mut tags = BTreeMap::new();

        if records.is_empty() {
            return Self {
                timestamp,
                overall,
                tags,
                synthetic: false,
            };
        }

        let mut accuracy = 0.0;
        let (mut overall_us, mut connect, mut send, mut latency, mut receive) =
            (0u64, 0u64, 0u64, 0u64, 0u64);

        for r in records {
            accuracy += r.accuracy();
            overall_us = overall_us.saturating_add(r.overall_us);
            connect = connect.saturating_add(r.connect_us);
            send = send.saturating_add(r.send_us);
            latency = latency.saturating_add(r.latency_us);
            receive = receive.saturating_add(r.receive_us);

            overall.max_response_ms = overall.max_response_ms.max(r.overall_ms());
            overall.bytes_sent = overall.bytes_sent.saturating_add(r.bytes_sent);
            overall.bytes_received = overall.bytes_received.saturating_add(r.bytes_received);
            *overall.http_codes.entry(r.http_code).or_insert(0) += 1;
            *overall.net_codes.entry(r.net_code).or_insert(0) += 1;
            *tags.entry(r.tag.clone()).or_insert(0) += 1;
        }

        let n = records.len() as f64;
        let avg_ms = |total_us: u64| total_us as f64 / n / 1000.0;
        overall.selfload = 100.0 * accuracy / n;
        overall.avg_response_ms = avg_ms(overall_us);
        overall.avg_connect_ms = avg_ms(connect);
        overall.avg_send_ms = avg_ms(send);
        overall.avg_latency_ms = avg_ms(latency);
        overall.avg_receive_ms = avg_ms(receive);

        Self {
            timestamp,
            overall,
            tags,
            synthetic: false,
        }
    }

    /// An all-zero second used to fill gaps in the stream.
    pub fn zero(timestamp: i64) -> Self {
        Self {
            timestamp,
            overall: OverallStats::default(),
            tags: BTreeMap::new(),
            synthetic: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_phout_line;

    fn record(line: &str) -> RequestRecord {
        parse_phout_line(line).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn summarizes_records() {
        let records = vec![
            record("1000.1\ta\t2000\t100\t200\t1500\t200\t2000\t10\t100\t0\t200"),
            record("1000.2\tb\t4000\t300\t400\t2500\t800\t1999\t20\t300\t110\t0"),
            record("1000.3\ta\t3000\t200\t300\t2000\t500\t3000\t30\t200\t0\t200"),
        ];
        let agg = SecondAggregate::from_records(1000, &records, 7);

        assert_eq!(agg.overall.rps, 3);
        assert_eq!(agg.overall.active_instances, 7);
        assert!(!agg.synthetic);
        assert!((agg.overall.avg_response_ms - 3.0).abs() < 1e-9);
        assert!((agg.overall.avg_connect_ms - 0.2).abs() < 1e-9);
        assert_eq!(agg.overall.max_response_ms, 4);
        assert_eq!(agg.overall.bytes_sent, 60);
        assert_eq!(agg.overall.bytes_received, 600);
        assert_eq!(agg.overall.http_codes.get(&200), Some(&2));
        assert_eq!(agg.overall.http_codes.get(&0), Some(&1));
        assert_eq!(agg.overall.net_codes.get(&110), Some(&1));
        assert_eq!(agg.tags.get("a"), Some(&2));
        assert_eq!(agg.tags.get("b"), Some(&1));

        let expected = 100.0 * (2001.0 / 2001.0 + 2000.0 / 4001.0 + 3001.0 / 3001.0) / 3.0;
        assert!((agg.overall.selfload - expected).abs() < 1e-9);
    }

    #[test]
    fn zero_second_is_synthetic_and_empty() {
        let z = SecondAggregate::zero(5);
        assert!(z.synthetic);
        assert_eq!(z.overall, OverallStats::default());
        assert!(z.tags.is_empty());
    }
}

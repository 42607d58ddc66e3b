use tracing::{debug, warn};

use crate::aggregate::SecondAggregate;
use crate::bucket::SecondBucketAggregator;
use crate::config::GeneratorInfo;
use crate::error::Result;
use crate::gap::GapFiller;
use crate::record::{LineError, parse_phout_line};
use crate::schedule::LoadSchedule;
use crate::tail::{LineChunker, MAX_CHUNK_BYTES, TailFile};

/// Upper bound on seconds returned by one [`ResultReader::poll`]; a longer gap
/// keeps filling on the following polls.
pub const MAX_SECONDS_PER_POLL: usize = 1024;

/// Turns the generator's result and stat streams into a gap-free, schedule-annotated
/// series of per-second aggregates.
#[derive(Debug)]
pub struct ResultReader {
    phout: TailFile,
    phout_lines: LineChunker,
    stat: Option<(TailFile, LineChunker)>,
    aggregator: SecondBucketAggregator,
    gaps: GapFiller,
    schedule: LoadSchedule,
    lines_read: u64,
    malformed_lines: u64,
}

impl ResultReader {
    pub fn new(info: &GeneratorInfo, buffered_seconds: usize) -> Self {
        Self {
            phout: TailFile::new(&info.phout_file),
            phout_lines: LineChunker::new(),
            stat: info
                .stat_log
                .as_ref()
                .map(|p| (TailFile::new(p), LineChunker::new())),
            aggregator: SecondBucketAggregator::new(buffered_seconds),
            gaps: GapFiller::new(),
            schedule: LoadSchedule::new(info.steps.iter().copied()),
            lines_read: 0,
            malformed_lines: 0,
        }
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub fn malformed_lines(&self) -> u64 {
        self.malformed_lines
    }

    pub fn late_records(&self) -> u64 {
        self.aggregator.late_records()
    }

    pub fn first_request_time(&self) -> Option<f64> {
        self.aggregator.first_request_time()
    }

    pub fn buffered_seconds(&self) -> usize {
        self.aggregator.buffered_seconds()
    }

    /// Reads what is available and returns up to [`MAX_SECONDS_PER_POLL`] seconds
    /// that became final.
    ///
    /// `force` drains pending seconds regardless of the stabilization window.
    pub fn poll(&mut self, force: bool) -> Result<Vec<SecondAggregate>> {
        self.read_stat()?;

        // Avoid reading far ahead of what can be emitted; a zero window still reads.
        let depth = (self.aggregator.buffered_seconds() * 2).max(1);
        if self.aggregator.pending_seconds() < depth || force {
            let chunk = self.phout.read_chunk(MAX_CHUNK_BYTES)?;
            self.ingest(&chunk);
        }

        Ok(std::iter::from_fn(|| self.next_second(force))
            .take(MAX_SECONDS_PER_POLL)
            .collect())
    }

    /// Reads the result stream to its current end and yields every pending second.
    ///
    /// The seconds are produced lazily, so a large gap is never materialized.
    pub fn finish(&mut self) -> Result<impl Iterator<Item = SecondAggregate> + '_> {
        self.read_to_end()?;
        Ok(std::iter::from_fn(move || self.next_second(true)))
    }

    /// Reads the stat log and the result stream to their current ends.
    pub fn read_to_end(&mut self) -> Result<()> {
        self.read_stat()?;
        loop {
            let chunk = self.phout.read_chunk(MAX_CHUNK_BYTES)?;
            if chunk.is_empty() {
                break;
            }
            self.ingest(&chunk);
        }

        if !self.phout_lines.pending().is_empty() {
            warn!(
                bytes = self.phout_lines.pending().len(),
                "discarding unterminated trailing line"
            );
        }

        Ok(())
    }

    fn read_stat(&mut self) -> Result<()> {
        let Some((file, lines)) = self.stat.as_mut() else {
            return Ok(());
        };

        loop {
            let chunk = file.read_chunk(MAX_CHUNK_BYTES)?;
            if chunk.is_empty() {
                return Ok(());
            }
            for line in lines.push(&chunk) {
                self.aggregator.instances_mut().feed_line(&line)?;
            }
        }
    }

    fn ingest(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }

        let lines = self.phout_lines.push(chunk);
        debug!(lines = lines.len(), "processing result lines");

        for line in lines {
            match parse_phout_line(&line) {
                Ok(record) => {
                    self.lines_read += 1;
                    self.aggregator.push(record);
                }
                Err(LineError::Empty) => {
                    warn!("empty result line");
                }
                Err(err) => {
                    self.lines_read += 1;
                    self.malformed_lines += 1;
                    warn!(%err, line = %line, "malformed result line, skipped");
                }
            }
        }
    }

    /// Next gap-free, schedule-annotated second, if one is final.
    pub fn next_second(&mut self, force: bool) -> Option<SecondAggregate> {
        loop {
            if let Some(mut second) = self.gaps.next_second() {
                second.overall.planned_requests = self.schedule.next_planned();
                return Some(second);
            }
            let ready = self.aggregator.pop_ready(force)?;
            self.gaps.push(ready);
        }
    }
}

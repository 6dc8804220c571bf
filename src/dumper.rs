use crate::{
    batch::BatchAccumulator,
    transform::PointTransformer,
};
use statistics_dumper_queue::{
    ConsumeError,
    Connector,
    HttpRefresher,
    QueueConsumer,
    QueueError,
    TokenRefresher,
};
use statistics_dumper_store::{
    InfluxClient,
    SchemaSetupError,
    SeriesStore,
    StoreWriter,
};
use std::time::Duration;

/// Errors that stop the dumper. Everything else is logged and skipped.
#[derive(thiserror::Error, Debug)]
pub enum DumperError {
    #[error("store schema setup failed")]
    Schema(#[from] SchemaSetupError),
    #[error("statistics queue unavailable")]
    Queue(#[from] QueueError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub samples: u64,
    pub decode_errors: u64,
    pub points: u64,
    pub batches_written: u64,
    pub batches_dropped: u64,
}

/// The consume, transform, batch and flush loop.
pub struct Dumper<C: Connector, R = HttpRefresher, S = InfluxClient> {
    consumer: QueueConsumer<C, R>,
    transformer: PointTransformer,
    accumulator: BatchAccumulator,
    writer: StoreWriter<S>,
    pop_timeout: Duration,
    stats: PipelineStats,
}

impl<C, R, S> Dumper<C, R, S>
where
    C: Connector,
    R: TokenRefresher,
    S: SeriesStore,
{
    pub fn new(
        consumer: QueueConsumer<C, R>,
        transformer: PointTransformer,
        writer: StoreWriter<S>,
        batch_size: usize,
        pop_timeout: Duration,
    ) -> Self {
        Self {
            consumer,
            transformer,
            accumulator: BatchAccumulator::new(batch_size),
            writer,
            pop_timeout,
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Points collected but not yet written.
    pub fn pending(&self) -> usize {
        self.accumulator.len()
    }

    /// Set up the schema, then pump until a fatal error.
    pub async fn run(&mut self) -> Result<(), DumperError> {
        self.writer.ensure_schema().await?;
        info!(
            database = %self.writer.database(),
            queues = ?self.consumer.queues().as_slice(),
            batch_size = self.accumulator.capacity(),
            "dumping statistics"
        );
        loop {
            self.pump().await?;
        }
    }

    /// One read from the queue. Flushes when the batch fills up or the read comes back empty.
    pub async fn pump(&mut self) -> Result<(), DumperError> {
        match self.consumer.next(self.pop_timeout).await {
            Ok(Some((origin, sample))) => {
                self.stats.samples += 1;
                trace!(origin = origin.as_str(), key = %sample.key, "sample");
                for point in self.transformer.transform(origin, sample) {
                    self.stats.points += 1;
                    self.accumulate(point).await;
                }
            }
            Ok(None) => {
                if !self.accumulator.is_empty() {
                    self.flush().await;
                }
            }
            Err(ConsumeError::Decode { queue, source }) => {
                self.stats.decode_errors += 1;
                warn!(%queue, error = %source, "dropping undecodable sample");
            }
            Err(ConsumeError::Connection(err)) => {
                error!(error = %err, "lost the statistics queue");
                return Err(err.into());
            }
        }
        Ok(())
    }

    async fn accumulate(&mut self, point: statistics_dumper_store::DerivedPoint) {
        let mut point = point;
        while let Err(rejected) = self.accumulator.add(point) {
            self.flush().await;
            point = rejected;
        }
        if self.accumulator.is_full() {
            self.flush().await;
        }
    }

    /// Write out the current batch. A failed write loses the batch.
    async fn flush(&mut self) {
        let batch = self.accumulator.drain();
        let points = batch.len();
        match self.writer.flush(batch).await {
            Ok(()) => self.stats.batches_written += 1,
            Err(err) => {
                self.stats.batches_dropped += 1;
                error!(database = %err.database, points, error = %err.source, "dropping batch");
            }
        }
        debug!(stats = ?self.stats, "flushed");
    }
}

//! Pipeline orchestration
//!
//! A dispatcher pulls records from the input channel and spawns one task per
//! record, with at most `max_in_flight` evaluating at once. A collector
//! awaits the tasks in input order and writes each result as soon as it and
//! every earlier result are settled.

use sluice_query::Mapping;
use sluice_value::{Message, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

use crate::config::{DEFAULT_BUFFER_SIZE, DEFAULT_MAX_IN_FLIGHT, PipelineConfig};
use crate::io::{self, MessageWriter, Record};
use crate::policies::ERROR_METADATA_KEY;
use crate::{Error, ErrorPolicy, Result};

/// Statistics for a pipeline run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PipelineStats {
    /// Records read from the input
    pub received: usize,
    /// Messages written to the output
    pub succeeded: usize,
    /// Messages a mapping filtered out
    pub filtered: usize,
    /// Messages whose processing failed
    pub failed: usize,
    /// Wall time of the processing stage
    pub duration: Duration,
}

impl PipelineStats {
    /// Get success rate as percentage of processed messages
    pub fn success_rate(&self) -> f64 {
        let total = self.succeeded + self.filtered + self.failed;
        if total == 0 {
            100.0
        } else {
            ((self.succeeded + self.filtered) as f64 / total as f64) * 100.0
        }
    }
}

/// Result of a pipeline run.
///
/// `outputs` and `errors` only hold messages for memory outputs. Messages
/// sent to files or stdout are written as they are produced and not kept.
#[derive(Debug, Default, Clone)]
pub struct RunReport {
    /// Processed messages, in input order
    pub outputs: Vec<Message>,
    /// Failed messages collected by [`ErrorPolicy::Route`], in input order
    pub errors: Vec<Message>,
    pub stats: PipelineStats,
}

enum Outcome {
    Output(Message),
    Filtered,
    Failed { original: Message, error: String },
}

/// A set of mappings applied in sequence to every message
#[derive(Debug, Clone)]
pub struct Pipeline {
    processors: Arc<[Mapping]>,
    max_in_flight: usize,
    buffer_size: usize,
    error_policy: ErrorPolicy,
}

impl Pipeline {
    /// Create a pipeline with default concurrency and the drop policy
    pub fn new(processors: Vec<Mapping>) -> Self {
        Self {
            processors: processors.into(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            error_policy: ErrorPolicy::default(),
        }
    }

    /// Build a pipeline from configuration, compiling its mappings
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(config.load_processors()?)
            .with_max_in_flight(config.pipeline.max_in_flight)
            .with_buffer_size(config.pipeline.buffer_size)
            .with_error_policy(config.error_policy))
    }

    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    #[must_use]
    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    /// Apply every processor to one message.
    ///
    /// Returns `Ok(None)` as soon as a processor filters the message.
    pub fn process_message(&self, message: Message) -> sluice_query::Result<Option<Message>> {
        apply_all(&self.processors, message)
    }

    /// Process messages concurrently
    pub async fn process(&self, messages: Vec<Message>) -> Result<RunReport> {
        self.process_records(messages.into_iter().map(Record::Parsed).collect())
            .await
    }

    /// Process input records concurrently, collecting the results in
    /// memory. Malformed records count as failures and are subject to the
    /// error policy.
    pub async fn process_records(&self, records: Vec<Record>) -> Result<RunReport> {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let feed = async move {
            for record in records {
                if tx.send(record).await.is_err() {
                    break;
                }
            }
        };

        let mut outputs = MessageWriter::memory();
        let mut errors = MessageWriter::memory();
        let ((), processed) = tokio::join!(feed, self.process_channel(rx, &mut outputs, &mut errors));
        let stats = processed?;

        Ok(RunReport {
            outputs: outputs.finish().await?,
            errors: errors.finish().await?,
            stats,
        })
    }

    /// Process records until the channel closes, writing results to
    /// `output` and routed failures to `errors` in input order.
    ///
    /// On a fatal failure the records still in flight are aborted and the
    /// receiver is dropped, which stops the producer.
    pub async fn process_channel(
        &self,
        mut records: mpsc::Receiver<Record>,
        output: &mut MessageWriter,
        errors: &mut MessageWriter,
    ) -> Result<PipelineStats> {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let (handle_tx, mut handle_rx) = mpsc::channel::<JoinHandle<Outcome>>(self.max_in_flight);
        let processors = Arc::clone(&self.processors);

        let dispatch = async move {
            let mut received = 0;
            loop {
                let record = tokio::select! {
                    record = records.recv() => record,
                    () = handle_tx.closed() => None,
                };
                let Some(record) = record else {
                    break;
                };
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                received += 1;
                let processors = Arc::clone(&processors);
                let handle = tokio::spawn(async move {
                    let outcome = evaluate(&processors, record);
                    drop(permit);
                    outcome
                });
                if let Err(mpsc::error::SendError(handle)) = handle_tx.send(handle).await {
                    handle.abort();
                    break;
                }
            }
            received
        };

        let collect = async {
            let mut stats = PipelineStats::default();
            let mut index = 0;
            while let Some(handle) = handle_rx.recv().await {
                if let Err(e) = self.settle(index, handle, output, errors, &mut stats).await {
                    handle_rx.close();
                    while let Ok(remaining) = handle_rx.try_recv() {
                        remaining.abort();
                    }
                    return Err(e);
                }
                index += 1;
            }
            Ok(stats)
        };

        let (received, collected) = tokio::join!(dispatch, collect);
        let mut stats = collected?;
        stats.received = received;
        stats.duration = started.elapsed();
        Ok(stats)
    }

    async fn settle(
        &self,
        index: usize,
        handle: JoinHandle<Outcome>,
        output: &mut MessageWriter,
        errors: &mut MessageWriter,
        stats: &mut PipelineStats,
    ) -> Result<()> {
        let outcome = handle
            .await
            .map_err(|e| Error::processing(index, format!("task failed: {e}")))?;
        match outcome {
            Outcome::Output(message) => {
                output.write(message).await?;
                stats.succeeded += 1;
            }
            Outcome::Filtered => {
                tracing::debug!(index, "Message filtered");
                stats.filtered += 1;
            }
            Outcome::Failed { original, error } => {
                stats.failed += 1;
                match self.error_policy {
                    ErrorPolicy::Drop => {
                        tracing::warn!(index, %error, "Dropping failed message");
                    }
                    ErrorPolicy::Route => {
                        tracing::warn!(index, %error, "Routing failed message");
                        errors
                            .write(original.with_metadata(ERROR_METADATA_KEY, error))
                            .await?;
                    }
                    ErrorPolicy::Fail => {
                        tracing::warn!(index, %error, "Aborting run on failed message");
                        return Err(Error::processing(index, error));
                    }
                }
            }
        }
        Ok(())
    }

    /// Stream the configured input through the processors into the
    /// configured outputs.
    ///
    /// Results are written as they settle, so a run stopped by
    /// [`ErrorPolicy::Fail`] leaves every output preceding the failure
    /// written and flushed.
    pub async fn run(&self, config: &PipelineConfig) -> Result<RunReport> {
        tracing::info!(
            processors = self.processors.len(),
            max_in_flight = self.max_in_flight,
            buffer_size = self.buffer_size,
            policy = ?self.error_policy,
            "Starting pipeline"
        );

        let (records, reader) = io::open_input(config, self.buffer_size).await?;
        let mut output = MessageWriter::open(config, &config.output).await?;
        let mut errors = match &config.error_output {
            Some(error_output) => MessageWriter::open(config, error_output).await?,
            None => MessageWriter::memory(),
        };

        let processed = self.process_channel(records, &mut output, &mut errors).await;
        let outputs = output.finish().await;
        let routed = errors.finish().await;
        let stats = match processed {
            Ok(stats) => stats,
            Err(e) => {
                reader.abort();
                return Err(e);
            }
        };
        reader
            .await
            .map_err(|e| Error::io("read input", "<reader>", e.to_string()))??;

        let report = RunReport {
            outputs: outputs?,
            errors: routed?,
            stats,
        };
        tracing::info!(
            received = report.stats.received,
            succeeded = report.stats.succeeded,
            filtered = report.stats.filtered,
            failed = report.stats.failed,
            elapsed_ms = report.stats.duration.as_millis() as u64,
            "Pipeline finished"
        );
        Ok(report)
    }
}

fn apply_all(processors: &[Mapping], message: Message) -> sluice_query::Result<Option<Message>> {
    let mut current = message;
    for mapping in processors {
        match mapping.apply(&current)? {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

fn evaluate(processors: &[Mapping], record: Record) -> Outcome {
    match record {
        Record::Parsed(message) => match apply_all(processors, message.clone()) {
            Ok(Some(output)) => Outcome::Output(output),
            Ok(None) => Outcome::Filtered,
            Err(e) => Outcome::Failed {
                original: message,
                error: e.to_string(),
            },
        },
        Record::Malformed { raw, error } => Outcome::Failed {
            original: Message::new(Value::String(raw)),
            error,
        },
    }
}

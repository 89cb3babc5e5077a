//! Message inputs and outputs
//!
//! Inputs are read by a background task that feeds a bounded channel, so a
//! run holds at most the channel's capacity of unread records in memory.
//! Outputs are written one message at a time as results become available.

use sluice_value::{Message, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{InputConfig, OutputConfig, PipelineConfig};
use crate::{Error, Result};

/// One input item
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A message ready for processing
    Parsed(Message),
    /// An input line that could not be decoded
    Malformed { raw: String, error: String },
}

impl Record {
    /// Decode one line of newline-delimited JSON
    pub fn from_line(line: &str) -> Self {
        match Message::from_json_line(line) {
            Ok(message) => Self::Parsed(message),
            Err(e) => Self::Malformed {
                raw: line.to_string(),
                error: e.to_string(),
            },
        }
    }
}

/// Background task feeding input records into a channel
pub type InputTask = JoinHandle<Result<()>>;

/// Open the configured input and start reading it in the background.
///
/// At most `buffer` records wait in the channel. The reader stops early when
/// the receiver is dropped. Read errors surface through the returned task.
pub async fn open_input(
    config: &PipelineConfig,
    buffer: usize,
) -> Result<(mpsc::Receiver<Record>, InputTask)> {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let task = match &config.input {
        InputConfig::JsonLines { path } => {
            let path = config.resolve(path);
            let source = path.display().to_string();
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| Error::io("read input", source.clone(), e.to_string()))?;
            tokio::spawn(async move { forward_lines(BufReader::new(file), &source, tx).await })
        }
        InputConfig::Stdin => tokio::spawn(async move {
            forward_lines(BufReader::new(tokio::io::stdin()), "<stdin>", tx).await
        }),
        InputConfig::Memory { messages } => {
            let messages = messages.clone();
            tokio::spawn(async move {
                for payload in messages {
                    let record = Record::Parsed(Message::new(Value::from(payload)));
                    if tx.send(record).await.is_err() {
                        break;
                    }
                }
                Ok(())
            })
        }
    };
    Ok((rx, task))
}

/// Decode newline-delimited JSON from `reader` into `records`, skipping
/// blank lines
pub async fn forward_lines<R>(reader: R, source: &str, records: mpsc::Sender<Record>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| Error::io("read input", source, e.to_string()))?
    {
        if line.trim().is_empty() {
            continue;
        }
        if records.send(Record::from_line(&line)).await.is_err() {
            tracing::debug!(source, "Input receiver closed, stopping reader");
            break;
        }
    }
    Ok(())
}

enum Sink {
    Memory(Vec<Message>),
    Stream(Box<dyn AsyncWrite + Send + Unpin>),
}

/// Destination for processed messages, written one line at a time
pub struct MessageWriter {
    sink: Sink,
    target: String,
    flush_each: bool,
    written: usize,
}

impl std::fmt::Debug for MessageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageWriter")
            .field("target", &self.target)
            .field("written", &self.written)
            .finish()
    }
}

impl MessageWriter {
    /// Keep messages in memory; they are returned by [`MessageWriter::finish`]
    pub fn memory() -> Self {
        Self {
            sink: Sink::Memory(Vec::new()),
            target: "<memory>".to_string(),
            flush_each: false,
            written: 0,
        }
    }

    /// Write newline-delimited JSON to `writer`, flushing after every line
    pub fn stream<W>(writer: W, target: impl Into<String>) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            sink: Sink::Stream(Box::new(writer)),
            target: target.into(),
            flush_each: true,
            written: 0,
        }
    }

    /// Open a configured output. Files are created (or truncated) here.
    pub async fn open(config: &PipelineConfig, output: &OutputConfig) -> Result<Self> {
        match output {
            OutputConfig::JsonLines { path } => {
                let path = config.resolve(path);
                let target = path.display().to_string();
                let file = tokio::fs::File::create(&path)
                    .await
                    .map_err(|e| Error::io("create output", target.clone(), e.to_string()))?;
                let mut writer = Self::stream(BufWriter::new(file), target);
                writer.flush_each = false;
                Ok(writer)
            }
            OutputConfig::Stdout => Ok(Self::stream(tokio::io::stdout(), "<stdout>")),
            OutputConfig::Memory => Ok(Self::memory()),
        }
    }

    /// Number of messages written so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub async fn write(&mut self, message: Message) -> Result<()> {
        match &mut self.sink {
            Sink::Memory(messages) => messages.push(message),
            Sink::Stream(writer) => {
                let mut line = message
                    .to_json_line()
                    .map_err(|e| Error::Output(e.to_string()))?;
                line.push('\n');
                writer
                    .write_all(line.as_bytes())
                    .await
                    .map_err(|e| Error::io("write output", self.target.as_str(), e.to_string()))?;
                if self.flush_each {
                    writer.flush().await.map_err(|e| {
                        Error::io("flush output", self.target.as_str(), e.to_string())
                    })?;
                }
            }
        }
        self.written += 1;
        Ok(())
    }

    /// Flush the output. Returns the collected messages for memory outputs
    /// and nothing for streamed ones.
    pub async fn finish(self) -> Result<Vec<Message>> {
        match self.sink {
            Sink::Memory(messages) => Ok(messages),
            Sink::Stream(mut writer) => {
                writer
                    .flush()
                    .await
                    .map_err(|e| Error::io("flush output", self.target, e.to_string()))?;
                Ok(Vec::new())
            }
        }
    }
}

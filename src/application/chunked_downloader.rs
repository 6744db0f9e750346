// Chunked downloader: ranged fetches in parallel, writes strictly in offset order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::progress::ProgressAggregator;
use super::sink::ByteSink;
use crate::api::{self, ApiError, ByteSource, SourceInfo};
use crate::config::EngineConfig;
use crate::domain::{DownloadEvent, EngineError, StreamVariant};

#[derive(Clone)]
pub struct ChunkedDownloader {
    source: Arc<dyn ByteSource>,
    config: EngineConfig,
}

impl ChunkedDownloader {
    pub fn new(source: Arc<dyn ByteSource>, config: EngineConfig) -> Self {
        Self { source, config }
    }

    /// Spawn the transfer of `variant` into `sink`. Must run inside a tokio runtime.
    pub fn start(&self, variant: &StreamVariant, sink: Box<dyn ByteSink>) -> DownloadHandle {
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));

        let job = DownloadJob {
            source: Arc::clone(&self.source),
            locator: variant.locator.clone(),
            approximate_size: variant.approximate_size,
            sink,
            config: self.config.clone(),
            token: token.clone(),
            events: tx,
            progress: ProgressAggregator::new(),
            written: 0,
            high_water: 0,
            total: None,
            consecutive_failures: 0,
        };

        info!(
            "starting {} {} download",
            variant.resolution, variant.container
        );
        let task = tokio::spawn(job.run());

        DownloadHandle {
            control: DownloadControl { token, task },
            events: rx,
        }
    }
}

/// Cancellation side of a running download.
pub struct DownloadControl {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl DownloadControl {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the transfer task to exit.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            error!("download task panicked: {}", e);
        }
    }

    pub async fn cancel_and_wait(self) {
        self.cancel();
        self.wait().await;
    }
}

/// A running download: a cancel switch plus its single-subscriber event sequence.
pub struct DownloadHandle {
    control: DownloadControl,
    events: mpsc::Receiver<DownloadEvent>,
}

impl DownloadHandle {
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.control.token.clone()
    }

    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }

    pub fn into_parts(self) -> (DownloadControl, mpsc::Receiver<DownloadEvent>) {
        (self.control, self.events)
    }

    pub fn into_stream(self) -> BoxStream<'static, DownloadEvent> {
        receiver_stream(self.events)
    }
}

pub(crate) fn receiver_stream(
    rx: mpsc::Receiver<DownloadEvent>,
) -> BoxStream<'static, DownloadEvent> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|event| (event, rx)) }).boxed()
}

enum Interrupt {
    Cancelled,
    Fatal(EngineError),
}

type Step<T = ()> = std::result::Result<T, Interrupt>;

/// Race `fut` against cancellation and the per-chunk timeout.
async fn guarded<T>(
    token: &CancellationToken,
    timeout: Duration,
    fut: impl Future<Output = api::Result<T>>,
) -> Step<api::Result<T>> {
    tokio::select! {
        _ = token.cancelled() => Err(Interrupt::Cancelled),
        result = tokio::time::timeout(timeout, fut) => {
            Ok(result.unwrap_or_else(|_| Err(ApiError::Timeout)))
        }
    }
}

async fn backoff(token: &CancellationToken, delay: Duration) -> Step {
    tokio::select! {
        _ = token.cancelled() => Err(Interrupt::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

struct DownloadJob {
    source: Arc<dyn ByteSource>,
    locator: String,
    approximate_size: Option<u64>,
    sink: Box<dyn ByteSink>,
    config: EngineConfig,
    token: CancellationToken,
    events: mpsc::Sender<DownloadEvent>,
    progress: ProgressAggregator,
    written: u64,
    /// Furthest offset ever confirmed; only progress past it clears the failure streak.
    high_water: u64,
    total: Option<u64>,
    consecutive_failures: u32,
}

impl DownloadJob {
    async fn run(mut self) {
        let terminal = match self.transfer().await {
            Ok(()) => match self.sink.finish().await {
                Ok(()) => {
                    info!("download completed ({} bytes)", self.written);
                    DownloadEvent::Completed {
                        bytes_written: self.written,
                    }
                }
                Err(e) => {
                    error!("closing sink failed: {}", e);
                    DownloadEvent::Failed(EngineError::SinkWriteFailed(e.to_string()))
                }
            },
            Err(Interrupt::Cancelled) => {
                info!("download cancelled at {} bytes", self.written);
                self.close_partial().await;
                DownloadEvent::Cancelled {
                    bytes_written: self.written,
                }
            }
            Err(Interrupt::Fatal(err)) => {
                error!("download failed at {} bytes: {}", self.written, err);
                self.close_partial().await;
                DownloadEvent::Failed(err)
            }
        };
        self.emit(terminal).await;
    }

    async fn close_partial(&mut self) {
        let policy = self.config.partial_data_policy();
        if let Err(e) = self.sink.abandon(policy).await {
            warn!("closing partial sink ({:?}) failed: {}", policy, e);
        }
    }

    async fn emit(&mut self, event: DownloadEvent) {
        let delivered = if event.is_terminal() {
            self.events.send(event).await.is_ok()
        } else {
            // A slow subscriber must not pin a cancelled job; drop the update instead.
            tokio::select! {
                biased;
                sent = self.events.send(event) => sent.is_ok(),
                _ = self.token.cancelled() => true,
            }
        };
        if !delivered {
            debug!("event receiver dropped");
        }
    }

    fn check_cancelled(&self) -> Step {
        if self.token.is_cancelled() {
            Err(Interrupt::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn transfer(&mut self) -> Step {
        let info = self.probe().await?;
        self.total = info.content_length.or(self.approximate_size);
        let ranged = info.supports_range && info.content_length.is_some();
        debug!(
            "probe: length={:?} ranged={} chunk_size={}",
            info.content_length, ranged, self.config.chunk_size
        );

        self.emit(DownloadEvent::Started {
            total_bytes: self.total,
            ranged,
        })
        .await;
        self.report_progress().await;

        match info.content_length {
            Some(length) if ranged => self.transfer_ranged(length).await,
            exact => self.transfer_streamed(exact).await,
        }
    }

    async fn probe(&mut self) -> Step<SourceInfo> {
        loop {
            self.check_cancelled()?;
            let timeout = self.config.chunk_timeout();
            let result = guarded(&self.token, timeout, self.source.probe(&self.locator)).await?;
            match result {
                Ok(info) => return Ok(info),
                Err(e) => self.on_read_failure(e).await?,
            }
        }
    }

    /// Count a failed read. Transient failures back off and return `Ok` so the
    /// caller can retry; anything else ends the download.
    async fn on_read_failure(&mut self, err: ApiError) -> Step {
        if !err.is_transient() {
            return Err(Interrupt::Fatal(EngineError::from_api(&err)));
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.max_consecutive_failures {
            return Err(Interrupt::Fatal(EngineError::TransientFailureExceeded {
                attempts: self.consecutive_failures,
                last_error: err.to_string(),
            }));
        }

        let delay = self.config.retry_backoff() * self.consecutive_failures;
        warn!(
            "transient read failure at offset {} (attempt {}/{}): {}; retrying in {:?}",
            self.written, self.consecutive_failures, self.config.max_consecutive_failures, err, delay
        );
        backoff(&self.token, delay).await
    }

    async fn write_chunk(&mut self, data: &[u8]) -> Step {
        let mut attempt = 0;
        loop {
            self.check_cancelled()?;
            match self.sink.write_at(self.written, data).await {
                Ok(()) => break,
                Err(e) if attempt < self.config.write_retries => {
                    attempt += 1;
                    warn!(
                        "sink write at {} failed (attempt {}): {}",
                        self.written, attempt, e
                    );
                    backoff(&self.token, self.config.retry_backoff() * attempt).await?;
                }
                Err(e) => {
                    return Err(Interrupt::Fatal(EngineError::SinkWriteFailed(format!(
                        "write at offset {} failed after {} retries: {}",
                        self.written, self.config.write_retries, e
                    ))));
                }
            }
        }

        self.written += data.len() as u64;
        if self.written > self.high_water {
            self.high_water = self.written;
            self.consecutive_failures = 0;
        }
        self.report_progress().await;
        Ok(())
    }

    async fn report_progress(&mut self) {
        if let Some(progress) = self.progress.update(self.written, self.total) {
            self.emit(DownloadEvent::Progress {
                progress,
                bytes_written: self.written,
                total_bytes: self.total,
            })
            .await;
        }
    }

    async fn transfer_ranged(&mut self, length: u64) -> Step {
        let chunk_size = self.config.chunk_size;
        let parallel = self.config.parallel_chunks.max(1) as u64;

        while self.written < length {
            self.check_cancelled()?;

            let window: Vec<(u64, u64)> = (0..parallel)
                .map(|i| self.written + i * chunk_size)
                .take_while(|start| *start < length)
                .map(|start| (start, (start + chunk_size).min(length) - 1))
                .collect();

            let results = {
                let source = &self.source;
                let locator = self.locator.as_str();
                let token = &self.token;
                let timeout = self.config.chunk_timeout();
                futures::future::join_all(window.iter().map(|&(start, end)| {
                    guarded(token, timeout, source.fetch_range(locator, start, end))
                }))
                .await
            };

            for ((start, end), result) in window.into_iter().zip(results) {
                let expected = end - start + 1;
                match result? {
                    Ok(bytes) if bytes.len() as u64 >= expected => {
                        debug!("chunk {}-{} fetched", start, end);
                        let bytes = bytes.slice(..expected as usize);
                        self.write_chunk(&bytes).await?;
                    }
                    Ok(bytes) => {
                        // Keep the confirmed prefix and resume right after it.
                        if !bytes.is_empty() {
                            self.write_chunk(&bytes).await?;
                        }
                        self.on_read_failure(ApiError::Incomplete {
                            expected,
                            received: bytes.len() as u64,
                        })
                        .await?;
                        break;
                    }
                    Err(e) => {
                        self.on_read_failure(e).await?;
                        debug!("resuming from offset {}", self.written);
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn restart_from_zero(&mut self) -> Step {
        if let Err(e) = self.sink.truncate().await {
            return Err(Interrupt::Fatal(EngineError::SinkWriteFailed(format!(
                "truncate failed: {}",
                e
            ))));
        }
        warn!(
            "source cannot resume; restarting from zero after {} bytes",
            self.written
        );
        self.written = 0;
        self.emit(DownloadEvent::ResumedFromStart).await;
        Ok(())
    }

    async fn transfer_streamed(&mut self, exact_length: Option<u64>) -> Step {
        let chunk_size = self.config.chunk_size as usize;
        loop {
            if self.written > 0 {
                self.restart_from_zero().await?;
            }
            self.check_cancelled()?;

            let timeout = self.config.chunk_timeout();
            let opened =
                guarded(&self.token, timeout, self.source.open_stream(&self.locator)).await?;
            let mut body = match opened {
                Ok(body) => body,
                Err(e) => {
                    self.on_read_failure(e).await?;
                    continue;
                }
            };

            let mut pending = BytesMut::new();
            let failure = loop {
                let next = guarded(&self.token, timeout, body.try_next()).await?;
                match next {
                    Ok(Some(bytes)) => {
                        pending.extend_from_slice(&bytes);
                        while pending.len() >= chunk_size {
                            let piece: Bytes = pending.split_to(chunk_size).freeze();
                            self.write_chunk(&piece).await?;
                        }
                    }
                    Ok(None) => {
                        if !pending.is_empty() {
                            let piece = pending.split().freeze();
                            self.write_chunk(&piece).await?;
                        }
                        match exact_length {
                            Some(expected) if self.written < expected => {
                                break ApiError::Incomplete {
                                    expected,
                                    received: self.written,
                                };
                            }
                            _ => return Ok(()),
                        }
                    }
                    Err(e) => break e,
                }
            };

            self.on_read_failure(failure).await?;
        }
    }
}

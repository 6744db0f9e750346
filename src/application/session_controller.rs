use std::io;
use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::catalog_resolver::StreamCatalogResolver;
use super::chunked_downloader::{ChunkedDownloader, DownloadControl};
use super::sink::{ByteSink, FileSink};
use super::stream_selector;
use crate::api::ApiClient;
use crate::config::EngineConfig;
use crate::domain::{
    DownloadEvent, DownloadSession, EngineError, Result, SessionState, StreamVariant,
    VideoCatalog, VideoIdentifier,
};
use crate::utils::{get_timestamp, sanitize_filename};

/// Events of one download, ending with `Completed`, `Failed` or `Cancelled`.
pub type DownloadStream = BoxStream<'static, DownloadEvent>;

struct Shared {
    state: SessionState,
    catalog: Option<VideoCatalog>,
    session: Option<DownloadSession>,
    last_error: Option<EngineError>,
}

struct ActiveDownload {
    id: u64,
    control: DownloadControl,
    supervisor: JoinHandle<()>,
}

enum SinkTarget {
    OutputDir,
    Custom(Box<dyn ByteSink>),
}

/// Drives preview and download for one user session.
///
/// Operations take `&mut self`, so they never overlap. A download runs on its
/// own task; a supervisor task relays its events and records the outcome
/// before the caller sees the terminal event.
pub struct SessionController {
    resolver: StreamCatalogResolver,
    downloader: ChunkedDownloader,
    config: EngineConfig,
    shared: Arc<Mutex<Shared>>,
    active: Option<ActiveDownload>,
    next_session_id: u64,
}

impl SessionController {
    pub fn new(
        resolver: StreamCatalogResolver,
        downloader: ChunkedDownloader,
        config: EngineConfig,
    ) -> Self {
        Self {
            resolver,
            downloader,
            config,
            shared: Arc::new(Mutex::new(Shared {
                state: SessionState::Idle,
                catalog: None,
                session: None,
                last_error: None,
            })),
            active: None,
            next_session_id: 1,
        }
    }

    /// Wire both upstream seams to one HTTP client.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(
            ApiClient::new(config.api_config()).map_err(|e| EngineError::Config(e.to_string()))?,
        );
        let resolver = StreamCatalogResolver::new(client.clone());
        let downloader = ChunkedDownloader::new(client, config.clone());
        Ok(Self::new(resolver, downloader, config))
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn catalog(&self) -> Option<VideoCatalog> {
        self.shared.lock().catalog.clone()
    }

    pub fn session(&self) -> Option<DownloadSession> {
        self.shared.lock().session.clone()
    }

    pub fn last_error(&self) -> Option<EngineError> {
        self.shared.lock().last_error.clone()
    }

    fn set_state(&self, state: SessionState) {
        let mut shared = self.shared.lock();
        if shared.state != state {
            info!("session state {} -> {}", shared.state, state);
            shared.state = state;
        }
    }

    fn fail(&self, err: EngineError) -> EngineError {
        warn!("session failed: {}", err);
        self.set_state(SessionState::Failed);
        self.shared.lock().last_error = Some(err.clone());
        err
    }

    pub async fn preview(&mut self, url: &str) -> Result<VideoCatalog> {
        let state = self.state();
        let id = match VideoIdentifier::parse(url) {
            Ok(id) => id,
            // No new identifier to switch to; leave a running download alone.
            Err(e) if state == SessionState::Downloading => return Err(e),
            Err(e) => return Err(self.fail(e)),
        };

        if state == SessionState::Downloading {
            if let Some(catalog) = self.catalog().filter(|c| c.id == id) {
                return Ok(catalog);
            }
        }

        self.stop_active().await;
        {
            let mut shared = self.shared.lock();
            shared.catalog = None;
            shared.session = None;
            shared.last_error = None;
        }
        self.set_state(SessionState::Previewing);

        match self.resolver.resolve(&id).await {
            Ok(catalog) => {
                self.shared.lock().catalog = Some(catalog.clone());
                self.set_state(SessionState::PreviewReady);
                Ok(catalog)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Download into `<output_dir>/<title> [<resolution>].<container>`.
    pub async fn download(&mut self, resolution: &str) -> Result<DownloadStream> {
        self.begin_download(resolution, SinkTarget::OutputDir).await
    }

    pub async fn download_to(
        &mut self,
        resolution: &str,
        sink: Box<dyn ByteSink>,
    ) -> Result<DownloadStream> {
        self.begin_download(resolution, SinkTarget::Custom(sink))
            .await
    }

    /// Cancel the running download, if any, and wait for it to stop.
    pub async fn cancel(&mut self) -> bool {
        let was_running = self.state() == SessionState::Downloading;
        self.stop_active().await;
        was_running
    }

    async fn stop_active(&mut self) {
        if let Some(active) = self.active.take() {
            info!("stopping download session {}", active.id);
            active.control.cancel_and_wait().await;
            if let Err(e) = active.supervisor.await {
                error!("session supervisor panicked: {}", e);
            }
        }
    }

    async fn begin_download(
        &mut self,
        resolution: &str,
        target: SinkTarget,
    ) -> Result<DownloadStream> {
        let state = self.state();
        let catalog = match (state, self.catalog()) {
            (
                SessionState::PreviewReady
                | SessionState::Downloading
                | SessionState::Completed
                | SessionState::Cancelled,
                Some(catalog),
            ) => catalog,
            _ => {
                return Err(EngineError::InvalidState {
                    operation: "download",
                    state,
                })
            }
        };

        let selected = stream_selector::select(&catalog, resolution).cloned();
        // At most one session: the previous one is gone before anything new starts.
        self.stop_active().await;

        let mut variant = selected.map_err(|e| self.fail(e))?;
        let mut catalog = catalog;
        if variant.is_expired(get_timestamp()) {
            info!("{} locator expired; refreshing catalog", variant.resolution);
            self.set_state(SessionState::Previewing);
            catalog = self
                .resolver
                .resolve(&catalog.id)
                .await
                .map_err(|e| self.fail(e))?;
            self.shared.lock().catalog = Some(catalog.clone());
            variant = stream_selector::select(&catalog, resolution)
                .cloned()
                .map_err(|e| self.fail(e))?;
        }

        let sink: Box<dyn ByteSink> = match target {
            SinkTarget::Custom(sink) => sink,
            SinkTarget::OutputDir => {
                let sink = self.open_output(&catalog, &variant).await.map_err(|e| {
                    self.fail(EngineError::SinkWriteFailed(format!(
                        "cannot create file in {}: {}",
                        self.config.output_dir.display(),
                        e
                    )))
                })?;
                info!("downloading to {}", sink.path().display());
                Box::new(sink)
            }
        };

        let id = self.next_session_id;
        self.next_session_id += 1;
        {
            let mut shared = self.shared.lock();
            shared.last_error = None;
            shared.session = Some(DownloadSession {
                id,
                catalog: catalog.clone(),
                variant: variant.clone(),
                bytes_written: 0,
                total_bytes: variant.approximate_size,
                state: SessionState::Downloading,
            });
        }
        self.set_state(SessionState::Downloading);

        let (control, events) = self.downloader.start(&variant, sink).into_parts();
        let (tx, rx) = mpsc::unbounded_channel();
        let supervisor = tokio::spawn(supervise(Arc::clone(&self.shared), id, events, tx));
        self.active = Some(ActiveDownload {
            id,
            control,
            supervisor,
        });

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed())
    }

    /// Open `<title> [<resolution>].<container>` in the output directory. An
    /// existing file is never reused; a ` (n)` suffix picks the next free name.
    async fn open_output(
        &self,
        catalog: &VideoCatalog,
        variant: &StreamVariant,
    ) -> io::Result<FileSink> {
        let stem = sanitize_filename(&catalog.title);
        let stem = if stem.is_empty() {
            catalog.id.to_string()
        } else {
            stem
        };
        let ext = if variant.container.is_empty() {
            "mp4"
        } else {
            variant.container.as_str()
        };

        let mut attempt = 0u32;
        loop {
            let name = match attempt {
                0 => format!("{} [{}].{}", stem, variant.resolution, ext),
                n => format!("{} [{}] ({}).{}", stem, variant.resolution, n, ext),
            };
            match FileSink::create_new(self.config.output_dir.join(name)).await {
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                result => return result,
            }
        }
    }
}

/// Relay events to the caller, recording each into the shared snapshot first.
async fn supervise(
    shared: Arc<Mutex<Shared>>,
    id: u64,
    mut events: mpsc::Receiver<DownloadEvent>,
    caller: mpsc::UnboundedSender<DownloadEvent>,
) {
    while let Some(event) = events.recv().await {
        record(&shared, id, &event);
        // A caller that dropped the stream still gets its state recorded.
        let _ = caller.send(event);
    }
}

fn record(shared: &Mutex<Shared>, id: u64, event: &DownloadEvent) {
    let mut guard = shared.lock();
    let inner = &mut *guard;
    let Some(session) = inner.session.as_mut().filter(|s| s.id == id) else {
        return;
    };

    let terminal = match event {
        DownloadEvent::Started { total_bytes, .. } => {
            session.total_bytes = *total_bytes;
            None
        }
        DownloadEvent::Progress {
            bytes_written,
            total_bytes,
            ..
        } => {
            session.bytes_written = *bytes_written;
            session.total_bytes = *total_bytes;
            None
        }
        DownloadEvent::ResumedFromStart => {
            session.bytes_written = 0;
            None
        }
        DownloadEvent::Completed { bytes_written } => {
            session.bytes_written = *bytes_written;
            Some(SessionState::Completed)
        }
        DownloadEvent::Cancelled { bytes_written } => {
            session.bytes_written = *bytes_written;
            Some(SessionState::Cancelled)
        }
        DownloadEvent::Failed(err) => {
            inner.last_error = Some(err.clone());
            Some(SessionState::Failed)
        }
    };

    if let Some(state) = terminal {
        session.state = state;
        info!("session {} state {} -> {}", id, inner.state, state);
        inner.state = state;
    }
}

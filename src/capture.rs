// Diagnostic capture. The sampling loop collects listing + status on the
// endpoint's own connection (bounded in time); file I/O runs in a dedicated
// writer task fed through a channel, so a slow or full disk never stalls a tick.

use crate::error::CaptureError;
use crate::models::{DiagnosticArtifact, Endpoint};
use crate::sampler::{EndpointClient, bounded};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::instrument;

/// Bulk listing followed by a full status snapshot, both on `client`.
#[instrument(skip(client, endpoint), fields(endpoint = %endpoint.name, operation = "capture"))]
pub async fn collect<C: EndpointClient>(
    client: &mut C,
    endpoint: &Endpoint,
    limit: Duration,
) -> Result<DiagnosticArtifact, CaptureError> {
    let work = async {
        let records = client.list_connections().await?;
        let status = client.status().await?;
        Ok::<_, crate::error::ConnectionError>((records, status))
    };
    let (records, status) = bounded(endpoint, "capture", limit, work).await?;
    Ok(DiagnosticArtifact {
        endpoint: endpoint.clone(),
        captured_at: chrono::Local::now(),
        records,
        status,
    })
}

/// Writes artifacts under one directory. Files are opened append-only and
/// never removed here.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn write(&self, artifact: &DiagnosticArtifact) -> Result<PathBuf, CaptureError> {
        let path = self.dir.join(artifact.file_name());
        let io_err = |source| CaptureError::Write {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        file.write_all(artifact.body().as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        Ok(path)
    }
}

/// Channel capacity between the sampling loop and the writer.
pub fn capture_channel(capacity: usize) -> (mpsc::Sender<DiagnosticArtifact>, mpsc::Receiver<DiagnosticArtifact>) {
    mpsc::channel(capacity.max(1))
}

/// Drains artifacts until every sender is dropped. Write failures are logged
/// and counted; nothing propagates back to the sampler.
pub fn spawn_artifact_writer(
    mut rx: mpsc::Receiver<DiagnosticArtifact>,
    writer: ArtifactWriter,
    artifacts_written_total: Arc<AtomicU64>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(artifact) = rx.recv().await {
            let endpoint = artifact.endpoint.name.clone();
            let records = artifact.records.len();
            let w = writer.clone();
            let result = tokio::task::spawn_blocking(move || w.write(&artifact))
                .await
                .map_err(|e| CaptureError::Join(e.to_string()))
                .and_then(|r| r);
            match result {
                Ok(path) => {
                    artifacts_written_total.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        endpoint = %endpoint,
                        records,
                        path = %path.display(),
                        "diagnostic artifact written"
                    );
                }
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, error = %e, "diagnostic artifact not written");
                }
            }
        }
        tracing::debug!("Artifact writer shutting down");
    })
}

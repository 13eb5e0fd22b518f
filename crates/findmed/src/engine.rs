use crate::handler::{FindRequest, FindResponse, RequestError, RequestHandler};
use findme_core::{BuildSummary, FaceEncoder};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Find {
        request: FindRequest,
        reply: oneshot::Sender<FindResponse>,
    },
    Rescan {
        reply: oneshot::Sender<Result<BuildSummary, RequestError>>,
    },
    Status {
        reply: oneshot::Sender<serde_json::Value>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run the full find-my-photos pipeline for one request.
    pub async fn find_photos(&self, request: FindRequest) -> Result<FindResponse, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Find { request, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn rescan(&self) -> Result<BuildSummary, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Rescan { reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub async fn status(&self) -> Result<serde_json::Value, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Status { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    async fn send(&self, request: EngineRequest) -> Result<(), EngineError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the handler; requests are handled one at a time in
/// arrival order. Cached encodings are loaded before the first request.
pub fn spawn_engine<E>(mut handler: RequestHandler<E>) -> Result<EngineHandle, EngineError>
where
    E: FaceEncoder + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("findme-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            handler.warm();
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Find { request, reply } => {
                        let _ = reply.send(handler.handle(&request));
                    }
                    EngineRequest::Rescan { reply } => {
                        let _ = reply.send(handler.rescan());
                    }
                    EngineRequest::Status { reply } => {
                        let _ = reply.send(handler.status());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_support::{png_bytes, write_photo, ColorEncoder};
    use tempfile::TempDir;

    fn engine(tmp: &TempDir) -> EngineHandle {
        let config = Config {
            source_dir: tmp.path().join("photos"),
            output_dir: tmp.path().join("out"),
            encodings_path: tmp.path().join("encodings.zip"),
            selfie_dir: None,
            model_dir: tmp.path().join("models"),
            match_threshold: 0.6,
        };
        spawn_engine(RequestHandler::new(config, ColorEncoder)).unwrap()
    }

    #[tokio::test]
    async fn test_find_photos_round_trip() {
        let tmp = TempDir::new().unwrap();
        write_photo(&tmp.path().join("photos"), "party.jpg", [200, 40, 40]);
        let handle = engine(&tmp);

        let response = handle
            .find_photos(FindRequest {
                phone: "5551234567".into(),
                email: "guest@example.com".into(),
                selfie: png_bytes([200, 40, 40]),
                force_rescan: false,
            })
            .await
            .unwrap();

        assert_eq!(response.previews.len(), 1);
        assert!(response.archive.is_some());
        assert!(tmp.path().join("encodings.zip").exists());
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_serialized() {
        let tmp = TempDir::new().unwrap();
        write_photo(&tmp.path().join("photos"), "party.jpg", [200, 40, 40]);
        let handle = engine(&tmp);

        let requests = (0..4).map(|i| {
            let handle = handle.clone();
            tokio::spawn(async move {
                handle
                    .find_photos(FindRequest {
                        phone: format!("555123456{i}"),
                        email: "guest@example.com".into(),
                        selfie: png_bytes([200, 40, 40]),
                        force_rescan: i == 0,
                    })
                    .await
            })
        });
        for task in requests.collect::<Vec<_>>() {
            let response = task.await.unwrap().unwrap();
            assert_eq!(response.previews.len(), 1, "{}", response.status);
        }
    }

    #[tokio::test]
    async fn test_rescan_without_gallery_fails() {
        let tmp = TempDir::new().unwrap();
        let handle = engine(&tmp);

        let err = handle.rescan().await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Request(RequestError::SourceUnavailable(_))
        ));

        let status = handle.status().await.unwrap();
        assert_eq!(status["encodings_loaded"], false);
    }
}

use crate::engine::{EngineError, EngineHandle};
use crate::handler::FindRequest;
use zbus::interface;

pub const BUS_NAME: &str = "org.findme.PhotoFinder1";
pub const OBJECT_PATH: &str = "/org/findme/PhotoFinder1";

/// D-Bus interface for the photo finder daemon.
///
/// Bus name: org.findme.PhotoFinder1
/// Object path: /org/findme/PhotoFinder1
pub struct PhotoFinderService {
    engine: EngineHandle,
}

impl PhotoFinderService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

fn to_fdo(e: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

#[interface(name = "org.findme.PhotoFinder1")]
impl PhotoFinderService {
    /// Find the caller's photos from a selfie.
    ///
    /// Returns the status text, copied photo paths and the archive path
    /// (empty when no archive was made). Request failures are reported in
    /// the status text, not as D-Bus errors.
    async fn find_photos(
        &self,
        phone: &str,
        email: &str,
        selfie: Vec<u8>,
        force_rescan: bool,
    ) -> zbus::fdo::Result<(String, Vec<String>, String)> {
        tracing::info!(selfie_bytes = selfie.len(), force_rescan, "find_photos requested");
        let response = self
            .engine
            .find_photos(FindRequest {
                phone: phone.to_string(),
                email: email.to_string(),
                selfie,
                force_rescan,
            })
            .await
            .map_err(to_fdo)?;

        let previews = response
            .previews
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        let archive = response
            .archive
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        Ok((response.status, previews, archive))
    }

    /// Re-encode the photo collection now.
    async fn rescan(&self) -> zbus::fdo::Result<String> {
        tracing::info!("rescan requested");
        let summary = self.engine.rescan().await.map_err(to_fdo)?;
        Ok(summary.to_string())
    }

    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(to_fdo)?;
        Ok(status.to_string())
    }
}

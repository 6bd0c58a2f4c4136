//! Local image store lookup and on-demand upload to a compute.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::client::ComputeClient;
use crate::error::{ComputeError, Result};

/// Locates named disk/ROM images on the controller host.
pub trait ImageStore: Send + Sync {
    /// Resolve an image filename to a local path, if present.
    fn locate(&self, filename: &str) -> Option<PathBuf>;
}

/// Image store backed by a flat directory.
#[derive(Debug, Clone)]
pub struct DirectoryImageStore {
    root: PathBuf,
}

impl DirectoryImageStore {
    /// Create a store rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory images are resolved under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageStore for DirectoryImageStore {
    fn locate(&self, filename: &str) -> Option<PathBuf> {
        // Image names come from compute responses; refuse anything that
        // would escape the store root.
        let name = Path::new(filename);
        if name
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }

        let path = self.root.join(name);
        path.is_file().then_some(path)
    }
}

/// Uploads a named image to a compute agent.
///
/// Stateless: each provisioning attempt is a single lookup plus a single
/// upload, with no retry of its own. The caller decides what a failure
/// means (node creation retries exactly once after a successful upload).
#[derive(Clone)]
pub struct ImageProvisioner {
    store: Arc<dyn ImageStore>,
}

impl ImageProvisioner {
    /// Create a provisioner resolving images from the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ImageStore>) -> Self {
        Self { store }
    }

    /// Resolve `filename` locally and upload it to the compute under
    /// `/{emulator}/images/{filename}`.
    ///
    /// # Errors
    ///
    /// Returns `ComputeError::ImageNotFound` if the store cannot resolve
    /// the name, or the upload's own error if the transfer fails.
    pub async fn provision(
        &self,
        client: &dyn ComputeClient,
        emulator: &str,
        filename: &str,
    ) -> Result<()> {
        let source = self
            .store
            .locate(filename)
            .ok_or_else(|| ComputeError::ImageNotFound {
                filename: filename.to_string(),
            })?;

        tracing::info!(emulator, filename, "provisioning missing image on compute");
        client
            .upload(&format!("/{emulator}/images/{filename}"), &source)
            .await?;
        Ok(())
    }
}

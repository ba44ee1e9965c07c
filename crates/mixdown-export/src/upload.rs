//! Upload of finished files to a remote service.

use crate::error::Result;
use std::path::Path;

/// Uploads one exported file. Implementations live with the host
/// application; the exporter only decides when to call them.
pub trait Uploader: Send + Sync {
    fn upload(&self, path: &Path, title: &str) -> Result<()>;
}

impl<F> Uploader for F
where
    F: Fn(&Path, &str) -> Result<()> + Send + Sync,
{
    fn upload(&self, path: &Path, title: &str) -> Result<()> {
        self(path, title)
    }
}

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use trialbox_core::TrialParameters;

use crate::config::ProtocolConfig;

/// External source of parameter edits, polled once per trial boundary.
///
/// `None` means nothing changed since the last poll.
pub trait ParameterSource {
    fn poll(&mut self) -> Option<TrialParameters>;
}

/// Parameters that never change during the session
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedParameters;

impl ParameterSource for FixedParameters {
    fn poll(&mut self) -> Option<TrialParameters> {
        None
    }
}

impl<F> ParameterSource for F
where
    F: FnMut() -> Option<TrialParameters>,
{
    fn poll(&mut self) -> Option<TrialParameters> {
        self()
    }
}

/// Watches a protocol file and picks up edits made while the session runs.
///
/// An edit that fails to load or validate is logged and skipped; the session
/// keeps the last good parameters.
#[derive(Debug)]
pub struct FileParameterSource {
    path: PathBuf,
    seen: Option<SystemTime>,
}

impl FileParameterSource {
    /// Start watching `path`. Its current contents count as already applied.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let seen = modified(&path);
        Self { path, seen }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl ParameterSource for FileParameterSource {
    fn poll(&mut self) -> Option<TrialParameters> {
        let current = modified(&self.path);
        if current.is_none() || current == self.seen {
            return None;
        }
        self.seen = current;

        match ProtocolConfig::load(&self.path).and_then(|c| c.trial_parameters()) {
            Ok(params) => {
                tracing::info!(path = ?self.path, "picked up parameter edit");
                Some(params)
            }
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "ignoring invalid parameter edit");
                None
            }
        }
    }
}

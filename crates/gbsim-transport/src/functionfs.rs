use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::source::{DataEndpoints, EndpointSet, EndpointSource};

/// FunctionFS endpoint files of a configured Greybus gadget.
///
/// Layout:
/// ```text
/// ep0          control events and AP->SVC messages
/// ep1          SVC->AP events (interrupt in)
/// ep2, ep3     CPort traffic to / from the AP (bulk in / bulk out)
/// ep4, ep5     second data pair, and so on
/// ```
///
/// Mounting the filesystem and writing descriptors is left to the gadget
/// setup; this type only opens the endpoint files.
#[derive(Debug, Clone)]
pub struct FunctionFs {
    prefix: PathBuf,
    data_pairs: usize,
}

impl FunctionFs {
    /// Default mount point of the gbsim function.
    pub const DEFAULT_PREFIX: &'static str = "/dev/ffs-gbsim";

    const CONTROL_INDEX: usize = 0;
    const SVC_INDEX: usize = 1;
    const FIRST_DATA_INDEX: usize = 2;

    /// Endpoints under `prefix` with a single data pair.
    pub fn new(prefix: impl AsRef<Path>) -> Self {
        Self {
            prefix: prefix.as_ref().to_path_buf(),
            data_pairs: 1,
        }
    }

    /// Override the number of bulk in/out pairs.
    pub fn with_data_pairs(mut self, data_pairs: usize) -> Self {
        self.data_pairs = data_pairs.max(1);
        self
    }

    /// Mount point of the function.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Number of bulk in/out pairs.
    pub fn data_pairs(&self) -> usize {
        self.data_pairs
    }

    /// Path of endpoint file `ep<index>`.
    pub fn endpoint_path(&self, index: usize) -> PathBuf {
        self.prefix.join(format!("ep{index}"))
    }

    /// Open the control endpoint (`ep0`).
    pub fn open_control(&self) -> Result<Endpoint> {
        self.open_endpoint(Self::CONTROL_INDEX)
    }

    fn open_endpoint(&self, index: usize) -> Result<Endpoint> {
        let path = self.endpoint_path(index);
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;
        debug!(?path, "opened endpoint");
        Ok(Endpoint::from_file(file, format!("ep{index}")))
    }
}

impl EndpointSource for FunctionFs {
    fn open(&mut self) -> Result<EndpointSet> {
        let svc = self.open_endpoint(Self::SVC_INDEX)?;

        let mut data = Vec::with_capacity(self.data_pairs);
        for pair in 0..self.data_pairs {
            let base = Self::FIRST_DATA_INDEX + pair * 2;
            data.push(DataEndpoints {
                index: pair,
                to_ap: self.open_endpoint(base)?,
                from_ap: self.open_endpoint(base + 1)?,
            });
        }

        info!(
            prefix = ?self.prefix,
            data_pairs = self.data_pairs,
            "opened svc and cport endpoints"
        );
        Ok(EndpointSet { svc, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_paths_follow_layout() {
        let ffs = FunctionFs::new("/dev/ffs-test").with_data_pairs(2);
        assert_eq!(ffs.endpoint_path(0), PathBuf::from("/dev/ffs-test/ep0"));
        assert_eq!(ffs.endpoint_path(5), PathBuf::from("/dev/ffs-test/ep5"));
        assert_eq!(ffs.data_pairs(), 2);
    }

    #[test]
    fn zero_data_pairs_clamps_to_one() {
        let ffs = FunctionFs::new(FunctionFs::DEFAULT_PREFIX).with_data_pairs(0);
        assert_eq!(ffs.data_pairs(), 1);
    }

    #[test]
    fn open_missing_endpoint_reports_path() {
        let dir = std::env::temp_dir().join(format!("gbsim-ffs-missing-{}", std::process::id()));
        let mut ffs = FunctionFs::new(&dir);

        let err = ffs.open().unwrap_err();
        match err {
            TransportError::Open { path, .. } => assert_eq!(path, dir.join("ep1")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn opens_regular_files_as_packetized_endpoints() {
        let dir = std::env::temp_dir().join(format!("gbsim-ffs-files-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for index in 0..4 {
            std::fs::write(dir.join(format!("ep{index}")), b"").unwrap();
        }

        let mut ffs = FunctionFs::new(&dir);
        let control = ffs.open_control().unwrap();
        assert!(control.is_packetized());
        assert_eq!(control.name(), "ep0");

        let set = ffs.open().unwrap();
        assert_eq!(set.svc.name(), "ep1");
        assert_eq!(set.data.len(), 1);
        assert_eq!(set.data[0].to_ap.name(), "ep2");
        assert_eq!(set.data[0].from_ap.name(), "ep3");

        let _ = std::fs::remove_dir_all(&dir);
    }
}

use crate::node_config::NodeConfig;
use crate::{Result, TcnError};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const CONFIG_FILENAME: &str = "config";
const VERSION_FILENAME: &str = "version";
const DATASTORE_DIR: &str = "datastore";

/// On-disk repository format marker written next to the config record.
pub const REPO_VERSION: &str = "2";

/// A node's on-disk repository rooted at `<cluster>/<index>`.
#[derive(Debug, Clone)]
pub struct NodeRepo {
    root: PathBuf,
}

impl NodeRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILENAME)
    }

    pub fn is_initialized(&self) -> bool {
        self.config_path().is_file()
    }

    /// Writes the config record, version marker and datastore directory.
    ///
    /// There is no rollback: a failure part way through leaves the repository
    /// in whatever state the filesystem reached.
    pub fn init(&self, config: &NodeConfig) -> Result<()> {
        if self.is_initialized() {
            return Err(TcnError::AlreadyInitialized(self.root.clone()));
        }

        fs::create_dir_all(&self.root)?;

        let payload = serde_json::to_vec_pretty(config)?;
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            // the record carries the unencrypted private key
            options.mode(0o600);
        }

        let mut file = options.open(self.config_path()).map_err(|error| {
            if error.kind() == ErrorKind::AlreadyExists {
                TcnError::AlreadyInitialized(self.root.clone())
            } else {
                TcnError::Io(error)
            }
        })?;
        file.write_all(&payload)?;
        file.write_all(b"\n")?;
        file.sync_all()?;

        fs::write(
            self.root.join(VERSION_FILENAME),
            format!("{}\n", REPO_VERSION),
        )?;
        fs::create_dir_all(self.root.join(DATASTORE_DIR))?;

        tracing::debug!("wrote config record to {:?}", self.config_path());
        Ok(())
    }

    pub fn load_config(&self) -> Result<NodeConfig> {
        let payload = fs::read(self.config_path())?;
        let config = serde_json::from_slice(&payload)?;
        Ok(config)
    }
}

use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::PipeStream;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Resolve the OS-local path for a user-chosen pipe name.
///
/// `testpipe` maps to `<tmp>/portal-testpipe.pipe`.
pub fn pipe_path(name: &str) -> Result<PathBuf> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(TransportError::InvalidName(name.to_string()));
    }
    Ok(std::env::temp_dir().join(format!("portal-{name}.pipe")))
}

/// Server end of a named pipe.
///
/// Backed by a filesystem-path Unix domain socket. The path is removed on
/// drop as long as it still refers to the socket this server created.
pub struct PipeServer {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl PipeServer {
    /// Default permission mode for created pipe paths.
    pub const DEFAULT_PIPE_MODE: u32 = 0o600;
    /// `sockaddr_un.sun_path` is 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Create the pipe for `name` and start listening.
    pub fn bind(name: &str) -> Result<Self> {
        Self::bind_path(pipe_path(name)?)
    }

    /// Create a pipe at an explicit path.
    ///
    /// A stale socket at `path` is removed first; any other kind of file is
    /// left alone and reported as a bind error.
    pub fn bind_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |source: std::io::Error| TransportError::Bind {
            addr: path.display().to_string(),
            source,
        };

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a pipe",
                )));
            }
            debug!(?path, "removing stale pipe");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(Self::DEFAULT_PIPE_MODE))
            .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "pipe created");

        Ok(Self {
            listener,
            path,
            created_inode: Some((created.dev(), created.ino())),
        })
    }

    /// Wait up to `timeout` for a client.
    ///
    /// Returns `Ok(None)` when nobody connected in time, so the caller can
    /// check for cancellation and call again.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Option<PipeStream>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    stream.set_nonblocking(false).map_err(TransportError::Accept)?;
                    debug!(path = ?self.path, "client connected to pipe");
                    return Ok(Some(PipeStream::from_unix(stream)));
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(ACCEPT_POLL_INTERVAL.min(deadline - now));
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
    }

    /// Open the client end of the pipe called `name`.
    pub fn connect(name: &str) -> Result<PipeStream> {
        Self::connect_path(pipe_path(name)?)
    }

    /// Open the client end of a pipe at an explicit path.
    pub fn connect_path(path: impl AsRef<Path>) -> Result<PipeStream> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
            addr: path.display().to_string(),
            source: e,
        })?;
        debug!(?path, "connected to pipe");
        Ok(PipeStream::from_unix(stream))
    }

    /// The path this pipe is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PipeServer {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "removing pipe");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "pipe path identity changed; skipping cleanup");
            }
        }
    }
}

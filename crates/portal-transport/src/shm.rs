//! Shared-memory segments.
//!
//! A segment is a fixed-capacity, file-backed mapping identified by a tag.
//! Both ends map the same file; the writer overwrites the frame at offset 0
//! and readers re-read it on every poll tick. There is no change
//! notification, so readers must poll.
//!
//! The backing file outlives every handle. It is only removed by
//! [`SharedSegment::unlink`], and a handle whose file was removed or replaced
//! reports [`SharedSegment::is_detached`] so its owner can re-open the tag.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Length of the frame prefix (magic + header) written last by
/// [`SharedSegment::write_frame`].
const FRAME_PREFIX_LEN: usize = 10;

/// Resolve the backing file for a segment tag.
///
/// Prefers the RAM-backed `/dev/shm` when the platform has it.
pub fn segment_path(tag: &str) -> Result<PathBuf> {
    if tag.is_empty() || tag.contains(['/', '\\']) || tag == "." || tag == ".." {
        return Err(TransportError::InvalidName(tag.to_string()));
    }
    let dev_shm = Path::new("/dev/shm");
    if dev_shm.is_dir() {
        Ok(dev_shm.join(format!("portal-{tag}")))
    } else {
        Ok(std::env::temp_dir().join(format!("portal-{tag}.shm")))
    }
}

/// A mapped shared-memory segment.
pub struct SharedSegment {
    map: MmapMut,
    path: PathBuf,
    capacity: usize,
    /// Identity of the file this handle mapped.
    identity: FileIdentity,
}

impl SharedSegment {
    /// Open the segment for `tag`, creating it with `capacity` bytes if needed.
    ///
    /// An existing smaller backing file is grown to `capacity`; a larger one
    /// is left as is and only its first `capacity` bytes are mapped.
    pub fn open(tag: &str, capacity: usize) -> Result<Self> {
        Self::open_path(segment_path(tag)?, capacity)
    }

    /// Open a segment at an explicit backing path.
    pub fn open_path(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let map_err = |source: std::io::Error| TransportError::Map {
            path: path.clone(),
            source,
        };

        if capacity == 0 {
            return Err(map_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "segment capacity must be greater than zero",
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(map_err)?;

        let current_len = file.metadata().map_err(map_err)?.len();
        if current_len < capacity as u64 {
            file.set_len(capacity as u64).map_err(map_err)?;
        }

        // SAFETY: the mapping is backed by a regular file we keep open for the
        // lifetime of the map. Other processes may write to it concurrently;
        // callers treat the contents as untrusted bytes and validate every
        // frame before use.
        let map = unsafe { memmap2::MmapOptions::new().len(capacity).map_mut(&file) }
            .map_err(map_err)?;

        let identity = FileIdentity::of(&file).map_err(map_err)?;
        info!(?path, capacity, "shared-memory segment mapped");

        Ok(Self {
            map,
            path,
            capacity,
            identity,
        })
    }

    /// Current contents of the whole segment.
    pub fn as_slice(&self) -> &[u8] {
        &self.map[..]
    }

    /// Overwrite the frame at offset 0.
    ///
    /// The body is written before the 10-byte prefix so that a reader never
    /// sees a new checksum paired with the previous payload.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() > self.capacity {
            return Err(TransportError::CapacityExceeded {
                size: frame.len(),
                capacity: self.capacity,
            });
        }
        let split = FRAME_PREFIX_LEN.min(frame.len());
        self.map[split..frame.len()].copy_from_slice(&frame[split..]);
        self.map[..split].copy_from_slice(&frame[..split]);
        self.map.flush_range(0, frame.len())?;
        debug!(path = ?self.path, size = frame.len(), "frame written to segment");
        Ok(())
    }

    /// Mapped capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file behind the tag is no longer the one this handle maps.
    ///
    /// True once the file was removed or replaced. Writes to a detached
    /// handle are invisible to anyone who opens the tag afterwards.
    pub fn is_detached(&self) -> bool {
        !self.backs_path()
    }

    /// Remove the backing file if it is still the one this handle maps.
    ///
    /// Existing mappings stay valid; later `open` calls create a fresh file.
    pub fn unlink(&self) -> Result<()> {
        if !self.backs_path() {
            debug!(path = ?self.path, "segment identity changed; skipping unlink");
            return Ok(());
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = ?self.path, "shared-memory segment removed");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn backs_path(&self) -> bool {
        File::open(&self.path)
            .and_then(|file| FileIdentity::of(&file))
            .is_ok_and(|identity| identity == self.identity)
    }
}

impl std::fmt::Debug for SharedSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSegment")
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(file: &File) -> std::io::Result<Self> {
        use std::os::unix::fs::MetadataExt;
        let metadata = file.metadata()?;
        Ok(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    fn of(file: &File) -> std::io::Result<Self> {
        // No inode on this platform; creation time is stable for a given file.
        let created = file.metadata()?.created()?;
        let nanos = created
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Ok(Self { dev: 0, ino: nanos })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_tag(tag: &str) -> String {
        format!(
            "t-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        )
    }

    #[test]
    fn writer_and_reader_share_contents() {
        let tag = unique_tag("share");
        let mut writer = SharedSegment::open(&tag, 64).unwrap();
        let reader = SharedSegment::open(&tag, 64).unwrap();

        writer.write_frame(b"pk\x00\x00\x01\x00\x03\x00\x00\x00abc").unwrap();
        assert_eq!(&reader.as_slice()[..13], b"pk\x00\x00\x01\x00\x03\x00\x00\x00abc");
        assert_eq!(reader.capacity(), 64);
        writer.unlink().unwrap();
    }

    #[test]
    fn fresh_segment_is_zeroed() {
        let segment = SharedSegment::open(&unique_tag("zero"), 32).unwrap();
        assert!(segment.as_slice().iter().all(|b| *b == 0));
        segment.unlink().unwrap();
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut segment = SharedSegment::open(&unique_tag("small"), 8).unwrap();
        let err = segment.write_frame(&[1u8; 9]).unwrap_err();
        assert!(matches!(
            err,
            TransportError::CapacityExceeded {
                size: 9,
                capacity: 8
            }
        ));
        segment.unlink().unwrap();
    }

    #[test]
    fn backing_file_outlives_its_creator() {
        let tag = unique_tag("persist");
        let mut creator = SharedSegment::open(&tag, 32).unwrap();
        let reader = SharedSegment::open(&tag, 32).unwrap();
        let path = creator.path().to_path_buf();

        drop(reader);
        creator.write_frame(b"pk-state").unwrap();
        drop(creator);
        assert!(path.exists(), "dropping a handle must not remove the segment");

        let reopened = SharedSegment::open(&tag, 32).unwrap();
        assert_eq!(&reopened.as_slice()[..8], b"pk-state");
        reopened.unlink().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn replaced_file_detaches_old_handles() {
        let tag = unique_tag("detach");
        let first = SharedSegment::open(&tag, 16).unwrap();
        assert!(!first.is_detached());

        first.unlink().unwrap();
        assert!(first.is_detached());

        let second = SharedSegment::open(&tag, 16).unwrap();
        assert!(first.is_detached());
        assert!(!second.is_detached());

        // A stale handle must not remove the file it no longer maps.
        first.unlink().unwrap();
        assert!(second.path().exists());
        second.unlink().unwrap();
    }

    #[test]
    fn zero_capacity_rejected() {
        let err = SharedSegment::open(&unique_tag("empty"), 0).unwrap_err();
        assert!(matches!(err, TransportError::Map { .. }));
    }

    #[test]
    fn invalid_tag_rejected() {
        assert!(matches!(
            segment_path("../escape"),
            Err(TransportError::InvalidName(_))
        ));
    }
}

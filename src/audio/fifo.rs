// FIFO-based audio input
// An external capture process writes 16kHz mono s16le PCM into a named pipe;
// the session driver reads it from here.

use std::fs::File;
use std::io::{self, Read};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use tracing::{debug, info, warn};

use super::{AudioSource, Capture, CaptureProvider, PcmAssembler};
use crate::lock;

/// Sleep between non-blocking read attempts while the pipe is empty.
const EMPTY_PIPE_BACKOFF: Duration = Duration::from_millis(5);

/// Create the FIFO special file at `fifo_path` unless one is already there.
///
/// Returns whether a new FIFO was made.
fn ensure_fifo(fifo_path: &Path) -> io::Result<bool> {
    match std::fs::metadata(fifo_path) {
        Ok(meta) if meta.file_type().is_fifo() => Ok(false),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{:?} exists and is not a FIFO", fifo_path),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            // Read/write permissions for owner only
            nix::unistd::mkfifo(fifo_path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::Other,
                    format!("Failed to create FIFO at {:?}: {}", fifo_path, e),
                )
            })?;
            info!("Created capture FIFO at {:?}", fifo_path);
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

/// FifoSource reads PCM from a named pipe (FIFO).
///
/// The pipe is opened read/write and non-blocking, so the session never
/// sees end-of-file while the capture process reconnects; an empty pipe
/// reads as [`Capture::Idle`]. The FIFO file itself outlives the source.
pub struct FifoSource {
    fifo_path: PathBuf,
    reader: Option<File>,
    pcm: PcmAssembler,
    bytes: Vec<u8>,
}

impl FifoSource {
    /// Source over the FIFO at `fifo_path`, creating the FIFO if needed.
    ///
    /// The FIFO is not opened until [`AudioSource::start`].
    ///
    /// # Errors
    /// Fails if the FIFO can't be created, or if something other than a
    /// FIFO already exists at the path.
    pub fn new(fifo_path: PathBuf) -> io::Result<Self> {
        ensure_fifo(&fifo_path)?;
        Ok(Self {
            fifo_path,
            reader: None,
            pcm: PcmAssembler::new(),
            bytes: Vec::new(),
        })
    }

    /// Path the capture process should write to.
    pub fn fifo_path(&self) -> &Path {
        &self.fifo_path
    }
}

impl AudioSource for FifoSource {
    fn start(&mut self) -> io::Result<()> {
        let reader = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&self.fifo_path)?;
        debug!("Capture FIFO {:?} opened for reading", self.fifo_path);
        self.reader = Some(reader);
        self.pcm.clear();
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16], wait: Duration) -> io::Result<Capture> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "capture FIFO read before start",
                ))
            }
        };
        if buf.is_empty() {
            return Ok(Capture::Idle);
        }

        self.bytes.resize(buf.len() * 2, 0);
        // Leave room for a held-back byte so the samples always fit `buf`
        let max_bytes = if self.pcm.has_pending() {
            buf.len() * 2 - 1
        } else {
            buf.len() * 2
        };
        let deadline = Instant::now() + wait;

        loop {
            match reader.read(&mut self.bytes[..max_bytes]) {
                Ok(0) => return Ok(Capture::Closed),
                Ok(n) => {
                    let samples = self.pcm.push(&self.bytes[..n]);
                    if samples.is_empty() {
                        continue;
                    }
                    buf[..samples.len()].copy_from_slice(&samples);
                    return Ok(Capture::Samples(samples.len()));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(Capture::Idle);
                    }
                    std::thread::sleep(EMPTY_PIPE_BACKOFF.min(deadline - now));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// [`CaptureProvider`] that opens a [`FifoSource`] at a fixed path.
///
/// The FIFO stays in place across sessions, so a long-running capture
/// process can keep writing to the same path between stop and start. A
/// FIFO this provider created is removed when the provider is dropped.
#[derive(Debug)]
pub struct FifoCapture {
    fifo_path: PathBuf,
    /// Whether this provider made the FIFO and must remove it
    created: Mutex<bool>,
}

impl FifoCapture {
    pub fn new(fifo_path: PathBuf) -> Self {
        Self {
            fifo_path,
            created: Mutex::new(false),
        }
    }

    pub fn fifo_path(&self) -> &Path {
        &self.fifo_path
    }
}

impl CaptureProvider for FifoCapture {
    fn open(&self) -> io::Result<Box<dyn AudioSource>> {
        let mut created = lock(&self.created);
        if ensure_fifo(&self.fifo_path)? {
            *created = true;
        }
        Ok(Box::new(FifoSource::new(self.fifo_path.clone())?))
    }
}

impl Drop for FifoCapture {
    /// Clean up the FIFO file if this provider created it.
    fn drop(&mut self) {
        if !*lock(&self.created) {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.fifo_path) {
            warn!("Failed to remove FIFO file {:?}: {}", self.fifo_path, e);
        } else {
            debug!("Cleaned up FIFO at {:?}", self.fifo_path);
        }
    }
}

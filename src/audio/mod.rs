// Audio input for continuous sessions.
//
// Capture itself belongs to an external service; a session only reads
// 16 kHz mono s16 samples from whatever `AudioSource` the configured
// `CaptureProvider` opens.

pub mod fifo;
pub mod pcm;

use std::io;
use std::time::Duration;

pub use fifo::{FifoCapture, FifoSource};
pub use pcm::{bytes_to_samples, PcmAssembler};

/// Result of one read from an [`AudioSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// `n` samples were written to the front of the buffer
    Samples(usize),
    /// Nothing arrived within the wait
    Idle,
    /// The source will not produce more audio
    Closed,
}

/// A live stream of samples read by the session driver thread.
pub trait AudioSource: Send {
    /// Begin delivering audio. Failure here aborts session start.
    fn start(&mut self) -> io::Result<()>;

    /// Read up to `buf.len()` samples, waiting at most `wait`.
    fn read(&mut self, buf: &mut [i16], wait: Duration) -> io::Result<Capture>;
}

/// Opens a fresh [`AudioSource`] for every continuous session.
pub trait CaptureProvider: Send + Sync {
    fn open(&self) -> io::Result<Box<dyn AudioSource>>;
}

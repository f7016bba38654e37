// OneShotTranscriber - whole-input recognition with a transient recognizer
//
// Each call creates its own recognizer and drops it before returning, on
// success and on every error path.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, info};

use crate::audio::{bytes_to_samples, PcmAssembler};
use crate::engine::{EngineError, Recognizer, SpeechModel, SAMPLE_RATE};
use crate::error::{Result, SessionError};
use crate::recognizer::RecognizerFactory;
use crate::wav::WavReader;

pub struct OneShotTranscriber {
    /// Read size for files, in bytes (even)
    chunk_bytes: usize,
}

impl OneShotTranscriber {
    pub fn new(chunk_bytes: usize) -> Self {
        // Keep chunks sample aligned
        let chunk_bytes = (chunk_bytes.max(2) / 2) * 2;
        Self { chunk_bytes }
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// Transcribe an in-memory s16le PCM buffer and return the final record.
    ///
    /// # Errors
    /// `TranscribeFailed` if the recognizer can't be built or decoding fails.
    pub fn transcribe_buffer(&self, model: &dyn SpeechModel, bytes: &[u8]) -> Result<String> {
        let mut recognizer = Self::recognizer(model)?;
        let samples = bytes_to_samples(bytes);
        debug!("OneShotTranscriber: decoding {} samples from buffer", samples.len());

        recognizer.accept_waveform(&samples).map_err(transcribe_failed)?;
        recognizer.final_result().map_err(transcribe_failed)
    }

    /// Transcribe a file of raw s16le PCM or 16 kHz mono 16-bit WAV.
    ///
    /// The file is streamed in `chunk_bytes` reads. For WAV, the RIFF chunks
    /// are walked to `data` and only that chunk is decoded.
    ///
    /// # Errors
    /// `TranscribeFailed` if the file can't be read, a WAV header is
    /// malformed or in an unsupported format, or decoding fails.
    pub fn transcribe_file(&self, model: &dyn SpeechModel, path: &Path) -> Result<String> {
        let mut file = File::open(path).map_err(|e| {
            SessionError::TranscribeFailed(format!("Cannot open {:?}: {}", path, e))
        })?;

        let mut magic = [0u8; 12];
        let magic_len = read_full(&mut file, &mut magic).map_err(read_failed)?;

        let (data_start, mut remaining) = if WavReader::is_wav(&magic[..magic_len]) {
            let layout = WavReader::read_layout(&mut file).map_err(SessionError::TranscribeFailed)?;
            WavReader::check_format(&layout.format).map_err(SessionError::TranscribeFailed)?;
            debug!(
                "OneShotTranscriber: WAV data at offset {} ({} bytes)",
                layout.data_offset, layout.data_len
            );
            // Streaming writers leave the size at 0 or u32::MAX
            let limit = match layout.data_len {
                0 => u64::MAX,
                n if n == u64::from(u32::MAX) => u64::MAX,
                n => n,
            };
            (layout.data_offset, limit)
        } else {
            (0, u64::MAX)
        };
        file.seek(SeekFrom::Start(data_start)).map_err(read_failed)?;

        let mut recognizer = Self::recognizer(model)?;
        let mut pcm = PcmAssembler::new();
        let mut total = 0u64;

        let mut buf = vec![0u8; self.chunk_bytes];
        while remaining > 0 {
            let n = read_full(&mut file, &mut buf).map_err(read_failed)?;
            if n == 0 {
                break;
            }
            // Anything past the data chunk (trailing metadata) is not audio
            let take = remaining.min(n as u64) as usize;
            let samples = pcm.push(&buf[..take]);
            recognizer.accept_waveform(&samples).map_err(transcribe_failed)?;
            remaining -= take as u64;
            total += take as u64;
        }

        info!("OneShotTranscriber: decoded {} bytes from {:?}", total, path);
        recognizer.final_result().map_err(transcribe_failed)
    }

    fn recognizer(model: &dyn SpeechModel) -> Result<Box<dyn Recognizer>> {
        RecognizerFactory::create(model, SAMPLE_RATE, None)
            .map_err(|e| SessionError::TranscribeFailed(e.to_string()))
    }
}

fn transcribe_failed(e: EngineError) -> SessionError {
    SessionError::TranscribeFailed(e.to_string())
}

fn read_failed(e: io::Error) -> SessionError {
    SessionError::TranscribeFailed(e.to_string())
}

/// Fill `buf` unless EOF comes first. Returns bytes read.
fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

use std::io::{self, Read, Seek, SeekFrom};

use crate::engine::SAMPLE_RATE;

/// Bits per sample the engine accepts
pub const BITS_PER_SAMPLE: u16 = 16;

/// Number of channels the engine accepts
pub const CHANNELS: u16 = 1;

/// PCM format code in the `fmt ` chunk
const FORMAT_PCM: u16 = 1;

/// Audio parameters read from a WAV `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

/// Location of PCM data inside a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavLayout {
    pub format: WavFormat,
    /// Byte offset of the first sample
    pub data_offset: u64,
    /// Length of the `data` chunk in bytes (as declared by the header)
    pub data_len: u64,
}

/// Reads the RIFF/WAVE header at the start of an audio file.
pub struct WavReader;

impl WavReader {
    /// Checks for the `RIFF....WAVE` magic.
    pub fn is_wav(bytes: &[u8]) -> bool {
        bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
    }

    /// Walk the RIFF chunks until the `data` chunk.
    ///
    /// ```text
    /// Bytes 0-3:   "RIFF"
    /// Bytes 4-7:   File size - 8
    /// Bytes 8-11:  "WAVE"
    /// then chunks: 4-byte id, little-endian u32 size, payload (padded to even)
    ///   "fmt ": audio format u16, channels u16, sample rate u32,
    ///           byte rate u32, block align u16, bits per sample u16
    ///   "data": PCM samples
    /// ```
    ///
    /// Chunks other than `fmt ` are skipped with a seek, so metadata of any
    /// size (LIST, bext, iXML) may sit before `data`. The reader is left
    /// somewhere inside the header; seek to `data_offset` before reading
    /// samples.
    ///
    /// # Errors
    /// Returns an error if the magic is missing, a chunk is truncated, or the
    /// `fmt ` chunk does not precede `data`.
    pub fn read_layout<R: Read + Seek>(reader: &mut R) -> Result<WavLayout, String> {
        let mut riff = [0u8; 12];
        reader
            .seek(SeekFrom::Start(0))
            .and_then(|_| reader.read_exact(&mut riff))
            .map_err(|_| "Missing RIFF/WAVE header".to_string())?;
        if !Self::is_wav(&riff) {
            return Err("Missing RIFF/WAVE header".to_string());
        }

        let mut offset: u64 = 12;
        let mut format: Option<WavFormat> = None;

        loop {
            let mut header = [0u8; 8];
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(format!("Cannot read WAV header: {}", e)),
            }
            let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;
            let body = offset + 8;

            match &header[0..4] {
                b"fmt " => {
                    let mut fmt = [0u8; 16];
                    if size < 16 || reader.read_exact(&mut fmt).is_err() {
                        return Err("Truncated fmt chunk".to_string());
                    }
                    let u16_at = |i: usize| u16::from_le_bytes([fmt[i], fmt[i + 1]]);
                    format = Some(WavFormat {
                        audio_format: u16_at(0),
                        channels: u16_at(2),
                        sample_rate: u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]),
                        bits_per_sample: u16_at(14),
                    });
                }
                b"data" => {
                    let format = format.ok_or_else(|| "data chunk before fmt chunk".to_string())?;
                    return Ok(WavLayout {
                        format,
                        data_offset: body,
                        data_len: size,
                    });
                }
                _ => {}
            }

            // Chunks are word aligned
            offset = body + size + (size & 1);
            reader
                .seek(SeekFrom::Start(offset))
                .map_err(|e| format!("Cannot read WAV header: {}", e))?;
        }

        Err("No data chunk found in WAV header".to_string())
    }

    /// Rejects anything the recognizer can't consume as-is.
    pub fn check_format(format: &WavFormat) -> Result<(), String> {
        if format.audio_format != FORMAT_PCM {
            return Err(format!(
                "Unsupported WAV encoding {} (only PCM is supported)",
                format.audio_format
            ));
        }
        if format.channels != CHANNELS {
            return Err(format!(
                "Unsupported channel count {} (expected mono)",
                format.channels
            ));
        }
        if format.sample_rate != SAMPLE_RATE as u32 {
            return Err(format!(
                "Unsupported sample rate {} Hz (expected {} Hz)",
                format.sample_rate, SAMPLE_RATE as u32
            ));
        }
        if format.bits_per_sample != BITS_PER_SAMPLE {
            return Err(format!(
                "Unsupported sample width {} bits (expected {})",
                format.bits_per_sample, BITS_PER_SAMPLE
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn wav_bytes(format: WavFormat, pcm: &[u8]) -> Vec<u8> {
    let block_align = format.channels * (format.bits_per_sample / 8);
    let byte_rate = format.sample_rate * block_align as u32;
    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + pcm.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&format.audio_format.to_le_bytes());
    out.extend_from_slice(&format.channels.to_le_bytes());
    out.extend_from_slice(&format.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&format.bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

#[cfg(test)]
pub(crate) const ENGINE_FORMAT: WavFormat = WavFormat {
    audio_format: 1,
    channels: 1,
    sample_rate: 16000,
    bits_per_sample: 16,
};

/// PcmAssembler turns s16le byte chunks into i16 samples for the engine.
///
/// Chunks handed over by a host do not have to be sample-aligned: an odd
/// trailing byte is held back and joined with the first byte of the next
/// chunk.
///
/// # Audio Format Expectations
/// - Sample rate: 16kHz
/// - Format: s16le (16-bit signed integer, little-endian)
/// - Channels: mono (single channel)
/// - Bytes per second: 32,000 (16000 samples/sec × 2 bytes/sample)
#[derive(Debug, Default)]
pub struct PcmAssembler {
    /// Low byte of a sample split across two chunks
    pending: Option<u8>,
}

impl PcmAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts a chunk to samples, carrying an unpaired byte forward.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<i16> {
        let mut samples = Vec::with_capacity((chunk.len() + 1) / 2);
        let mut rest = chunk;

        if let Some(low) = self.pending.take() {
            match rest.split_first() {
                Some((&high, tail)) => {
                    samples.push(i16::from_le_bytes([low, high]));
                    rest = tail;
                }
                None => {
                    self.pending = Some(low);
                    return samples;
                }
            }
        }

        let pairs = rest.chunks_exact(2);
        if let [odd] = pairs.remainder() {
            self.pending = Some(*odd);
        }
        samples.extend(pairs.map(|pair| i16::from_le_bytes([pair[0], pair[1]])));
        samples
    }

    /// True if a byte is waiting for its pair.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Forget a held-back byte.
    pub fn clear(&mut self) {
        self.pending = None;
    }
}

/// Converts a complete buffer; a trailing odd byte is discarded.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

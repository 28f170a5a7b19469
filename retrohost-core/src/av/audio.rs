/// One interleaved stereo frame of 16-bit samples.
pub const BYTES_PER_STEREO_FRAME: usize = 4;

/// Turns core audio upcalls into little-endian interleaved stereo bytes.
///
/// The scratch buffer is reused; each returned slice is only valid until the next call.
#[derive(Debug, Default)]
pub struct AudioBatcher {
    scratch: Vec<u8>,
}

impl AudioBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single stereo sample: exactly four bytes, left then right.
    pub fn sample(&mut self, left: i16, right: i16) -> &[u8] {
        self.scratch.clear();
        self.scratch.extend_from_slice(&left.to_le_bytes());
        self.scratch.extend_from_slice(&right.to_le_bytes());
        &self.scratch
    }

    /// An interleaved batch (`L R L R ...`). A trailing odd sample is dropped.
    pub fn batch(&mut self, interleaved: &[i16]) -> &[u8] {
        let frames = interleaved.len() / 2;
        self.scratch.clear();
        self.scratch.reserve(frames * BYTES_PER_STEREO_FRAME);
        for s in &interleaved[..frames * 2] {
            self.scratch.extend_from_slice(&s.to_le_bytes());
        }
        &self.scratch
    }

    /// Frames consumed by a batch of `interleaved.len()` samples.
    pub fn frames_in(interleaved: &[i16]) -> usize {
        interleaved.len() / 2
    }
}

//! Captured video frame.

use poise_core::FrameSize;

/// One frame handed from the capture device to the detector.
///
/// The pixel layout is whatever the device and detector agree on; the
/// metrics layer only needs the dimensions.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Capture resolution; the reference frame for head position.
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

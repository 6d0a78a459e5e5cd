use crate::format::{JPEG_ESCAPE, JPEG_END_OF_STREAM, JPEG_SIGNATURE};

/// Assembles synthetic JPEG marker streams for tests, one segment at a time.
#[derive(Debug, Clone)]
pub struct JpegBuilder {
    bytes: Vec<u8>,
}

impl JpegBuilder {
    pub fn new() -> Self {
        Self {
            bytes: JPEG_SIGNATURE.to_vec(),
        }
    }

    /// Appends a length-carrying segment; the length field is computed from `payload`.
    pub fn segment(mut self, tag: u8, payload: &[u8]) -> Self {
        let declared = u16::try_from(payload.len() + 2).expect("payload too large for a segment");
        self.bytes.push(JPEG_ESCAPE);
        self.bytes.push(tag);
        self.bytes.extend_from_slice(&declared.to_be_bytes());
        self.bytes.extend_from_slice(payload);
        self
    }

    /// Appends bytes verbatim (entropy-coded data, fill bytes, broken markers).
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn end(mut self) -> Self {
        self.bytes.push(JPEG_ESCAPE);
        self.bytes.push(JPEG_END_OF_STREAM);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// The two-region container used throughout the tests: a 50-byte quantization
/// table and a 500-byte scan header, framed by SOI/EOI.
pub fn dqt_sos_container() -> Vec<u8> {
    let dqt: Vec<u8> = (0..50u8).collect();
    let sos: Vec<u8> = (0..500u16).map(|i| (i % 251) as u8).collect();
    JpegBuilder::new()
        .segment(0xDB, &dqt)
        .segment(0xDA, &sos)
        .end()
        .build()
}

/// Encodes a small gradient with the `image` crate's baseline JPEG encoder.
pub fn encoded_jpeg() -> Vec<u8> {
    use image::ExtendedColorType;
    use image::codecs::jpeg::JpegEncoder;

    let (width, height) = (32u32, 24u32);
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.push((x * 8) as u8);
            pixels.push((y * 10) as u8);
            pixels.push(((x + y) * 4) as u8);
        }
    }

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 85)
        .encode(&pixels, width, height, ExtendedColorType::Rgb8)
        .expect("in-memory JPEG encoding");
    out
}

//! Raw channel sample decoding.

/// Width of one sample on a channel data service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleWidth {
    /// Signed 16-bit samples.
    I16,
    /// Signed 32-bit samples (`data32=1` modules).
    I32,
}

impl SampleWidth {
    /// Width selected by the root service's `data32` knob.
    pub fn from_data32(data32: &str) -> Self {
        if data32.trim() == "1" {
            Self::I32
        } else {
            Self::I16
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Self::I16 => 2,
            Self::I32 => 4,
        }
    }
}

/// Decoded samples of one channel, little-endian on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Samples {
    I16(Vec<i16>),
    I32(Vec<i32>),
}

impl Samples {
    /// Decode `count` elements from the front of `buf`, or every whole
    /// element when `count` is `None`.
    ///
    /// `count` is clamped to the whole elements available in `buf`.
    pub fn decode(buf: &[u8], width: SampleWidth, count: Option<usize>) -> Self {
        let whole = buf.len() / width.bytes();
        let n = count.map_or(whole, |c| c.min(whole));
        let used = &buf[..n * width.bytes()];
        match width {
            SampleWidth::I16 => Self::I16(
                used.chunks_exact(2)
                    .map(|c| i16::from_le_bytes([c[0], c[1]]))
                    .collect(),
            ),
            SampleWidth::I32 => Self::I32(
                used.chunks_exact(4)
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
        }
    }

    pub fn width(&self) -> SampleWidth {
        match self {
            Self::I16(_) => SampleWidth::I16,
            Self::I32(_) => SampleWidth::I32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::I16(v) => v.len(),
            Self::I32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw little-endian bytes, as dumped to disk.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::I16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::I32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        }
    }
}

//! H.264 Annex-B framing
//!
//! Splits a raw elementary stream into NAL units. Every unit handed out is
//! re-framed with a 4-byte start code so consumers can concatenate units
//! directly into a playable stream.

use std::fmt;
use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Start code every emitted unit begins with
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Largest unit accepted before the stream is considered corrupt
const MAX_UNIT_SIZE: usize = 4 * 1024 * 1024;

const READ_CHUNK: usize = 64 * 1024;

/// NAL unit type (low 5 bits of the header byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalType {
    /// Non-IDR slice
    Slice,
    /// IDR slice (keyframe)
    Idr,
    Sei,
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// Access unit delimiter
    Aud,
    Other(u8),
}

impl NalType {
    #[must_use]
    pub const fn from_header(header: u8) -> Self {
        match header & 0x1F {
            1 => Self::Slice,
            5 => Self::Idr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            n => Self::Other(n),
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::Idr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::Other(n) => n,
        }
    }
}

impl fmt::Display for NalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slice => f.write_str("SLICE"),
            Self::Idr => f.write_str("IDR"),
            Self::Sei => f.write_str("SEI"),
            Self::Sps => f.write_str("SPS"),
            Self::Pps => f.write_str("PPS"),
            Self::Aud => f.write_str("AUD"),
            Self::Other(n) => write!(f, "{n}"),
        }
    }
}

/// One NAL unit, stored with its 4-byte start code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    nal_type: NalType,
    data: Bytes,
}

impl NalUnit {
    /// Frame a unit from its payload (header byte onwards).
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        let header = *payload.first()?;
        let mut data = BytesMut::with_capacity(START_CODE.len() + payload.len());
        data.put_slice(&START_CODE);
        data.put_slice(payload);
        Some(Self {
            nal_type: NalType::from_header(header),
            data: data.freeze(),
        })
    }

    #[must_use]
    pub const fn nal_type(&self) -> NalType {
        self.nal_type
    }

    /// Start code plus payload
    #[must_use]
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[START_CODE.len()..]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Position of the next `00 00 01` at or after `from`
fn find_start_code(buf: &[u8], from: usize) -> Option<usize> {
    if buf.len() < from + 3 {
        return None;
    }
    buf[from..]
        .windows(3)
        .position(|w| w == [0, 0, 1])
        .map(|p| p + from)
}

/// Reads NAL units off an Annex-B byte stream.
///
/// A unit is complete once the following start code has arrived, so the
/// most recent unit is held back until the encoder emits the next one.
pub struct NalReader<R> {
    inner: R,
    buf: BytesMut,
    /// `buf` starts at a unit payload (its start code already consumed)
    in_unit: bool,
    /// Bytes of `buf` already searched for the next start code
    scanned: usize,
}

impl<R: AsyncRead + Unpin> NalReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
            in_unit: false,
            scanned: 0,
        }
    }

    /// Next complete unit. EOF is an error: the source is a live stream.
    pub async fn read_unit(&mut self) -> io::Result<NalUnit> {
        loop {
            if let Some(unit) = self.split_unit() {
                return Ok(unit);
            }
            if self.buf.len() > MAX_UNIT_SIZE {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("NAL unit exceeds {MAX_UNIT_SIZE} bytes"),
                ));
            }

            self.buf.reserve(READ_CHUNK);
            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "video socket closed",
                ));
            }
        }
    }

    fn split_unit(&mut self) -> Option<NalUnit> {
        loop {
            if !self.in_unit {
                // Bytes ahead of the first start code belong to no unit
                let start = find_start_code(&self.buf, 0)?;
                self.buf.advance(start + 3);
                self.in_unit = true;
                self.scanned = 0;
            }

            let Some(next) = find_start_code(&self.buf, self.scanned) else {
                // A start code may straddle two reads
                self.scanned = self.buf.len().saturating_sub(2);
                return None;
            };

            // A zero right before `00 00 01` is the first byte of a 4-byte code
            let end = if next > 0 && self.buf[next - 1] == 0 {
                next - 1
            } else {
                next
            };
            let payload = self.buf.split_to(end);
            self.in_unit = false;
            self.scanned = 0;

            if let Some(unit) = NalUnit::from_payload(&payload) {
                return Some(unit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: &[u8] = &[0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40];
    const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];
    const IDR: &[u8] = &[0x65, 0x88, 0x84, 0x21, 0xA0];
    const SLICE: &[u8] = &[0x41, 0x9A, 0x02, 0x04];
    const SC4: &[u8] = &[0, 0, 0, 1];
    const SC3: &[u8] = &[0, 0, 1];
    const EMPTY: &[u8] = &[];

    fn framed(parts: &[(&[u8], &[u8])]) -> Vec<u8> {
        parts
            .iter()
            .flat_map(|(sc, payload)| sc.iter().chain(payload.iter()).copied())
            .collect()
    }

    #[test]
    fn test_nal_type_from_header() {
        assert_eq!(NalType::from_header(0x67), NalType::Sps);
        assert_eq!(NalType::from_header(0x68), NalType::Pps);
        assert_eq!(NalType::from_header(0x65), NalType::Idr);
        assert_eq!(NalType::from_header(0x41), NalType::Slice);
        assert_eq!(NalType::from_header(0x0C), NalType::Other(12));
        assert_eq!(NalType::Other(12).as_u8(), 12);
        assert_eq!(NalType::Sps.to_string(), "SPS");
    }

    #[test]
    fn test_unit_framing() {
        let unit = NalUnit::from_payload(SPS).unwrap();
        assert_eq!(&unit.data()[..4], &START_CODE);
        assert_eq!(unit.payload(), SPS);
        assert_eq!(unit.len(), SPS.len() + 4);
        assert!(NalUnit::from_payload(&[]).is_none());
    }

    #[tokio::test]
    async fn test_mixed_start_codes_are_normalized() {
        let stream = framed(&[
            (SC4, SPS),
            (SC3, PPS),
            (SC4, IDR),
            (SC3, SLICE),
            (SC4, SLICE),
        ]);
        let mut reader = NalReader::new(stream.as_slice());

        for expected in [SPS, PPS, IDR, SLICE] {
            let unit = reader.read_unit().await.unwrap();
            assert_eq!(&unit.data()[..4], &START_CODE);
            assert_eq!(unit.payload(), expected);
        }
        // The final unit never sees a following start code
        let err = reader.read_unit().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_leading_garbage_and_empty_units_skipped() {
        let mut stream = vec![0xFF, 0x12];
        stream.extend(framed(&[
            (SC4, EMPTY),
            (SC4, SPS),
            (SC3, PPS),
        ]));
        let mut reader = NalReader::new(stream.as_slice());

        let unit = reader.read_unit().await.unwrap();
        assert_eq!(unit.nal_type(), NalType::Sps);
        assert_eq!(unit.payload(), SPS);
    }

    #[tokio::test]
    async fn test_units_split_across_reads() {
        let stream = framed(&[
            (SC4, SPS),
            (SC4, PPS),
            (SC4, IDR),
        ]);
        let (mut tx, rx) = tokio::io::duplex(4);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            // One byte at a time so start codes straddle reads
            for b in stream {
                tx.write_all(&[b]).await.unwrap();
            }
        });

        let mut reader = NalReader::new(rx);
        assert_eq!(reader.read_unit().await.unwrap().payload(), SPS);
        assert_eq!(reader.read_unit().await.unwrap().payload(), PPS);
        // IDR is last, so the writer closing ends the stream
        assert!(reader.read_unit().await.is_err());
        writer.await.unwrap();
    }
}

use bytes::{BufMut, Bytes, BytesMut};

use crate::nal::{NalType, NalUnit};

/// First SPS, PPS and IDR seen on a stream.
///
/// Each slot is written once; later units of the same type never replace
/// the cached one.
#[derive(Debug, Default)]
pub struct BootstrapCache {
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    idr: Option<Bytes>,
}

impl BootstrapCache {
    /// Cache `unit` if it fills an empty slot. Returns true when this call
    /// completed the set.
    pub fn offer(&mut self, unit: &NalUnit) -> bool {
        if unit.is_empty() || self.is_complete() {
            return false;
        }
        let slot = match unit.nal_type() {
            NalType::Sps => &mut self.sps,
            NalType::Pps => &mut self.pps,
            NalType::Idr => &mut self.idr,
            _ => return false,
        };
        if slot.is_none() {
            *slot = Some(unit.data().clone());
        }
        self.is_complete()
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.sps.is_some() && self.pps.is_some() && self.idr.is_some()
    }

    /// `SPS ++ PPS ++ IDR`, or `None` while any of them is missing.
    #[must_use]
    pub fn blob(&self) -> Option<Bytes> {
        let (sps, pps, idr) = (self.sps.as_ref()?, self.pps.as_ref()?, self.idr.as_ref()?);
        let mut blob = BytesMut::with_capacity(sps.len() + pps.len() + idr.len());
        blob.put_slice(sps);
        blob.put_slice(pps);
        blob.put_slice(idr);
        Some(blob.freeze())
    }

    /// Cached sizes for logging: (sps, pps, idr)
    #[must_use]
    pub fn sizes(&self) -> (usize, usize, usize) {
        (
            self.sps.as_ref().map_or(0, Bytes::len),
            self.pps.as_ref().map_or(0, Bytes::len),
            self.idr.as_ref().map_or(0, Bytes::len),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(payload: &[u8]) -> NalUnit {
        NalUnit::from_payload(payload).unwrap()
    }

    #[test]
    fn test_blob_order_is_fixed() {
        let mut cache = BootstrapCache::default();
        // Arrival order differs from blob order
        assert!(!cache.offer(&unit(&[0x65, 0xAA])));
        assert!(!cache.offer(&unit(&[0x68, 0xBB])));
        assert!(cache.blob().is_none());
        assert!(cache.offer(&unit(&[0x67, 0xCC])));

        let blob = cache.blob().unwrap();
        assert_eq!(
            blob.as_ref(),
            &[0, 0, 0, 1, 0x67, 0xCC, 0, 0, 0, 1, 0x68, 0xBB, 0, 0, 0, 1, 0x65, 0xAA]
        );
    }

    #[test]
    fn test_first_unit_of_each_type_wins() {
        let mut cache = BootstrapCache::default();
        cache.offer(&unit(&[0x67, 0x01]));
        cache.offer(&unit(&[0x67, 0x02, 0x03]));
        cache.offer(&unit(&[0x41, 0x09]));
        assert_eq!(cache.sizes(), (6, 0, 0));
    }
}

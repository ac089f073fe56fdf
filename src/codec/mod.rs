//! Wire frame codec: TGR, CTL, ACK (spec §3, §4.1).
//!
//! All three frames are fixed-length. Multi-byte integer fields travel in
//! network byte order; `crc` (TGR, ACK) is computed over the bytes
//! immediately following the header, using the host's native byte layout
//! for the fields being signed, before that payload is swapped to network
//! order for transmission — this matches the source's `crc16(0, (char*)msg
//! + 4, sizeof(*msg) - 4)` called before `hton`.

use crc::{Crc, CRC_16_ARC};

use crate::errors::{CodecError, Verdict};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

pub const TGR_HDR: u16 = 0xa0f9;
pub const CTL_HDR: u16 = 0xa1f9;
pub const ACK_HDR: u16 = 0xa2f9;

pub const TGR_LEN: usize = 1024;
pub const CTL_LEN: usize = 28;
pub const ACK_LEN: usize = 56;

const TGR_RESERVED_LEN: usize = 1016;
const NAME_LEN: usize = 16;
const COORD_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtlCode {
    Online,
    Offline,
}

impl CtlCode {
    fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(CtlCode::Online),
            2 => Some(CtlCode::Offline),
            _ => None,
        }
    }

    fn as_u16(self) -> u16 {
        match self {
            CtlCode::Online => 1,
            CtlCode::Offline => 2,
        }
    }
}

/// Trigger datagram: server → client, solicits a GPS sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TgrFrame {
    pub tsp: u32,
}

impl TgrFrame {
    /// CRC payload is `tsp` (host order) followed by the reserved region
    /// exactly as it sits on the wire — the full 1020 bytes spec §4.1
    /// requires ("length sizeof(frame)-4"), not a zero-filled reconstruction.
    fn crc_payload(tsp: u32, reserved: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + reserved.len());
        buf.extend_from_slice(&tsp.to_ne_bytes());
        buf.extend_from_slice(reserved);
        buf
    }

    pub fn encode(&self) -> [u8; TGR_LEN] {
        let reserved = [0u8; TGR_RESERVED_LEN];
        let crc = CRC16.checksum(&Self::crc_payload(self.tsp, &reserved));
        let mut out = [0u8; TGR_LEN];
        out[0..2].copy_from_slice(&TGR_HDR.to_be_bytes());
        out[2..4].copy_from_slice(&crc.to_be_bytes());
        out[4..8].copy_from_slice(&self.tsp.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != TGR_LEN {
            return Err(CodecError::ShortFrame {
                expected: TGR_LEN,
                actual: bytes.len(),
            });
        }
        let hdr = u16::from_be_bytes([bytes[0], bytes[1]]);
        if hdr != TGR_HDR {
            return Err(CodecError::BadHeader(hdr));
        }
        let tsp = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let crc_wire = u16::from_be_bytes([bytes[2], bytes[3]]);
        let crc_calc = CRC16.checksum(&Self::crc_payload(tsp, &bytes[8..TGR_LEN]));
        if crc_calc != crc_wire {
            return Err(CodecError::BadCrc {
                expected: crc_calc,
                actual: crc_wire,
            });
        }
        Ok(TgrFrame { tsp })
    }

    pub fn validate(bytes: &[u8]) -> Verdict {
        match Self::decode(bytes) {
            Ok(_) => Verdict::Ok,
            Err(CodecError::BadHeader(_)) => Verdict::BadHeader,
            Err(CodecError::BadCrc { .. }) => Verdict::BadCrc,
            Err(_) => Verdict::BadHeader,
        }
    }
}

/// Control frame: client → server over TCP, announces ONLINE/OFFLINE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtlFrame {
    pub ctl: CtlCode,
    pub uport: u16,
    pub mport: u16,
    pub bport: u16,
    pub name: String,
}

impl CtlFrame {
    pub fn encode(&self) -> [u8; CTL_LEN] {
        let mut out = [0u8; CTL_LEN];
        out[0..2].copy_from_slice(&CTL_HDR.to_be_bytes());
        out[2..4].copy_from_slice(&self.ctl.as_u16().to_be_bytes());
        out[4..6].copy_from_slice(&self.uport.to_be_bytes());
        out[6..8].copy_from_slice(&self.mport.to_be_bytes());
        out[8..10].copy_from_slice(&self.bport.to_be_bytes());
        // bytes 10..12 are the unused pad field, left zeroed
        write_name(&mut out[12..12 + NAME_LEN], &self.name);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != CTL_LEN {
            return Err(CodecError::ShortFrame {
                expected: CTL_LEN,
                actual: bytes.len(),
            });
        }
        let hdr = u16::from_be_bytes([bytes[0], bytes[1]]);
        if hdr != CTL_HDR {
            return Err(CodecError::BadHeader(hdr));
        }
        let ctl_raw = u16::from_be_bytes([bytes[2], bytes[3]]);
        let ctl = CtlCode::from_u16(ctl_raw).ok_or(CodecError::BadControlCode(ctl_raw))?;
        let uport = u16::from_be_bytes([bytes[4], bytes[5]]);
        let mport = u16::from_be_bytes([bytes[6], bytes[7]]);
        let bport = u16::from_be_bytes([bytes[8], bytes[9]]);
        let name = read_name(&bytes[12..12 + NAME_LEN]);
        Ok(CtlFrame {
            ctl,
            uport,
            mport,
            bport,
            name,
        })
    }

    pub fn validate(bytes: &[u8]) -> Verdict {
        match Self::decode(bytes) {
            Ok(_) => Verdict::Ok,
            Err(CodecError::BadControlCode(_)) => Verdict::BadControlCode,
            Err(_) => Verdict::BadHeader,
        }
    }
}

/// Acknowledgement: client → server over unicast UDP, carries a GPS fix.
#[derive(Debug, Clone, PartialEq)]
pub struct AckFrame {
    pub name: String,
    pub latitude: String,
    pub longitude: String,
    pub tsp: u32,
}

impl AckFrame {
    fn crc_payload(name: &str, latitude: &str, longitude: &str, tsp: u32) -> Vec<u8> {
        let mut buf = Vec::with_capacity(NAME_LEN + COORD_LEN * 2 + 4);
        let mut name_buf = [0u8; NAME_LEN];
        write_name(&mut name_buf, name);
        buf.extend_from_slice(&name_buf);
        let mut lat_buf = [0u8; COORD_LEN];
        write_name(&mut lat_buf, latitude);
        buf.extend_from_slice(&lat_buf);
        let mut lon_buf = [0u8; COORD_LEN];
        write_name(&mut lon_buf, longitude);
        buf.extend_from_slice(&lon_buf);
        buf.extend_from_slice(&tsp.to_ne_bytes());
        buf
    }

    pub fn encode(&self) -> [u8; ACK_LEN] {
        let payload = Self::crc_payload(&self.name, &self.latitude, &self.longitude, self.tsp);
        let crc = CRC16.checksum(&payload);
        let mut out = [0u8; ACK_LEN];
        out[0..2].copy_from_slice(&ACK_HDR.to_be_bytes());
        out[2..4].copy_from_slice(&crc.to_be_bytes());
        write_name(&mut out[4..4 + NAME_LEN], &self.name);
        write_name(&mut out[20..20 + COORD_LEN], &self.latitude);
        write_name(&mut out[36..36 + COORD_LEN], &self.longitude);
        out[52..56].copy_from_slice(&self.tsp.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != ACK_LEN {
            return Err(CodecError::ShortFrame {
                expected: ACK_LEN,
                actual: bytes.len(),
            });
        }
        let hdr = u16::from_be_bytes([bytes[0], bytes[1]]);
        if hdr != ACK_HDR {
            return Err(CodecError::BadHeader(hdr));
        }
        let crc_wire = u16::from_be_bytes([bytes[2], bytes[3]]);
        let name = read_name(&bytes[4..4 + NAME_LEN]);
        let latitude = read_name(&bytes[20..20 + COORD_LEN]);
        let longitude = read_name(&bytes[36..36 + COORD_LEN]);
        let tsp = u32::from_be_bytes([bytes[52], bytes[53], bytes[54], bytes[55]]);

        let crc_calc = CRC16.checksum(&Self::crc_payload(&name, &latitude, &longitude, tsp));
        if crc_calc != crc_wire {
            return Err(CodecError::BadCrc {
                expected: crc_calc,
                actual: crc_wire,
            });
        }
        Ok(AckFrame {
            name,
            latitude,
            longitude,
            tsp,
        })
    }

    pub fn validate(bytes: &[u8]) -> Verdict {
        match Self::decode(bytes) {
            Ok(_) => Verdict::Ok,
            Err(CodecError::BadHeader(_)) => Verdict::BadHeader,
            Err(CodecError::BadCrc { .. }) => Verdict::BadCrc,
            Err(_) => Verdict::BadHeader,
        }
    }
}

/// Writes `s` into `dst`, truncating to fit and leaving the remainder (at
/// least one byte) zeroed so the field is always NUL-terminated.
fn write_name(dst: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(dst.len() - 1);
    dst[..n].copy_from_slice(&bytes[..n]);
    for b in &mut dst[n..] {
        *b = 0;
    }
}

/// Reads a fixed-width ASCII field, trimming at the first NUL. Defensive
/// against an unterminated field: never reads past `src`'s end regardless.
fn read_name(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tgr_round_trips() {
        let f = TgrFrame { tsp: 1_700_000_000 };
        let encoded = f.encode();
        assert_eq!(TgrFrame::decode(&encoded).unwrap(), f);
        assert_eq!(TgrFrame::validate(&encoded), Verdict::Ok);
    }

    #[test]
    fn tgr_bad_crc_is_detected() {
        let f = TgrFrame { tsp: 42 };
        let mut encoded = f.encode();
        encoded[10] ^= 0xff;
        assert_eq!(TgrFrame::validate(&encoded), Verdict::BadCrc);
    }

    #[test]
    fn ctl_round_trips_and_truncates_name() {
        let f = CtlFrame {
            ctl: CtlCode::Online,
            uport: 7001,
            mport: 7002,
            bport: 7003,
            name: "a-very-long-client-name-that-overflows".to_string(),
        };
        let encoded = f.encode();
        let decoded = CtlFrame::decode(&encoded).unwrap();
        assert_eq!(decoded.ctl, CtlCode::Online);
        assert_eq!(decoded.uport, 7001);
        assert_eq!(decoded.name.len(), 15);
    }

    #[test]
    fn ctl_rejects_unknown_control_code() {
        let mut encoded = CtlFrame {
            ctl: CtlCode::Online,
            uport: 1,
            mport: 2,
            bport: 3,
            name: "c1".to_string(),
        }
        .encode();
        encoded[2..4].copy_from_slice(&99u16.to_be_bytes());
        assert_eq!(CtlFrame::validate(&encoded), Verdict::BadControlCode);
    }

    #[test]
    fn ack_round_trips() {
        let f = AckFrame {
            name: "C1".to_string(),
            latitude: "1.500000".to_string(),
            longitude: "2.500000".to_string(),
            tsp: 100,
        };
        let encoded = f.encode();
        assert_eq!(AckFrame::decode(&encoded).unwrap(), f);
        assert_eq!(AckFrame::validate(&encoded), Verdict::Ok);
    }

    #[test]
    fn ack_unterminated_name_field_is_truncated_defensively() {
        let mut encoded = AckFrame {
            name: "0123456789abcdef".to_string(), // exactly 16 bytes, no room for NUL
            latitude: "1.0".to_string(),
            longitude: "2.0".to_string(),
            tsp: 1,
        }
        .encode();
        // force the full 16-byte name field to be non-NUL-terminated
        encoded[4..20].copy_from_slice(b"0123456789abcdef");
        let decoded = AckFrame::decode(&encoded);
        // CRC won't match (payload changed) but decode must not panic or
        // read out of bounds regardless of verdict.
        let _ = decoded;
    }

    proptest! {
        #[test]
        fn tgr_decode_of_encode_is_identity(tsp: u32) {
            let f = TgrFrame { tsp };
            prop_assert_eq!(TgrFrame::decode(&f.encode()).unwrap(), f);
        }

        #[test]
        fn ctl_decode_of_encode_is_identity(uport: u16, mport: u16, bport: u16, online: bool) {
            let f = CtlFrame {
                ctl: if online { CtlCode::Online } else { CtlCode::Offline },
                uport, mport, bport,
                name: "fleet-unit".to_string(),
            };
            prop_assert_eq!(CtlFrame::decode(&f.encode()).unwrap(), f);
        }

        #[test]
        fn ack_decode_of_encode_is_identity(tsp: u32) {
            let f = AckFrame {
                name: "C1".to_string(),
                latitude: "1.500000".to_string(),
                longitude: "2.500000".to_string(),
                tsp,
            };
            prop_assert_eq!(AckFrame::decode(&f.encode()).unwrap(), f);
        }

        #[test]
        fn tgr_bit_flip_in_crc_region_is_detected(tsp: u32, byte_index in 4usize..8, bit in 0u8..8) {
            let f = TgrFrame { tsp };
            let mut encoded = f.encode();
            encoded[byte_index] ^= 1 << bit;
            // a flipped byte inside the covered region either changes tsp
            // (caught by a value mismatch) or corrupts the crc check.
            prop_assert_ne!(TgrFrame::validate(&encoded), Verdict::BadHeader);
        }
    }
}

//! BACnet Virtual Link Control (Annex J) framing.
//!
//! Every BACnet/IP datagram starts with a 4-byte BVLC header:
//!
//! ```text
//! Byte/     0       |       1       |       2       |       3       |
//!   +---------------+---------------+---------------+---------------+
//!  0| Type (0x81)   | Function      | Length (incl. header)         |
//!   +---------------+---------------+---------------+---------------+
//! ```
//!
//! The gateway emits Original-Unicast and Original-Broadcast NPDUs and
//! accepts those plus Forwarded-NPDU (sent by BBMDs), whose payload is
//! prefixed with the 6-byte B/IP address of the originating station.

use crate::core::error::{BacexError, BacexResult};
use bytes::{BufMut, BytesMut};

/// BVLC type octet for BACnet/IP.
pub const BVLC_TYPE: u8 = 0x81;
/// BVLC header size in bytes.
pub const BVLC_HEADER_SIZE: usize = 4;

/// BVLC functions handled by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BvlcFunction {
    /// Forwarded-NPDU (0x04), relayed by a BBMD.
    ForwardedNpdu,
    /// Original-Unicast-NPDU (0x0a).
    OriginalUnicast,
    /// Original-Broadcast-NPDU (0x0b).
    OriginalBroadcast,
}

impl BvlcFunction {
    fn from_octet(octet: u8) -> Option<Self> {
        match octet {
            0x04 => Some(Self::ForwardedNpdu),
            0x0a => Some(Self::OriginalUnicast),
            0x0b => Some(Self::OriginalBroadcast),
            _ => None,
        }
    }

    fn octet(self) -> u8 {
        match self {
            Self::ForwardedNpdu => 0x04,
            Self::OriginalUnicast => 0x0a,
            Self::OriginalBroadcast => 0x0b,
        }
    }
}

/// A decoded BVLC frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BvlcFrame<'a> {
    pub function: BvlcFunction,
    /// The NPDU payload. For Forwarded-NPDU the originating B/IP address
    /// has already been stripped.
    pub npdu: &'a [u8],
}

/// Encode a BVLC frame around an NPDU payload.
pub fn encode(function: BvlcFunction, npdu: &[u8]) -> BytesMut {
    let total = BVLC_HEADER_SIZE + npdu.len();
    let mut out = BytesMut::with_capacity(total);
    out.put_u8(BVLC_TYPE);
    out.put_u8(function.octet());
    out.put_u16(total as u16);
    out.put_slice(npdu);
    out
}

/// Decode a BVLC frame from a received datagram.
///
/// Returns `Ok(None)` for well-formed BVLC functions the gateway does not
/// consume (BBMD registration traffic and the like), so callers can skip
/// them without treating the datagram as an error.
pub fn decode(datagram: &[u8]) -> BacexResult<Option<BvlcFrame<'_>>> {
    if datagram.len() < BVLC_HEADER_SIZE {
        return Err(BacexError::TruncatedFrame {
            needed: BVLC_HEADER_SIZE,
            available: datagram.len(),
        });
    }
    if datagram[0] != BVLC_TYPE {
        return Err(BacexError::malformed(format!(
            "not a BACnet/IP frame: type 0x{:02x}",
            datagram[0]
        )));
    }

    let declared = usize::from(u16::from_be_bytes([datagram[2], datagram[3]]));
    if declared != datagram.len() {
        return Err(BacexError::malformed(format!(
            "BVLC length {declared} does not match datagram length {}",
            datagram.len()
        )));
    }

    let Some(function) = BvlcFunction::from_octet(datagram[1]) else {
        return Ok(None);
    };

    let mut npdu = &datagram[BVLC_HEADER_SIZE..];
    if function == BvlcFunction::ForwardedNpdu {
        // 6-byte originating B/IP address precedes the NPDU.
        if npdu.len() < 6 {
            return Err(BacexError::TruncatedFrame {
                needed: BVLC_HEADER_SIZE + 6,
                available: datagram.len(),
            });
        }
        npdu = &npdu[6..];
    }

    Ok(Some(BvlcFrame { function, npdu }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_broadcast() {
        let npdu = [0x01, 0x00, 0x10, 0x08];
        let frame = encode(BvlcFunction::OriginalBroadcast, &npdu);
        let decoded = decode(&frame).expect("decode").expect("consumed");
        assert_eq!(decoded.function, BvlcFunction::OriginalBroadcast);
        assert_eq!(decoded.npdu, npdu);
    }

    #[test]
    fn forwarded_npdu_strips_origin_address() {
        let npdu = [0x01, 0x00, 0x10, 0x00];
        let mut body = BytesMut::new();
        body.put_slice(&[192, 168, 1, 50, 0xBA, 0xC0]);
        body.put_slice(&npdu);
        let frame = encode(BvlcFunction::ForwardedNpdu, &body);
        let decoded = decode(&frame).expect("decode").expect("consumed");
        assert_eq!(decoded.npdu, npdu);
    }

    #[test]
    fn unconsumed_function_is_skipped() {
        // Register-Foreign-Device (0x05) is BBMD traffic.
        let frame = [0x81, 0x05, 0x00, 0x06, 0x00, 0x3C];
        assert_eq!(decode(&frame).expect("decode"), None);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let frame = [0x81, 0x0b, 0x00, 0x09, 0x01, 0x00];
        assert!(decode(&frame).is_err());
    }

    #[test]
    fn non_bacnet_frame_is_an_error() {
        let frame = [0x45, 0x0b, 0x00, 0x04];
        assert!(decode(&frame).is_err());
    }
}

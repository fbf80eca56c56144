//! Network layer (NPDU) encoding.
//!
//! The gateway only talks to devices on the local network, so outgoing
//! NPDUs carry no routing information. Incoming NPDUs may still have been
//! routed, so the decoder skips destination/source network fields when the
//! control octet says they are present.

use crate::core::error::{BacexError, BacexResult};
use bytes::{BufMut, BytesMut};

/// NPDU protocol version.
pub const NPDU_VERSION: u8 = 0x01;

const CTRL_NETWORK_MESSAGE: u8 = 0x80;
const CTRL_DEST_PRESENT: u8 = 0x20;
const CTRL_SOURCE_PRESENT: u8 = 0x08;
const CTRL_EXPECTING_REPLY: u8 = 0x04;

/// A decoded NPDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Npdu<'a> {
    /// Whether the sender expects a reply.
    pub expecting_reply: bool,
    /// The APDU payload.
    pub apdu: &'a [u8],
}

/// Encode an NPDU around an APDU, for local (non-routed) delivery.
pub fn encode(expecting_reply: bool, apdu: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(2 + apdu.len());
    out.put_u8(NPDU_VERSION);
    out.put_u8(if expecting_reply {
        CTRL_EXPECTING_REPLY
    } else {
        0x00
    });
    out.put_slice(apdu);
    out
}

/// Decode an NPDU.
///
/// Returns `Ok(None)` for network-layer messages (no APDU to deliver).
pub fn decode(npdu: &[u8]) -> BacexResult<Option<Npdu<'_>>> {
    if npdu.len() < 2 {
        return Err(BacexError::TruncatedFrame {
            needed: 2,
            available: npdu.len(),
        });
    }
    if npdu[0] != NPDU_VERSION {
        return Err(BacexError::malformed(format!(
            "unsupported NPDU version 0x{:02x}",
            npdu[0]
        )));
    }

    let control = npdu[1];
    if control & CTRL_NETWORK_MESSAGE != 0 {
        return Ok(None);
    }

    let mut pos = 2usize;
    if control & CTRL_DEST_PRESENT != 0 {
        pos = skip_address(npdu, pos)?;
    }
    if control & CTRL_SOURCE_PRESENT != 0 {
        pos = skip_address(npdu, pos)?;
    }
    if control & CTRL_DEST_PRESENT != 0 {
        // Hop count trails the address fields.
        pos += 1;
    }

    if npdu.len() < pos {
        return Err(BacexError::TruncatedFrame {
            needed: pos,
            available: npdu.len(),
        });
    }

    Ok(Some(Npdu {
        expecting_reply: control & CTRL_EXPECTING_REPLY != 0,
        apdu: &npdu[pos..],
    }))
}

/// Skip a DNET/DLEN/DADR or SNET/SLEN/SADR triple starting at `pos`.
fn skip_address(npdu: &[u8], pos: usize) -> BacexResult<usize> {
    // 2-byte network number + 1-byte address length + address octets.
    if npdu.len() < pos + 3 {
        return Err(BacexError::TruncatedFrame {
            needed: pos + 3,
            available: npdu.len(),
        });
    }
    let addr_len = usize::from(npdu[pos + 2]);
    let end = pos + 3 + addr_len;
    if npdu.len() < end {
        return Err(BacexError::TruncatedFrame {
            needed: end,
            available: npdu.len(),
        });
    }
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_local() {
        let apdu = [0x10, 0x08];
        let npdu = encode(false, &apdu);
        let decoded = decode(&npdu).expect("decode").expect("apdu");
        assert!(!decoded.expecting_reply);
        assert_eq!(decoded.apdu, apdu);
    }

    #[test]
    fn expecting_reply_flag_survives() {
        let npdu = encode(true, &[0x00]);
        let decoded = decode(&npdu).expect("decode").expect("apdu");
        assert!(decoded.expecting_reply);
    }

    #[test]
    fn routed_source_is_skipped() {
        // Version, control (source present), SNET=0x0001, SLEN=1, SADR=0x07.
        let npdu = [0x01, 0x08, 0x00, 0x01, 0x01, 0x07, 0x10, 0x00];
        let decoded = decode(&npdu).expect("decode").expect("apdu");
        assert_eq!(decoded.apdu, [0x10, 0x00]);
    }

    #[test]
    fn network_message_yields_none() {
        let npdu = [0x01, 0x80, 0x00];
        assert_eq!(decode(&npdu).expect("decode"), None);
    }

    #[test]
    fn truncated_address_is_an_error() {
        let npdu = [0x01, 0x20, 0x00, 0x01];
        assert!(decode(&npdu).is_err());
    }
}

//! BACnet/IP wire codec: BVLC framing, NPDU network layer, APDU services,
//! and the tagged-value encoding they share.

pub mod apdu;
pub mod bvlc;
pub mod npdu;
pub mod tags;

use crate::core::error::BacexResult;
use apdu::Apdu;
use bytes::BytesMut;

/// Assemble a complete BACnet/IP datagram around an APDU.
pub fn build_datagram(function: bvlc::BvlcFunction, expecting_reply: bool, apdu: &[u8]) -> BytesMut {
    let npdu = npdu::encode(expecting_reply, apdu);
    bvlc::encode(function, &npdu)
}

/// Decode a received datagram down to its APDU.
///
/// Returns `Ok(None)` for datagrams that are valid BACnet/IP but carry
/// nothing for the application layer (BBMD traffic, network messages).
pub fn parse_datagram(datagram: &[u8]) -> BacexResult<Option<Apdu>> {
    let Some(frame) = bvlc::decode(datagram)? else {
        return Ok(None);
    };
    let Some(npdu) = npdu::decode(frame.npdu)? else {
        return Ok(None);
    };
    Apdu::decode(npdu.apdu).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bacnet::codec::apdu::{encode_who_is, IAm};
    use crate::bacnet::{ObjectId, Segmentation};

    #[test]
    fn datagram_round_trip() {
        let who_is = encode_who_is(None, None);
        let datagram = build_datagram(bvlc::BvlcFunction::OriginalBroadcast, false, &who_is);
        match parse_datagram(&datagram).expect("parse") {
            Some(Apdu::WhoIs { low: None, high: None }) => {}
            other => panic!("expected Who-Is, got {other:?}"),
        }
    }

    #[test]
    fn i_am_datagram_round_trip() {
        let iam = IAm {
            device: ObjectId::device(42),
            max_apdu: 480,
            segmentation: Segmentation::Both,
            vendor_id: 15,
        };
        let datagram = build_datagram(
            bvlc::BvlcFunction::OriginalBroadcast,
            false,
            &apdu::encode_i_am(&iam),
        );
        match parse_datagram(&datagram).expect("parse") {
            Some(Apdu::IAm(decoded)) => assert_eq!(decoded, iam),
            other => panic!("expected I-Am, got {other:?}"),
        }
    }
}

//! Application layer (APDU) encoding.
//!
//! The gateway uses four PDU shapes: Unconfirmed-Request for Who-Is and
//! I-Am, Confirmed-Request for ReadProperty, ComplexAck for the matching
//! ReadProperty-ACK, and the Error/Reject/Abort family for failures.
//!
//! ```text
//! Unconfirmed-Request:        Confirmed-Request:
//! +------+---------+          +------+------+--------+---------+
//! | 0x10 | service |          | 0x00 | 0x05 | invoke | service |
//! +------+---------+          +------+------+--------+---------+
//!
//! ComplexAck:                 Error:
//! +------+--------+---------+ +------+--------+---------+-------+------+
//! | 0x30 | invoke | service | | 0x50 | invoke | service | class | code |
//! +------+--------+---------+ +------+--------+---------+-------+------+
//! ```
//!
//! Segmented PDUs are never requested; a segmented reply is reported as an
//! error rather than reassembled.

use super::tags::{self, TagKind};
use crate::bacnet::{ObjectId, PropertyId, PropertyValue, Segmentation};
use crate::core::error::{BacexError, BacexResult};
use bytes::{BufMut, BytesMut};

/// Unconfirmed service choices.
pub const SERVICE_I_AM: u8 = 0;
/// Who-Is service choice.
pub const SERVICE_WHO_IS: u8 = 8;
/// Confirmed service choice for ReadProperty.
pub const SERVICE_READ_PROPERTY: u8 = 12;

const PDU_CONFIRMED_REQUEST: u8 = 0x0;
const PDU_UNCONFIRMED_REQUEST: u8 = 0x1;
const PDU_SIMPLE_ACK: u8 = 0x2;
const PDU_COMPLEX_ACK: u8 = 0x3;
const PDU_ERROR: u8 = 0x5;
const PDU_REJECT: u8 = 0x6;
const PDU_ABORT: u8 = 0x7;

const SEGMENTED_BIT: u8 = 0x08;

/// Max-segments/max-APDU octet: no segmentation, 1476-byte APDU.
const MAX_APDU_OCTET: u8 = 0x05;

/// A decoded APDU.
#[derive(Debug, Clone, PartialEq)]
pub enum Apdu {
    /// Who-Is with optional device-instance range.
    WhoIs {
        low: Option<u32>,
        high: Option<u32>,
    },
    /// I-Am device announcement.
    IAm(IAm),
    /// An unconfirmed service the gateway does not consume.
    OtherUnconfirmed { service: u8 },
    /// ReadProperty-ACK.
    ReadPropertyAck {
        invoke_id: u8,
        ack: ReadPropertyAck,
    },
    /// SimpleAck (not produced by ReadProperty, accepted for completeness).
    SimpleAck { invoke_id: u8, service: u8 },
    /// A ReadProperty request addressed to us.
    ReadPropertyRequest {
        invoke_id: u8,
        object: ObjectId,
        property: PropertyId,
        array_index: Option<u32>,
    },
    /// A confirmed request for a service the gateway does not serve.
    ConfirmedRequest { invoke_id: u8, service: u8 },
    /// Error PDU.
    Error {
        invoke_id: u8,
        service: u8,
        class: u32,
        code: u32,
    },
    /// Reject PDU.
    Reject { invoke_id: u8, reason: u8 },
    /// Abort PDU.
    Abort { invoke_id: u8, reason: u8 },
}

/// I-Am payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IAm {
    pub device: ObjectId,
    pub max_apdu: u32,
    pub segmentation: Segmentation,
    pub vendor_id: u32,
}

/// ReadProperty-ACK payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyAck {
    pub object: ObjectId,
    pub property: PropertyId,
    pub array_index: Option<u32>,
    pub value: PropertyValue,
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a Who-Is, optionally bounded to an instance range.
pub fn encode_who_is(low: Option<u32>, high: Option<u32>) -> BytesMut {
    let mut out = BytesMut::new();
    out.put_u8(PDU_UNCONFIRMED_REQUEST << 4);
    out.put_u8(SERVICE_WHO_IS);
    if let (Some(low), Some(high)) = (low, high) {
        tags::write_context_unsigned(&mut out, 0, u64::from(low));
        tags::write_context_unsigned(&mut out, 1, u64::from(high));
    }
    out
}

/// Encode an I-Am announcement.
pub fn encode_i_am(iam: &IAm) -> BytesMut {
    let mut out = BytesMut::new();
    out.put_u8(PDU_UNCONFIRMED_REQUEST << 4);
    out.put_u8(SERVICE_I_AM);
    tags::write_application_object_id(&mut out, iam.device);
    tags::write_application_unsigned(&mut out, u64::from(iam.max_apdu));
    tags::write_application_enumerated(&mut out, iam.segmentation.number());
    tags::write_application_unsigned(&mut out, u64::from(iam.vendor_id));
    out
}

/// Encode a ReadProperty confirmed request.
pub fn encode_read_property(
    invoke_id: u8,
    object: ObjectId,
    property: PropertyId,
    array_index: Option<u32>,
) -> BytesMut {
    let mut out = BytesMut::new();
    out.put_u8(PDU_CONFIRMED_REQUEST << 4);
    out.put_u8(MAX_APDU_OCTET);
    out.put_u8(invoke_id);
    out.put_u8(SERVICE_READ_PROPERTY);
    tags::write_context_object_id(&mut out, 0, object);
    tags::write_context_enumerated(&mut out, 1, property.number());
    if let Some(index) = array_index {
        tags::write_context_unsigned(&mut out, 2, u64::from(index));
    }
    out
}

/// Encode a ReadProperty-ACK.
pub fn encode_read_property_ack(invoke_id: u8, ack: &ReadPropertyAck) -> BytesMut {
    let mut out = BytesMut::new();
    out.put_u8(PDU_COMPLEX_ACK << 4);
    out.put_u8(invoke_id);
    out.put_u8(SERVICE_READ_PROPERTY);
    tags::write_context_object_id(&mut out, 0, ack.object);
    tags::write_context_enumerated(&mut out, 1, ack.property.number());
    if let Some(index) = ack.array_index {
        tags::write_context_unsigned(&mut out, 2, u64::from(index));
    }
    tags::write_opening(&mut out, 3);
    encode_value(&mut out, &ack.value);
    tags::write_closing(&mut out, 3);
    out
}

fn encode_value(out: &mut BytesMut, value: &PropertyValue) {
    match value {
        PropertyValue::Null => tags::write_tag(out, tags::app_tag::NULL, false, 0),
        PropertyValue::Boolean(b) => {
            tags::write_tag(out, tags::app_tag::BOOLEAN, false, usize::from(*b));
        }
        PropertyValue::Unsigned(u) => tags::write_application_unsigned(out, *u),
        PropertyValue::Signed(i) => tags::write_application_signed(out, *i),
        PropertyValue::Real(r) => tags::write_application_real(out, *r),
        PropertyValue::Double(d) => {
            tags::write_tag(out, tags::app_tag::DOUBLE, false, 8);
            out.put_slice(&d.to_be_bytes());
        }
        PropertyValue::CharacterString(s) => tags::write_application_string(out, s),
        PropertyValue::Enumerated(e) => tags::write_application_enumerated(out, *e),
        PropertyValue::ObjectId(id) => tags::write_application_object_id(out, *id),
        PropertyValue::List(items) => {
            for item in items {
                encode_value(out, item);
            }
        }
        PropertyValue::Opaque { tag, bytes } => {
            tags::write_tag(out, *tag, false, bytes.len());
            out.put_slice(bytes);
        }
    }
}

/// Encode an Error PDU for a confirmed service.
pub fn encode_error(invoke_id: u8, service: u8, class: u32, code: u32) -> BytesMut {
    let mut out = BytesMut::new();
    out.put_u8(PDU_ERROR << 4);
    out.put_u8(invoke_id);
    out.put_u8(service);
    tags::write_application_enumerated(&mut out, class);
    tags::write_application_enumerated(&mut out, code);
    out
}

/// Encode a Reject PDU.
pub fn encode_reject(invoke_id: u8, reason: u8) -> BytesMut {
    let mut out = BytesMut::new();
    out.put_u8(PDU_REJECT << 4);
    out.put_u8(invoke_id);
    out.put_u8(reason);
    out
}

/// Encode an Abort PDU.
pub fn encode_abort(invoke_id: u8, reason: u8) -> BytesMut {
    let mut out = BytesMut::new();
    out.put_u8(PDU_ABORT << 4);
    out.put_u8(invoke_id);
    out.put_u8(reason);
    out
}

// ============================================================================
// Decoding
// ============================================================================

impl Apdu {
    /// Decode an APDU.
    pub fn decode(apdu: &[u8]) -> BacexResult<Self> {
        if apdu.is_empty() {
            return Err(BacexError::TruncatedFrame {
                needed: 1,
                available: 0,
            });
        }
        let pdu_type = apdu[0] >> 4;
        match pdu_type {
            PDU_UNCONFIRMED_REQUEST => decode_unconfirmed(apdu),
            PDU_CONFIRMED_REQUEST => decode_confirmed_request(apdu),
            PDU_SIMPLE_ACK => {
                if apdu.len() < 3 {
                    return Err(BacexError::TruncatedFrame {
                        needed: 3,
                        available: apdu.len(),
                    });
                }
                Ok(Self::SimpleAck {
                    invoke_id: apdu[1],
                    service: apdu[2],
                })
            }
            PDU_COMPLEX_ACK => decode_complex_ack(apdu),
            PDU_ERROR => decode_error(apdu),
            PDU_REJECT => {
                if apdu.len() < 3 {
                    return Err(BacexError::TruncatedFrame {
                        needed: 3,
                        available: apdu.len(),
                    });
                }
                Ok(Self::Reject {
                    invoke_id: apdu[1],
                    reason: apdu[2],
                })
            }
            PDU_ABORT => {
                if apdu.len() < 3 {
                    return Err(BacexError::TruncatedFrame {
                        needed: 3,
                        available: apdu.len(),
                    });
                }
                Ok(Self::Abort {
                    invoke_id: apdu[1],
                    reason: apdu[2],
                })
            }
            other => Err(BacexError::malformed(format!(
                "unsupported PDU type {other}"
            ))),
        }
    }
}

fn decode_unconfirmed(apdu: &[u8]) -> BacexResult<Apdu> {
    if apdu.len() < 2 {
        return Err(BacexError::TruncatedFrame {
            needed: 2,
            available: apdu.len(),
        });
    }
    let service = apdu[1];
    let body = &apdu[2..];
    match service {
        SERVICE_WHO_IS => decode_who_is(body),
        SERVICE_I_AM => decode_i_am(body).map(Apdu::IAm),
        other => Ok(Apdu::OtherUnconfirmed { service: other }),
    }
}

fn decode_who_is(body: &[u8]) -> BacexResult<Apdu> {
    if body.is_empty() {
        return Ok(Apdu::WhoIs {
            low: None,
            high: None,
        });
    }
    let mut pos = 0;
    let low = read_context_unsigned(body, &mut pos, 0)?;
    let high = read_context_unsigned(body, &mut pos, 1)?;
    if low.is_none() || high.is_none() {
        return Err(BacexError::malformed(
            "Who-Is range requires both low and high limits",
        ));
    }
    Ok(Apdu::WhoIs {
        low: low.map(|v| v as u32),
        high: high.map(|v| v as u32),
    })
}

fn decode_i_am(body: &[u8]) -> BacexResult<IAm> {
    let mut pos = 0;
    let device = match tags::decode_application(body, &mut pos)? {
        PropertyValue::ObjectId(id) => id,
        other => {
            return Err(BacexError::malformed(format!(
                "I-Am device identifier missing, got {other:?}"
            )));
        }
    };
    let max_apdu = tags::decode_application(body, &mut pos)?
        .as_unsigned()
        .ok_or_else(|| BacexError::malformed("I-Am max-APDU missing"))?;
    let seg_raw = tags::decode_application(body, &mut pos)?
        .as_unsigned()
        .ok_or_else(|| BacexError::malformed("I-Am segmentation missing"))?;
    let segmentation = Segmentation::from_number(seg_raw as u32)
        .ok_or_else(|| BacexError::malformed(format!("bad segmentation value {seg_raw}")))?;
    let vendor_id = tags::decode_application(body, &mut pos)?
        .as_unsigned()
        .ok_or_else(|| BacexError::malformed("I-Am vendor id missing"))?;

    Ok(IAm {
        device,
        max_apdu: max_apdu as u32,
        segmentation,
        vendor_id: vendor_id as u32,
    })
}

fn decode_confirmed_request(apdu: &[u8]) -> BacexResult<Apdu> {
    if apdu.len() < 4 {
        return Err(BacexError::TruncatedFrame {
            needed: 4,
            available: apdu.len(),
        });
    }
    let invoke_id = apdu[2];
    let service = apdu[3];
    if apdu[0] & SEGMENTED_BIT != 0 || service != SERVICE_READ_PROPERTY {
        return Ok(Apdu::ConfirmedRequest { invoke_id, service });
    }

    let body = &apdu[4..];
    let mut pos = 0;
    let object = read_context_object_id(body, &mut pos, 0)?;
    let property = read_context_unsigned(body, &mut pos, 1)?
        .ok_or_else(|| BacexError::malformed("ReadProperty missing property id"))?;
    let array_index = read_context_unsigned(body, &mut pos, 2)?.map(|v| v as u32);

    Ok(Apdu::ReadPropertyRequest {
        invoke_id,
        object,
        property: PropertyId::from_number(property as u32),
        array_index,
    })
}

fn decode_complex_ack(apdu: &[u8]) -> BacexResult<Apdu> {
    if apdu[0] & SEGMENTED_BIT != 0 {
        return Err(BacexError::malformed(
            "segmented ComplexAck is not supported",
        ));
    }
    if apdu.len() < 3 {
        return Err(BacexError::TruncatedFrame {
            needed: 3,
            available: apdu.len(),
        });
    }
    let invoke_id = apdu[1];
    let service = apdu[2];
    if service != SERVICE_READ_PROPERTY {
        return Err(BacexError::malformed(format!(
            "unexpected ComplexAck service {service}"
        )));
    }

    let body = &apdu[3..];
    let mut pos = 0;

    let object = read_context_object_id(body, &mut pos, 0)?;
    let property = read_context_unsigned(body, &mut pos, 1)?
        .ok_or_else(|| BacexError::malformed("ReadProperty-ACK missing property id"))?;
    let array_index = read_context_unsigned(body, &mut pos, 2)?.map(|v| v as u32);

    // Value is wrapped in context tag 3.
    let opening = tags::read_tag(body, &mut pos)?;
    if !(opening.context && opening.number == 3 && opening.kind == TagKind::Opening) {
        return Err(BacexError::malformed(
            "ReadProperty-ACK missing value opening tag",
        ));
    }

    let mut values = Vec::new();
    loop {
        let peeked = tags::peek_tag(body, pos)?;
        if peeked.context && peeked.number == 3 && peeked.kind == TagKind::Closing {
            tags::read_tag(body, &mut pos)?;
            break;
        }
        values.push(tags::decode_application(body, &mut pos)?);
    }

    let value = match values.len() {
        0 => PropertyValue::Null,
        1 => values.remove(0),
        _ => PropertyValue::List(values),
    };

    Ok(Apdu::ReadPropertyAck {
        invoke_id,
        ack: ReadPropertyAck {
            object,
            property: PropertyId::from_number(property as u32),
            array_index,
            value,
        },
    })
}

fn decode_error(apdu: &[u8]) -> BacexResult<Apdu> {
    if apdu.len() < 3 {
        return Err(BacexError::TruncatedFrame {
            needed: 3,
            available: apdu.len(),
        });
    }
    let invoke_id = apdu[1];
    let service = apdu[2];
    let body = &apdu[3..];
    let mut pos = 0;
    let class = tags::decode_application(body, &mut pos)?
        .as_unsigned()
        .ok_or_else(|| BacexError::malformed("Error PDU missing class"))?;
    let code = tags::decode_application(body, &mut pos)?
        .as_unsigned()
        .ok_or_else(|| BacexError::malformed("Error PDU missing code"))?;
    Ok(Apdu::Error {
        invoke_id,
        service,
        class: class as u32,
        code: code as u32,
    })
}

/// Read an optional context-tagged unsigned with the expected tag number.
fn read_context_unsigned(
    body: &[u8],
    pos: &mut usize,
    number: u8,
) -> BacexResult<Option<u64>> {
    if *pos >= body.len() {
        return Ok(None);
    }
    let peeked = tags::peek_tag(body, *pos)?;
    if !peeked.context || peeked.number != number {
        return Ok(None);
    }
    let header = tags::read_tag(body, pos)?;
    let TagKind::Length(len) = header.kind else {
        return Err(BacexError::malformed(format!(
            "context tag {number} is not primitive"
        )));
    };
    Ok(Some(tags::read_unsigned_content(body, pos, len)?))
}

/// Read a required context-tagged object identifier.
fn read_context_object_id(body: &[u8], pos: &mut usize, number: u8) -> BacexResult<ObjectId> {
    let header = tags::read_tag(body, pos)?;
    if !header.context || header.number != number {
        return Err(BacexError::malformed(format!(
            "expected context tag {number} object identifier"
        )));
    }
    let TagKind::Length(4) = header.kind else {
        return Err(BacexError::malformed("object identifier must be 4 bytes"));
    };
    let b = tags::take(body, pos, 4)?;
    Ok(ObjectId::from_wire(u32::from_be_bytes([
        b[0], b[1], b[2], b[3],
    ])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bacnet::ObjectType;

    #[test]
    fn who_is_round_trip() {
        let frame = encode_who_is(None, None);
        assert_eq!(
            Apdu::decode(&frame).expect("decode"),
            Apdu::WhoIs {
                low: None,
                high: None
            }
        );

        let ranged = encode_who_is(Some(100), Some(199));
        assert_eq!(
            Apdu::decode(&ranged).expect("decode"),
            Apdu::WhoIs {
                low: Some(100),
                high: Some(199)
            }
        );
    }

    #[test]
    fn i_am_round_trip() {
        let iam = IAm {
            device: ObjectId::device(881234),
            max_apdu: 1476,
            segmentation: Segmentation::None,
            vendor_id: 260,
        };
        let frame = encode_i_am(&iam);
        assert_eq!(Apdu::decode(&frame).expect("decode"), Apdu::IAm(iam));
    }

    #[test]
    fn read_property_ack_round_trip() {
        let ack = ReadPropertyAck {
            object: ObjectId::new(ObjectType::AnalogInput, 5),
            property: PropertyId::PresentValue,
            array_index: None,
            value: PropertyValue::Real(72.25),
        };
        let frame = encode_read_property_ack(0x42, &ack);
        match Apdu::decode(&frame).expect("decode") {
            Apdu::ReadPropertyAck {
                invoke_id,
                ack: decoded,
            } => {
                assert_eq!(invoke_id, 0x42);
                assert_eq!(decoded, ack);
            }
            other => panic!("expected ReadPropertyAck, got {other:?}"),
        }
    }

    #[test]
    fn object_list_ack_decodes_to_list() {
        let ack = ReadPropertyAck {
            object: ObjectId::device(9),
            property: PropertyId::ObjectList,
            array_index: None,
            value: PropertyValue::List(vec![
                PropertyValue::ObjectId(ObjectId::device(9)),
                PropertyValue::ObjectId(ObjectId::new(ObjectType::AnalogInput, 1)),
                PropertyValue::ObjectId(ObjectId::new(ObjectType::BinaryOutput, 2)),
            ]),
        };
        let frame = encode_read_property_ack(7, &ack);
        match Apdu::decode(&frame).expect("decode") {
            Apdu::ReadPropertyAck { ack: decoded, .. } => match decoded.value {
                PropertyValue::List(items) => assert_eq!(items.len(), 3),
                other => panic!("expected list, got {other:?}"),
            },
            other => panic!("expected ReadPropertyAck, got {other:?}"),
        }
    }

    #[test]
    fn error_pdu_round_trip() {
        // class=property(2), code=unknown-property(32)
        let frame = encode_error(9, SERVICE_READ_PROPERTY, 2, 32);
        assert_eq!(
            Apdu::decode(&frame).expect("decode"),
            Apdu::Error {
                invoke_id: 9,
                service: SERVICE_READ_PROPERTY,
                class: 2,
                code: 32,
            }
        );
    }

    #[test]
    fn reject_and_abort_round_trip() {
        assert_eq!(
            Apdu::decode(&encode_reject(3, 9)).expect("decode"),
            Apdu::Reject {
                invoke_id: 3,
                reason: 9
            }
        );
        assert_eq!(
            Apdu::decode(&encode_abort(4, 5)).expect("decode"),
            Apdu::Abort {
                invoke_id: 4,
                reason: 5
            }
        );
    }

    #[test]
    fn segmented_ack_is_rejected() {
        let mut frame = encode_read_property_ack(
            1,
            &ReadPropertyAck {
                object: ObjectId::device(1),
                property: PropertyId::PresentValue,
                array_index: None,
                value: PropertyValue::Null,
            },
        );
        frame[0] |= SEGMENTED_BIT;
        assert!(Apdu::decode(&frame).is_err());
    }

    #[test]
    fn read_property_request_shape() {
        let frame = encode_read_property(
            0x11,
            ObjectId::new(ObjectType::AnalogValue, 3),
            PropertyId::PresentValue,
            None,
        );
        assert_eq!(frame[0], 0x00);
        assert_eq!(frame[2], 0x11);
        assert_eq!(frame[3], SERVICE_READ_PROPERTY);
        match Apdu::decode(&frame).expect("decode") {
            Apdu::ReadPropertyRequest {
                invoke_id,
                object,
                property,
                array_index,
            } => {
                assert_eq!(invoke_id, 0x11);
                assert_eq!(object, ObjectId::new(ObjectType::AnalogValue, 3));
                assert_eq!(property, PropertyId::PresentValue);
                assert_eq!(array_index, None);
            }
            other => panic!("expected ReadPropertyRequest, got {other:?}"),
        }
    }

    #[test]
    fn foreign_confirmed_service_stays_generic() {
        // WriteProperty (service 15) is not served by the gateway.
        let frame = [0x00, 0x05, 0x09, 0x0F];
        match Apdu::decode(&frame).expect("decode") {
            Apdu::ConfirmedRequest { invoke_id, service } => {
                assert_eq!(invoke_id, 0x09);
                assert_eq!(service, 0x0F);
            }
            other => panic!("expected ConfirmedRequest, got {other:?}"),
        }
    }

    #[test]
    fn truncated_apdu_is_an_error() {
        assert!(Apdu::decode(&[]).is_err());
        assert!(Apdu::decode(&[0x30]).is_err());
    }
}

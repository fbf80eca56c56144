//! Wire codec integration tests: full datagrams through every layer.

mod common;

use bacex::bacnet::codec::apdu::{
    encode_error, encode_i_am, encode_read_property, encode_read_property_ack, encode_who_is,
    Apdu, IAm, ReadPropertyAck, SERVICE_READ_PROPERTY,
};
use bacex::bacnet::codec::bvlc::BvlcFunction;
use bacex::bacnet::codec::{build_datagram, parse_datagram};
use bacex::bacnet::{ObjectId, ObjectType, PropertyId, PropertyValue, Segmentation};

fn roundtrip(apdu_bytes: &[u8]) -> Apdu {
    let datagram = build_datagram(BvlcFunction::OriginalUnicast, false, apdu_bytes);
    parse_datagram(&datagram)
        .expect("datagram must parse")
        .expect("datagram must carry an APDU")
}

#[test]
fn who_is_broadcast_frame() {
    let datagram = build_datagram(
        BvlcFunction::OriginalBroadcast,
        false,
        &encode_who_is(None, None),
    );
    // BVLC header: type, Original-Broadcast, length covering all layers.
    assert_eq!(&datagram[..4], &[0x81, 0x0b, 0x00, 0x08]);
    // NPDU: version 1, no routing, no reply expected.
    assert_eq!(&datagram[4..6], &[0x01, 0x00]);
    // APDU: unconfirmed request, Who-Is.
    assert_eq!(&datagram[6..], &[0x10, 0x08]);
}

#[test]
fn i_am_survives_all_layers() {
    let iam = IAm {
        device: ObjectId::device(2_400_001),
        max_apdu: 1476,
        segmentation: Segmentation::None,
        vendor_id: 842,
    };
    match roundtrip(&encode_i_am(&iam)) {
        Apdu::IAm(decoded) => assert_eq!(decoded, iam),
        other => panic!("expected I-Am, got {other:?}"),
    }
}

#[test]
fn read_property_request_carries_invoke_id() {
    let frame = encode_read_property(
        0x2A,
        ObjectId::new(ObjectType::AnalogInput, 19),
        PropertyId::PresentValue,
        None,
    );
    match roundtrip(&frame) {
        Apdu::ReadPropertyRequest {
            invoke_id,
            object,
            property,
            ..
        } => {
            assert_eq!(invoke_id, 0x2A);
            assert_eq!(object, ObjectId::new(ObjectType::AnalogInput, 19));
            assert_eq!(property, PropertyId::PresentValue);
        }
        other => panic!("expected ReadPropertyRequest, got {other:?}"),
    }
}

#[test]
fn read_property_ack_value_types() {
    let cases = vec![
        PropertyValue::Real(21.5),
        PropertyValue::Unsigned(3),
        PropertyValue::Enumerated(1),
        PropertyValue::CharacterString("Supply Fan".to_string()),
        PropertyValue::Null,
    ];
    for value in cases {
        let ack = ReadPropertyAck {
            object: ObjectId::new(ObjectType::BinaryValue, 2),
            property: PropertyId::PresentValue,
            array_index: None,
            value: value.clone(),
        };
        match roundtrip(&encode_read_property_ack(1, &ack)) {
            Apdu::ReadPropertyAck { ack: decoded, .. } => assert_eq!(decoded.value, value),
            other => panic!("expected ReadPropertyAck, got {other:?}"),
        }
    }
}

#[test]
fn object_list_ack_round_trips_many_objects() {
    let ids: Vec<PropertyValue> = (0..120)
        .map(|i| PropertyValue::ObjectId(ObjectId::new(ObjectType::AnalogInput, i)))
        .collect();
    let ack = ReadPropertyAck {
        object: ObjectId::device(7),
        property: PropertyId::ObjectList,
        array_index: None,
        value: PropertyValue::List(ids),
    };
    match roundtrip(&encode_read_property_ack(3, &ack)) {
        Apdu::ReadPropertyAck { ack: decoded, .. } => match decoded.value {
            PropertyValue::List(items) => assert_eq!(items.len(), 120),
            other => panic!("expected list, got {other:?}"),
        },
        other => panic!("expected ReadPropertyAck, got {other:?}"),
    }
}

#[test]
fn error_frame_round_trips() {
    match roundtrip(&encode_error(5, SERVICE_READ_PROPERTY, 1, 31)) {
        Apdu::Error {
            invoke_id,
            class,
            code,
            ..
        } => {
            assert_eq!(invoke_id, 5);
            assert_eq!(class, 1);
            assert_eq!(code, 31);
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[test]
fn truncated_datagrams_are_errors_not_panics() {
    let iam = encode_i_am(&IAm {
        device: ObjectId::device(9),
        max_apdu: 480,
        segmentation: Segmentation::Both,
        vendor_id: 1,
    });
    let datagram = build_datagram(BvlcFunction::OriginalBroadcast, false, &iam);

    for len in 0..datagram.len() {
        // Every truncation either errors cleanly or, when it cuts exactly
        // at the declared BVLC length, fails the length check.
        let _ = parse_datagram(&datagram[..len]);
    }
    assert!(parse_datagram(&datagram[..2]).is_err());
}

#[test]
fn foreign_bvlc_traffic_is_skipped() {
    // Register-Foreign-Device: valid BACnet/IP, nothing for the gateway.
    let frame = [0x81, 0x05, 0x00, 0x06, 0x00, 0x3C];
    assert_eq!(parse_datagram(&frame).unwrap(), None);
}

#[test]
fn network_layer_messages_are_skipped() {
    // BVLC wrapping an NPDU with the network-message control bit set.
    let npdu = [0x01, 0x80, 0x00];
    let mut datagram = vec![0x81, 0x0a, 0x00, 0x07];
    datagram.extend_from_slice(&npdu);
    assert_eq!(parse_datagram(&datagram).unwrap(), None);
}

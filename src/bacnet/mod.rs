//! BACnet/IP object model and protocol engines.
//!
//! The gateway speaks the subset of BACnet/IP it needs for inventory and
//! extraction: Who-Is/I-Am for discovery and ReadProperty for everything
//! else. Object and property identifiers use the camelCase spellings that
//! appear in extraction maps and exports ("analogInput", "presentValue").

pub mod client;
pub mod codec;
pub mod discovery;
pub mod map;
pub mod poller;

use serde::{Deserialize, Serialize};
use std::fmt;

/// BACnet object types known to the gateway.
///
/// Unlisted type numbers are carried as [`ObjectType::Other`] so frames from
/// vendor-specific objects still decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    Calendar,
    Command,
    Device,
    EventEnrollment,
    File,
    Group,
    Loop,
    MultiStateInput,
    MultiStateOutput,
    NotificationClass,
    Program,
    Schedule,
    MultiStateValue,
    TrendLog,
    Other(u16),
}

impl ObjectType {
    /// Wire type number.
    pub fn number(self) -> u16 {
        match self {
            Self::AnalogInput => 0,
            Self::AnalogOutput => 1,
            Self::AnalogValue => 2,
            Self::BinaryInput => 3,
            Self::BinaryOutput => 4,
            Self::BinaryValue => 5,
            Self::Calendar => 6,
            Self::Command => 7,
            Self::Device => 8,
            Self::EventEnrollment => 9,
            Self::File => 10,
            Self::Group => 11,
            Self::Loop => 12,
            Self::MultiStateInput => 13,
            Self::MultiStateOutput => 14,
            Self::NotificationClass => 15,
            Self::Program => 16,
            Self::Schedule => 17,
            Self::MultiStateValue => 19,
            Self::TrendLog => 20,
            Self::Other(n) => n,
        }
    }

    /// Object type from a wire type number.
    pub fn from_number(n: u16) -> Self {
        match n {
            0 => Self::AnalogInput,
            1 => Self::AnalogOutput,
            2 => Self::AnalogValue,
            3 => Self::BinaryInput,
            4 => Self::BinaryOutput,
            5 => Self::BinaryValue,
            6 => Self::Calendar,
            7 => Self::Command,
            8 => Self::Device,
            9 => Self::EventEnrollment,
            10 => Self::File,
            11 => Self::Group,
            12 => Self::Loop,
            13 => Self::MultiStateInput,
            14 => Self::MultiStateOutput,
            15 => Self::NotificationClass,
            16 => Self::Program,
            17 => Self::Schedule,
            19 => Self::MultiStateValue,
            20 => Self::TrendLog,
            other => Self::Other(other),
        }
    }

    /// The camelCase spelling used in maps, exports, and the database.
    pub fn name(self) -> String {
        match self {
            Self::AnalogInput => "analogInput".to_string(),
            Self::AnalogOutput => "analogOutput".to_string(),
            Self::AnalogValue => "analogValue".to_string(),
            Self::BinaryInput => "binaryInput".to_string(),
            Self::BinaryOutput => "binaryOutput".to_string(),
            Self::BinaryValue => "binaryValue".to_string(),
            Self::Calendar => "calendar".to_string(),
            Self::Command => "command".to_string(),
            Self::Device => "device".to_string(),
            Self::EventEnrollment => "eventEnrollment".to_string(),
            Self::File => "file".to_string(),
            Self::Group => "group".to_string(),
            Self::Loop => "loop".to_string(),
            Self::MultiStateInput => "multiStateInput".to_string(),
            Self::MultiStateOutput => "multiStateOutput".to_string(),
            Self::NotificationClass => "notificationClass".to_string(),
            Self::Program => "program".to_string(),
            Self::Schedule => "schedule".to_string(),
            Self::MultiStateValue => "multiStateValue".to_string(),
            Self::TrendLog => "trendLog".to_string(),
            Self::Other(n) => format!("proprietary-{n}"),
        }
    }

    /// Parse a camelCase object-type name as found in extraction maps.
    pub fn parse(name: &str) -> Option<Self> {
        let t = match name.trim() {
            "analogInput" => Self::AnalogInput,
            "analogOutput" => Self::AnalogOutput,
            "analogValue" => Self::AnalogValue,
            "binaryInput" => Self::BinaryInput,
            "binaryOutput" => Self::BinaryOutput,
            "binaryValue" => Self::BinaryValue,
            "calendar" => Self::Calendar,
            "command" => Self::Command,
            "device" => Self::Device,
            "eventEnrollment" => Self::EventEnrollment,
            "file" => Self::File,
            "group" => Self::Group,
            "loop" => Self::Loop,
            "multiStateInput" => Self::MultiStateInput,
            "multiStateOutput" => Self::MultiStateOutput,
            "notificationClass" => Self::NotificationClass,
            "program" => Self::Program,
            "schedule" => Self::Schedule,
            "multiStateValue" => Self::MultiStateValue,
            "trendLog" => Self::TrendLog,
            other => {
                let n = other.strip_prefix("proprietary-")?.parse().ok()?;
                Self::Other(n)
            }
        };
        Some(t)
    }

    /// Whether a snapshot read of presentValue makes sense for this type.
    ///
    /// Restricted to the common value-carrying types to keep snapshots
    /// fast.
    pub fn carries_present_value(self) -> bool {
        matches!(
            self,
            Self::AnalogInput
                | Self::AnalogOutput
                | Self::AnalogValue
                | Self::BinaryInput
                | Self::BinaryOutput
                | Self::BinaryValue
                | Self::MultiStateInput
                | Self::MultiStateOutput
                | Self::MultiStateValue
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A BACnet object identifier: type plus 22-bit instance number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    pub object_type: ObjectType,
    pub instance: u32,
}

impl ObjectId {
    /// Maximum encodable instance number (22 bits).
    pub const MAX_INSTANCE: u32 = 0x3F_FFFF;

    /// Create an object identifier. The instance is masked to 22 bits.
    pub fn new(object_type: ObjectType, instance: u32) -> Self {
        Self {
            object_type,
            instance: instance & Self::MAX_INSTANCE,
        }
    }

    /// A device object identifier.
    pub fn device(instance: u32) -> Self {
        Self::new(ObjectType::Device, instance)
    }

    /// Pack into the 32-bit wire form.
    pub fn to_wire(self) -> u32 {
        (u32::from(self.object_type.number()) << 22) | (self.instance & Self::MAX_INSTANCE)
    }

    /// Unpack from the 32-bit wire form.
    pub fn from_wire(raw: u32) -> Self {
        Self {
            object_type: ObjectType::from_number((raw >> 22) as u16),
            instance: raw & Self::MAX_INSTANCE,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.object_type, self.instance)
    }
}

/// BACnet property identifiers known to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyId {
    ApplicationSoftwareVersion,
    FirmwareRevision,
    MaxApduLengthAccepted,
    ModelName,
    ObjectList,
    ObjectName,
    PresentValue,
    SegmentationSupported,
    VendorIdentifier,
    VendorName,
    Other(u32),
}

impl PropertyId {
    /// Wire property number.
    pub fn number(self) -> u32 {
        match self {
            Self::ApplicationSoftwareVersion => 12,
            Self::FirmwareRevision => 44,
            Self::MaxApduLengthAccepted => 62,
            Self::ModelName => 70,
            Self::ObjectList => 76,
            Self::ObjectName => 77,
            Self::PresentValue => 85,
            Self::SegmentationSupported => 107,
            Self::VendorIdentifier => 120,
            Self::VendorName => 121,
            Self::Other(n) => n,
        }
    }

    /// Property from a wire number.
    pub fn from_number(n: u32) -> Self {
        match n {
            12 => Self::ApplicationSoftwareVersion,
            44 => Self::FirmwareRevision,
            62 => Self::MaxApduLengthAccepted,
            70 => Self::ModelName,
            76 => Self::ObjectList,
            77 => Self::ObjectName,
            85 => Self::PresentValue,
            107 => Self::SegmentationSupported,
            120 => Self::VendorIdentifier,
            121 => Self::VendorName,
            other => Self::Other(other),
        }
    }

    /// The camelCase spelling used in maps and the database.
    pub fn name(self) -> String {
        match self {
            Self::ApplicationSoftwareVersion => "applicationSoftwareVersion".to_string(),
            Self::FirmwareRevision => "firmwareRevision".to_string(),
            Self::MaxApduLengthAccepted => "maxApduLengthAccepted".to_string(),
            Self::ModelName => "modelName".to_string(),
            Self::ObjectList => "objectList".to_string(),
            Self::ObjectName => "objectName".to_string(),
            Self::PresentValue => "presentValue".to_string(),
            Self::SegmentationSupported => "segmentationSupported".to_string(),
            Self::VendorIdentifier => "vendorIdentifier".to_string(),
            Self::VendorName => "vendorName".to_string(),
            Self::Other(n) => format!("property-{n}"),
        }
    }

    /// Parse a camelCase property name as found in extraction maps.
    pub fn parse(name: &str) -> Option<Self> {
        let p = match name.trim() {
            "applicationSoftwareVersion" => Self::ApplicationSoftwareVersion,
            "firmwareRevision" => Self::FirmwareRevision,
            "maxApduLengthAccepted" => Self::MaxApduLengthAccepted,
            "modelName" => Self::ModelName,
            "objectList" => Self::ObjectList,
            "objectName" => Self::ObjectName,
            "presentValue" => Self::PresentValue,
            "segmentationSupported" => Self::SegmentationSupported,
            "vendorIdentifier" => Self::VendorIdentifier,
            "vendorName" => Self::VendorName,
            other => {
                let n = other.strip_prefix("property-")?.parse().ok()?;
                Self::Other(n)
            }
        };
        Some(p)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Segmentation support advertised in I-Am.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segmentation {
    Both,
    Transmit,
    Receive,
    None,
}

impl Segmentation {
    /// From the wire enumeration.
    pub fn from_number(n: u32) -> Option<Self> {
        match n {
            0 => Some(Self::Both),
            1 => Some(Self::Transmit),
            2 => Some(Self::Receive),
            3 => Some(Self::None),
            _ => Option::None,
        }
    }

    /// Wire enumeration value.
    pub fn number(self) -> u32 {
        match self {
            Self::Both => 0,
            Self::Transmit => 1,
            Self::Receive => 2,
            Self::None => 3,
        }
    }

    /// Spelling stored in the database.
    pub fn name(self) -> &'static str {
        match self {
            Self::Both => "segmentedBoth",
            Self::Transmit => "segmentedTransmit",
            Self::Receive => "segmentedReceive",
            Self::None => "noSegmentation",
        }
    }
}

impl fmt::Display for Segmentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A decoded application-tagged value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Unsigned(u64),
    Signed(i64),
    Real(f32),
    Double(f64),
    CharacterString(String),
    Enumerated(u32),
    ObjectId(ObjectId),
    /// A constructed or list payload (e.g. objectList).
    List(Vec<PropertyValue>),
    /// An application tag the gateway does not interpret; kept opaque so the
    /// rest of the frame still decodes.
    Opaque { tag: u8, bytes: Vec<u8> },
}

impl PropertyValue {
    /// Render the stored `value_raw` text form.
    pub fn render(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Unsigned(u) => u.to_string(),
            Self::Signed(i) => i.to_string(),
            Self::Real(r) => r.to_string(),
            Self::Double(d) => d.to_string(),
            Self::CharacterString(s) => s.clone(),
            Self::Enumerated(e) => e.to_string(),
            Self::ObjectId(id) => id.to_string(),
            Self::List(items) => items
                .iter()
                .map(Self::render)
                .collect::<Vec<_>>()
                .join(";"),
            Self::Opaque { tag, bytes } => format!("opaque(tag={tag},len={})", bytes.len()),
        }
    }

    /// Unsigned view, if this value carries one.
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Self::Unsigned(u) => Some(*u),
            Self::Enumerated(e) => Some(u64::from(*e)),
            _ => None,
        }
    }

    /// String view, if this value carries one.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::CharacterString(s) => Some(s),
            _ => None,
        }
    }
}

/// Identity and device-object properties collected during discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: u32,
    /// Peer address in `ip:port` form.
    pub address: String,
    pub max_apdu: Option<u32>,
    pub segmentation: Option<Segmentation>,
    pub vendor_id: Option<u32>,
    pub vendor_name: Option<String>,
    pub model_name: Option<String>,
    pub firmware_rev: Option<String>,
    pub app_software: Option<String>,
}

impl DeviceInfo {
    /// Bare identity from an I-Am, before device-object reads.
    pub fn from_iam(device_id: u32, address: String) -> Self {
        Self {
            device_id,
            address,
            max_apdu: None,
            segmentation: None,
            vendor_id: None,
            vendor_name: None,
            model_name: None,
            firmware_rev: None,
            app_software: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_wire_round_trip() {
        let id = ObjectId::new(ObjectType::AnalogInput, 42);
        assert_eq!(ObjectId::from_wire(id.to_wire()), id);

        let dev = ObjectId::device(1234);
        assert_eq!(dev.to_wire() >> 22, 8);
        assert_eq!(ObjectId::from_wire(dev.to_wire()).instance, 1234);
    }

    #[test]
    fn object_type_names_round_trip() {
        for t in [
            ObjectType::AnalogInput,
            ObjectType::BinaryValue,
            ObjectType::MultiStateOutput,
            ObjectType::Device,
            ObjectType::Other(321),
        ] {
            assert_eq!(ObjectType::parse(&t.name()), Some(t));
        }
        assert_eq!(ObjectType::parse("no-such-type"), None);
    }

    #[test]
    fn snapshot_filter_matches_value_carrying_types() {
        assert!(ObjectType::AnalogInput.carries_present_value());
        assert!(ObjectType::MultiStateValue.carries_present_value());
        assert!(!ObjectType::Device.carries_present_value());
        assert!(!ObjectType::TrendLog.carries_present_value());
    }

    #[test]
    fn property_value_rendering() {
        assert_eq!(PropertyValue::Real(21.5).render(), "21.5");
        assert_eq!(PropertyValue::Null.render(), "null");
        assert_eq!(
            PropertyValue::ObjectId(ObjectId::new(ObjectType::AnalogValue, 3)).render(),
            "analogValue,3"
        );
    }
}

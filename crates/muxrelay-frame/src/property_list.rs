//! Version 1: XML property lists inside the binary envelope.
//!
//! The envelope kind is always [`KIND_PLIST`]; the logical kind travels in the
//! dictionary's `MessageType` entry.

use std::io::Cursor;

use plist::{Dictionary, Value};

use crate::codec::RawFrame;
use crate::error::{FrameError, Result};
use crate::message::{swap_port, Device, Message, MessageKind};
use crate::wire::{check_version, ProtocolVersion, WireCodec};

/// Envelope kind marking a property-list payload.
pub const KIND_PLIST: u32 = 8;

const KEY_MESSAGE_TYPE: &str = "MessageType";
const KEY_CLIENT_VERSION: &str = "ClientVersionString";
const KEY_PROG_NAME: &str = "ProgName";
const KEY_DEVICE_ID: &str = "DeviceID";
const KEY_PORT_NUMBER: &str = "PortNumber";
const KEY_NUMBER: &str = "Number";
const KEY_PROPERTIES: &str = "Properties";
const KEY_PRODUCT_ID: &str = "ProductID";
const KEY_SERIAL_NUMBER: &str = "SerialNumber";
const KEY_LOCATION_ID: &str = "LocationID";

/// Codec for the property-list protocol.
#[derive(Debug, Clone)]
pub struct PlistCodec {
    /// Injected as `ClientVersionString` in every outbound message.
    pub client_version: String,
    /// Injected as `ProgName` in every outbound message.
    pub prog_name: String,
}

impl Default for PlistCodec {
    fn default() -> Self {
        Self {
            client_version: format!("muxrelay {}", env!("CARGO_PKG_VERSION")),
            prog_name: "muxrelay".to_string(),
        }
    }
}

impl WireCodec for PlistCodec {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::Plist
    }

    fn encode(&self, message: &Message, tag: u32) -> Result<RawFrame> {
        let mut dict = Dictionary::new();
        dict.insert(
            KEY_CLIENT_VERSION.to_string(),
            Value::String(self.client_version.clone()),
        );
        dict.insert(
            KEY_MESSAGE_TYPE.to_string(),
            Value::String(message.kind().as_str().to_string()),
        );
        dict.insert(
            KEY_PROG_NAME.to_string(),
            Value::String(self.prog_name.clone()),
        );

        match message {
            Message::Result { code } => {
                dict.insert(KEY_NUMBER.to_string(), integer(*code));
            }
            Message::Connect { device_id, port } => {
                dict.insert(KEY_DEVICE_ID.to_string(), integer(*device_id));
                dict.insert(
                    KEY_PORT_NUMBER.to_string(),
                    integer(u32::from(swap_port(*port))),
                );
            }
            Message::Listen => {}
            Message::DeviceAttach(device) => {
                dict.insert(KEY_DEVICE_ID.to_string(), integer(device.device_id));
                dict.insert(
                    KEY_PROPERTIES.to_string(),
                    Value::Dictionary(device_properties(device)),
                );
            }
            Message::DeviceRemove { device_id } => {
                dict.insert(KEY_DEVICE_ID.to_string(), integer(*device_id));
            }
        }

        let mut payload = Vec::new();
        Value::Dictionary(dict).to_writer_xml(&mut payload)?;

        Ok(RawFrame::new(
            self.version().as_u32(),
            KIND_PLIST,
            tag,
            payload,
        ))
    }

    fn decode(&self, frame: &RawFrame) -> Result<(Message, u32)> {
        check_version(self.version(), frame)?;
        if frame.kind != KIND_PLIST {
            return Err(FrameError::Protocol(format!(
                "received non-plist message kind {}",
                frame.kind
            )));
        }

        let value = Value::from_reader(Cursor::new(frame.payload.as_ref()))?;
        let dict = value
            .as_dictionary()
            .ok_or_else(|| FrameError::Protocol("plist payload is not a dictionary".to_string()))?;

        let message_type = get_string(dict, KEY_MESSAGE_TYPE)?;
        let message = match parse_kind(message_type)? {
            MessageKind::Result => Message::Result {
                code: get_u32(dict, KEY_NUMBER)?,
            },
            MessageKind::Connect => Message::Connect {
                device_id: get_u32(dict, KEY_DEVICE_ID)?,
                port: swap_port(get_u16(dict, KEY_PORT_NUMBER)?),
            },
            MessageKind::Listen => Message::Listen,
            MessageKind::DeviceAttach => {
                let device_id = get_u32(dict, KEY_DEVICE_ID)?;
                let props = dict
                    .get(KEY_PROPERTIES)
                    .and_then(Value::as_dictionary)
                    .ok_or_else(|| missing(KEY_PROPERTIES))?;
                Message::DeviceAttach(Device {
                    device_id,
                    product_id: get_u16(props, KEY_PRODUCT_ID)?,
                    serial_number: get_string(props, KEY_SERIAL_NUMBER)?.to_string(),
                    location_id: get_u32(props, KEY_LOCATION_ID)?,
                })
            }
            MessageKind::DeviceRemove => Message::DeviceRemove {
                device_id: get_u32(dict, KEY_DEVICE_ID)?,
            },
        };

        Ok((message, frame.tag))
    }
}

fn parse_kind(message_type: &str) -> Result<MessageKind> {
    let kind = match message_type {
        "Result" => MessageKind::Result,
        "Connect" => MessageKind::Connect,
        "Listen" => MessageKind::Listen,
        "Attached" => MessageKind::DeviceAttach,
        "Detached" => MessageKind::DeviceRemove,
        other => {
            return Err(FrameError::Protocol(format!(
                "unknown MessageType '{other}'"
            )))
        }
    };
    Ok(kind)
}

fn device_properties(device: &Device) -> Dictionary {
    let mut props = Dictionary::new();
    props.insert(KEY_DEVICE_ID.to_string(), integer(device.device_id));
    props.insert(
        KEY_PRODUCT_ID.to_string(),
        integer(u32::from(device.product_id)),
    );
    props.insert(
        KEY_SERIAL_NUMBER.to_string(),
        Value::String(device.serial_number.clone()),
    );
    props.insert(KEY_LOCATION_ID.to_string(), integer(device.location_id));
    props
}

fn integer(value: u32) -> Value {
    Value::Integer(u64::from(value).into())
}

fn missing(key: &str) -> FrameError {
    FrameError::Protocol(format!("missing or mistyped plist field '{key}'"))
}

fn get_string<'a>(dict: &'a Dictionary, key: &str) -> Result<&'a str> {
    dict.get(key)
        .and_then(Value::as_string)
        .ok_or_else(|| missing(key))
}

fn get_u32(dict: &Dictionary, key: &str) -> Result<u32> {
    let raw = dict
        .get(key)
        .and_then(Value::as_unsigned_integer)
        .ok_or_else(|| missing(key))?;
    u32::try_from(raw)
        .map_err(|_| FrameError::Protocol(format!("plist field '{key}' out of range: {raw}")))
}

fn get_u16(dict: &Dictionary, key: &str) -> Result<u16> {
    let raw = get_u32(dict, key)?;
    u16::try_from(raw)
        .map_err(|_| FrameError::Protocol(format!("plist field '{key}' out of range: {raw}")))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn decode_dict(frame: &RawFrame) -> Dictionary {
        Value::from_reader(Cursor::new(frame.payload.as_ref()))
            .unwrap()
            .into_dictionary()
            .unwrap()
    }

    #[test]
    fn envelope_uses_plist_marker_and_version_one() {
        let frame = PlistCodec::default().encode(&Message::Listen, 1).unwrap();
        assert_eq!(frame.version, 1);
        assert_eq!(frame.kind, KIND_PLIST);
        assert_eq!(frame.tag, 1);
        assert!(frame.payload.starts_with(b"<?xml"));
    }

    #[test]
    fn encode_injects_metadata_and_message_type() {
        let codec = PlistCodec {
            client_version: "test-client 1.0".to_string(),
            prog_name: "relay-test".to_string(),
        };
        let frame = codec.encode(&Message::Listen, 3).unwrap();
        let dict = decode_dict(&frame);

        assert_eq!(
            dict.get("ClientVersionString").and_then(Value::as_string),
            Some("test-client 1.0")
        );
        assert_eq!(
            dict.get("ProgName").and_then(Value::as_string),
            Some("relay-test")
        );
        assert_eq!(
            dict.get("MessageType").and_then(Value::as_string),
            Some("Listen")
        );
    }

    #[test]
    fn connect_carries_swapped_port() {
        let frame = PlistCodec::default()
            .encode(
                &Message::Connect {
                    device_id: 4,
                    port: 8080,
                },
                2,
            )
            .unwrap();
        let dict = decode_dict(&frame);

        assert_eq!(
            dict.get("MessageType").and_then(Value::as_string),
            Some("Connect")
        );
        assert_eq!(
            dict.get("DeviceID").and_then(Value::as_unsigned_integer),
            Some(4)
        );
        assert_eq!(
            dict.get("PortNumber").and_then(Value::as_unsigned_integer),
            Some(0x901F)
        );

        let (message, tag) = PlistCodec::default().decode(&frame).unwrap();
        assert_eq!(
            message,
            Message::Connect {
                device_id: 4,
                port: 8080
            }
        );
        assert_eq!(tag, 2);
    }

    #[test]
    fn decodes_daemon_attached_document() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>DeviceID</key>
	<integer>12</integer>
	<key>MessageType</key>
	<string>Attached</string>
	<key>Properties</key>
	<dict>
		<key>ConnectionType</key>
		<string>USB</string>
		<key>DeviceID</key>
		<integer>12</integer>
		<key>LocationID</key>
		<integer>336592896</integer>
		<key>ProductID</key>
		<integer>4776</integer>
		<key>SerialNumber</key>
		<string>00008030-001A2D3E0C42802E</string>
	</dict>
</dict>
</plist>
"#;
        let frame = RawFrame::new(1, KIND_PLIST, 0, Bytes::from_static(xml));
        let (message, _) = PlistCodec::default().decode(&frame).unwrap();

        assert_eq!(
            message,
            Message::DeviceAttach(Device {
                device_id: 12,
                product_id: 4776,
                serial_number: "00008030-001A2D3E0C42802E".to_string(),
                location_id: 336_592_896,
            })
        );
    }

    #[test]
    fn roundtrip_every_kind() {
        let codec = PlistCodec::default();
        let messages = [
            Message::Result { code: 3 },
            Message::Connect {
                device_id: 9,
                port: 22,
            },
            Message::Listen,
            Message::DeviceAttach(Device {
                device_id: 9,
                product_id: 0x12a8,
                serial_number: "abc".to_string(),
                location_id: 1,
            }),
            Message::DeviceRemove { device_id: 9 },
        ];
        for (tag, message) in messages.into_iter().enumerate() {
            let frame = codec.encode(&message, tag as u32).unwrap();
            let (decoded, decoded_tag) = codec.decode(&frame).unwrap();
            assert_eq!(decoded, message);
            assert_eq!(decoded_tag, tag as u32);
        }
    }

    #[test]
    fn non_plist_kind_rejected() {
        let frame = RawFrame::new(1, 1, 1, Bytes::from_static(&[0, 0, 0, 0]));
        let err = PlistCodec::default().decode(&frame).unwrap_err();
        assert!(matches!(err, FrameError::Protocol(_)));
    }

    #[test]
    fn binary_version_is_mismatch() {
        let frame = RawFrame::new(0, 1, 1, Bytes::from_static(&[0, 0, 0, 0]));
        let err = PlistCodec::default().decode(&frame).unwrap_err();
        assert!(matches!(
            err,
            FrameError::VersionMismatch {
                expected: 1,
                actual: 0
            }
        ));
    }

    #[test]
    fn unknown_message_type_rejected() {
        let mut dict = Dictionary::new();
        dict.insert(
            "MessageType".to_string(),
            Value::String("Paired".to_string()),
        );
        let mut payload = Vec::new();
        Value::Dictionary(dict).to_writer_xml(&mut payload).unwrap();

        let frame = RawFrame::new(1, KIND_PLIST, 0, payload);
        let err = PlistCodec::default().decode(&frame).unwrap_err();
        assert!(matches!(err, FrameError::Protocol(msg) if msg.contains("Paired")));
    }

    #[test]
    fn missing_result_number_rejected() {
        let mut dict = Dictionary::new();
        dict.insert(
            "MessageType".to_string(),
            Value::String("Result".to_string()),
        );
        let mut payload = Vec::new();
        Value::Dictionary(dict).to_writer_xml(&mut payload).unwrap();

        let frame = RawFrame::new(1, KIND_PLIST, 0, payload);
        let err = PlistCodec::default().decode(&frame).unwrap_err();
        assert!(matches!(err, FrameError::Protocol(_)));
    }

    #[test]
    fn garbage_payload_is_plist_error() {
        let frame = RawFrame::new(1, KIND_PLIST, 0, Bytes::from_static(b"\x00\x01not a plist"));
        let err = PlistCodec::default().decode(&frame).unwrap_err();
        assert!(matches!(err, FrameError::Plist(_)));
    }
}

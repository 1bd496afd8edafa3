//! Version 0: fixed little-endian structs.

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::RawFrame;
use crate::error::{FrameError, Result};
use crate::message::{swap_port, Device, Message, SERIAL_FIELD_LEN};
use crate::wire::{check_version, ProtocolVersion, WireCodec};

/// Message kind: reply carrying a status code.
pub const KIND_RESULT: u32 = 1;
/// Message kind: connect request.
pub const KIND_CONNECT: u32 = 2;
/// Message kind: listen request.
pub const KIND_LISTEN: u32 = 3;
/// Message kind: device attached event.
pub const KIND_DEVICE_ADD: u32 = 4;
/// Message kind: device removed event.
pub const KIND_DEVICE_REMOVE: u32 = 5;

const RESULT_LEN: usize = 4;
const CONNECT_LEN: usize = 8;
const DEVICE_REMOVE_LEN: usize = 4;
/// u32 id + u16 product + serial + u16 padding + u32 location.
pub const DEVICE_RECORD_LEN: usize = 4 + 2 + SERIAL_FIELD_LEN + 2 + 4;

/// Codec for the binary protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl WireCodec for BinaryCodec {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::Binary
    }

    fn encode(&self, message: &Message, tag: u32) -> Result<RawFrame> {
        let mut payload = BytesMut::new();
        let kind = match message {
            Message::Result { code } => {
                payload.put_u32_le(*code);
                KIND_RESULT
            }
            Message::Connect { device_id, port } => {
                payload.put_u32_le(*device_id);
                payload.put_u16_le(swap_port(*port));
                payload.put_u16_le(0);
                KIND_CONNECT
            }
            Message::Listen => KIND_LISTEN,
            Message::DeviceAttach(device) => {
                put_device(&mut payload, device)?;
                KIND_DEVICE_ADD
            }
            Message::DeviceRemove { device_id } => {
                payload.put_u32_le(*device_id);
                KIND_DEVICE_REMOVE
            }
        };

        Ok(RawFrame::new(
            self.version().as_u32(),
            kind,
            tag,
            payload.freeze(),
        ))
    }

    fn decode(&self, frame: &RawFrame) -> Result<(Message, u32)> {
        check_version(self.version(), frame)?;
        let mut payload = frame.payload.clone();

        let message = match frame.kind {
            KIND_RESULT => {
                expect_len(frame.kind, &payload, RESULT_LEN)?;
                Message::Result {
                    code: payload.get_u32_le(),
                }
            }
            KIND_CONNECT => {
                expect_len(frame.kind, &payload, CONNECT_LEN)?;
                let device_id = payload.get_u32_le();
                let port = swap_port(payload.get_u16_le());
                Message::Connect { device_id, port }
            }
            KIND_LISTEN => Message::Listen,
            KIND_DEVICE_ADD => {
                expect_len(frame.kind, &payload, DEVICE_RECORD_LEN)?;
                Message::DeviceAttach(get_device(&mut payload))
            }
            KIND_DEVICE_REMOVE => {
                expect_len(frame.kind, &payload, DEVICE_REMOVE_LEN)?;
                Message::DeviceRemove {
                    device_id: payload.get_u32_le(),
                }
            }
            other => {
                return Err(FrameError::Protocol(format!(
                    "invalid incoming message kind {other}"
                )))
            }
        };

        Ok((message, frame.tag))
    }
}

fn expect_len(kind: u32, payload: &[u8], len: usize) -> Result<()> {
    if payload.len() != len {
        return Err(FrameError::Protocol(format!(
            "message kind {kind}: expected {len}-byte payload, got {}",
            payload.len()
        )));
    }
    Ok(())
}

fn put_device(dst: &mut BytesMut, device: &Device) -> Result<()> {
    let serial = device.serial_number.as_bytes();
    if serial.len() > SERIAL_FIELD_LEN {
        return Err(FrameError::Protocol(format!(
            "serial number is {} bytes, field holds {SERIAL_FIELD_LEN}",
            serial.len()
        )));
    }

    dst.reserve(DEVICE_RECORD_LEN);
    dst.put_u32_le(device.device_id);
    dst.put_u16_le(device.product_id);
    dst.put_slice(serial);
    dst.put_bytes(0, SERIAL_FIELD_LEN - serial.len());
    dst.put_u16_le(0);
    dst.put_u32_le(device.location_id);
    Ok(())
}

fn get_device(src: &mut impl Buf) -> Device {
    let device_id = src.get_u32_le();
    let product_id = src.get_u16_le();
    let mut serial = [0u8; SERIAL_FIELD_LEN];
    src.copy_to_slice(&mut serial);
    let _padding = src.get_u16_le();
    let location_id = src.get_u32_le();

    let end = serial
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(SERIAL_FIELD_LEN);
    Device {
        device_id,
        product_id,
        serial_number: String::from_utf8_lossy(&serial[..end]).into_owned(),
        location_id,
    }
}

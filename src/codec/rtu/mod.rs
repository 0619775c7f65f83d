// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU

use super::*;
use byteorder::{ByteOrder, LittleEndian};

// [MODBUS over Serial Line Specification and Implementation Guide V1.02](http://modbus.org/docs/Modbus_over_serial_line_V1_02.pdf), page 13
// "The maximum size of a MODBUS RTU frame is 256 bytes."
pub const MAX_FRAME_LEN: usize = 256;

/// Slave address, function code and the two CRC bytes.
pub const MIN_FRAME_LEN: usize = 4;

const CRC_LEN: usize = 2;

/// Marks an exception response in the function code.
const EXCEPTION_BIT: u8 = 0x80;

/// Calculate the CRC (Cyclic Redundancy Check) sum.
///
/// The value goes onto the wire low byte first.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            // if we followed clippy's suggestion to move out the crc >>= 1, the condition may not be met any more
            // the recommended action therefore makes no sense and it is better to allow this lint
            #[allow(clippy::branches_sharing_code)]
            if (crc & 0x0001) != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Verify the trailing CRC of a complete frame.
pub fn verify_frame(frame: &[u8]) -> Result<()> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(Error::BufferSize);
    }
    let (adu_buf, crc_buf) = frame.split_at(frame.len() - CRC_LEN);
    let expected_crc = LittleEndian::read_u16(crc_buf);
    let actual_crc = crc16(adu_buf);
    if expected_crc != actual_crc {
        return Err(Error::Crc(expected_crc, actual_crc));
    }
    Ok(())
}

/// Decode a verified frame.
///
/// Exception frames are reported as [`Error::Exception`].
pub fn decode(frame: &[u8]) -> Result<AddressedPdu> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(Error::BufferSize);
    }
    let slave = frame[0];
    let fn_code = frame[1];
    if fn_code & EXCEPTION_BIT != 0 {
        return Err(ProtocolError {
            function: FunctionCode::new(fn_code & !EXCEPTION_BIT),
            exception_code: frame[2],
        }
        .into());
    }
    Ok(AddressedPdu {
        slave,
        pdu: Pdu {
            function: FunctionCode::new(fn_code),
            data: frame[2..frame.len() - CRC_LEN].to_vec(),
        },
    })
}

/// Encode a PDU into a CRC-sealed frame.
#[must_use]
pub fn encode(adu: &AddressedPdu) -> RawFrame {
    let AddressedPdu { slave, pdu } = adu;
    let len = 2 + pdu.data.len();
    let mut buf = vec![0; len + CRC_LEN];
    buf[0] = *slave;
    buf[1] = pdu.function.value();
    buf[2..len].copy_from_slice(&pdu.data);
    let crc = crc16(&buf[..len]);
    LittleEndian::write_u16(&mut buf[len..], crc);
    buf
}

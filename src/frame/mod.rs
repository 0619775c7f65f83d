// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

pub(crate) mod rtu;

pub use self::rtu::*;
use byteorder::{BigEndian, ByteOrder};

/// A Modbus function code.
///
/// It is represented by an unsigned 8 bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// Modbus Function Code: `01` (`0x01`).
    ReadCoils,

    /// Modbus Function Code: `02` (`0x02`).
    ReadDiscreteInputs,

    /// Modbus Function Code: `05` (`0x05`).
    WriteSingleCoil,

    /// Modbus Function Code: `06` (`0x06`).
    WriteSingleRegister,

    /// Modbus Function Code: `03` (`0x03`).
    ReadHoldingRegisters,

    /// Modbus Function Code: `04` (`0x04`).
    ReadInputRegisters,

    /// Modbus Function Code: `15` (`0x0F`).
    WriteMultipleCoils,

    /// Modbus Function Code: `16` (`0x10`).
    WriteMultipleRegisters,

    /// Modbus Function Code: `22` (`0x16`).
    MaskWriteRegister,

    /// Modbus Function Code: `23` (`0x17`).
    ReadWriteMultipleRegisters,

    /// Any other function code seen on the bus.
    Custom(u8),
}

impl FunctionCode {
    /// Create a new [`FunctionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        match value {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x05 => Self::WriteSingleCoil,
            0x06 => Self::WriteSingleRegister,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleRegisters,
            0x16 => Self::MaskWriteRegister,
            0x17 => Self::ReadWriteMultipleRegisters,
            code => FunctionCode::Custom(code),
        }
    }

    /// Get the [`u8`] value of the current [`FunctionCode`].
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
            Self::MaskWriteRegister => 0x16,
            Self::ReadWriteMultipleRegisters => 0x17,
            Self::Custom(code) => code,
        }
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

/// A Modbus address is represented by 16 bit (from `0` to `65535`).
pub type Address = u16;

/// Number of items to process (`0` - `65535`).
pub type Quantity = u16;

/// Payload length that makes a PDU look like a request.
///
/// Read requests carry a start address and a quantity, two words each.
/// Nothing on the wire distinguishes a four byte response, so this is
/// a heuristic for the register reads we listen to.
pub const REQUEST_DATA_LEN: usize = 4;

/// A function code and its payload, independent of addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub function: FunctionCode,
    pub data: Vec<u8>,
}

impl Pdu {
    /// Build a read request for `quantity` words starting at `address`.
    #[must_use]
    pub fn read_request(function: FunctionCode, address: Address, quantity: Quantity) -> Self {
        let mut data = vec![0; REQUEST_DATA_LEN];
        BigEndian::write_u16(&mut data[0..2], address);
        BigEndian::write_u16(&mut data[2..4], quantity);
        Self { function, data }
    }

    /// Whether this PDU is classified as a request.
    #[must_use]
    pub fn is_request(&self) -> bool {
        self.data.len() == REQUEST_DATA_LEN
    }

    /// Start address and quantity of a request.
    #[must_use]
    pub fn request_range(&self) -> Option<(Address, Quantity)> {
        if !self.is_request() {
            return None;
        }
        Some((
            BigEndian::read_u16(&self.data[0..2]),
            BigEndian::read_u16(&self.data[2..4]),
        ))
    }
}

/// An exception frame sent by a slave.
///
/// The function code has the error bit already stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolError {
    pub function: FunctionCode,
    /// `0` if the frame ended before the exception code.
    pub exception_code: u8,
}

impl ProtocolError {
    /// The standard exception, if the code is a known one.
    #[must_use]
    pub fn exception(&self) -> Option<Exception> {
        Exception::try_from(self.exception_code).ok()
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exception() {
            Some(ex) => write!(f, "function {}: {ex}", self.function),
            None => write!(
                f,
                "function {}: exception code 0x{:0>2X}",
                self.function, self.exception_code
            ),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// A server (slave) exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDevice = 0x0B,
}

impl Exception {
    const fn get_name(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal function",
            Self::IllegalDataAddress => "Illegal data address",
            Self::IllegalDataValue => "Illegal data value",
            Self::ServerDeviceFailure => "Server device failure",
            Self::Acknowledge => "Acknowledge",
            Self::ServerDeviceBusy => "Server device busy",
            Self::MemoryParityError => "Memory parity error",
            Self::GatewayPathUnavailable => "Gateway path unavailable",
            Self::GatewayTargetDevice => "Gateway target device failed to respond",
        }
    }
}

impl TryFrom<u8> for Exception {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, u8> {
        use Exception::*;
        let ex = match code {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => ServerDeviceFailure,
            0x05 => Acknowledge,
            0x06 => ServerDeviceBusy,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            _ => return Err(code),
        };
        Ok(ex)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.get_name())
    }
}

/// A completed exchange observed on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReqRespPair {
    pub request: Pdu,
    pub response: Pdu,
}

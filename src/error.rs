// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{io, time::Duration};

use crate::frame::ProtocolError;

/// modbus-wiretap Error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid buffer size
    #[error("Invalid buffer size")]
    BufferSize,
    /// Unsupported function code
    #[error("Invalid function code: 0x{0:0>2X}")]
    FnCode(u8),
    /// Invalid CRC
    #[error("Invalid CRC: expected = 0x{0:0>4X}, actual = 0x{1:0>4X}")]
    Crc(u16, u16),
    /// Length Mismatch
    #[error("Length Mismatch: expected {0} byte(s), got {1}")]
    LengthMismatch(usize, usize),
    /// The slave answered with an exception frame
    #[error("Modbus exception: {0}")]
    Exception(#[from] ProtocolError),
    /// Fatal I/O error on the bus
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The serial port could not be opened
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
    /// The RTU pipeline has been stopped
    #[error("Modbus RTU stopped")]
    Stopped,
    /// No master traffic has been observed for too long
    #[error("No master traffic within the past {0:?}")]
    MasterSilent(Duration),
}

impl Error {
    /// Exception frames are part of normal bus traffic and never terminal.
    #[must_use]
    pub const fn is_exception(&self) -> bool {
        matches!(self, Self::Exception(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Register values of an Eastron SDM smart meter.
//!
//! The meter exposes its measurements as IEEE 754 floats spanning two
//! input registers each, see the
//! [SDM630 Modbus protocol](https://www.eastroneurope.com/images/uploads/products/protocol/SDM630_MODBUS_Protocol.pdf).

use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use crate::{
    error::{Error, Result},
    frame::{Address, FunctionCode, ReqRespPair},
};

pub const PHASE_1_POWER: Address = 0x0C;
pub const PHASE_2_POWER: Address = 0x0E;
pub const PHASE_3_POWER: Address = 0x10;
pub const IMPORTED_ENERGY: Address = 0x48;
pub const EXPORTED_ENERGY: Address = 0x4A;

/// Registers per float value.
const REGISTERS_PER_VALUE: u16 = 2;

/// A measured quantity the meter reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measurand {
    PowerL1,
    PowerL2,
    PowerL3,
    EnergyImported,
    EnergyExported,
}

impl Measurand {
    /// The measurand stored at `register`, if it is a known one.
    #[must_use]
    pub const fn from_register(register: Address) -> Option<Self> {
        let m = match register {
            PHASE_1_POWER => Self::PowerL1,
            PHASE_2_POWER => Self::PowerL2,
            PHASE_3_POWER => Self::PowerL3,
            IMPORTED_ENERGY => Self::EnergyImported,
            EXPORTED_ENERGY => Self::EnergyExported,
            _ => return None,
        };
        Some(m)
    }

    /// Stable name, e.g. for telemetry topics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PowerL1 => "power_l1",
            Self::PowerL2 => "power_l2",
            Self::PowerL3 => "power_l3",
            Self::EnergyImported => "energy_imported",
            Self::EnergyExported => "energy_exported",
        }
    }

    #[must_use]
    pub const fn unit(self) -> &'static str {
        match self {
            Self::PowerL1 | Self::PowerL2 | Self::PowerL3 => "W",
            Self::EnergyImported | Self::EnergyExported => "kWh",
        }
    }
}

impl fmt::Display for Measurand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single float read from the meter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub register: Address,
    pub value: f32,
}

impl Reading {
    #[must_use]
    pub const fn measurand(&self) -> Option<Measurand> {
        Measurand::from_register(self.register)
    }
}

/// Decode the float values of a read input registers exchange.
pub fn decode_readings(pair: &ReqRespPair) -> Result<Vec<Reading>> {
    let ReqRespPair { request, response } = pair;
    if request.function != FunctionCode::ReadInputRegisters {
        return Err(Error::FnCode(request.function.value()));
    }
    let Some((start, quantity)) = request.request_range() else {
        return Err(Error::BufferSize);
    };
    let count = usize::from(quantity / REGISTERS_PER_VALUE);
    // Byte count first, then four bytes per value.
    let expected_len = 1 + count * 4;
    if response.data.len() < expected_len {
        return Err(Error::LengthMismatch(expected_len, response.data.len()));
    }
    let readings = response.data[1..expected_len]
        .chunks_exact(4)
        .zip(0u16..)
        .map(|(bytes, i)| Reading {
            register: start.wrapping_add(i * REGISTERS_PER_VALUE),
            value: BigEndian::read_f32(bytes),
        })
        .collect();
    Ok(readings)
}

/// Consumer of decoded measurements.
pub trait RegisterSink {
    fn publish(&mut self, measurand: Measurand, value: f32) -> Result<()>;
}

/// Writes every measurement to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl RegisterSink for LogSink {
    fn publish(&mut self, measurand: Measurand, value: f32) -> Result<()> {
        info!("{measurand} [{}]: {value}", measurand.unit());
        Ok(())
    }
}

/// Decode `pair` and hand all known measurands to `sink`.
///
/// Returns the number of published values.
pub fn forward<S>(pair: &ReqRespPair, sink: &mut S) -> Result<usize>
where
    S: RegisterSink + ?Sized,
{
    let mut published = 0;
    for reading in decode_readings(pair)? {
        let Some(measurand) = reading.measurand() else {
            continue;
        };
        sink.publish(measurand, reading.value)?;
        published += 1;
    }
    Ok(published)
}

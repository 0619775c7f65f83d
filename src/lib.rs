// SPDX-FileCopyrightText: Copyright (c) 2018-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Passive listener for Modbus RTU buses.
//!
//! The wiretap sits on a half-duplex RS-485 bus next to a master (e.g. an
//! inverter) and a slave (e.g. a smart meter). It cuts the byte stream into
//! frames at every silent interval, verifies their CRC, and pairs requests
//! to the target slave with the responses that follow them.
//!
//! ```no_run
//! # async fn run() -> modbus_wiretap::Result<()> {
//! use modbus_wiretap::{bus, meter, wiretap::Wiretap};
//!
//! let port = modbus_wiretap::serial::open("/dev/ttyUSB0", 9600)?;
//! let (rtu, _tx) = bus::start(port, 9600);
//! let mut wiretap = Wiretap::new(rtu, 1);
//! loop {
//!     let pair = wiretap.next().await?;
//!     meter::forward(&pair, &mut meter::LogSink)?;
//! }
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod bus;
mod codec;
#[cfg(feature = "cli")]
pub mod config;
mod error;
mod frame;
pub mod liveness;
pub mod meter;
#[cfg(feature = "serial")]
pub mod serial;
pub mod wiretap;

pub use codec::rtu;
pub use error::*;
pub use frame::*;

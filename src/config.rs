// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command line and environment settings.

use clap::Parser;

use crate::frame::SlaveId;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "modbus-wiretap", version, about = "Listen to a Modbus RTU bus")]
pub struct Config {
    /// Serial device of the RS-485 adapter.
    #[arg(
        long,
        env = "WIRETAP_PORT",
        value_name = "PATH",
        default_value = "/dev/ttyUSB0"
    )]
    pub port: String,

    /// Line speed of the bus, sets the silent interval between frames.
    #[arg(
        long,
        env = "WIRETAP_BAUD_RATE",
        value_name = "BAUD",
        default_value_t = 9600,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub baud_rate: u32,

    /// Slave whose traffic is decoded.
    #[arg(long, env = "WIRETAP_SLAVE", value_name = "ID", default_value_t = 1)]
    pub slave: SlaveId,

    /// Poll the slave when the master has gone quiet instead of exiting.
    #[arg(long, env = "WIRETAP_AUTOMASTER")]
    pub automaster: bool,
}

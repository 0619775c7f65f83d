// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reacting to a silent master.
//!
//! Either the wiretap takes over polling the slave ([`Automaster`]) or it
//! gives up once nothing has been heard for a long time ([`watchdog`]).
//! The second option exists for serial adapters that stop delivering
//! data without reporting an error: restarting the process revives them.

use std::time::Duration;

use crate::{
    bus::Transmitter,
    error::{Error, Result},
    frame::{Address, AddressedPdu, FunctionCode, Pdu, Quantity},
    meter,
    wiretap::TapState,
};

/// How often the master's activity is checked.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Silence after which the automaster polls the slave itself.
///
/// Inverters usually poll every 0.5 seconds, so this leaves plenty of room
/// and keeps the risk of collisions low.
pub const TAKEOVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between two requests of the automaster.
pub const REQUEST_GAP: Duration = Duration::from_millis(500);

/// Silence after which the watchdog gives up.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(60);

/// A range of registers polled by the [`Automaster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterBlock {
    pub function: FunctionCode,
    pub address: Address,
    pub quantity: Quantity,
}

impl RegisterBlock {
    #[must_use]
    pub const fn input_registers(address: Address, quantity: Quantity) -> Self {
        Self {
            function: FunctionCode::ReadInputRegisters,
            address,
            quantity,
        }
    }

    #[must_use]
    pub fn request(&self) -> Pdu {
        Pdu::read_request(self.function, self.address, self.quantity)
    }
}

/// Power of all three phases, then imported and exported energy.
pub const DEFAULT_BLOCKS: [RegisterBlock; 2] = [
    RegisterBlock::input_registers(meter::PHASE_1_POWER, 6),
    RegisterBlock::input_registers(meter::IMPORTED_ENERGY, 4),
];

/// Polls the target slave whenever the master has been silent.
pub struct Automaster {
    state: TapState,
    tx: Transmitter,
    blocks: Vec<RegisterBlock>,
}

impl Automaster {
    #[must_use]
    pub fn new(state: TapState, tx: Transmitter) -> Self {
        Self {
            state,
            tx,
            blocks: DEFAULT_BLOCKS.to_vec(),
        }
    }

    #[must_use]
    pub fn with_blocks(mut self, blocks: impl Into<Vec<RegisterBlock>>) -> Self {
        self.blocks = blocks.into();
        self
    }

    /// Run until the bus is stopped or a write fails.
    pub async fn run(self) -> Result<()> {
        loop {
            tokio::time::sleep(CHECK_INTERVAL).await;
            let silence = self.state.master_silence();
            if silence <= TAKEOVER_TIMEOUT {
                continue;
            }
            info!("No master around for {silence:?}, polling slave ourselves");
            match self.poll().await {
                Ok(()) => {}
                Err(Error::Stopped) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    /// Request every block once.
    ///
    /// Each request becomes the pending one before it is written, so the
    /// answer pairs up like any other.
    pub async fn poll(&self) -> Result<()> {
        let slave = self.state.target_slave();
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(REQUEST_GAP).await;
            }
            let pdu = block.request();
            self.state.set_pending(pdu.clone());
            self.tx.write_pdu(&AddressedPdu { slave, pdu }).await?;
        }
        Ok(())
    }
}

/// Wait until the master has been silent for longer than `timeout`.
///
/// Never returns while traffic is observed. The returned error is meant
/// to end the process.
pub async fn watchdog(state: TapState, timeout: Duration) -> Error {
    loop {
        tokio::time::sleep(CHECK_INTERVAL).await;
        let silence = state.master_silence();
        if silence > timeout {
            error!("No packets received within the past {silence:?}");
            return Error::MasterSilent(silence);
        }
    }
}

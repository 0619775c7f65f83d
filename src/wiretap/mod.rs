// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Matching requests and responses of a foreign master.
//!
//! RTU has no transaction ids. A listener only sees a stream of PDUs and
//! has to guess which of them belong together: a PDU for the target slave
//! with a four byte payload is taken as request, the next PDU with the
//! same function code and any other length as its response.

use std::future::Future;

use tokio::time::Instant;

use crate::{
    bus::Rtu,
    error::{Error, Result},
    frame::{AddressedPdu, ReqRespPair, SlaveId},
};

mod state;

pub use self::state::{Pending, TapState};

/// Anything that yields decoded PDUs.
pub trait PduSource {
    /// Exception frames are reported as [`Error::Exception`], every
    /// other error is terminal.
    fn read_pdu(&mut self) -> impl Future<Output = Result<AddressedPdu>> + Send;
}

impl PduSource for Rtu {
    fn read_pdu(&mut self) -> impl Future<Output = Result<AddressedPdu>> + Send {
        Rtu::read_pdu(self)
    }
}

/// Passive request/response correlator for a single slave.
pub struct Wiretap<S> {
    source: S,
    state: TapState,
}

impl<S> Wiretap<S>
where
    S: PduSource,
{
    pub fn new(source: S, target: SlaveId) -> Self {
        Self {
            source,
            state: TapState::new(target),
        }
    }

    /// Handle to the shared correlation state.
    #[must_use]
    pub fn state(&self) -> TapState {
        self.state.clone()
    }

    /// Wait for the next complete exchange with the target slave.
    ///
    /// Exception frames are skipped, any other error from the source is
    /// returned and ends the wiretap.
    pub async fn next(&mut self) -> Result<ReqRespPair> {
        loop {
            let adu = match self.source.read_pdu().await {
                Ok(adu) => adu,
                Err(Error::Exception(err)) => {
                    warn!("Ignoring exception response: {err}");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if let Some(pair) = self.observe(adu) {
                return Ok(pair);
            }
        }
    }

    /// Feed a single PDU into the correlation.
    pub fn observe(&self, adu: AddressedPdu) -> Option<ReqRespPair> {
        let AddressedPdu { slave, pdu } = adu;
        if slave != self.state.target_slave() {
            return None;
        }
        if pdu.is_request() {
            self.state.heard_request(pdu, Instant::now());
            return None;
        }
        let Some(request) = self.state.take_matching(pdu.function) else {
            debug!("Discarding unmatched response for function {}", pdu.function);
            return None;
        };
        Some(ReqRespPair {
            request,
            response: pdu,
        })
    }
}

// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{io, process::ExitCode};

use clap::Parser as _;
use log::{error, info, warn};

use modbus_wiretap::{
    Error, Result, bus,
    config::Config,
    liveness::{Automaster, WATCHDOG_TIMEOUT, watchdog},
    meter::{self, LogSink, RegisterSink},
    serial,
    wiretap::{PduSource, Wiretap},
};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let config = Config::parse();
    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Bailing out on error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    info!(
        "Listening on {} at {} baud for slave {}",
        config.port, config.baud_rate, config.slave
    );
    let port = serial::open(&config.port, config.baud_rate)?;
    let (rtu, tx) = bus::start(port, config.baud_rate);
    let stop = rtu.stop_handle();
    let mut wiretap = Wiretap::new(rtu, config.slave);

    let state = wiretap.state();
    let mut liveness = if config.automaster {
        tokio::spawn(Automaster::new(state, tx).run())
    } else {
        drop(tx);
        tokio::spawn(async move { Err::<(), _>(watchdog(state, WATCHDOG_TIMEOUT).await) })
    };

    let mut sink = LogSink;
    let res = tokio::select! {
        res = consume(&mut wiretap, &mut sink) => res,
        res = &mut liveness => res.unwrap_or_else(|err| Err(Error::Io(io::Error::other(err)))),
        res = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            res.map_err(Error::from)
        }
    };

    stop.stop().await;
    liveness.abort();
    res
}

async fn consume<S, K>(wiretap: &mut Wiretap<S>, sink: &mut K) -> Result<()>
where
    S: PduSource,
    K: RegisterSink,
{
    loop {
        let pair = wiretap.next().await?;
        if let Err(err) = meter::forward(&pair, sink) {
            warn!("Skipping exchange for function {}: {err}", pair.request.function);
        }
    }
}

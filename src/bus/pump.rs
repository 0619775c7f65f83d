// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drains the byte stream into the chunk queue.

use std::{io, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    time::Instant,
};

use super::Link;

/// Bytes requested per read.
const CHUNK_LEN: usize = 256;

/// Pause after a transient read error.
const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Errors that are worth another read.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

pub(super) async fn run<R>(mut reader: R, link: Arc<Link>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0; CHUNK_LEN];
    loop {
        let res = tokio::select! {
            biased;
            () = link.closed.cancelled() => break,
            res = reader.read(&mut buf) => res,
        };
        let cnt = match res {
            Ok(0) => {
                error!("Byte stream closed, stopping reader");
                link.fail(io::ErrorKind::UnexpectedEof.into()).await;
                break;
            }
            Ok(cnt) => cnt,
            Err(err) if is_transient(&err) => {
                warn!("Transient read error: {err}");
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
            Err(err) => {
                error!("Read error: {err}");
                link.fail(err).await;
                break;
            }
        };

        let arrived = Instant::now();

        // A stop may have raced with the read that just completed.
        let state = link.state.lock().await;
        if state.stopped {
            break;
        }
        let Some(chunks) = state.chunks.as_ref() else {
            break;
        };
        let sent = tokio::select! {
            biased;
            () = link.closed.cancelled() => false,
            res = chunks.send((buf[..cnt].to_vec(), arrived)) => res.is_ok(),
        };
        if !sent {
            break;
        }
    }
    debug!("Reader stopped");
}

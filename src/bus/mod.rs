// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Listening to a Modbus RTU bus.
//!
//! [`start`] splits a byte stream into a reader and a writer half.
//! A pump task drains the reader into a chunk queue, an assembler task
//! cuts the chunks into frames at every silent interval and
//! [`Rtu::read_pdu`] decodes them. [`Transmitter`] writes sealed frames
//! back onto the bus.

use std::{io, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::{Mutex, mpsc},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    codec::rtu,
    error::{Error, Result},
    frame::{AddressedPdu, RawFrame},
};

mod assembler;
mod pump;

pub use self::assembler::{Event, FrameAssembler, silent_interval};

/// Chunks waiting for the assembler.
///
/// A single slot makes the pump wait until the previous chunk is consumed.
const CHUNK_QUEUE_LEN: usize = 1;

/// Bytes of a single read, stamped when the read completed.
type Chunk = (Vec<u8>, Instant);

/// Verified frames waiting to be decoded.
const FRAME_QUEUE_LEN: usize = 10;

struct StopState {
    stopped: bool,
    chunks: Option<mpsc::Sender<Chunk>>,
    fault: Option<io::Error>,
}

/// State shared between the pump and everyone who may stop it.
struct Link {
    state: Mutex<StopState>,
    closed: CancellationToken,
}

impl Link {
    fn new(chunks: mpsc::Sender<Chunk>) -> Self {
        Self {
            state: Mutex::new(StopState {
                stopped: false,
                chunks: Some(chunks),
                fault: None,
            }),
            closed: CancellationToken::new(),
        }
    }

    async fn stop(&self) {
        // Closing first aborts a pending read and makes the pump
        // release the lock if it is blocked on the chunk queue.
        self.closed.cancel();
        let mut state = self.state.lock().await;
        state.stopped = true;
        state.chunks = None;
    }

    async fn fail(&self, err: io::Error) {
        let mut state = self.state.lock().await;
        state.fault = Some(err);
        state.chunks = None;
    }

    async fn terminal_error(&self) -> Error {
        let mut state = self.state.lock().await;
        state.fault.take().map_or(Error::Stopped, Error::Io)
    }
}

/// Receiving end of the bus.
pub struct Rtu {
    frames: mpsc::Receiver<RawFrame>,
    link: Arc<Link>,
}

/// Stops a running [`Rtu`] from anywhere.
#[derive(Clone)]
pub struct StopHandle {
    link: Arc<Link>,
}

/// Writes frames onto the bus.
#[derive(Clone)]
pub struct Transmitter {
    writer: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
    link: Arc<Link>,
}

/// Start listening on `stream`.
///
/// The silent interval that separates two frames is derived
/// from `baud_rate`. Must be called within a tokio runtime.
pub fn start<S>(stream: S, baud_rate: u32) -> (Rtu, Transmitter)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_QUEUE_LEN);
    let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_LEN);
    let link = Arc::new(Link::new(chunk_tx));

    tokio::spawn(pump::run(reader, Arc::clone(&link)));
    tokio::spawn(assembler::run(
        FrameAssembler::new(silent_interval(baud_rate)),
        chunk_rx,
        frame_tx,
        link.closed.clone(),
    ));

    let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
    let rtu = Rtu {
        frames: frame_rx,
        link: Arc::clone(&link),
    };
    let tx = Transmitter {
        writer: Arc::new(Mutex::new(writer)),
        link,
    };
    (rtu, tx)
}

impl Rtu {
    /// Wait for the next frame and decode it.
    ///
    /// Exception frames are returned as [`Error::Exception`]. Once the
    /// bus has been stopped or failed every call returns a terminal
    /// error: [`Error::Io`] with the fault that ended the pump (reported
    /// once) or [`Error::Stopped`].
    pub async fn read_pdu(&mut self) -> Result<AddressedPdu> {
        let frame = tokio::select! {
            biased;
            () = self.link.closed.cancelled() => None,
            frame = self.frames.recv() => frame,
        };
        let Some(frame) = frame else {
            return Err(self.link.terminal_error().await);
        };
        rtu::decode(&frame)
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            link: Arc::clone(&self.link),
        }
    }

    /// Close the bus and shut down all tasks.
    pub async fn stop(&self) {
        self.stop_handle().stop().await;
    }
}

impl StopHandle {
    /// Close the bus and shut down all tasks. Idempotent.
    pub async fn stop(&self) {
        self.link.stop().await;
    }
}

impl Transmitter {
    /// Seal `adu` with a CRC and write it onto the bus.
    ///
    /// Nothing waits for a reply.
    pub async fn write_pdu(&self, adu: &AddressedPdu) -> Result<()> {
        if self.link.closed.is_cancelled() {
            return Err(Error::Stopped);
        }
        let frame = rtu::encode(adu);
        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, duplex};

    use super::*;
    use crate::frame::{FunctionCode, Pdu};

    const BAUD_RATE: u32 = 9600;

    fn request(slave: u8) -> AddressedPdu {
        AddressedPdu {
            slave,
            pdu: Pdu::read_request(FunctionCode::ReadInputRegisters, 0x000C, 6),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn read_frame_from_bus() {
        let (mut device, port) = duplex(256);
        let (mut rtu, _tx) = start(port, BAUD_RATE);

        device
            .write_all(&[0x01, 0x04, 0x00, 0x0C, 0x00, 0x06, 0xB0, 0x0B])
            .await
            .unwrap();

        assert_eq!(rtu.read_pdu().await.unwrap(), request(0x01));
    }

    #[tokio::test(start_paused = true)]
    async fn write_sealed_frame() {
        let (mut device, port) = duplex(256);
        let (_rtu, tx) = start(port, BAUD_RATE);

        tx.write_pdu(&request(0x01)).await.unwrap();

        let mut buf = [0; 8];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x01, 0x04, 0x00, 0x0C, 0x00, 0x06, 0xB0, 0x0B]);
    }

    #[tokio::test(start_paused = true)]
    async fn exception_frames_are_reported() {
        let (mut device, port) = duplex(256);
        let (mut rtu, _tx) = start(port, BAUD_RATE);

        device.write_all(&[0x01, 0x84, 0x02, 0xC2, 0xC1]).await.unwrap();

        let err = rtu.read_pdu().await.unwrap_err();
        assert!(err.is_exception());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_terminates_pending_read() {
        let (_device, port) = duplex(256);
        let (mut rtu, tx) = start(port, BAUD_RATE);
        let stop = rtu.stop_handle();

        let reader = tokio::spawn(async move { rtu.read_pdu().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        stop.stop().await;

        let res = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(res, Err(Error::Stopped)));
        assert!(matches!(
            tx.write_pdu(&request(0x01)).await,
            Err(Error::Stopped)
        ));

        // Stopping twice is fine.
        stop.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_via_rtu() {
        let (_device, port) = duplex(256);
        let (mut rtu, tx) = start(port, BAUD_RATE);

        rtu.stop().await;

        assert!(matches!(rtu.read_pdu().await, Err(Error::Stopped)));
        assert!(matches!(
            tx.write_pdu(&request(0x01)).await,
            Err(Error::Stopped)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_stream_is_a_fatal_error() {
        let (device, port) = duplex(256);
        let (mut rtu, _tx) = start(port, BAUD_RATE);

        drop(device);

        let err = rtu.read_pdu().await.unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
        // The fault is reported once, afterwards the bus is just stopped.
        assert!(matches!(rtu.read_pdu().await, Err(Error::Stopped)));
    }
}

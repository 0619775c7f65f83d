// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Frame boundaries from bus silence.
//!
//! RTU frames carry neither a delimiter nor a length field. A frame ends
//! when the bus has been silent for the configured interval.

use std::time::Duration;

use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;

use super::Chunk;
use crate::{
    codec::rtu::{MAX_FRAME_LEN, MIN_FRAME_LEN, verify_frame},
    frame::RawFrame,
};

/// Silent interval between two frames.
///
/// In RTU mode frames are separated by a silent interval of at least
/// 3.5 character times. Deployed devices work with 3.5 bit times
/// (`3.5 / baud_rate` seconds), so that is what is used here.
#[must_use]
pub fn silent_interval(baud_rate: u32) -> Duration {
    let bit_time = 1_000_000_000 / u64::from(baud_rate.max(1));
    Duration::from_nanos(bit_time * 7 / 2)
}

/// Input of the [`FrameAssembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Bytes were read from the bus at the given instant.
    DataArrived(Vec<u8>, Instant),
    /// The bus has been silent for the whole interval.
    SilenceElapsed,
}

/// Collects chunks until the bus falls silent.
///
/// Silence is measured between the arrival stamps of two chunks, so
/// intervals below the timer resolution still separate frames. The
/// timer only has to flush the last frame of a burst.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    silent_interval: Duration,
    last_arrival: Option<Instant>,
}

impl FrameAssembler {
    #[must_use]
    pub fn new(silent_interval: Duration) -> Self {
        Self {
            buf: Vec::with_capacity(MAX_FRAME_LEN),
            silent_interval,
            last_arrival: None,
        }
    }

    #[must_use]
    pub const fn silent_interval(&self) -> Duration {
        self.silent_interval
    }

    /// Number of bytes waiting for the next silence.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Process a single event.
    ///
    /// Returns a frame when the silence completes one with a valid CRC.
    /// A chunk that arrives after the silent interval completes the
    /// buffered frame before it starts the next one.
    pub fn handle(&mut self, event: Event) -> Option<RawFrame> {
        match event {
            Event::DataArrived(chunk, arrived) => {
                let frame = match self.last_arrival {
                    Some(last)
                        if arrived.saturating_duration_since(last) >= self.silent_interval =>
                    {
                        self.take_frame()
                    }
                    _ => None,
                };
                self.last_arrival = Some(arrived);
                self.buf.extend_from_slice(&chunk);
                if self.buf.len() > MAX_FRAME_LEN {
                    warn!(
                        "Discarding {} byte(s) received without any silence",
                        self.buf.len()
                    );
                    self.buf.clear();
                }
                frame
            }
            Event::SilenceElapsed => {
                self.last_arrival = None;
                self.take_frame()
            }
        }
    }

    fn take_frame(&mut self) -> Option<RawFrame> {
        let frame = std::mem::replace(&mut self.buf, Vec::with_capacity(MAX_FRAME_LEN));
        if frame.len() < MIN_FRAME_LEN {
            if !frame.is_empty() {
                debug!("Discarding {} byte(s) of noise: {frame:X?}", frame.len());
            }
            return None;
        }
        if let Err(err) = verify_frame(&frame) {
            warn!("Dropping frame of {} byte(s): {err}", frame.len());
            return None;
        }
        Some(frame)
    }
}

/// Wait for whatever happens first: a chunk or the end of the silent interval.
///
/// A waiting chunk wins over an elapsed timer, its stamp tells whether
/// the silence has been long enough. Returns `None` once no chunk will
/// ever arrive again.
async fn next_event(
    chunks: &mut mpsc::Receiver<Chunk>,
    deadline: Option<Instant>,
) -> Option<Event> {
    let Some(deadline) = deadline else {
        return chunks.recv().await.map(Event::from);
    };
    tokio::select! {
        biased;
        chunk = chunks.recv() => chunk.map(Event::from),
        () = tokio::time::sleep_until(deadline) => Some(Event::SilenceElapsed),
    }
}

impl From<Chunk> for Event {
    fn from((bytes, arrived): Chunk) -> Self {
        Self::DataArrived(bytes, arrived)
    }
}

pub(super) async fn run(
    mut assembler: FrameAssembler,
    mut chunks: mpsc::Receiver<Chunk>,
    frames: mpsc::Sender<RawFrame>,
    closed: CancellationToken,
) {
    // Armed by every chunk, disarmed by the silence it measures.
    let mut deadline = None;
    while let Some(event) = next_event(&mut chunks, deadline).await {
        deadline = match &event {
            Event::DataArrived(_, arrived) => Some(*arrived + assembler.silent_interval()),
            Event::SilenceElapsed => None,
        };
        let Some(frame) = assembler.handle(event) else {
            continue;
        };
        let delivered = tokio::select! {
            biased;
            () = closed.cancelled() => false,
            res = frames.send(frame) => res.is_ok(),
        };
        if !delivered {
            break;
        }
    }
    if assembler.buffered() > 0 {
        debug!("Discarding {} buffered byte(s)", assembler.buffered());
    }
    debug!("Frame assembler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &[u8] = &[0x01, 0x04, 0x00, 0x0C, 0x00, 0x06, 0xB0, 0x0B];
    const REQUEST_2: &[u8] = &[0x01, 0x04, 0x00, 0x48, 0x00, 0x04, 0x71, 0xDF];

    const BAUD_RATE: u32 = 9600;

    fn assembler() -> FrameAssembler {
        FrameAssembler::new(silent_interval(BAUD_RATE))
    }

    fn data(bytes: &[u8], arrived: Instant) -> Event {
        Event::DataArrived(bytes.to_vec(), arrived)
    }

    fn micros(us: u64) -> Duration {
        Duration::from_micros(us)
    }

    #[test]
    fn silent_interval_from_baud_rate() {
        assert_eq!(silent_interval(9600), Duration::from_nanos(364_581));
        assert_eq!(silent_interval(1200), Duration::from_nanos(2_916_665));
        assert_eq!(silent_interval(1_000_000), Duration::from_nanos(3_500));
        assert_eq!(silent_interval(1), Duration::from_millis(3_500));
        assert_eq!(silent_interval(0), silent_interval(1));
    }

    #[test]
    fn assemble_split_frame() {
        let t0 = Instant::now();
        let mut a = assembler();
        assert_eq!(a.handle(data(&REQUEST[..3], t0)), None);
        assert_eq!(a.handle(data(&REQUEST[3..], t0 + micros(300))), None);
        assert_eq!(a.buffered(), REQUEST.len());
        assert_eq!(a.handle(Event::SilenceElapsed).unwrap(), REQUEST);
        assert_eq!(a.buffered(), 0);
    }

    #[test]
    fn frames_separated_by_silence() {
        let t0 = Instant::now();
        let mut a = assembler();
        a.handle(data(REQUEST, t0));
        assert_eq!(a.handle(Event::SilenceElapsed).unwrap(), REQUEST);
        a.handle(data(REQUEST_2, t0 + micros(10_000)));
        assert_eq!(a.handle(Event::SilenceElapsed).unwrap(), REQUEST_2);
    }

    #[test]
    fn late_chunk_completes_buffered_frame() {
        let t0 = Instant::now();
        let mut a = assembler();
        assert_eq!(a.handle(data(REQUEST, t0)), None);
        // 500 µs exceed the 364.581 µs at 9600 baud.
        assert_eq!(a.handle(data(REQUEST_2, t0 + micros(500))).unwrap(), REQUEST);
        assert_eq!(a.buffered(), REQUEST_2.len());
        assert_eq!(a.handle(Event::SilenceElapsed).unwrap(), REQUEST_2);
    }

    #[test]
    fn gap_of_exactly_the_interval_separates() {
        let t0 = Instant::now();
        let mut a = assembler();
        a.handle(data(REQUEST, t0));
        let frame = a.handle(data(REQUEST_2, t0 + silent_interval(BAUD_RATE)));
        assert_eq!(frame.unwrap(), REQUEST);
    }

    #[test]
    fn discard_short_frames() {
        for len in 0..MIN_FRAME_LEN {
            let mut a = assembler();
            a.handle(data(&REQUEST[..len], Instant::now()));
            assert_eq!(a.handle(Event::SilenceElapsed), None);
            assert_eq!(a.buffered(), 0);
        }
    }

    #[test]
    fn drop_frame_with_bad_crc() {
        let t0 = Instant::now();
        let mut a = assembler();
        let mut corrupted = REQUEST.to_vec();
        corrupted[3] ^= 0xFF;
        a.handle(data(&corrupted, t0));
        // The bad frame is closed by the next chunk and yields nothing.
        assert_eq!(a.handle(data(REQUEST, t0 + micros(1_000))), None);
        assert_eq!(a.handle(Event::SilenceElapsed).unwrap(), REQUEST);
    }

    #[test]
    fn glued_frames_fail_the_crc() {
        let t0 = Instant::now();
        let mut a = assembler();
        a.handle(data(REQUEST, t0));
        a.handle(data(REQUEST_2, t0 + micros(100)));
        assert_eq!(a.handle(Event::SilenceElapsed), None);
    }

    #[test]
    fn discard_endless_transmission() {
        let t0 = Instant::now();
        let mut a = assembler();
        let noise = [0x55; 100];
        for i in 0..3 {
            assert_eq!(a.handle(data(&noise, t0 + micros(100 * i))), None);
        }
        // 300 bytes without silence can never be a frame.
        assert_eq!(a.buffered(), 0);
        assert_eq!(a.handle(data(&noise, t0 + micros(300))), None);
        assert_eq!(a.buffered(), noise.len());
        assert!(a.buffered() <= MAX_FRAME_LEN);
    }

    fn spawn_assembler() -> (
        mpsc::Sender<Chunk>,
        mpsc::Receiver<RawFrame>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let (chunk_tx, chunk_rx) = mpsc::channel(1);
        let (frame_tx, frame_rx) = mpsc::channel(10);
        let closed = CancellationToken::new();
        let task = tokio::spawn(run(assembler(), chunk_rx, frame_tx, closed.clone()));
        (chunk_tx, frame_rx, closed, task)
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_within_interval_form_one_frame() {
        let (chunks, mut frames, _closed, _task) = spawn_assembler();
        let t0 = Instant::now();

        chunks.send((REQUEST[..4].to_vec(), t0)).await.unwrap();
        chunks
            .send((REQUEST[4..].to_vec(), t0 + micros(200)))
            .await
            .unwrap();

        assert_eq!(frames.recv().await.unwrap(), REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_millisecond_gap_forms_two_frames() {
        let (chunks, mut frames, _closed, _task) = spawn_assembler();
        let t0 = Instant::now();

        chunks.send((REQUEST.to_vec(), t0)).await.unwrap();
        chunks
            .send((REQUEST_2.to_vec(), t0 + micros(500)))
            .await
            .unwrap();

        assert_eq!(frames.recv().await.unwrap(), REQUEST);
        assert_eq!(frames.recv().await.unwrap(), REQUEST_2);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flushes_last_frame() {
        let (chunks, mut frames, _closed, _task) = spawn_assembler();

        chunks.send((REQUEST.to_vec(), Instant::now())).await.unwrap();

        assert_eq!(frames.recv().await.unwrap(), REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_input_discards_partial_frame() {
        let (chunks, mut frames, _closed, task) = spawn_assembler();

        chunks.send((REQUEST.to_vec(), Instant::now())).await.unwrap();
        drop(chunks);

        task.await.unwrap();
        assert!(frames.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn close_releases_assembler_blocked_on_full_queue() {
        let (chunks, _frames, closed, task) = spawn_assembler();

        for _ in 0..11 {
            chunks.send((REQUEST.to_vec(), Instant::now())).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        closed.cancel();

        task.await.unwrap();
    }
}

//! Composite TV receiver: RTL-SDR to ffplay.
//!
//! Three actors: the synchronous SDR read loop feeding an SPSC ring, the
//! decoder draining it, and a ticker pacing completed frames into ffplay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::tick;
use rtrb::RingBuffer;
use tracing::{info, warn};

use tv_slinger::args::{convert_filter, RxArgs};
use tv_slinger::decoder::Decoder;
use tv_slinger::display::DisplaySink;
use tv_slinger::framestore::DisplayFrameStore;
use tv_slinger::sdr::{self, RtlSdr};
use tv_slinger::RAW_FRAME_BYTES;

/// NTSC frame rate, used to pace the player.
const FRAME_RATE: f64 = 30000.0 / 1001.0;

/// One SDR read per ring slot.
type IqChunk = Box<[u8]>;

/// Ring capacity; at ~131 ms of signal per chunk this is ample cushion.
const RING_CAPACITY: usize = 32;

fn main() -> anyhow::Result<()> {
    let args = RxArgs::parse();
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();

    let sample_rate = args.sample_rate();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("shutdown requested");
            running.store(false, Ordering::Relaxed);
        })
        .context("failed to install signal handler")?;
    }

    let device = RtlSdr::open(0).context("opening RTL-SDR")?;
    device
        .set_center_freq((args.freq * 1e6) as u32)
        .context("setting center frequency")?;
    device
        .set_sample_rate(sample_rate as u32)
        .context("setting sample rate")?;
    device
        .set_tuner_gain_mode(true)
        .context("setting manual gain mode")?;
    device
        .set_tuner_gain(args.gain)
        .context("setting tuner gain")?;
    device.reset_buffer().context("resetting buffer")?;
    info!(
        "tuned to {:.3} MHz at {:.1} Msps, gain {:.1} dB",
        args.freq,
        sample_rate / 1e6,
        args.gain as f64 / 10.0
    );

    let display_store = Arc::new(DisplayFrameStore::new());
    let (mut producer, mut consumer) = RingBuffer::<IqChunk>::new(RING_CAPACITY);

    // SDR read loop: block in the driver, hand chunks to the decoder thread
    let reader_running = running.clone();
    let reader = thread::spawn(move || {
        let mut buf = vec![0u8; sdr::DEFAULT_BUF_LENGTH];
        while reader_running.load(Ordering::Relaxed) {
            match device.read_sync(&mut buf) {
                Ok(n) if n == buf.len() => {
                    if producer.push(buf.clone().into_boxed_slice()).is_err() {
                        warn!("decoder falling behind, dropping a chunk");
                    }
                }
                Ok(n) => warn!("short read ({n} / {} bytes)", buf.len()),
                Err(e) => {
                    warn!("read_sync error: {e}");
                    break;
                }
            }
        }
        // Device closes when dropped here, ending the session
    });

    // Decoder thread: drain the ring, decode, report cadence
    let decoder_running = running.clone();
    let decoder_store = display_store.clone();
    let decoder_handle = thread::spawn(move || {
        let mut decoder = Decoder::new(sample_rate, decoder_store);
        let mut last_reported = 0u64;
        while decoder_running.load(Ordering::Relaxed) {
            match consumer.pop() {
                Ok(chunk) => {
                    decoder.process_iq(&chunk);
                    let frames = decoder.frames_completed();
                    if frames / 100 > last_reported {
                        last_reported = frames / 100;
                        info!("decoded {frames} frames");
                    }
                }
                Err(_) => thread::sleep(Duration::from_millis(2)),
            }
        }
    });

    // Display pacing: pull the latest raster at the frame rate
    let mut sink = DisplaySink::start(FRAME_RATE).context("starting ffplay")?;
    let frame_ticker = tick(Duration::from_secs_f64(1.0 / FRAME_RATE));
    let mut frame = vec![0u8; RAW_FRAME_BYTES];
    for _ in frame_ticker.iter() {
        if !running.load(Ordering::Relaxed) {
            break;
        }
        display_store.copy_to(&mut frame);
        if sink.write_frame(&frame).is_err() {
            // Player window closed: a normal way to stop the receiver
            info!("display pipe closed, shutting down");
            running.store(false, Ordering::Relaxed);
            break;
        }
    }

    sink.stop();
    let _ = reader.join();
    let _ = decoder_handle.join();
    info!("receiver stopped");
    Ok(())
}

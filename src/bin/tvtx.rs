//! Composite TV transmitter: webcam (or colorbars) to HackRF.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::tick;
use tracing::{error, info};

use tv_slinger::args::{convert_filter, TxArgs};
use tv_slinger::capture::{start_capture, CaptureConfig};
use tv_slinger::framestore::{CompositeFrameStore, RawFrameStore};
use tv_slinger::sdr::HackRf;
use tv_slinger::standard::{Standard, StandardDescriptor};
use tv_slinger::synth::Synthesizer;
use tv_slinger::txstream::TxStreamer;

fn main() -> anyhow::Result<()> {
    let args = TxArgs::parse();
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();

    let standard = if args.pal { Standard::Pal } else { Standard::Ntsc };
    let sample_rate = args.sample_rate();
    let desc = StandardDescriptor::new(standard, sample_rate);
    info!(
        "{:?} at {:.1} Msps: {} samples/line, {} lines/frame",
        standard,
        sample_rate / 1e6,
        desc.line_samples,
        desc.lines_per_frame
    );

    let raw = Arc::new(RawFrameStore::new());
    let composite = Arc::new(CompositeFrameStore::new(desc.frame_samples()));
    let mut synth = Synthesizer::new(desc.clone(), raw.clone(), composite.clone());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("shutdown requested");
            running.store(false, Ordering::Relaxed);
        })
        .context("failed to install signal handler")?;
    }

    // Device first: configuration failures are fatal before anything runs
    let mut device = HackRf::open().context("opening HackRF")?;
    device
        .set_freq((args.freq * 1e6) as u64)
        .context("setting frequency")?;
    device
        .set_sample_rate(sample_rate)
        .context("setting sample rate")?;
    device
        .set_txvga_gain(args.gain)
        .context("setting TX gain")?;
    device.set_amp_enable(true).context("enabling amp")?;

    // Video source: SMPTE bars or the ffmpeg capture subprocess
    let mut capture = None;
    if args.test {
        synth.fill_test_pattern();
        info!("transmitting SMPTE colorbars");
    } else {
        let cfg = CaptureConfig {
            device: args.device.clone(),
            callsign: args.callsign.clone(),
            standard,
        };
        capture = Some(start_capture(&cfg, raw.clone(), running.clone()).context("starting capture")?);
    }

    // Synthesizer ticker at the standard's frame rate
    let frame_ticker = tick(desc.frame_duration());
    let synth_running = running.clone();
    let synth_handle = thread::spawn(move || {
        for _ in frame_ticker.iter() {
            if !synth_running.load(Ordering::Relaxed) {
                break;
            }
            synth.generate_full_frame();
        }
    });

    let mut streamer = TxStreamer::new(composite);
    device
        .start_tx(move |buf| streamer.fill(buf))
        .context("starting TX stream")?;
    info!(
        "transmission live on {:.3} MHz ({:.2} MHz bandwidth), press Ctrl+C to stop",
        args.freq, args.bw
    );

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    if let Err(e) = device.stop_tx() {
        error!("stop_tx failed: {e}");
    }
    drop(device);
    if let Some((mut child, reader)) = capture {
        let _ = child.kill();
        let _ = child.wait();
        let _ = reader.join();
    }
    let _ = synth_handle.join();
    info!("transmitter stopped");
    Ok(())
}

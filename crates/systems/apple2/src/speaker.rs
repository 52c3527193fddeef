//! Speaker click accumulator and the host-side audio consumer.
//!
//! Every toggle of $C030 inverts a stored sample value; the number of
//! samples between two toggles comes from the cycle distance between them.
//! A bounded single-producer/single-consumer channel carries the samples to
//! the host audio callback; overflow drops samples, underrun plays silence.

use crossbeam_channel::{bounded, Receiver, Sender};
use emu_core::log;
use emu_core::logging::{LogCategory, LogLevel};

use crate::CPU_HZ;

pub const AUDIO_SAMPLE_RATE: u32 = 44_100;

/// After this many samples without a click the output decays to silence.
const ATTENUATION_SAMPLES: u32 = 400;

/// About one second of buffered audio.
const QUEUE_CAPACITY: usize = AUDIO_SAMPLE_RATE as usize;

const CLICK_LEVEL: i16 = 0x2000;

/// Sample producer driven by $C030 accesses on the emulator thread.
#[derive(Debug)]
pub struct Speaker {
    last_value: i16,
    attenuation_counter: u32,
    last_audio_cycles: u64,
    tx: Sender<i16>,
}

impl Speaker {
    /// Create the speaker and the consumer half of its sample queue.
    pub fn new() -> (Self, AudioConsumer) {
        let (tx, rx) = bounded(QUEUE_CAPACITY);
        (
            Speaker {
                last_value: CLICK_LEVEL,
                attenuation_counter: 0,
                last_audio_cycles: 0,
                tx,
            },
            AudioConsumer {
                rx,
                first: true,
                mute: false,
            },
        )
    }

    /// Toggle the speaker diaphragm at the given frame-cycle position.
    pub fn click(&mut self, frame_cycles: u64) {
        self.forward_to_frame_cycle(frame_cycles);
        self.attenuation_counter = ATTENUATION_SAMPLES;
        self.last_value = !self.last_value;
    }

    /// Produce the samples owed between the audio watermark and
    /// `frame_cycles`, then advance the watermark.
    pub fn forward_to_frame_cycle(&mut self, frame_cycles: u64) {
        let elapsed = frame_cycles.saturating_sub(self.last_audio_cycles);
        let samples = elapsed * AUDIO_SAMPLE_RATE as u64 / CPU_HZ;

        let mut dropped = 0u64;
        for _ in 0..samples {
            let sample = self.attenuate(self.last_value);
            if self.tx.try_send(sample).is_err() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            log!(
                LogCategory::Audio,
                LogLevel::Trace,
                "Audio: queue full, dropped {} samples",
                dropped
            );
        }

        self.last_audio_cycles = frame_cycles;
    }

    /// Reset the watermark at the start of a frame.
    pub fn begin_frame(&mut self) {
        self.last_audio_cycles = 0;
    }

    fn attenuate(&mut self, sample: i16) -> i16 {
        if self.attenuation_counter == 0 {
            0
        } else {
            self.attenuation_counter -= 1;
            sample
        }
    }
}

/// Consumer half of the sample queue, owned by the host audio callback on
/// its own thread.
#[derive(Debug)]
pub struct AudioConsumer {
    rx: Receiver<i16>,
    first: bool,
    /// Output zeroes and keep resetting the startup state while set.
    pub mute: bool,
}

impl AudioConsumer {
    /// Fill `data` with interleaved 16-bit little-endian stereo samples.
    /// The first call drains whatever accumulated during startup. The
    /// buffer length must describe whole stereo frames.
    pub fn read(&mut self, data: &mut [u8]) {
        if self.first {
            self.first = false;
            while self.rx.try_recv().is_ok() {}
            data.fill(0);
            return;
        }

        assert!(
            data.len() % 4 == 0,
            "audio buffer length must be a multiple of 4"
        );

        if self.mute {
            self.first = true;
            data.fill(0);
            return;
        }

        for chunk in data.chunks_exact_mut(4) {
            let sample = self.rx.try_recv().unwrap_or(0);
            let [lo, hi] = sample.to_le_bytes();
            chunk.copy_from_slice(&[lo, hi, lo, hi]);
        }
    }

    /// Number of samples waiting in the queue.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

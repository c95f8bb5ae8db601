//! Meter Slot
//!
//! The audio callback writes an input/output [`MeterReading`] pair once per
//! buffer; the UI polls it. A sequence lock over plain atomics keeps the
//! pair consistent without the writer ever waiting.

use std::hint;
use std::sync::atomic::{fence, AtomicU64, Ordering};

use equaliser_dsp::MeterReading;

/// Shared input/output meter slot (single writer, any number of readers)
#[derive(Debug)]
pub struct MeterBank {
    // Odd while a write is in progress
    sequence: AtomicU64,
    // f64 values stored as bits: in rms, in peak, in seq, out rms, out peak, out seq
    values: [AtomicU64; 6],
}

impl MeterBank {
    pub fn new() -> Self {
        Self {
            sequence: AtomicU64::new(0),
            values: pack(&MeterReading::SILENT, &MeterReading::SILENT).map(AtomicU64::new),
        }
    }

    /// Store a new pair. Must only be called from one thread at a time.
    ///
    /// # Real-time Safety
    /// Wait-free: a handful of atomic stores.
    #[inline]
    pub fn publish(&self, input: MeterReading, output: MeterReading) {
        let seq = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        for (slot, value) in self.values.iter().zip(pack(&input, &output)) {
            slot.store(value, Ordering::Relaxed);
        }

        self.sequence.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Latest consistent (input, output) pair
    pub fn read(&self) -> (MeterReading, MeterReading) {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before % 2 == 1 {
                hint::spin_loop();
                continue;
            }

            let bits: [u64; 6] = std::array::from_fn(|i| self.values[i].load(Ordering::Relaxed));

            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) == before {
                let input = MeterReading {
                    rms_db: f64::from_bits(bits[0]),
                    peak_db: f64::from_bits(bits[1]),
                    sequence: bits[2],
                };
                let output = MeterReading {
                    rms_db: f64::from_bits(bits[3]),
                    peak_db: f64::from_bits(bits[4]),
                    sequence: bits[5],
                };
                return (input, output);
            }
            hint::spin_loop();
        }
    }

    /// Back to silence. Only call while no stream is writing.
    pub fn clear(&self) {
        self.publish(MeterReading::SILENT, MeterReading::SILENT);
    }
}

fn pack(input: &MeterReading, output: &MeterReading) -> [u64; 6] {
    [
        input.rms_db.to_bits(),
        input.peak_db.to_bits(),
        input.sequence,
        output.rms_db.to_bits(),
        output.peak_db.to_bits(),
        output.sequence,
    ]
}

impl Default for MeterBank {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn reading(value: f64, sequence: u64) -> MeterReading {
        MeterReading {
            rms_db: value,
            peak_db: value + 3.0,
            sequence,
        }
    }

    #[test]
    fn test_starts_silent() {
        let bank = MeterBank::new();
        let (input, output) = bank.read();
        assert_eq!(input, MeterReading::SILENT);
        assert_eq!(output, MeterReading::SILENT);
    }

    #[test]
    fn test_publish_then_read() {
        let bank = MeterBank::new();
        bank.publish(reading(-12.0, 1), reading(-9.0, 1));
        let (input, output) = bank.read();
        assert_eq!(input, reading(-12.0, 1));
        assert_eq!(output, reading(-9.0, 1));

        bank.clear();
        assert_eq!(bank.read().0, MeterReading::SILENT);
    }

    #[test]
    fn test_never_returns_mixed_readings() {
        const WRITES: u64 = 200_000;
        let bank = Arc::new(MeterBank::new());
        let writer_bank = Arc::clone(&bank);

        let writer = thread::spawn(move || {
            for i in 1..=WRITES {
                let value = -((i % 96) as f64);
                writer_bank.publish(reading(value, i), reading(value, i));
            }
        });

        let mut last = 0;
        while last < WRITES {
            let (input, output) = bank.read();
            assert_eq!(input, output, "torn pair");
            if input.sequence > 0 {
                assert_eq!(input.peak_db, input.rms_db + 3.0, "torn reading");
            }
            assert!(input.sequence >= last);
            last = input.sequence;
        }
        writer.join().unwrap();
    }
}

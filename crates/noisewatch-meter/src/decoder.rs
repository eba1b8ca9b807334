/// Converts raw PCM frames into the calibrated loudness metric.
pub struct FrameDecoder {
    calibration_offset_db: f64,
}

impl FrameDecoder {
    pub fn new(calibration_offset_db: f64) -> Self {
        Self {
            calibration_offset_db,
        }
    }

    /// Mean absolute amplitude of the frame, in raw sample units.
    pub fn mean_amplitude(&self, samples: &[i16]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }

        // unsigned_abs keeps i16::MIN from overflowing
        let sum: u64 = samples.iter().map(|&s| s.unsigned_abs() as u64).sum();
        sum as f64 / samples.len() as f64
    }

    /// Loudness of the frame in dB. A silent frame decodes to exactly 0.0;
    /// that is a defined reading, not an error.
    pub fn decode(&self, samples: &[i16]) -> f64 {
        let amplitude = self.mean_amplitude(samples);
        if amplitude > 0.0 {
            20.0 * amplitude.log10() + self.calibration_offset_db
        } else {
            0.0
        }
    }
}

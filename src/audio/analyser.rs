//! Frequency analysis tap
//!
//! Keeps a sliding window of the most recent mono samples and turns it into
//! byte-scaled frequency bins for a live level meter.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

/// Analyser shared between the mix graph (writer) and the UI poller (reader)
pub type SharedAnalyser = Arc<Mutex<Analyser>>;

/// One polled set of frequency bins, 0..=255 per bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencySnapshot {
    pub bins: Vec<u8>,
}

impl FrequencySnapshot {
    /// Mean bin value normalized to 0.0-1.0
    pub fn level(&self) -> f32 {
        if self.bins.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.bins.iter().map(|&b| b as u32).sum();
        sum as f32 / (self.bins.len() as f32 * 255.0)
    }
}

/// Windowed DFT analyser
pub struct Analyser {
    fft_size: usize,
    window: VecDeque<f32>,
    blackman: Vec<f32>,
    smoothed: Vec<f32>,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
}

impl Analyser {
    /// Create an analyser with the given FFT size (256 gives 128 bins)
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(2);
        let blackman = (0..fft_size)
            .map(|n| {
                let x = n as f32 / fft_size as f32;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();

        Self {
            fft_size,
            window: VecDeque::from(vec![0.0; fft_size]),
            blackman,
            smoothed: vec![0.0; fft_size / 2],
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }
    }

    pub fn shared(fft_size: usize) -> SharedAnalyser {
        Arc::new(Mutex::new(Self::new(fft_size)))
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Feed interleaved samples; channels are averaged down to mono
    pub fn push_interleaved(&mut self, samples: &[f32], channels: u16) {
        let channels = channels.max(1) as usize;
        for frame in samples.chunks(channels) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            if self.window.len() == self.fft_size {
                self.window.pop_front();
            }
            self.window.push_back(mono);
        }
    }

    /// Compute byte-scaled magnitudes for the current window
    pub fn snapshot(&mut self) -> FrequencySnapshot {
        let n = self.fft_size;
        let windowed: Vec<f32> = self
            .window
            .iter()
            .zip(&self.blackman)
            .map(|(s, w)| s * w)
            .collect();

        let range = self.max_db - self.min_db;
        let mut bins = Vec::with_capacity(n / 2);

        for k in 0..n / 2 {
            let mut re = 0.0f32;
            let mut im = 0.0f32;
            for (i, sample) in windowed.iter().enumerate() {
                let phase = 2.0 * PI * k as f32 * i as f32 / n as f32;
                re += sample * phase.cos();
                im -= sample * phase.sin();
            }
            let magnitude = (re * re + im * im).sqrt() / n as f32;

            let smoothed = self.smoothing * self.smoothed[k] + (1.0 - self.smoothing) * magnitude;
            self.smoothed[k] = smoothed;

            let db = if smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = 255.0 * (db - self.min_db) / range;
            bins.push(scaled.clamp(0.0, 255.0) as u8);
        }

        FrequencySnapshot { bins }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_yields_zero_bins() {
        let mut analyser = Analyser::new(256);
        analyser.push_interleaved(&[0.0; 512], 2);
        let snapshot = analyser.snapshot();
        assert_eq!(snapshot.bins.len(), 128);
        assert!(snapshot.bins.iter().all(|&b| b == 0));
        assert_eq!(snapshot.level(), 0.0);
    }

    #[test]
    fn test_tone_peaks_near_its_bin() {
        let mut analyser = Analyser::new(256);
        // Bin 16 of a 256-point window at 48kHz is 3kHz
        let samples: Vec<f32> = (0..256)
            .map(|i| 0.001 * (2.0 * PI * 16.0 * i as f32 / 256.0).sin())
            .collect();
        for _ in 0..20 {
            analyser.push_interleaved(&samples, 1);
            analyser.snapshot();
        }
        let snapshot = analyser.snapshot();
        let peak = snapshot
            .bins
            .iter()
            .enumerate()
            .max_by_key(|(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap();
        assert!((15..=17).contains(&peak), "peak at bin {}", peak);
        assert!(snapshot.level() > 0.0);
    }
}

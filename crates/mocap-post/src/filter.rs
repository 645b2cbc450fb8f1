use std::f64::consts::{PI, SQRT_2};

/// Number of samples reflected at each end of a sequence before zero phase
/// filtering. Shorter sequences are left untouched.
pub const PAD_LEN: usize = 9;

/// A second order Butterworth low pass filter in direct form II transposed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Butterworth {
    b: [f64; 3],
    a: [f64; 2],
}

impl Butterworth {
    /// Design a low pass filter.
    ///
    /// # Arguments
    ///
    /// * `cutoff` - The cutoff frequency in Hz.
    /// * `sample_rate` - The sampling frequency in Hz.
    ///
    /// # Returns
    ///
    /// `None` when the cutoff is not strictly between zero and the Nyquist frequency.
    pub fn lowpass(cutoff: f64, sample_rate: f64) -> Option<Self> {
        if !(cutoff > 0.0 && sample_rate > 0.0 && cutoff < 0.5 * sample_rate) {
            return None;
        }

        let k = (PI * cutoff / sample_rate).tan();
        let k2 = k * k;
        let norm = 1.0 / (1.0 + SQRT_2 * k + k2);

        let b0 = k2 * norm;
        let a1 = 2.0 * (k2 - 1.0) * norm;
        let a2 = (1.0 - SQRT_2 * k + k2) * norm;

        Some(Self {
            b: [b0, 2.0 * b0, b0],
            a: [a1, a2],
        })
    }

    /// Filter state that produces a steady output for a unit step input.
    fn steady_state(&self) -> [f64; 2] {
        let [b0, b1, b2] = self.b;
        let [a1, a2] = self.a;
        let gain = (b0 + b1 + b2) / (1.0 + a1 + a2);
        let z2 = b2 - a2 * gain;
        let z1 = b1 - a1 * gain + z2;
        [z1, z2]
    }

    /// Causal filtering of `x`, starting from the state `zi`.
    pub fn filter(&self, x: &[f64], zi: [f64; 2]) -> Vec<f64> {
        let [b0, b1, b2] = self.b;
        let [a1, a2] = self.a;
        let [mut z1, mut z2] = zi;

        x.iter()
            .map(|&xn| {
                let yn = b0 * xn + z1;
                z1 = b1 * xn - a1 * yn + z2;
                z2 = b2 * xn - a2 * yn;
                yn
            })
            .collect()
    }

    /// Zero phase filtering: forward then backward over an odd extension of `x`.
    ///
    /// Sequences of at most [`PAD_LEN`] samples are returned unchanged.
    pub fn filtfilt(&self, x: &[f64]) -> Vec<f64> {
        let n = x.len();
        if n <= PAD_LEN {
            return x.to_vec();
        }

        let first = x[0];
        let last = x[n - 1];
        let mut ext = Vec::with_capacity(n + 2 * PAD_LEN);
        ext.extend((1..=PAD_LEN).rev().map(|i| 2.0 * first - x[i]));
        ext.extend_from_slice(x);
        ext.extend((1..=PAD_LEN).map(|i| 2.0 * last - x[n - 1 - i]));

        let zi = self.steady_state();

        let scaled = |z: [f64; 2], v: f64| [z[0] * v, z[1] * v];

        let forward = self.filter(&ext, scaled(zi, ext[0]));
        let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
        let start = reversed[0];
        reversed = self.filter(&reversed, scaled(zi, start));
        reversed.reverse();

        reversed[PAD_LEN..PAD_LEN + n].to_vec()
    }

    /// Zero phase filter every contiguous run of valid samples independently.
    ///
    /// Missing samples stay missing. Runs of at most [`PAD_LEN`] samples are
    /// left unfiltered.
    ///
    /// # Returns
    ///
    /// The number of runs that were filtered.
    pub fn filter_segments<const N: usize>(&self, samples: &mut [Option<[f64; N]>]) -> usize {
        let mut filtered = 0;
        let mut i = 0;
        while i < samples.len() {
            if samples[i].is_none() {
                i += 1;
                continue;
            }
            let start = i;
            while i < samples.len() && samples[i].is_some() {
                i += 1;
            }
            let segment = &mut samples[start..i];
            if segment.len() <= PAD_LEN {
                continue;
            }

            for d in 0..N {
                let channel: Vec<f64> = segment.iter().flatten().map(|v| v[d]).collect();
                let smoothed = self.filtfilt(&channel);
                for (value, s) in segment.iter_mut().flatten().zip(smoothed) {
                    value[d] = s;
                }
            }
            filtered += 1;
        }
        filtered
    }
}

//! Philox4x32-10 counter based generator.
//!
//! Accelerator random number libraries rely on counter based generators of
//! this family, their streams do not match the ChaCha based CPU reference
//! stream even for the same seed.
//!
//! Parallel Random Numbers: As Easy as 1, 2, 3, J. Salmon et al, 2011.
//! https://www.thesalmons.org/john/random123/papers/random123sc11.pdf

const PHILOX_M4X32_0: u32 = 0xD2511F53;
const PHILOX_M4X32_1: u32 = 0xCD9E8D57;
const PHILOX_W32_0: u32 = 0x9E3779B9;
const PHILOX_W32_1: u32 = 0xBB67AE85;

#[inline(always)]
fn round(ctr: [u32; 4], key: [u32; 2]) -> [u32; 4] {
    let prod0 = (ctr[0] as u64).wrapping_mul(PHILOX_M4X32_0 as u64);
    let prod1 = (ctr[2] as u64).wrapping_mul(PHILOX_M4X32_1 as u64);
    [
        ((prod1 >> 32) as u32) ^ ctr[1] ^ key[0],
        prod1 as u32,
        ((prod0 >> 32) as u32) ^ ctr[3] ^ key[1],
        prod0 as u32,
    ]
}

fn philox4x32_10(ctr: [u32; 4], key: [u32; 2]) -> [u32; 4] {
    let mut ctr = ctr;
    let mut key = key;
    for _ in 0..10 {
        ctr = round(ctr, key);
        key[0] = key[0].wrapping_add(PHILOX_W32_0);
        key[1] = key[1].wrapping_add(PHILOX_W32_1);
    }
    ctr
}

// Both maps land in (0, 1], the open lower bound keeps ln() finite in
// Box-Muller.
#[inline(always)]
fn to_unit_interval_f32(u: u32) -> f64 {
    ((u >> 8) as f64 + 1.0) / (1u64 << 24) as f64
}

/// 53 bits uniform: the 32 bits of `hi` followed by the top 21 bits of `lo`.
#[inline(always)]
fn to_unit_interval_f64(hi: u32, lo: u32) -> f64 {
    let bits = ((hi as u64) << 21) | ((lo as u64) >> 11);
    (bits as f64 + 1.0) / (1u64 << 53) as f64
}

#[inline(always)]
fn box_muller(u1: f64, u2: f64) -> (f64, f64) {
    let r = (-2.0 * u1.ln()).sqrt();
    let theta = 2.0 * std::f64::consts::PI * u2;
    (r * theta.cos(), r * theta.sin())
}

/// The state of a Philox stream: a key derived from the seed and the
/// position of the next block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Philox {
    key: [u32; 2],
    counter: u64,
}

impl Philox {
    pub fn new(seed: u64) -> Self {
        Self { key: [seed as u32, (seed >> 32) as u32], counter: 0 }
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    fn next_block(&mut self) -> [u32; 4] {
        let ctr = [self.counter as u32, (self.counter >> 32) as u32, 0, 0];
        self.counter = self.counter.wrapping_add(1);
        philox4x32_10(ctr, self.key)
    }

    /// Fills `out` with single precision standard normal values, each block
    /// of four outputs consumes one counter value.
    pub fn fill_normal_f32(&mut self, out: &mut [f32]) {
        for chunk in out.chunks_mut(4) {
            let block = self.next_block();
            for (pair, words) in chunk.chunks_mut(2).zip(block.chunks(2)) {
                let (z0, z1) =
                    box_muller(to_unit_interval_f32(words[0]), to_unit_interval_f32(words[1]));
                pair[0] = z0 as f32;
                if pair.len() > 1 {
                    pair[1] = z1 as f32;
                }
            }
        }
    }

    /// Fills `out` with double precision standard normal values. Each
    /// uniform takes two words, so a block only yields two outputs.
    pub fn fill_normal_f64(&mut self, out: &mut [f64]) {
        for pair in out.chunks_mut(2) {
            let [w0, w1, w2, w3] = self.next_block();
            let (z0, z1) = box_muller(to_unit_interval_f64(w0, w1), to_unit_interval_f64(w2, w3));
            pair[0] = z0;
            if pair.len() > 1 {
                pair[1] = z1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_advances_per_block() {
        let mut philox = Philox::new(42);
        philox.fill_normal_f32(&mut [0f32; 9]);
        assert_eq!(philox.counter(), 3);
        let mut philox = Philox::new(42);
        philox.fill_normal_f64(&mut [0f64; 9]);
        assert_eq!(philox.counter(), 5);
    }

    #[test]
    fn same_seed_same_values() {
        let mut out1 = vec![0f32; 64];
        let mut out2 = vec![0f32; 64];
        Philox::new(7).fill_normal_f32(&mut out1);
        Philox::new(7).fill_normal_f32(&mut out2);
        assert_eq!(out1, out2);
    }

    #[test]
    fn double_uniforms_use_53_bits() {
        assert!(to_unit_interval_f64(0, 1 << 11) > to_unit_interval_f64(0, 0));
        assert!(to_unit_interval_f64(u32::MAX, u32::MAX) <= 1.0);
        // Not on the 24 bits grid of the single precision path.
        let u = to_unit_interval_f64(0x1234_5678, 0x9abc_def0);
        let grid = (u * (1u64 << 24) as f64).fract();
        assert!(grid != 0.0);
    }

    #[test]
    fn normal_statistics() {
        let mut out = vec![0f64; 10000];
        Philox::new(42).fill_normal_f64(&mut out);
        let mean = out.iter().sum::<f64>() / 10000.;
        let variance = out.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 10000.;
        assert!(mean.abs() < 0.05, "mean = {mean}");
        assert!((variance - 1.).abs() < 0.1, "variance = {variance}");
        assert!(out.iter().all(|x| x.is_finite()));
    }
}

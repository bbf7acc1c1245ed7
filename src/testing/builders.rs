//! Deterministic pseudo-random test data.

use serde_json::{Value as Json, json};

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// A tiny linear congruential generator.
///
/// Not suitable for anything but tests: the point is that a seed always
/// produces the same sequence on every platform.
///
/// # Example
///
/// ```
/// use strata::testing::Lcg;
///
/// let mut a = Lcg::new(42);
/// let mut b = Lcg::new(42);
/// assert_eq!(a.next_u32(), b.next_u32());
/// assert!(a.below(10) < 10);
/// ```
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next 32 pseudo-random bits.
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_u32(&mut self) -> u32 {
        // Knuth's MMIX constants; the high half has the better bits.
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.state >> 32) as u32
    }

    /// Uniform integer in `[0, n)`; `n == 0` yields 0.
    pub fn below(&mut self, n: u32) -> u32 {
        if n == 0 { 0 } else { self.next_u32() % n }
    }

    /// Uniform float in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        f64::from(self.next_u32()) / (f64::from(u32::MAX) + 1.0)
    }

    /// Standard normal sample (Box-Muller).
    pub fn normal(&mut self) -> f64 {
        let u1 = 1.0 - self.unit();
        let u2 = self.unit();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    /// Alphanumeric string of length `len`.
    pub fn string(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| {
                let idx = self.below(ALPHANUMERIC.len() as u32) as usize;
                char::from(ALPHANUMERIC[idx])
            })
            .collect()
    }
}

/// One record with the canonical test layout:
///
/// - `a`: integer in `0..10`
/// - `b`: float in `[0, 1)`
/// - `c`: 32-character alphanumeric string
/// - `d`: list of 0 to 99 normally distributed floats
pub fn random_record(rng: &mut Lcg) -> Json {
    let a = rng.below(10);
    let b = rng.unit();
    let c = rng.string(32);
    let len = rng.below(100);
    let d: Vec<f64> = (0..len).map(|_| rng.normal()).collect();
    json!({ "a": a, "b": b, "c": c, "d": d })
}

/// `count` records from a generator seeded with `seed`.
///
/// ```
/// use strata::testing::random_records;
///
/// assert_eq!(random_records(3, 1), random_records(3, 1));
/// assert_ne!(random_records(3, 1), random_records(3, 2));
/// ```
#[must_use]
pub fn random_records(count: usize, seed: u64) -> Vec<Json> {
    let mut rng = Lcg::new(seed);
    (0..count).map(|_| random_record(&mut rng)).collect()
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use image::Rgb;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Lowest channel value a generated color may take (keeps away from black).
pub const CHANNEL_MIN: u8 = 50;
/// Highest channel value a generated color may take (keeps white label text readable).
pub const CHANNEL_MAX: u8 = 230;

/// Stable label → color mapping.
///
/// The first request for a label samples a color; every later request returns the
/// stored one. Entries are never reassigned or evicted, which is fine because the
/// label vocabulary is the detector's fixed class set.
#[derive(Debug)]
pub struct ColorAssigner {
    colors: HashMap<String, Rgb<u8>>,
    rng: StdRng,
}

/// Assigner shared between threads. Lookup-then-insert runs under one lock.
pub type SharedColorAssigner = Arc<Mutex<ColorAssigner>>;

impl ColorAssigner {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic assigner: the same seed and label discovery order give the same
    /// colors.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            colors: HashMap::new(),
            rng,
        }
    }

    pub fn shared(self) -> SharedColorAssigner {
        Arc::new(Mutex::new(self))
    }

    /// Color for `label`, registering it on first sight.
    pub fn color_for(&mut self, label: &str) -> Rgb<u8> {
        if let Some(color) = self.colors.get(label) {
            return *color;
        }
        let color = Rgb([
            self.rng.gen_range(CHANNEL_MIN..=CHANNEL_MAX),
            self.rng.gen_range(CHANNEL_MIN..=CHANNEL_MAX),
            self.rng.gen_range(CHANNEL_MIN..=CHANNEL_MAX),
        ]);
        log::debug!("color assigned: {} -> {:?}", label, color.0);
        self.colors.insert(label.to_string(), color);
        color
    }

    /// Color for `label` if it was already registered.
    pub fn get(&self, label: &str) -> Option<Rgb<u8>> {
        self.colors.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

impl Default for ColorAssigner {
    fn default() -> Self {
        Self::new()
    }
}

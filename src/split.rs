use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ConvertError;

const RATIO_TOLERANCE: f64 = 1e-6;

/// The dataset partition a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

/// Derives a stable 64-bit key from the run seed, a stream label and a record
/// id, via CRC-32C over the concatenated bytes.
///
/// The stream label separates independent random streams (split assignment,
/// augmentation) that share the same seed and id.
pub(crate) fn record_key(seed: u64, stream: &[u8], record_id: &str) -> u64 {
    let crc = crc32c::crc32c(&seed.to_le_bytes());
    let crc = crc32c::crc32c_append(crc, stream);
    let crc = crc32c::crc32c_append(crc, record_id.as_bytes());
    u64::from(crc)
}

/// Deterministic train/val/test assignment keyed by record id.
///
/// Each record's bucket is a pure function of `(record_id, seed, ratios)`:
/// the id is hashed into an RNG seed and a single uniform draw is compared
/// against the cumulative ratios. Parallel processing therefore yields the
/// same partition as sequential processing, regardless of arrival order.
#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    train: f64,
    val: f64,
    seed: u64,
}

impl Splitter {
    /// Validates the ratios and builds the splitter.
    ///
    /// The three ratios must each lie in `[0, 1]` and sum to 1.0 within
    /// tolerance; anything else is a fatal configuration error reported
    /// before processing starts.
    pub fn new(train: f64, val: f64, test: f64, seed: u64) -> Result<Self, ConvertError> {
        for (name, ratio) in [("train", train), ("val", val), ("test", test)] {
            if !(0.0..=1.0).contains(&ratio) || !ratio.is_finite() {
                return Err(ConvertError::Config(format!(
                    "{name} ratio {ratio} must lie in [0, 1]"
                )));
            }
        }
        if ((train + val + test) - 1.0).abs() > RATIO_TOLERANCE {
            return Err(ConvertError::Config(format!(
                "split ratios {train} + {val} + {test} must sum to 1.0"
            )));
        }

        Ok(Self { train, val, seed })
    }

    /// Assigns a record to its split.
    pub fn assign(&self, record_id: &str) -> Split {
        let mut rng = StdRng::seed_from_u64(record_key(self.seed, b"split", record_id));
        let draw: f64 = rng.gen_range(0.0..1.0);

        if draw < self.train {
            Split::Train
        } else if draw < self.train + self.val {
            Split::Val
        } else {
            Split::Test
        }
    }
}

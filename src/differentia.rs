use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Random fingerprint drawn for each deposited stratum.
///
/// Holds a `u64` masked to the column's bit width at construction, so two
/// differentiae of the same width match exactly when they are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Differentia(u64);

impl Differentia {
    /// Keep the low `bit_width` bits of `value`.
    #[inline]
    pub fn new(value: u64, bit_width: u8) -> Self {
        debug_assert!((1..=64).contains(&bit_width), "bit width {bit_width}");
        Self(value & Self::mask(bit_width))
    }

    /// Low `bit_width` bits set.
    #[inline]
    pub fn mask(bit_width: u8) -> u64 {
        match bit_width {
            64..=u8::MAX => u64::MAX,
            width => (1u64 << width) - 1,
        }
    }

    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }

    /// Draw a uniformly random fingerprint of `bit_width` bits.
    pub fn random(rng: &mut dyn RngCore, bit_width: u8) -> Self {
        Self(rng.gen_range(0..=Self::mask(bit_width)))
    }
}

impl From<Differentia> for u64 {
    fn from(differentia: Differentia) -> Self {
        differentia.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn mask_edges() {
        assert_eq!(Differentia::mask(1), 0b1);
        assert_eq!(Differentia::mask(13), 0x1FFF);
        assert_eq!(Differentia::mask(63), u64::MAX >> 1);
        assert_eq!(Differentia::mask(64), u64::MAX);
    }

    #[test]
    fn construction_drops_high_bits() {
        assert_eq!(Differentia::new(0xDEAD_BEEF_CAFE_BABE, 8).value(), 0xBE);
        assert_eq!(Differentia::new(0b10, 1).value(), 0);
        assert_eq!(u64::from(Differentia::new(u64::MAX, 64)), u64::MAX);
        // Equal after masking means the strata match.
        assert_eq!(Differentia::new(0xAF, 4), Differentia::new(0x0F, 4));
    }

    #[test]
    fn random_draws_fit_width() {
        let mut rng = SmallRng::seed_from_u64(7);
        for bit_width in [1u8, 3, 8, 63] {
            for _ in 0..256 {
                let d = Differentia::random(&mut rng, bit_width);
                assert_eq!(d.value() & !Differentia::mask(bit_width), 0);
            }
        }
        let one_bit: Vec<u64> = (0..64)
            .map(|_| Differentia::random(&mut rng, 1).value())
            .collect();
        assert!(one_bit.contains(&0) && one_bit.contains(&1));
    }

    #[test]
    fn serializes_as_bare_integer() {
        let d = Differentia::new(300, 16);
        assert_eq!(serde_json::to_string(&d).unwrap(), "300");
        assert_eq!(serde_json::from_str::<Differentia>("300").unwrap(), d);
    }
}

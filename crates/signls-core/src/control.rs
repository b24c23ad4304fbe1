//! Bounded, optionally randomized parameters

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Integer types a [`ControlValue`] can hold.
pub trait ControlInt: Copy + Ord + Debug + Into<i64> {
    /// Converts back from the widened representation, saturating at the type bounds.
    fn from_i64(value: i64) -> Self;
}

macro_rules! impl_control_int {
    ($($t:ty),*) => {
        $(
            impl ControlInt for $t {
                fn from_i64(value: i64) -> Self {
                    value.clamp(<$t>::MIN as i64, <$t>::MAX as i64) as $t
                }
            }
        )*
    };
}

impl_control_int!(u8, i8, u16, i16, i32);

/// A parameter kept inside `[min, max]` with a signed random amount.
///
/// The random amount is directional: a positive amount jitters upward by
/// `0..=amount`, a negative one downward by `amount..=0`. The jitter is drawn
/// in [`ControlValue::computed`] only, which also latches the result so a
/// later note-off can reuse exactly what was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlValue<T> {
    value: T,
    min: T,
    max: T,
    last: T,
    random_amount: i32,
}

impl<T: ControlInt> ControlValue<T> {
    pub fn new(value: T, min: T, max: T) -> Self {
        let value = value.clamp(min, max);
        Self {
            value,
            min,
            max,
            last: value,
            random_amount: 0,
        }
    }

    pub fn with_random_amount(mut self, amount: i32) -> Self {
        self.set_random_amount(amount);
        self
    }

    /// Base value, without jitter.
    pub fn value(&self) -> T {
        self.value
    }

    /// Value produced by the most recent [`ControlValue::computed`] or [`ControlValue::settle`].
    pub fn last(&self) -> T {
        self.last
    }

    pub fn min(&self) -> T {
        self.min
    }

    pub fn max(&self) -> T {
        self.max
    }

    pub fn random_amount(&self) -> i32 {
        self.random_amount
    }

    /// Stores a new base value. [`ControlValue::last`] keeps the value that
    /// was actually sent until the next resolution.
    pub fn set(&mut self, value: T) {
        self.value = value.clamp(self.min, self.max);
    }

    /// Stores the random amount, limited to the width of the range.
    pub fn set_random_amount(&mut self, amount: i32) {
        let span = (self.max.into() - self.min.into()).min(i32::MAX as i64) as i32;
        self.random_amount = amount.clamp(-span, span);
    }

    /// Latches the base value as [`ControlValue::last`] without any jitter.
    pub fn settle(&mut self) -> T {
        self.last = self.value;
        self.last
    }

    /// Resolves the value for playback and remembers it as [`ControlValue::last`].
    pub fn computed(&mut self, rng: &mut fastrand::Rng) -> T {
        let amount = self.random_amount as i64;
        let jitter = match amount {
            0 => 0,
            a if a > 0 => rng.i64(0..=a),
            a => rng.i64(a..=0),
        };
        let resolved = (self.value.into() + jitter).clamp(self.min.into(), self.max.into());
        self.last = T::from_i64(resolved);
        self.last
    }
}

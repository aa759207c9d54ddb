use core::time::Duration;

use thiserror::Error;

use crate::{InstantLike, SystemTimeLike};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Timespec(Duration);

impl Timespec {
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub const fn as_secs(self) -> u64 {
        self.0.as_secs()
    }

    pub const fn subsec_nanos(self) -> u32 {
        self.0.subsec_nanos()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FakeInstant(pub Timespec);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FakeSystemTime(pub Timespec);

#[derive(Debug, Error)]
#[error("fake system time is before the fake Unix epoch")]
pub struct FakeTimeError;

impl InstantLike for FakeInstant {
    fn checked_add(self, duration: Duration) -> Option<Self> {
        self.0 .0.checked_add(duration).map(Timespec).map(Self)
    }
}

impl SystemTimeLike for FakeSystemTime {
    type Error = FakeTimeError;

    const UNIX_EPOCH: Self = Self(Timespec(Duration::ZERO));

    fn duration_since(self, earlier: Self) -> Result<Duration, Self::Error> {
        self.0 .0.checked_sub(earlier.0 .0).ok_or(FakeTimeError)
    }
}

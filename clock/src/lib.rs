//! A [`Stream`]-based epoch timer for the detection pipeline.
//!
//! Implemented using [`Interval`]. [`Interval`]s may produce items late, but
//! the delays do not accumulate by default. There is no way to directly
//! convert a timestamp to an [`Instant`], so the conversion in [`epoch_ticks`]
//! assumes the [`Instant`] and [`SystemTime`] obtained at subscription
//! correspond to the same point in time. The error is negligible compared to
//! clock differences between nodes.
//!
//! [`Interval`]: tokio::time::Interval

use core::{error::Error, time::Duration};
use std::time::{Instant, SystemTime, SystemTimeError};

use anyhow::Result;
use futures::stream::{Stream, StreamExt as _};
use thiserror::Error;
use tokio_stream::wrappers::IntervalStream;
use types::{
    config::ChainConfig,
    consts::GENESIS_EPOCH,
    primitives::{Epoch, UnixSeconds},
};

#[cfg(test)]
mod fake_time;

pub trait InstantLike: Sized {
    fn checked_add(self, duration: Duration) -> Option<Self>;
}

pub trait SystemTimeLike: Copy {
    type Error: Error + Send + Sync + 'static;

    const UNIX_EPOCH: Self;

    fn duration_since(self, earlier: Self) -> Result<Duration, Self::Error>;
}

impl InstantLike for Instant {
    fn checked_add(self, duration: Duration) -> Option<Self> {
        Self::checked_add(&self, duration)
    }
}

impl SystemTimeLike for SystemTime {
    type Error = SystemTimeError;

    const UNIX_EPOCH: Self = Self::UNIX_EPOCH;

    fn duration_since(self, earlier: Self) -> Result<Duration, Self::Error> {
        Self::duration_since(&self, earlier)
    }
}

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum ClockError {
    #[error("time of next epoch overflowed")]
    NextInstantOverflow,
    #[error("ran out of epochs")]
    RanOutOfEpochs,
}

/// Emits the current epoch immediately, then every subsequent epoch at its
/// boundary. The stream is monotone and non-skipping.
pub fn epoch_ticks(
    config: &ChainConfig,
    genesis_time: UnixSeconds,
) -> Result<impl Stream<Item = Result<Epoch>>> {
    let now_instant = Instant::now();
    let now_system_time = SystemTime::now();

    let (current_epoch, next_epoch_instant) =
        next_epoch_with_instant(config, now_instant, now_system_time, genesis_time)?;

    let interval = tokio::time::interval_at(next_epoch_instant.into(), config.epoch_duration());

    let mut previous_epoch = current_epoch;

    let later_epochs = IntervalStream::new(interval).map(move |_| {
        previous_epoch = previous_epoch
            .checked_add(1)
            .ok_or(ClockError::RanOutOfEpochs)?;
        Ok(previous_epoch)
    });

    Ok(futures::stream::once(core::future::ready(Ok(current_epoch))).chain(later_epochs))
}

fn next_epoch_with_instant<I: InstantLike, S: SystemTimeLike>(
    config: &ChainConfig,
    now_instant: I,
    now_system_time: S,
    genesis_time: UnixSeconds,
) -> Result<(Epoch, I)> {
    let unix_epoch_to_now = now_system_time.duration_since(S::UNIX_EPOCH)?;
    let unix_epoch_to_genesis = Duration::from_secs(genesis_time);
    let epoch_duration = config.epoch_duration();

    anyhow::ensure!(
        epoch_duration > Duration::ZERO,
        "slot duration must be nonzero",
    );

    // Some platforms do not support `Instant`s before a platform dependent
    // epoch, typically the system boot time. Subtracting a `Duration` from an
    // `Instant` could panic there. The `InstantLike` trait only permits
    // addition.

    let (current_epoch, now_to_next_epoch) = if unix_epoch_to_now <= unix_epoch_to_genesis {
        let now_to_genesis = unix_epoch_to_genesis - unix_epoch_to_now;
        (GENESIS_EPOCH, now_to_genesis + epoch_duration)
    } else {
        let genesis_to_now = unix_epoch_to_now - unix_epoch_to_genesis;

        // `Duration` does not implement `Div<Duration>` or `Rem<Duration>`,
        // so the arithmetic is done on nanoseconds.
        let nanos_since_genesis = genesis_to_now.as_nanos();
        let nanos_per_epoch = epoch_duration.as_nanos();
        let epochs_since_genesis = u64::try_from(nanos_since_genesis / nanos_per_epoch)?;
        let nanos_into_epoch = u64::try_from(nanos_since_genesis % nanos_per_epoch)?;

        (
            GENESIS_EPOCH + epochs_since_genesis,
            epoch_duration.saturating_sub(Duration::from_nanos(nanos_into_epoch)),
        )
    };

    let next_epoch_instant = now_instant
        .checked_add(now_to_next_epoch)
        .ok_or(ClockError::NextInstantOverflow)?;

    Ok((current_epoch, next_epoch_instant))
}

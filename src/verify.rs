//! Write-then-read-back retries.
//!
//! The bus may acknowledge a write which the target never latched. Writes that matter are
//! therefore read back and repeated until the device reports the expected value.

use crate::error::Error;

/// Default number of write attempts before giving up.
pub const RETRY_TIMES: usize = 10;

/// How a verified write ended.
#[derive(Debug)]
pub enum VerifyOutcome<E> {
    /// The value read back matched after `attempts` writes.
    Success { attempts: usize },
    /// Every write went through but none was confirmed.
    VerifyFailure { attempts: usize },
    /// A bus transaction failed. No further attempts were made.
    IoFailure(E),
}

impl<E> VerifyOutcome<E> {
    pub fn is_success(&self) -> bool {
        matches!(self, VerifyOutcome::Success { .. })
    }
}

impl<I: embedded_io::Error> VerifyOutcome<Error<I>> {
    /// Collapse into a `Result`, yielding the number of attempts on success.
    pub fn into_result(self) -> Result<usize, Error<I>> {
        match self {
            VerifyOutcome::Success { attempts } => Ok(attempts),
            VerifyOutcome::VerifyFailure { attempts } => Err(Error::VerifyFailed { attempts }),
            VerifyOutcome::IoFailure(err) => Err(err),
        }
    }
}

/// Run `write` then `read` on `target` up to `max_attempts` times, stopping as soon as `matches`
/// accepts the value read back.
///
/// Errors from either step end the loop immediately: retries only cover values that silently did
/// not stick, never failed transactions.
pub fn write_verify<C, T, E, W, R, P>(
    target: &mut C,
    max_attempts: usize,
    mut write: W,
    mut read: R,
    matches: P,
) -> VerifyOutcome<E>
where
    C: ?Sized,
    W: FnMut(&mut C) -> Result<(), E>,
    R: FnMut(&mut C) -> Result<T, E>,
    P: Fn(&T) -> bool,
{
    for attempt in 1..=max_attempts {
        if let Err(err) = write(target) {
            return VerifyOutcome::IoFailure(err);
        }
        match read(target) {
            Ok(value) if matches(&value) => {
                if attempt > 1 {
                    tracing::debug!("Write confirmed after {} attempts", attempt);
                }
                return VerifyOutcome::Success { attempts: attempt };
            }
            Ok(_) => tracing::debug!("Read-back mismatch on attempt {}", attempt),
            Err(err) => return VerifyOutcome::IoFailure(err),
        }
    }
    tracing::warn!("Write not confirmed after {} attempts", max_attempts);
    VerifyOutcome::VerifyFailure {
        attempts: max_attempts,
    }
}

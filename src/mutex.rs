//! Cross process locking of the I2C bus.
//!
//! Every Sequent Microsystems tool on the host shares one named counting semaphore. A process owns
//! the bus once it has taken the semaphore down to zero. Waiting is done in bounded slices: when a
//! slice times out with the count still at zero, the previous owner is assumed dead and the bus is
//! taken over. No other stale state detection is performed.

use std::sync::{Arc, Condvar, Mutex};

use fugit::MillisDurationU32;
use thiserror::Error;

/// Name of the semaphore shared with the sibling tools.
pub const DEFAULT_SEMAPHORE_NAME: &str = "/SMI2C_SEM";
/// Initial, and maximum, count of the semaphore.
pub const DEFAULT_INITIAL_COUNT: u32 = 3;
/// Length of one waiting slice.
pub const DEFAULT_POLL_TIMEOUT: MillisDurationU32 = MillisDurationU32::millis(3000);

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Invalid semaphore name {0:?}")]
    InvalidName(String),
    #[error("Fail to open semaphore: {0}")]
    Open(std::io::Error),
    #[error("Fail to wait on semaphore: {0}")]
    Wait(std::io::Error),
    #[error("Fail to post semaphore: {0}")]
    Post(std::io::Error),
    #[error("Semaphore state poisoned")]
    Poisoned,
}

/// A lock serializing access to the bus across processes.
pub trait BusMutex {
    /// Block until this process owns the bus.
    fn acquire(&self) -> Result<(), LockError>;

    /// Hand the bus back.
    fn release(&self) -> Result<(), LockError>;
}

/// Owns the bus until dropped.
pub struct BusGuard<'a, M: BusMutex + ?Sized> {
    mutex: &'a M,
}

impl<'a, M: BusMutex + ?Sized> BusGuard<'a, M> {
    pub fn acquire(mutex: &'a M) -> Result<Self, LockError> {
        mutex.acquire()?;
        tracing::debug!("Bus acquired");
        Ok(Self { mutex })
    }
}

impl<M: BusMutex + ?Sized> Drop for BusGuard<'_, M> {
    fn drop(&mut self) {
        match self.mutex.release() {
            Ok(()) => tracing::debug!("Bus released"),
            Err(err) => tracing::error!("{}", err),
        }
    }
}

/// In process stand-in for the named semaphore, following the same protocol.
///
/// Clones share the same count, so each clone can play a separate process.
#[derive(Clone)]
pub struct InMemoryBusMutex {
    state: Arc<(Mutex<u32>, Condvar)>,
    max_count: u32,
    poll_timeout: MillisDurationU32,
}

impl InMemoryBusMutex {
    pub fn new(initial_count: u32, poll_timeout: MillisDurationU32) -> Self {
        Self {
            state: Arc::new((Mutex::new(initial_count), Condvar::new())),
            max_count: initial_count,
            poll_timeout,
        }
    }

    pub fn count(&self) -> Result<u32, LockError> {
        let count = self.state.0.lock().map_err(|_| LockError::Poisoned)?;
        Ok(*count)
    }
}

impl Default for InMemoryBusMutex {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_COUNT, DEFAULT_POLL_TIMEOUT)
    }
}

impl BusMutex for InMemoryBusMutex {
    fn acquire(&self) -> Result<(), LockError> {
        let (lock, available) = &*self.state;
        let slice = std::time::Duration::from_millis(self.poll_timeout.to_millis() as u64);
        let mut count = lock.lock().map_err(|_| LockError::Poisoned)?;
        loop {
            let (guard, waited) = available
                .wait_timeout_while(count, slice, |count| *count == 0)
                .map_err(|_| LockError::Poisoned)?;
            count = guard;
            if waited.timed_out() {
                tracing::warn!(
                    "Bus still busy after {} ms, taking over",
                    self.poll_timeout.to_millis()
                );
                return Ok(());
            }
            *count -= 1;
            if *count == 0 {
                return Ok(());
            }
        }
    }

    fn release(&self) -> Result<(), LockError> {
        let (lock, available) = &*self.state;
        let mut count = lock.lock().map_err(|_| LockError::Poisoned)?;
        if *count < self.max_count {
            *count += 1;
            available.notify_one();
        }
        Ok(())
    }
}

/// The POSIX named semaphore shared with the other bus users on this host.
///
/// Created on first use and never removed.
#[cfg(target_os = "linux")]
pub struct NamedSemaphore {
    sem: *mut libc::sem_t,
    max_count: u32,
    poll_timeout: MillisDurationU32,
}

#[cfg(target_os = "linux")]
impl NamedSemaphore {
    pub fn open(
        name: &str,
        initial_count: u32,
        poll_timeout: MillisDurationU32,
    ) -> Result<Self, LockError> {
        let c_name =
            std::ffi::CString::new(name).map_err(|_| LockError::InvalidName(name.to_string()))?;
        // SAFETY: `c_name` is a valid NUL terminated string for the duration of the call.
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT,
                0o666 as libc::c_uint,
                initial_count as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(LockError::Open(std::io::Error::last_os_error()));
        }
        Ok(Self {
            sem,
            max_count: initial_count,
            poll_timeout,
        })
    }

    fn value(&self) -> Result<u32, LockError> {
        let mut value: libc::c_int = 0;
        // SAFETY: `self.sem` stays open until drop.
        if unsafe { libc::sem_getvalue(self.sem, &mut value) } == -1 {
            return Err(LockError::Wait(std::io::Error::last_os_error()));
        }
        Ok(value.max(0) as u32)
    }

    /// Take one count, waiting at most one slice. Returns false on timeout.
    fn timed_wait(&self) -> Result<bool, LockError> {
        let mut deadline = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `deadline` is a valid, writable timespec.
        if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut deadline) } == -1 {
            return Err(LockError::Wait(std::io::Error::last_os_error()));
        }
        let millis = self.poll_timeout.to_millis();
        deadline.tv_sec += (millis / 1000) as libc::time_t;
        deadline.tv_nsec += ((millis % 1000) * 1_000_000) as libc::c_long;
        if deadline.tv_nsec >= 1_000_000_000 {
            deadline.tv_sec += 1;
            deadline.tv_nsec -= 1_000_000_000;
        }

        loop {
            // SAFETY: `self.sem` stays open until drop, `deadline` outlives the call.
            if unsafe { libc::sem_timedwait(self.sem, &deadline) } == 0 {
                return Ok(true);
            }
            let err = std::io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) => return Ok(false),
                _ => return Err(LockError::Wait(err)),
            }
        }
    }
}

#[cfg(target_os = "linux")]
impl BusMutex for NamedSemaphore {
    fn acquire(&self) -> Result<(), LockError> {
        loop {
            let taken = self.timed_wait()?;
            let value = self.value()?;
            if !taken {
                tracing::debug!("Semaphore wait timed out, count {}", value);
            }
            if value == 0 {
                if !taken {
                    tracing::warn!(
                        "Bus still busy after {} ms, taking over",
                        self.poll_timeout.to_millis()
                    );
                }
                return Ok(());
            }
        }
    }

    fn release(&self) -> Result<(), LockError> {
        if self.value()? < self.max_count {
            // SAFETY: `self.sem` stays open until drop.
            if unsafe { libc::sem_post(self.sem) } == -1 {
                return Err(LockError::Post(std::io::Error::last_os_error()));
            }
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        // SAFETY: opened in `open`, closed exactly once here.
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_releases_on_drop() {
        let mutex = InMemoryBusMutex::default();
        {
            let _guard = BusGuard::acquire(&mutex).unwrap();
            assert_eq!(mutex.count().unwrap(), 0);
        }
        assert_eq!(mutex.count().unwrap(), 1);
    }

    #[test]
    fn guard_releases_on_error_path() {
        fn failing(mutex: &InMemoryBusMutex) -> Result<(), &'static str> {
            let _guard = BusGuard::acquire(mutex).map_err(|_| "lock")?;
            Err("bus failure")
        }
        let mutex = InMemoryBusMutex::default();
        assert_eq!(failing(&mutex), Err("bus failure"));
        assert_eq!(mutex.count().unwrap(), 1);
        // And can be taken again straight away.
        let _guard = BusGuard::acquire(&mutex).unwrap();
    }

    #[test]
    fn release_never_exceeds_maximum() {
        let mutex = InMemoryBusMutex::new(3, MillisDurationU32::millis(50));
        mutex.release().unwrap();
        mutex.release().unwrap();
        assert_eq!(mutex.count().unwrap(), 3);
    }

    #[test]
    fn stale_owner_is_taken_over() {
        let mutex = InMemoryBusMutex::new(3, MillisDurationU32::millis(20));
        mutex.acquire().unwrap();
        // Never released, the next acquire has to give up waiting.
        mutex.acquire().unwrap();
        assert_eq!(mutex.count().unwrap(), 0);
    }

    #[test]
    fn concurrent_owners_never_overlap() {
        let mutex = InMemoryBusMutex::new(3, MillisDurationU32::millis(5000));
        let inside = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let mutex = mutex.clone();
                let inside = inside.clone();
                let overlaps = overlaps.clone();
                thread::spawn(move || {
                    for _ in 0..20 {
                        let _guard = BusGuard::acquire(&mutex).unwrap();
                        if inside.swap(true, Ordering::SeqCst) {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_millis(1));
                        inside.store(false, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}

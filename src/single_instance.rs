use crate::error::{Error, Result};
use nix::fcntl::{Flock, FlockArg};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Well-known lock path. The flock on it is the mutual exclusion; the
/// PID written inside is advisory metadata for the hand-off signal.
pub const DEFAULT_LOCK_PATH: &str = "/tmp/asus-helper.lock";

static ACTIVATE_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Held for the process lifetime by the winning instance. Dropping it
/// releases the flock; [`InstanceLock::release`] also removes the file.
pub struct InstanceLock {
    lock: Flock<File>,
    path: PathBuf,
}

pub enum Acquisition {
    Acquired(InstanceLock),
    /// Another live process holds the flock.
    AlreadyRunning,
}

/// Try to become the single running instance. On success the current
/// PID is written into the lock file (truncating any stale content).
/// Contention is an expected outcome, not an error.
pub fn acquire(path: &Path) -> Result<Acquisition> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o600)
        .open(path)
        .map_err(|e| Error::Lock(format!("cannot open {}: {}", path.display(), e)))?;

    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(lock) => {
            lock.set_len(0)
                .map_err(|e| Error::Lock(format!("cannot truncate lock file: {}", e)))?;
            let mut handle: &File = &lock;
            write!(handle, "{}", std::process::id())
                .map_err(|e| Error::Lock(format!("cannot record pid: {}", e)))?;
            log::debug!(
                target: "single_instance",
                "lock acquired, pid {} written to {}",
                std::process::id(),
                path.display()
            );
            Ok(Acquisition::Acquired(InstanceLock {
                lock,
                path: path.to_path_buf(),
            }))
        }
        Err((_, nix::errno::Errno::EWOULDBLOCK)) => Ok(Acquisition::AlreadyRunning),
        Err((_, errno)) => Err(Error::Lock(format!(
            "flock on {} failed: {}",
            path.display(),
            errno
        ))),
    }
}

impl InstanceLock {
    /// Clean shutdown: remove the lock file, then let the flock go.
    /// A process that dies without this leaves a stale file behind;
    /// the flock itself vanishes with the process, so the next acquire
    /// still succeeds.
    pub fn release(self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!(target: "single_instance", "could not remove lock file: {}", e);
        }
        drop(self.lock);
        log::debug!(target: "single_instance", "lock released");
    }
}

/// Read the holder's PID from the lock file and send it SIGUSR1 so it
/// surfaces itself. Failure here is reported but never force-breaks the
/// lock: a stale lock file with a dead PID stays for the next acquire
/// to reclaim.
pub fn signal_holder(path: &Path) -> Result<i32> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::SignalDelivery(format!("cannot read {}: {}", path.display(), e)))?;
    let pid: i32 = content
        .trim()
        .parse()
        .map_err(|_| Error::SignalDelivery(format!("lock file holds no pid: {:?}", content)))?;

    signal::kill(Pid::from_raw(pid), Signal::SIGUSR1)
        .map_err(|e| Error::SignalDelivery(format!("kill({}, SIGUSR1): {}", pid, e)))?;
    log::info!(target: "single_instance", "sent SIGUSR1 to existing instance (pid {})", pid);
    Ok(pid)
}

extern "C" fn on_sigusr1(_: nix::libc::c_int) {
    // Async-signal-safe: only flip the flag. The event loop picks it up
    // on its next turn.
    ACTIVATE_REQUESTED.store(true, Ordering::Relaxed);
}

/// Install the SIGUSR1 handler. Call once before entering the event
/// loop.
pub fn install_activate_handler() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_sigusr1),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe {
        signal::sigaction(Signal::SIGUSR1, &action)
            .map_err(|e| Error::Lock(format!("sigaction failed: {}", e)))?;
    }
    Ok(())
}

/// Consume a pending activate request, if any. Safe to call (and
/// ignore) while shutting down.
pub fn take_activate_request() -> bool {
    ACTIVATE_REQUESTED.swap(false, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_second_acquire_observes_contention() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("instance.lock");

        let first = match acquire(&path).unwrap() {
            Acquisition::Acquired(lock) => lock,
            Acquisition::AlreadyRunning => panic!("first acquire must win"),
        };

        // flock is per open file description, so a second open in the
        // same process contends just like another process would.
        assert!(matches!(
            acquire(&path).unwrap(),
            Acquisition::AlreadyRunning
        ));

        // The record is our own decimal pid.
        let recorded = std::fs::read_to_string(&path).unwrap();
        assert_eq!(recorded, std::process::id().to_string());

        first.release();
        assert!(!path.exists());

        // Released lock can be re-acquired.
        assert!(matches!(
            acquire(&path).unwrap(),
            Acquisition::Acquired(_)
        ));
    }

    #[test]
    fn test_signal_holder_reaches_this_process() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("instance.lock");
        std::fs::write(&path, std::process::id().to_string()).unwrap();

        install_activate_handler().unwrap();
        assert!(!take_activate_request());

        let pid = signal_holder(&path).unwrap();
        assert_eq!(pid as u32, std::process::id());

        // Delivery is asynchronous; poll briefly.
        let deadline = Instant::now() + Duration::from_secs(2);
        while !take_activate_request() {
            assert!(Instant::now() < deadline, "SIGUSR1 never arrived");
            std::thread::sleep(Duration::from_millis(10));
        }

        // Consumed: a second take sees nothing.
        assert!(!take_activate_request());
    }

    #[test]
    fn test_signal_holder_failure_paths() {
        let tmp = tempfile::tempdir().unwrap();

        // Missing lock file.
        let missing = tmp.path().join("nope.lock");
        assert!(matches!(
            signal_holder(&missing),
            Err(Error::SignalDelivery(_))
        ));

        // Garbage instead of a pid.
        let garbled = tmp.path().join("garbled.lock");
        std::fs::write(&garbled, "not-a-pid").unwrap();
        assert!(matches!(
            signal_holder(&garbled),
            Err(Error::SignalDelivery(_))
        ));
    }
}

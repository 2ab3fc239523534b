//! In-place binary replacement with bounded retry.

use std::{fs, io, path::Path, thread, time::Duration};

use tracing::warn;

use crate::{error::SwapError, platform};

/// Total attempts before the last error is surfaced.
const MAX_ATTEMPTS: u32 = 5;

/// First back-off delay; doubles after every failed attempt.
const FIRST_DELAY: Duration = Duration::from_secs(1);

/// Copies `source` over `destination` in place and marks the result executable.
///
/// The destination is opened write+truncate so its path and inode survive the
/// swap; a rename would break a destination that is still mapped as a running
/// executable image. The destination must already exist. Failures are retried
/// with exponential back-off (1s, 2s, 4s, 8s) because Windows keeps a
/// just-exited image briefly locked; the last error is surfaced when all
/// attempts fail.
pub fn swap_file(source: &Path, destination: &Path) -> Result<(), SwapError> {
    swap_with_schedule(source, destination, MAX_ATTEMPTS, FIRST_DELAY)
}

fn swap_with_schedule(
    source: &Path,
    destination: &Path,
    attempts: u32,
    first_delay: Duration,
) -> Result<(), SwapError> {
    let mut delay = first_delay;
    let mut attempt = 1;
    loop {
        match copy_over(source, destination) {
            Ok(()) => return Ok(()),
            Err(err) if attempt < attempts => {
                warn!(
                    "Swap attempt {attempt}/{attempts} failed, retrying in {delay:?}: {err}"
                );
                thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn copy_over(source: &Path, destination: &Path) -> Result<(), SwapError> {
    let mut reader = fs::File::open(source).map_err(|err| SwapError::Source {
        path: source.to_path_buf(),
        source: err,
    })?;

    let mut writer = fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(destination)
        .map_err(|err| SwapError::Destination {
            path: destination.to_path_buf(),
            source: err,
        })?;

    io::copy(&mut reader, &mut writer).map_err(|err| SwapError::Copy {
        from: source.to_path_buf(),
        to: destination.to_path_buf(),
        source: err,
    })?;

    platform::set_executable(destination).map_err(|err| SwapError::Permissions {
        path: destination.to_path_buf(),
        source: err,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn swap_replaces_content_in_place() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("staged");
        let destination = temp.path().join("current");
        fs::write(&source, b"new version").expect("write source");
        fs::write(&destination, b"old version, longer than the new one")
            .expect("write destination");

        swap_file(&source, &destination).expect("swap");

        assert_eq!(fs::read(&destination).expect("read back"), b"new version");
    }

    #[cfg(unix)]
    #[test]
    fn swap_preserves_destination_inode() {
        use std::os::unix::fs::MetadataExt;

        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("staged");
        let destination = temp.path().join("current");
        fs::write(&source, b"v2").expect("write source");
        fs::write(&destination, b"v1").expect("write destination");

        let inode_before = fs::metadata(&destination).expect("metadata").ino();
        swap_file(&source, &destination).expect("swap");
        let inode_after = fs::metadata(&destination).expect("metadata").ino();

        assert_eq!(inode_before, inode_after);
    }

    #[cfg(unix)]
    #[test]
    fn swap_marks_destination_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("staged");
        let destination = temp.path().join("current");
        fs::write(&source, b"#!/bin/sh\n").expect("write source");
        fs::write(&destination, b"#!/bin/sh\n# old\n").expect("write destination");

        swap_file(&source, &destination).expect("swap");

        let mode = fs::metadata(&destination).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o751);
    }

    #[test]
    fn swap_does_not_create_missing_destination() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("staged");
        let destination = temp.path().join("missing");
        fs::write(&source, b"v2").expect("write source");

        let err = swap_with_schedule(&source, &destination, 2, Duration::from_millis(5))
            .expect_err("swap should fail");

        assert!(matches!(err, SwapError::Destination { .. }));
        assert!(!destination.exists());
    }

    #[test]
    fn swap_retries_until_destination_appears() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("staged");
        let destination = temp.path().join("current");
        fs::write(&source, b"v2").expect("write source");

        let destination_clone = destination.clone();
        let unblocker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(25));
            fs::write(&destination_clone, b"v1").expect("write destination late");
        });

        let started = Instant::now();
        swap_with_schedule(&source, &destination, 5, Duration::from_millis(10))
            .expect("swap should eventually succeed");
        unblocker.join().expect("unblocker thread panicked");

        assert!(started.elapsed() >= Duration::from_millis(25));
        assert_eq!(fs::read(&destination).expect("read back"), b"v2");
    }
}

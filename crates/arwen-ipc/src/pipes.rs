//! Pipe plumbing between the node and the arwen child.
//!
//! The node allocates five pipes per child and hands the child one end of each
//! at fixed descriptor numbers:
//!
//! | fd | pipe        | child end |
//! |----|-------------|-----------|
//! | 3  | init        | read      |
//! | 4  | input       | read      |
//! | 5  | output      | write     |
//! | 6  | log profile | read      |
//! | 7  | log         | write     |
//!
//! ## Safety contracts
//!
//! 1. Every pipe is created close-on-exec, so a child only inherits what the
//!    `pre_exec` hook explicitly re-installs at 3..=7.
//! 2. The `pre_exec` hook runs between fork and exec: it only calls `fcntl` and
//!    `dup2` over a fixed-size array, both async-signal-safe, and allocates
//!    nothing.
//! 3. The child takes ownership of 3..=7 exactly once ([`ArwenEnds::take_inherited`]).

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::unix::pipe;
use tokio::process::Command;

pub const INIT_FD: RawFd = 3;
pub const INPUT_FD: RawFd = 4;
pub const OUTPUT_FD: RawFd = 5;
pub const LOG_PROFILE_FD: RawFd = 6;
pub const LOG_FD: RawFd = 7;

const CHILD_FDS: [RawFd; 5] = [INIT_FD, INPUT_FD, OUTPUT_FD, LOG_PROFILE_FD, LOG_FD];

/// Child ends are first copied above this, so the final `dup2` onto 3..=7 can
/// never clobber a source that happens to sit in that range.
const STAGING_FLOOR: RawFd = LOG_FD + 1;

struct Pipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl Pipe {
    fn new() -> io::Result<Self> {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        let (read, write) = nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)?;

        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let (read, write) = {
            let (read, write) = nix::unistd::pipe()?;
            set_cloexec(&read)?;
            set_cloexec(&write)?;
            (read, write)
        };

        Ok(Self { read, write })
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_cloexec(fd: &OwnedFd) -> io::Result<()> {
    // SAFETY: fd is a live descriptor owned by the caller.
    let rc = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// The five pipes of one child, before spawn.
pub(crate) struct PipeSet {
    init: Pipe,
    input: Pipe,
    output: Pipe,
    log_profile: Pipe,
    log: Pipe,
}

/// The node's ends, once the child has been spawned.
pub(crate) struct NodeEnds {
    pub init: pipe::Sender,
    pub input: pipe::Sender,
    pub output: pipe::Receiver,
    pub log_profile: pipe::Sender,
    pub log: pipe::Receiver,
}

impl PipeSet {
    pub(crate) fn new() -> io::Result<Self> {
        Ok(Self {
            init: Pipe::new()?,
            input: Pipe::new()?,
            output: Pipe::new()?,
            log_profile: Pipe::new()?,
            log: Pipe::new()?,
        })
    }

    fn child_ends(&self) -> [RawFd; 5] {
        [
            self.init.read.as_raw_fd(),
            self.input.read.as_raw_fd(),
            self.output.write.as_raw_fd(),
            self.log_profile.read.as_raw_fd(),
            self.log.write.as_raw_fd(),
        ]
    }

    /// Arranges for the spawned process to find its ends at fds 3..=7.
    ///
    /// `self` must outlive the `spawn` call.
    pub(crate) fn attach(&self, command: &mut Command) {
        let sources = self.child_ends();
        // SAFETY: see the module-level safety contracts; the closure captures
        // only plain integers.
        unsafe {
            command.pre_exec(move || install_child_fds(&sources));
        }
    }

    /// Closes the child ends in this process and wraps the node ends for tokio.
    /// Must run inside a tokio runtime.
    pub(crate) fn into_node_ends(self) -> io::Result<NodeEnds> {
        let PipeSet {
            init,
            input,
            output,
            log_profile,
            log,
        } = self;
        drop((init.read, input.read, output.write, log_profile.read, log.write));

        Ok(NodeEnds {
            init: sender(init.write)?,
            input: sender(input.write)?,
            output: receiver(output.read)?,
            log_profile: sender(log_profile.write)?,
            log: receiver(log.read)?,
        })
    }
}

fn install_child_fds(sources: &[RawFd; 5]) -> io::Result<()> {
    let mut staged: [RawFd; 5] = [-1; 5];
    for (slot, &fd) in staged.iter_mut().zip(sources) {
        // SAFETY: fd is open in the forked child; F_DUPFD_CLOEXEC is async-signal-safe.
        let copy = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, STAGING_FLOOR) };
        if copy < 0 {
            return Err(io::Error::last_os_error());
        }
        *slot = copy;
    }

    for (&target, &fd) in CHILD_FDS.iter().zip(&staged) {
        // SAFETY: both descriptors are valid; dup2 clears close-on-exec on target.
        if unsafe { libc::dup2(fd, target) } < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn sender(fd: OwnedFd) -> io::Result<pipe::Sender> {
    pipe::Sender::from_file(std::fs::File::from(fd))
}

fn receiver(fd: OwnedFd) -> io::Result<pipe::Receiver> {
    pipe::Receiver::from_file(std::fs::File::from(fd))
}

/// The child's ends, taken over from fds 3..=7.
pub(crate) struct ArwenEnds {
    pub init: pipe::Receiver,
    pub input: pipe::Receiver,
    pub output: pipe::Sender,
    pub log_profile: pipe::Receiver,
    pub log: pipe::Sender,
}

impl ArwenEnds {
    /// Claims the inherited descriptors. Succeeds at most once per process.
    /// Must run inside a tokio runtime.
    pub(crate) fn take_inherited() -> io::Result<Self> {
        static TAKEN: AtomicBool = AtomicBool::new(false);
        if TAKEN.swap(true, Ordering::SeqCst) {
            return Err(io::Error::other("inherited pipes already taken"));
        }

        Ok(Self {
            init: receiver(inherited(INIT_FD)?)?,
            input: receiver(inherited(INPUT_FD)?)?,
            output: sender(inherited(OUTPUT_FD)?)?,
            log_profile: receiver(inherited(LOG_PROFILE_FD)?)?,
            log: sender(inherited(LOG_FD)?)?,
        })
    }
}

fn inherited(fd: RawFd) -> io::Result<OwnedFd> {
    // SAFETY: F_GETFD only inspects the descriptor table.
    if unsafe { libc::fcntl(fd, libc::F_GETFD) } == -1 {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("fd {fd} was not inherited; arwen must be started by the node"),
        ));
    }
    // SAFETY: fd is open (checked above) and guarded by TAKEN, so nothing else in
    // this process owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

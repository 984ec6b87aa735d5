// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::ffi::CString;
use std::os::fd::AsRawFd;
use std::path::Path;

use anyhow::{bail, Context};
use nix::libc;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{chdir, execvp, ForkResult, Pid};
use tokio::io::unix::AsyncFd;

use super::nbio::{read_chunk, set_nonblocking, write_all, PtyFd};

/// How a child process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// A native PTY spawned via `forkpty`, driving exactly one agent child.
pub struct PtySession {
    master: AsyncFd<PtyFd>,
    child_pid: Pid,
}

impl PtySession {
    /// Fork and exec `command[0]` with `command[1..]` as arguments, with
    /// `cwd` as the child's working directory and a PTY of the given size.
    ///
    /// `command` must be non-empty.
    // forkpty leaves the child partially initialized until the exec below;
    // this is the one place in the worker that needs `unsafe`.
    #[allow(unsafe_code)]
    pub fn spawn(command: &[String], cwd: &Path, cols: u16, rows: u16) -> anyhow::Result<Self> {
        anyhow::ensure!(!command.is_empty(), "command must have at least one element");
        let winsize = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };

        // SAFETY: forkpty's child-side contract requires avoiding anything
        // beyond async-signal-safe calls before exec; chdir/setenv/execvp
        // below satisfy that.
        let ForkptyResult { master, fork_result } =
            unsafe { forkpty(&winsize, None) }.context("forkpty failed")?;

        match fork_result {
            ForkResult::Child => {
                let _ = chdir(cwd);
                std::env::set_var("TERM", "xterm-256color");

                let c_args: Vec<CString> = command
                    .iter()
                    .map(|s| CString::new(s.as_bytes()))
                    .collect::<Result<_, _>>()
                    .context("invalid command argument")?;

                let _ = execvp(&c_args[0], &c_args);
                // execvp only returns on failure.
                std::process::exit(127);
            }
            ForkResult::Parent { child } => {
                set_nonblocking(&master)?;
                let afd = AsyncFd::new(PtyFd(master)).context("AsyncFd::new failed")?;
                Ok(Self { master: afd, child_pid: child })
            }
        }
    }

    pub fn child_pid(&self) -> u32 {
        self.child_pid.as_raw() as u32
    }

    /// Read one chunk of output from the PTY master. Returns `Ok(0)` at EOF.
    pub async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        match read_chunk(&self.master, buf).await {
            Ok(n) => Ok(n),
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub async fn write(&self, data: &[u8]) -> std::io::Result<()> {
        write_all(&self.master, data).await
    }

    // TIOCSWINSZ is a well-understood ioctl on a valid PTY fd.
    #[allow(unsafe_code)]
    pub fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        let ws = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };
        // SAFETY: `ws` is a fully initialized Winsize and the fd is the PTY
        // master we own.
        let ret = unsafe { libc::ioctl(self.master.as_raw_fd(), libc::TIOCSWINSZ, &ws) };
        if ret < 0 {
            bail!("TIOCSWINSZ ioctl failed: {}", std::io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn signal(&self, signal: Signal) -> anyhow::Result<()> {
        kill(self.child_pid, signal).context("kill failed")
    }

    /// Block (on the calling thread) until the child exits. Intended to be
    /// run via `spawn_blocking`.
    pub fn wait_blocking(&self) -> anyhow::Result<ExitStatus> {
        wait_for_exit(self.child_pid)
    }

    /// Non-blocking poll for whether the child has already exited.
    pub fn try_wait(&self) -> anyhow::Result<Option<ExitStatus>> {
        match waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => Ok(Some(ExitStatus { code: Some(code), signal: None })),
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                Ok(Some(ExitStatus { code: None, signal: Some(sig as i32) }))
            }
            Ok(_) => Ok(None),
            Err(nix::errno::Errno::ECHILD) => Ok(None),
            Err(e) => bail!("waitpid failed: {e}"),
        }
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        let _ = kill(self.child_pid, Signal::SIGHUP);
        let _ = waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG));
    }
}

fn wait_for_exit(pid: Pid) -> anyhow::Result<ExitStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(ExitStatus { code: Some(code), signal: None }),
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                return Ok(ExitStatus { code: None, signal: Some(sig as i32) })
            }
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => bail!("waitpid failed: {e}"),
        }
    }
}

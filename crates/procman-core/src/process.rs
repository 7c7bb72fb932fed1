//! OS seam for job children: spawn into a fresh process group with stdout
//! piped, terminate with SIGTERM to the whole group.

use std::io;
use std::process::Stdio;

use libc::{killpg, setsid, SIGTERM};
use tokio::process::{Child, ChildStdout, Command};

pub(crate) struct Spawned {
    pub child: Child,
    pub pgid: libc::pid_t,
    pub stdout: ChildStdout,
}

pub(crate) fn spawn(argv: &[&str]) -> io::Result<Spawned> {
    let mut cmd = Command::new(argv[0]);
    if argv.len() > 1 {
        cmd.args(&argv[1..]);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    // The child leads its own session so signals reach the whole group.
    #[allow(unsafe_code)]
    unsafe {
        cmd.pre_exec(|| {
            if setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut child = cmd.spawn()?;

    let pid = child
        .id()
        .ok_or_else(|| io::Error::other("spawned process has no pid"))?;
    let pgid = libc::pid_t::try_from(pid).map_err(|_| io::Error::other("pid out of range"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout not piped"))?;

    Ok(Spawned { child, pgid, stdout })
}

/// Sends SIGTERM to the child's process group. The caller still has to reap.
pub(crate) fn terminate(pgid: libc::pid_t) -> io::Result<()> {
    #[allow(unsafe_code)]
    unsafe {
        if killpg(pgid, SIGTERM) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

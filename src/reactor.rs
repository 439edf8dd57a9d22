use crate::{
    ipc::{Accepted, Command, ControlServer},
    switcher::Flow,
    wayland::Daemon,
};
use anyhow::{Context, bail};
use log::{error, info};
use std::{
    io,
    os::fd::{AsRawFd, RawFd},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use wayland_client::{Connection, EventQueue, backend::WaylandError};

const POLL_TIMEOUT_MS: libc::c_int = 100;
const WAYLAND_FAILURE: libc::c_short = libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;

/// Single-threaded event loop multiplexing the compositor connection and the
/// control socket.
pub struct Reactor {
    connection: Connection,
    event_queue: EventQueue<Daemon>,
    server: ControlServer,
    quit: Arc<AtomicBool>,
}

impl Reactor {
    pub fn new(
        connection: Connection,
        event_queue: EventQueue<Daemon>,
        server: ControlServer,
        quit: Arc<AtomicBool>,
    ) -> Self {
        Self {
            connection,
            event_queue,
            server,
            quit,
        }
    }

    /// Runs until a QUIT command or signal. Errors are fatal protocol failures.
    pub fn run(&mut self, daemon: &mut Daemon) -> anyhow::Result<()> {
        info!("Daemon started (PID: {})", std::process::id());

        while !self.quit.load(Ordering::Relaxed) {
            self.dispatch_pending(daemon)?;

            // Every prepared read is either consumed or dropped, which cancels it.
            let Some(guard) = self.event_queue.prepare_read() else {
                continue;
            };

            match self.connection.flush() {
                Ok(()) => {}
                Err(WaylandError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e).context("failed to flush Wayland connection"),
            }

            let wayland_fd = guard.connection_fd().as_raw_fd();
            let (wayland_events, control_events) =
                match poll(wayland_fd, self.server.fd(), POLL_TIMEOUT_MS) {
                    Ok(revents) => revents,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                        drop(guard);
                        continue;
                    }
                    Err(e) => return Err(e).context("poll failed"),
                };

            if wayland_events & WAYLAND_FAILURE != 0 {
                drop(guard);
                bail!("Wayland connection terminated (compositor exited)");
            }

            if wayland_events & libc::POLLIN != 0 {
                match guard.read() {
                    Ok(_) => {}
                    Err(WaylandError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e).context("failed to read Wayland events"),
                }
                self.dispatch_pending(daemon)?;
            } else {
                drop(guard);
            }

            daemon.refresh_if_stale();

            if control_events & libc::POLLIN != 0
                && drain_commands(&self.server, |command| daemon.handle_command(command))
                    == Flow::Quit
            {
                info!("Quit requested");
                self.quit.store(true, Ordering::Relaxed);
            }
        }

        info!("Shutting down");
        Ok(())
    }

    fn dispatch_pending(&mut self, daemon: &mut Daemon) -> anyhow::Result<()> {
        daemon
            .backend
            .dispatch_pending()
            .context("backend dispatch failed")?;
        self.event_queue
            .dispatch_pending(daemon)
            .context("Wayland dispatch failed")?;
        Ok(())
    }
}

/// Accepts every pending connection and applies its command. Returns
/// `Flow::Quit` if any command asked the daemon to stop.
fn drain_commands(server: &ControlServer, mut apply: impl FnMut(Command) -> Flow) -> Flow {
    let mut flow = Flow::Continue;
    loop {
        match server.accept_command() {
            Ok(Accepted::Command(command)) => {
                if apply(command) == Flow::Quit {
                    flow = Flow::Quit;
                }
            }
            Ok(Accepted::Ignored) => {}
            Ok(Accepted::Drained) => break,
            Err(e) => {
                error!("Accept error: {e}");
                break;
            }
        }
    }
    flow
}

/// Waits for either descriptor and returns their `revents`.
fn poll(wayland_fd: RawFd, control_fd: RawFd, timeout_ms: libc::c_int) -> io::Result<(i16, i16)> {
    let mut fds = [
        libc::pollfd {
            fd: wayland_fd,
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: control_fd,
            events: libc::POLLIN,
            revents: 0,
        },
    ];

    // SAFETY: `fds` is a valid array of initialized pollfd structs for the
    // duration of the call.
    let n = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((fds[0].revents, fds[1].revents))
}

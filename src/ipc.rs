//! Control socket for CLI → daemon communication.
//!
//! Uses a Unix stream socket at `/tmp/wswitch.sock`. Each client connects,
//! writes a single newline-terminated token and disconnects; the daemon never
//! replies.
//!
//! Tokens: `NEXT`, `PREV`, `SELECT`, `TOGGLE`, `HIDE`, `QUIT`.

use std::{
    fs,
    io::{self, Read, Write},
    os::{
        fd::{AsRawFd, RawFd},
        unix::net::{UnixListener, UnixStream},
    },
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

pub const SOCKET_PATH: &str = "/tmp/wswitch.sock";

const READ_BUFFER_SIZE: usize = 256;
const READ_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("daemon is already running on {0:?}")]
    AlreadyRunning(PathBuf),

    #[error("control socket {0:?}: {1}")]
    Io(PathBuf, io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Command {
    /// Show the switcher or move to the next window
    Next,
    /// Show the switcher or move to the previous window
    Prev,
    /// Switch to the highlighted window
    Select,
    /// Show or hide the switcher
    Toggle,
    /// Hide the switcher without switching
    Hide,
    /// Stop the daemon
    Quit,
}

impl Command {
    pub fn to_wire(self) -> &'static str {
        match self {
            Command::Next => "NEXT",
            Command::Prev => "PREV",
            Command::Select => "SELECT",
            Command::Toggle => "TOGGLE",
            Command::Hide => "HIDE",
            Command::Quit => "QUIT",
        }
    }

    /// Parses one received message; the trailing newline is optional.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim() {
            "NEXT" => Some(Command::Next),
            "PREV" => Some(Command::Prev),
            "SELECT" => Some(Command::Select),
            "TOGGLE" => Some(Command::Toggle),
            "HIDE" => Some(Command::Hide),
            "QUIT" => Some(Command::Quit),
            _ => None,
        }
    }
}

pub fn socket_path() -> PathBuf {
    PathBuf::from(SOCKET_PATH)
}

/// Returns whether something is accepting connections on `path`.
pub fn is_daemon_running(path: &Path) -> bool {
    UnixStream::connect(path).is_ok()
}

pub fn send_command(path: &Path, command: Command) -> io::Result<()> {
    let mut stream = UnixStream::connect(path)?;
    stream.write_all(command.to_wire().as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()
}

pub enum Accepted {
    Command(Command),
    /// The client sent nothing usable.
    Ignored,
    /// No more pending connections.
    Drained,
}

/// Listening side of the control socket. Removes the socket file on drop.
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    pub fn bind(path: &Path) -> Result<Self, IpcError> {
        if is_daemon_running(path) {
            return Err(IpcError::AlreadyRunning(path.to_path_buf()));
        }

        // Nobody answered, so any leftover file is stale.
        match fs::remove_file(path) {
            Ok(()) => log::debug!("Removed stale socket {path:?}"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(IpcError::Io(path.to_path_buf(), e)),
        }

        let listener =
            UnixListener::bind(path).map_err(|e| IpcError::Io(path.to_path_buf(), e))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| IpcError::Io(path.to_path_buf(), e))?;

        log::info!("Listening for commands on {path:?}");

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    /// Accepts one pending connection and reads its single command.
    pub fn accept_command(&self) -> io::Result<Accepted> {
        let mut stream = match self.listener.accept() {
            Ok((stream, _)) => stream,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Accepted::Drained),
            Err(e) => return Err(e),
        };

        // Accepted sockets are blocking; bound the wait on clients that never write.
        if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
            log::debug!("Failed to set control client timeout: {e}");
            return Ok(Accepted::Ignored);
        }
        let mut buffer = [0u8; READ_BUFFER_SIZE - 1];
        let n = match stream.read(&mut buffer) {
            Ok(n) => n,
            Err(e) => {
                log::debug!("Failed to read from control client: {e}");
                return Ok(Accepted::Ignored);
            }
        };

        let message = String::from_utf8_lossy(&buffer[..n]);
        match Command::from_wire(&message) {
            Some(command) => {
                log::debug!("Received command: {}", command.to_wire());
                Ok(Accepted::Command(command))
            }
            None => {
                if n > 0 {
                    log::debug!("Ignoring unrecognized command: {:?}", message.trim());
                }
                Ok(Accepted::Ignored)
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
        log::debug!("Control socket {:?} removed", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Command; 6] = [
        Command::Next,
        Command::Prev,
        Command::Select,
        Command::Toggle,
        Command::Hide,
        Command::Quit,
    ];

    #[test]
    fn wire_tokens_are_uppercase() {
        let tokens: Vec<_> = ALL.iter().map(|c| c.to_wire()).collect();
        assert_eq!(tokens, ["NEXT", "PREV", "SELECT", "TOGGLE", "HIDE", "QUIT"]);
    }

    #[test]
    fn from_wire_strips_newline() {
        assert_eq!(Command::from_wire("TOGGLE\n"), Some(Command::Toggle));
        assert_eq!(Command::from_wire("QUIT"), Some(Command::Quit));
    }

    #[test]
    fn from_wire_rejects_garbage() {
        assert_eq!(Command::from_wire(""), None);
        assert_eq!(Command::from_wire("next"), None);
        assert_eq!(Command::from_wire("NEXT PREV"), None);
        assert_eq!(Command::from_wire("\u{fffd}\u{fffd}"), None);
    }

    fn accept_blocking(server: &ControlServer) -> Accepted {
        for _ in 0..200 {
            match server.accept_command().unwrap() {
                Accepted::Drained => std::thread::sleep(std::time::Duration::from_millis(5)),
                other => return other,
            }
        }
        panic!("no connection arrived");
    }

    #[test]
    fn server_receives_commands_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wswitch.sock");
        let server = ControlServer::bind(&path).unwrap();

        assert!(matches!(server.accept_command().unwrap(), Accepted::Drained));

        send_command(&path, Command::Next).unwrap();
        send_command(&path, Command::Select).unwrap();
        assert!(matches!(
            accept_blocking(&server),
            Accepted::Command(Command::Next)
        ));
        assert!(matches!(
            accept_blocking(&server),
            Accepted::Command(Command::Select)
        ));
        assert!(matches!(server.accept_command().unwrap(), Accepted::Drained));
    }

    #[test]
    fn garbage_and_empty_connections_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wswitch.sock");
        let server = ControlServer::bind(&path).unwrap();

        {
            let mut stream = UnixStream::connect(&path).unwrap();
            stream.write_all(&[0xde, 0xad, 0xbe, 0xef, b'\n']).unwrap();
        }
        drop(UnixStream::connect(&path).unwrap());

        assert!(matches!(accept_blocking(&server), Accepted::Ignored));
        assert!(matches!(accept_blocking(&server), Accepted::Ignored));
    }

    #[test]
    fn second_server_on_live_socket_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wswitch.sock");
        let _server = ControlServer::bind(&path).unwrap();

        assert!(is_daemon_running(&path));
        assert!(matches!(
            ControlServer::bind(&path),
            Err(IpcError::AlreadyRunning(_))
        ));
    }

    #[test]
    fn stale_socket_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wswitch.sock");
        drop(UnixListener::bind(&path).unwrap());
        assert!(path.exists());
        assert!(!is_daemon_running(&path));

        let server = ControlServer::bind(&path).unwrap();
        assert!(is_daemon_running(&path));
        drop(server);
        assert!(!path.exists());
    }

    #[test]
    fn sending_without_daemon_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wswitch.sock");
        let started = std::time::Instant::now();
        assert!(!is_daemon_running(&path));
        assert!(send_command(&path, Command::Toggle).is_err());
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }
}

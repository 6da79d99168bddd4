//! Unix domain socket plumbing.
//!
//! One connection carries exactly one request frame and one reply frame.
//! Listeners are bound at a filesystem path; a stale socket file left by a
//! crashed process is replaced, anything else at that path is an error.

use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::Path;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

use crate::core::codec::PacketCodec;
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};

/// A framed socket connection.
pub type Connection = Framed<UnixStream, PacketCodec>;

/// Bind a listener at `path`.
///
/// Missing parent directories are created owner-only; a stale socket file
/// at `path` is removed first.
#[instrument(skip(path), fields(socket_path = %path.display()))]
pub fn bind(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }
    remove_stale_socket(path)?;

    let listener = UnixListener::bind(path)?;
    info!("Listening on unix socket");
    Ok(listener)
}

/// Remove the socket file at `path`, if one is there.
#[instrument(skip(path), fields(socket_path = %path.display()))]
pub fn unbind(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!("Removed socket file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(error = %e, "Failed to remove socket file");
            Err(e.into())
        }
    }
}

/// Connect to the socket at `path`.
///
/// A connect that does not finish within `timeout` fails with
/// `io::ErrorKind::TimedOut`, so callers can retry it like any other
/// connection-level failure.
pub async fn connect(path: &Path, timeout: Duration) -> Result<Connection> {
    let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
    Ok(framed(stream))
}

/// Wrap an accepted stream in the packet codec.
pub fn framed(stream: UnixStream) -> Connection {
    Framed::new(stream, PacketCodec)
}

/// Write one frame and flush it.
pub async fn send_frame(conn: &mut Connection, payload: Vec<u8>) -> Result<()> {
    conn.send(Packet::new(payload)).await
}

/// Read one frame. `Ok(None)` means the peer closed the connection first.
pub async fn recv_frame(conn: &mut Connection) -> Result<Option<Vec<u8>>> {
    match conn.next().await {
        Some(Ok(packet)) => Ok(Some(packet.payload)),
        Some(Err(e)) => Err(e),
        None => Ok(None),
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || path.exists() {
        return Ok(());
    }

    std::fs::create_dir_all(path).map_err(|e| {
        ProtocolError::Io(io::Error::new(
            e.kind(),
            format!("failed to create directory {}: {e}", path.display()),
        ))
    })?;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).map_err(|e| {
        ProtocolError::Io(io::Error::new(
            e.kind(),
            format!("failed to set permissions on {}: {e}", path.display()),
        ))
    })?;

    debug!(path = %path.display(), "Created socket directory");
    Ok(())
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if !metadata.file_type().is_socket() {
        return Err(ProtocolError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("path {} exists but is not a socket", path.display()),
        )));
    }

    std::fs::remove_file(path)?;
    debug!(path = %path.display(), "Removed stale socket file");
    Ok(())
}

// # Liveness Notification
//
// Best-effort readiness reporting to a process supervisor.
//
// The daemon tells its supervisor when it is ready, when a reload begins and
// when it is stopping. Nothing here may fail the caller: an absent or
// unreachable supervisor is logged at debug level and otherwise ignored.

use async_trait::async_trait;
use tracing::debug;

/// Lifecycle states reported to the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    /// Initialization finished, or a reload completed
    Ready,
    /// A reload began at the given CLOCK_MONOTONIC time, in microseconds
    Reloading { monotonic_usec: u64 },
    /// Shutting down
    Stopping,
}

impl LivenessState {
    /// A reloading state stamped with the current monotonic time
    pub fn reloading_now() -> Self {
        LivenessState::Reloading {
            monotonic_usec: monotonic_usec(),
        }
    }

    /// sd_notify(3) wire form
    pub fn as_notify_message(&self) -> String {
        match self {
            LivenessState::Ready => "READY=1".to_string(),
            LivenessState::Reloading { monotonic_usec } => {
                format!("RELOADING=1\nMONOTONIC_USEC={}", monotonic_usec)
            }
            LivenessState::Stopping => "STOPPING=1".to_string(),
        }
    }
}

/// Receiver of lifecycle notifications
#[async_trait]
pub trait Liveness: Send + Sync {
    /// Report a state change; never fails
    async fn notify(&self, state: LivenessState);
}

/// Liveness sink that discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLiveness;

#[async_trait]
impl Liveness for NoLiveness {
    async fn notify(&self, state: LivenessState) {
        debug!("No supervisor, not reporting {:?}", state);
    }
}

/// Notifies systemd through the datagram socket named by `$NOTIFY_SOCKET`
#[derive(Debug, Clone)]
pub struct SystemdNotify {
    socket_path: String,
}

impl SystemdNotify {
    /// Environment variable naming the notify socket
    pub const ENV: &'static str = "NOTIFY_SOCKET";

    /// Notifier for an explicit socket path
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Notifier from `$NOTIFY_SOCKET`, if set
    pub fn from_env() -> Option<Self> {
        std::env::var(Self::ENV)
            .ok()
            .filter(|path| !path.is_empty())
            .map(Self::new)
    }

    /// Socket path this notifier writes to
    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    #[cfg(unix)]
    async fn send(&self, message: &str) -> std::io::Result<()> {
        use tokio::net::UnixDatagram;

        let socket = UnixDatagram::unbound()?;
        if let Some(abstract_name) = self.socket_path.strip_prefix('@') {
            #[cfg(target_os = "linux")]
            {
                use std::os::linux::net::SocketAddrExt;
                let addr = std::os::unix::net::SocketAddr::from_abstract_name(abstract_name)?;
                let std_socket = socket.into_std()?;
                std_socket.send_to_addr(message.as_bytes(), &addr)?;
                return Ok(());
            }
            #[cfg(not(target_os = "linux"))]
            {
                let _ = abstract_name;
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "abstract notify sockets are Linux-only",
                ));
            }
        }
        socket.send_to(message.as_bytes(), &self.socket_path).await?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn send(&self, _message: &str) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "notify sockets need a unix platform",
        ))
    }
}

#[async_trait]
impl Liveness for SystemdNotify {
    async fn notify(&self, state: LivenessState) {
        let message = state.as_notify_message();
        if let Err(e) = self.send(&message).await {
            debug!(
                "Failed to notify supervisor at {}: {}",
                self.socket_path, e
            );
        }
    }
}

/// Pick the supervisor notifier for this process
pub fn from_env() -> Box<dyn Liveness> {
    match SystemdNotify::from_env() {
        Some(notify) => {
            debug!("Reporting liveness to {}", notify.socket_path());
            Box::new(notify)
        }
        None => Box::new(NoLiveness),
    }
}

/// Current CLOCK_MONOTONIC time in microseconds
#[cfg(unix)]
pub fn monotonic_usec() -> u64 {
    // SAFETY: timespec is plain old data; clock_gettime fills it in
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if rc != 0 {
        return 0;
    }
    (ts.tv_sec as u64) * 1_000_000 + (ts.tv_nsec as u64) / 1_000
}

#[cfg(not(unix))]
pub fn monotonic_usec() -> u64 {
    0
}

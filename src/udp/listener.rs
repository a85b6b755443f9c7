use crate::destinations::DestinationRouter;
use crate::events::{EventParseError, LogEvent, UserEvent};
use crate::queue::UdpQueueHandler;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Receive buffer large enough for any UDP payload.
const RECV_BUFFER_SIZE: usize = 65535;

/// Which event stream a socket carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    UserEvents,
    LogEvents,
}

/// Parses admitted datagrams and fans the resulting points out to the
/// destination buffers. Runs inside the queue handler's worker pool.
pub struct EventDispatch {
    router: Arc<DestinationRouter>,
}

impl EventDispatch {
    pub fn new(router: Arc<DestinationRouter>) -> Self {
        Self { router }
    }

    pub async fn handle_user_event(
        &self,
        message: Vec<u8>,
        remote: SocketAddr,
    ) -> Result<(), EventParseError> {
        let event = UserEvent::parse(&message)?;
        debug!(
            remote = %remote,
            user = %event.user_id,
            command = %event.command,
            "User event received"
        );
        self.router.write_point(&event.to_point());
        Ok(())
    }

    pub async fn handle_log_event(
        &self,
        message: Vec<u8>,
        remote: SocketAddr,
    ) -> Result<(), EventParseError> {
        let event = LogEvent::parse(&message)?;
        debug!(
            remote = %remote,
            level = %event.level,
            subsystem = %event.subsystem,
            "Log event received"
        );
        self.router.write_point(&event.to_point());
        Ok(())
    }
}

/// Receive loop for one UDP socket.
///
/// Every datagram goes through the queue handler's admission checks; the
/// handler closure routes it by stream kind. The loop only stops on
/// cancellation, never on a receive or handler error.
pub async fn run_listener(
    kind: ListenerKind,
    listen: String,
    queue: UdpQueueHandler,
    dispatch: Arc<EventDispatch>,
    cancel: CancellationToken,
) -> Result<(), std::io::Error> {
    let socket = UdpSocket::bind(&listen).await?;
    info!(
        addr = %socket.local_addr()?,
        queue = queue.name(),
        "UDP listener bound"
    );

    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(queue = queue.name(), "UDP listener shutting down");
                break;
            }

            result = socket.recv_from(&mut buffer) => {
                match result {
                    Ok((len, remote)) => {
                        let message = buffer[..len].to_vec();
                        let dispatch = Arc::clone(&dispatch);
                        match kind {
                            ListenerKind::UserEvents => {
                                queue.add_message(message, remote, move |m, r| async move {
                                    dispatch.handle_user_event(m, r).await
                                });
                            }
                            ListenerKind::LogEvents => {
                                queue.add_message(message, remote, move |m, r| async move {
                                    dispatch.handle_log_event(m, r).await
                                });
                            }
                        }
                    }
                    Err(e) => {
                        error!(queue = queue.name(), error = %e, "UDP receive error");
                    }
                }
            }
        }
    }

    Ok(())
}

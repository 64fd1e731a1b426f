//! OSC listener thread
//!
//! Binds a UDP port and runs a blocking receive loop on a dedicated thread.
//! Every datagram is truncated to [`MAX_FRAME_BYTES`], tagged with its sender
//! and pushed onto the transfer queue. Decoding happens later, on the control
//! thread.
//!
//! # Lifecycle
//!
//! ```text
//! start(port) ─► bind ─► spawn "osc-listen-<port>" ─► recv_from loop ─► enqueue
//! stop()      ─► set shutdown flag ─► wake datagram ─► join ─► drain queue
//! ```
//!
//! The thread owns the [`FrameProducer`] while it runs and hands it back when
//! joined, so the same queue is reused across listen sessions. `stop()` always
//! joins before draining: once the join returns no further frame can be
//! enqueued, and the drain then guarantees nothing from the old session leaks
//! into the next one.

use crate::error::ListenerError;
use crate::frame::{Frame, MAX_FRAME_BYTES};
use crate::queue::{frame_queue, FrameConsumer, FrameProducer};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Fallback wake-up interval if the wake datagram is lost
const RECEIVE_TIMEOUT: Duration = Duration::from_millis(50);

/// Large enough for any sane datagram so truncation can be detected and logged
const RECEIVE_BUFFER_BYTES: usize = 1536;

/// Running receive thread plus what is needed to break and join it
struct ListenSession {
    shutdown: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    waker: UdpSocket,
    wake_addr: SocketAddr,
    handle: thread::JoinHandle<FrameProducer>,
}

/// Inbound OSC endpoint plus the control-thread side of the transfer queue
pub struct OscListener {
    consumer: FrameConsumer,
    /// Parked here between sessions; moved into the thread while listening
    producer: Option<FrameProducer>,
    session: Option<ListenSession>,
    /// Bound port, 0 when not listening
    port: u16,
}

impl Default for OscListener {
    fn default() -> Self {
        Self::new()
    }
}

impl OscListener {
    pub fn new() -> Self {
        let (producer, consumer) = frame_queue();
        Self {
            consumer,
            producer: Some(producer),
            session: None,
            port: 0,
        }
    }

    /// Start listening on `port` (0 picks an ephemeral port)
    ///
    /// An existing session is stopped first. On failure the listener is left
    /// in the "not listening" state with port 0. Returns the bound port.
    pub fn start(&mut self, port: u16) -> Result<u16, ListenerError> {
        if self.session.is_some() {
            log::debug!("[OSC {}] Restarting listener on port {}", self.port, port);
            self.stop();
        }
        self.port = 0;

        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
            .map_err(|source| ListenerError::Bind { port, source })?;
        socket
            .set_read_timeout(Some(RECEIVE_TIMEOUT))
            .map_err(ListenerError::Socket)?;
        let bound_port = socket.local_addr().map_err(ListenerError::Socket)?.port();
        let waker = socket.try_clone().map_err(ListenerError::Socket)?;

        // A previous thread may have panicked and taken the producer with it
        let producer = match self.producer.take() {
            Some(producer) => producer,
            None => {
                let (producer, consumer) = frame_queue();
                self.consumer = consumer;
                producer
            }
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let thread_shutdown = shutdown.clone();
        let thread_alive = alive.clone();

        let handle = thread::Builder::new()
            .name(format!("osc-listen-{}", bound_port))
            .spawn(move || {
                let producer = receive_loop(socket, producer, &thread_shutdown, bound_port);
                thread_alive.store(false, Ordering::Release);
                producer
            })
            .map_err(ListenerError::Spawn)?;

        log::info!("[OSC {}] Listening for remote commands", bound_port);

        self.session = Some(ListenSession {
            shutdown,
            alive,
            waker,
            wake_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, bound_port)),
            handle,
        });
        self.port = bound_port;
        Ok(bound_port)
    }

    /// Stop listening: break the receive call, join the thread, drain the queue
    ///
    /// Safe to call when not listening. Returns the number of stale frames
    /// discarded.
    pub fn stop(&mut self) -> usize {
        if let Some(session) = self.session.take() {
            session.shutdown.store(true, Ordering::Release);
            // Best effort: the receive timeout covers a lost wake datagram
            if let Err(e) = session.waker.send_to(&[], session.wake_addr) {
                log::debug!("[OSC {}] Wake datagram failed: {}", self.port, e);
            }

            log::debug!("[OSC {}] Waiting for listener thread to stop...", self.port);
            match session.handle.join() {
                Ok(producer) => self.producer = Some(producer),
                Err(_) => log::error!("[OSC {}] Listener thread panicked", self.port),
            }
        }

        let discarded = self.consumer.discard_pending();
        if discarded > 0 {
            log::debug!("[OSC {}] Discarded {} stale frame(s)", self.port, discarded);
        }
        self.port = 0;
        discarded
    }

    /// Whether a listen session is active
    pub fn is_listening(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the receive thread is still running (false after a socket error)
    pub fn is_alive(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.alive.load(Ordering::Acquire))
    }

    /// Bound port, or 0 when not listening
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Take the next pending frame (non-blocking, control thread only)
    pub fn try_dequeue(&mut self) -> Option<Frame> {
        self.consumer.try_dequeue()
    }

    /// Frames waiting for the control loop
    pub fn pending(&self) -> usize {
        self.consumer.pending()
    }

    /// Frames dropped because the control loop fell behind
    pub fn dropped_frames(&self) -> u64 {
        self.consumer.dropped_frames()
    }
}

impl Drop for OscListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Receive loop running on the listener thread
///
/// Returns the producer so the queue outlives the session.
fn receive_loop(
    socket: UdpSocket,
    mut producer: FrameProducer,
    shutdown: &AtomicBool,
    port: u16,
) -> FrameProducer {
    log::debug!("[OSC {}] Listener thread started", port);

    let mut buf = [0u8; RECEIVE_BUFFER_BYTES];

    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        match socket.recv_from(&mut buf) {
            Ok((n, origin)) => {
                // Anything arriving after the break request belongs to no session
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                if n == 0 {
                    continue;
                }
                if n > MAX_FRAME_BYTES {
                    log::debug!(
                        "[OSC {}] Truncating {} byte datagram from {} to {}",
                        port,
                        n,
                        origin,
                        MAX_FRAME_BYTES
                    );
                }
                if !producer.enqueue(Frame::new(&buf[..n], origin)) {
                    log::warn!(
                        "[OSC {}] Transfer queue full, dropping frame from {}",
                        port,
                        origin
                    );
                }
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) => {}
            // ICMP port-unreachable echoes show up here on some platforms
            Err(ref e) if e.kind() == ErrorKind::ConnectionReset => {}
            Err(e) => {
                log::error!("[OSC {}] Receive error: {}", port, e);
                break;
            }
        }
    }

    log::debug!("[OSC {}] Listener thread stopped", port);
    producer
}

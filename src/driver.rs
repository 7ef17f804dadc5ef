//! Event-loop driver: one UDP peer, one engine connection, stdio streams.
//!
//! The loop mirrors the engine's entry points onto real event sources:
//! stdin activity → `read`, inbound datagrams → `receive`, a periodic
//! interval → `tick`; `output` and `read` are pumped after every event
//! because stdout is always writable and an ACK may have opened the window.
//! The process ends when the connection destroys itself.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::Notify;

use ctcp::{Config, Conn, Input, Registry};

use crate::socket::{Socket, MAX_DATAGRAM};

/// Sink capacity advertised for stdout: effectively unbounded.
const STDOUT_BUFSPACE: usize = 1 << 20;

/// Chunk size for the stdin reader task.
const STDIN_CHUNK: usize = 4096;

// ---------------------------------------------------------------------------
// UdpConn — the engine's collaborator
// ---------------------------------------------------------------------------

/// Bridges the engine to the UDP socket, stdin, stdout, and the clock.
struct UdpConn {
    socket: Arc<Socket>,
    stdin_rx: mpsc::Receiver<Vec<u8>>,
    /// Bytes pulled off the channel but not yet consumed by the engine.
    pending: Vec<u8>,
    stdin_eof: bool,
    stdout: io::Stdout,
    start: Instant,
}

impl UdpConn {
    fn new(socket: Arc<Socket>, stdin_rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            socket,
            stdin_rx,
            pending: Vec::new(),
            stdin_eof: false,
            stdout: io::stdout(),
            start: Instant::now(),
        }
    }
}

impl Conn for UdpConn {
    fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        self.socket.try_send(frame)
    }

    fn input(&mut self, buf: &mut [u8]) -> Input {
        // Top up from the reader task before serving.
        loop {
            match self.stdin_rx.try_recv() {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.stdin_eof = true;
                    break;
                }
            }
        }
        if self.pending.is_empty() {
            return if self.stdin_eof {
                Input::Eof
            } else {
                Input::WouldBlock
            };
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Input::Data(n)
    }

    fn output(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            // End-of-stream: nothing to close on stdout, just settle it.
            self.stdout.flush()?;
            return Ok(0);
        }
        self.stdout.write_all(data)?;
        self.stdout.flush()?;
        Ok(data.len())
    }

    fn bufspace(&self) -> usize {
        STDOUT_BUFSPACE
    }

    fn now_ms(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }
}

// ---------------------------------------------------------------------------
// stdin reader task
// ---------------------------------------------------------------------------

/// Spawn a task pumping stdin into a channel.  Dropping the sender signals
/// end-of-stream; the notify wakes the event loop on every chunk.
fn stdin_source(notify: Arc<Notify>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut chunk = vec![0u8; STDIN_CHUNK];
        loop {
            match stdin.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(chunk[..n].to_vec()).await.is_err() {
                        break;
                    }
                    notify.notify_one();
                }
            }
        }
        drop(tx);
        notify.notify_one();
    });
    rx
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Run one connection until it destroys itself.
pub async fn run(bind: SocketAddr, peer: Option<SocketAddr>, cfg: Config) -> anyhow::Result<()> {
    let socket = Arc::new(Socket::bind(bind).await?);
    log::info!("[driver] bound to {}", socket.local_addr()?);
    if let Some(peer) = peer {
        socket.set_peer(peer);
        log::info!("[driver] talking to {peer}");
    }

    let stdin_notify = Arc::new(Notify::new());
    let stdin_rx = stdin_source(Arc::clone(&stdin_notify));
    let conn = UdpConn::new(Arc::clone(&socket), stdin_rx);

    let mut registry = Registry::new();
    let id = registry.open(conn, &cfg);

    let mut ticker = tokio::time::interval(Duration::from_millis(cfg.timer_ms as u64));
    let mut buf = vec![0u8; MAX_DATAGRAM];

    // Drain anything already queued on stdin before the first event.
    registry.read(id);

    while registry.contains(id) {
        tokio::select! {
            ready = socket.readable() => {
                ready?;
                while let Some(n) = socket.try_recv(&mut buf)? {
                    registry.receive(id, &buf[..n]);
                }
            }
            _ = stdin_notify.notified() => {
                registry.read(id);
            }
            _ = ticker.tick() => {
                registry.tick();
            }
        }
        // The sink may have drained and an ACK may have opened the window.
        registry.output(id);
        registry.read(id);
    }

    log::info!("[driver] connection finished");
    Ok(())
}

//! The single-threaded, event-driven server: one `mio::Poll` loop,
//! non-blocking sockets, and a small per-connection read/write state
//! machine. No worker threads — all request handling happens inline on
//! the poll thread, since `crate::store::Database` is not `Send`.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use mio::event::Source;
use mio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use mio::{Events, Interest, Poll, Registry, Token, Waker};

use crate::config::ListenAddr;
use crate::error::ProtocolError;
use crate::handlers;
use crate::protocol::{self, Header, Opcode, Packet, Status};
use crate::store::Database;

const ACCEPT: Token = Token(0);
const SHUTDOWN: Token = Token(1);
const FIRST_CONN_TOKEN: usize = 2;

/// A declared body length above this is treated as a protocol error rather
/// than an allocation attempt; spec has no upper bound on frame size, but
/// an unbounded one would let a single client exhaust memory.
const MAX_BODY_LEN: u32 = 16 * 1024 * 1024;

/// Per-connection cap on unflushed response bytes (spec §5's backpressure
/// SHOULD, which the source left unimplemented). Once a connection's write
/// buffer reaches this size, its read interest is dropped until the buffer
/// fully drains, so one slow reader can't make the server buffer unbounded
/// response data for it.
const MAX_PENDING_WRITE_BYTES: usize = 1024 * 1024;

/// Either listening mode named by `-m inet|unix`.
enum Listener {
    Inet(TcpListener),
    Unix(UnixListener),
}

impl Listener {
    fn accept(&self) -> io::Result<(Stream, String)> {
        match self {
            Listener::Inet(l) => l.accept().map(|(s, addr)| (Stream::Inet(s), addr.to_string())),
            Listener::Unix(l) => l.accept().map(|(s, addr)| (Stream::Unix(s), format!("{addr:?}"))),
        }
    }

    fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        match self {
            Listener::Inet(l) => registry.register(l, token, Interest::READABLE),
            Listener::Unix(l) => registry.register(l, token, Interest::READABLE),
        }
    }
}

/// Either connected socket kind, unified so the rest of the server doesn't
/// care which mode accepted it.
enum Stream {
    Inet(TcpStream),
    Unix(UnixStream),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Inet(s) => s.read(buf),
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Inet(s) => s.write(buf),
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Inet(s) => s.flush(),
            Stream::Unix(s) => s.flush(),
        }
    }
}

impl Source for Stream {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Stream::Inet(s) => s.register(registry, token, interests),
            Stream::Unix(s) => s.register(registry, token, interests),
        }
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Stream::Inet(s) => s.reregister(registry, token, interests),
            Stream::Unix(s) => s.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Stream::Inet(s) => s.deregister(registry),
            Stream::Unix(s) => s.deregister(registry),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadWant {
    Header,
    Body(u32),
}

struct Connection {
    socket: Stream,
    read_buf: Vec<u8>,
    read_want: ReadWant,
    /// The header parsed while transitioning `Header -> Body(n)`, held
    /// until the body finishes buffering and dispatch consumes it.
    pending_header: Option<Header>,
    write_buf: Vec<u8>,
    write_offset: usize,
}

impl Connection {
    fn new(socket: Stream) -> Self {
        Connection {
            socket,
            read_buf: Vec::with_capacity(256),
            read_want: ReadWant::Header,
            pending_header: None,
            write_buf: Vec::new(),
            write_offset: 0,
        }
    }

    fn has_pending_write(&self) -> bool {
        self.write_offset < self.write_buf.len()
    }

    fn pending_write_len(&self) -> usize {
        self.write_buf.len() - self.write_offset
    }
}

/// A handle used to request shutdown from outside the poll loop (e.g. a
/// signal handler). Cloning shares the same flag and waker.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // best-effort: if the loop already exited, waking is a harmless no-op error.
        let _ = self.waker.wake();
    }
}

pub struct Server {
    poll: Poll,
    listener: Listener,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    shutdown_flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
    db: Database,
}

impl Server {
    pub fn bind(addr: ListenAddr) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut listener = match &addr {
            ListenAddr::Inet(sock_addr) => Listener::Inet(TcpListener::bind(*sock_addr)?),
            ListenAddr::Unix(path) => {
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
                Listener::Unix(UnixListener::bind(path)?)
            }
        };
        listener.register(poll.registry(), ACCEPT)?;
        let waker = Arc::new(Waker::new(poll.registry(), SHUTDOWN)?);

        info!("listening on {addr}");

        Ok(Server {
            poll,
            listener,
            connections: HashMap::new(),
            next_token: FIRST_CONN_TOKEN,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            waker,
            db: Database::new(),
        })
    }

    /// Returns a handle that, when `request_shutdown` is called (typically
    /// from a signal handler on another thread), wakes the poll loop and
    /// causes it to exit gracefully on its next iteration.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { flag: self.shutdown_flag.clone(), waker: self.waker.clone() }
    }

    /// Runs the event loop until shutdown is requested. Consumes `self`;
    /// the database and all connections are dropped on return.
    pub fn run(mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(256);

        loop {
            self.poll.poll(&mut events, None)?;

            for event in &events {
                match event.token() {
                    ACCEPT => self.accept_loop()?,
                    SHUTDOWN => {
                        if self.shutdown_flag.load(Ordering::SeqCst) {
                            info!("shutdown requested, closing {} connection(s)", self.connections.len());
                            return Ok(());
                        }
                    }
                    token => self.handle_connection_event(token, event),
                }
            }
        }
    }

    fn accept_loop(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((mut socket, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    socket.register(self.poll.registry(), token, Interest::READABLE)?;
                    debug!("accepted connection from {peer} as {token:?}");
                    self.connections.insert(token, Connection::new(socket));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn handle_connection_event(&mut self, token: Token, event: &mio::event::Event) {
        if event.is_readable() {
            if let Err(e) = self.drive_read(token) {
                trace!("closing {token:?}: {e}");
                self.close(token);
                return;
            }
        }
        if event.is_writable() {
            if let Err(e) = self.drive_write(token) {
                trace!("closing {token:?} on write error: {e}");
                self.close(token);
            }
        }
    }

    /// Reads as much as is available without blocking, feeding complete
    /// frames to the dispatcher as they become available, per spec §4.5's
    /// per-connection read state machine. A header carries straight
    /// through to dispatch when its body length is zero (a bare ACK-style
    /// request), and pipelined bytes already buffered are drained in the
    /// same call rather than waiting for another readable event.
    fn drive_read(&mut self, token: Token) -> Result<(), ProtocolError> {
        loop {
            let want = {
                let conn = self.connections.get_mut(&token).expect("token present");
                match conn.read_want {
                    ReadWant::Header => 5,
                    ReadWant::Body(n) => n as usize,
                }
            };

            loop {
                let conn = self.connections.get_mut(&token).expect("token present");
                if conn.read_buf.len() >= want {
                    break;
                }
                let mut chunk = [0u8; 4096];
                match conn.socket.read(&mut chunk) {
                    Ok(0) => return Err(ProtocolError::Invalid("connection closed by peer".into())),
                    Ok(n) => conn.read_buf.extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                    Err(e) => return Err(ProtocolError::Io(e)),
                }
            }

            let conn = self.connections.get_mut(&token).expect("token present");
            match conn.read_want {
                ReadWant::Header => {
                    let header = Header::from_byte(conn.read_buf[0]);
                    let body_len = u32::from_be_bytes(conn.read_buf[1..5].try_into().unwrap());
                    if body_len > MAX_BODY_LEN {
                        return Err(ProtocolError::Invalid(format!("frame body too large: {body_len}")));
                    }
                    conn.read_buf.drain(..5);
                    conn.read_want = ReadWant::Body(body_len);
                    conn.pending_header = Some(header);
                    // loop back around: `want` is recomputed as Body(body_len),
                    // and a zero-length body is satisfied immediately.
                }
                ReadWant::Body(body_len) => {
                    let header = conn.pending_header.take().expect("header set before body");
                    let body: Vec<u8> = conn.read_buf.drain(..body_len as usize).collect();
                    conn.read_want = ReadWant::Header;

                    self.dispatch(token, header, &body)?;

                    // Backpressure (spec §5): once the response backlog
                    // crosses the budget, stop pulling more requests off
                    // this connection — `arm_writable` has already dropped
                    // its read interest, so further bytes simply sit
                    // unread on the socket until the buffer drains.
                    let conn = self.connections.get(&token).expect("token present");
                    if conn.pending_write_len() >= MAX_PENDING_WRITE_BYTES {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Decodes and runs one complete frame, enqueuing its response on the
    /// connection's write buffer and arming it for writing.
    fn dispatch(&mut self, token: Token, header: Header, body: &[u8]) -> Result<(), ProtocolError> {
        if header.is_response() {
            return Err(ProtocolError::Invalid("client sent a response-typed frame".into()));
        }

        // An opcode the header bits don't map to any known command is a
        // client-visible UNKNOWN_CMD response, not a framing error: the
        // connection stays open (spec §4.3/§7), unlike a malformed body for
        // a recognized opcode, which closes it.
        let opcode = match header.opcode() {
            Ok(opcode) => opcode,
            Err(e) => {
                warn!("unknown opcode from {token:?}: {e}");
                let conn = self.connections.get_mut(&token).expect("token present");
                protocol::encode_status_frame(Opcode::Ack, Status::UnknownCmd, &mut conn.write_buf)?;
                self.arm_writable(token);
                return Ok(());
            }
        };

        let (resp_opcode, status, resp_packet) = match Packet::decode(opcode, body) {
            Ok(packet) => handlers::dispatch(&mut self.db, packet),
            Err(e) => {
                warn!("malformed {opcode:?} body from {token:?}: {e}");
                return Err(e);
            }
        };

        let conn = self.connections.get_mut(&token).expect("token present");
        protocol::encode_frame(Header::response(resp_opcode, status), &resp_packet, &mut conn.write_buf)?;

        self.arm_writable(token);
        Ok(())
    }

    /// Arms the connection for writing. Also re-evaluates its read
    /// interest against the backpressure budget: a connection already over
    /// budget loses `READABLE` until `drive_write` drains it.
    fn arm_writable(&mut self, token: Token) {
        let conn = self.connections.get_mut(&token).expect("token present");
        let interests = if conn.pending_write_len() >= MAX_PENDING_WRITE_BYTES {
            Interest::WRITABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        };
        if let Err(e) = self.poll.registry().reregister(&mut conn.socket, token, interests) {
            error!("failed to arm {token:?} for writing: {e}");
        }
    }

    /// Flushes as much of the write buffer as the socket accepts. On a
    /// short write, leaves the connection armed for another writable
    /// event; once drained, re-arms for read only.
    fn drive_write(&mut self, token: Token) -> io::Result<()> {
        let conn = self.connections.get_mut(&token).expect("token present");

        while conn.has_pending_write() {
            match conn.socket.write(&conn.write_buf[conn.write_offset..]) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "wrote zero bytes")),
                Ok(n) => conn.write_offset += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }

        conn.write_buf.clear();
        conn.write_offset = 0;
        self.poll.registry().reregister(&mut conn.socket, token, Interest::READABLE)?;
        Ok(())
    }

    fn close(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut conn.socket);
            trace!("closed {token:?}");
        }
    }
}

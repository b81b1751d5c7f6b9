//! Acceptor loop: binds the listener, runs the per-tick
//! wait/dispatch/sweep/revive sequence, and wires `SIGINT` onto a
//! lock-free per-server running flag.
//!
//! The running flag replaces the global mutex-guarded server registry
//! of the program this was distilled from with one `Arc<AtomicBool>`
//! per `Server`, registered into a small process-global list of weak
//! references so the installed signal handler never blocks on a lock
//! across a syscall.

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, WorkerError};
use crate::handler::HandlerRegistry;
use crate::multiplexer::{Interest, Multiplexer};
use crate::worker::{Stats, WorkerPool};

const REACTOR_TICK: Duration = Duration::from_millis(500);

const NOT_IMPLEMENTED: &str = "HTTP/1.1 501 Not Implemented\r\nContent-Type: text/html; charset=UTF-8\r\n\r\n<html><head><title>Not Implemented</title></head><body><h1>Not Implemented</h1><p>Server can't process such request.</p></body></html>";
const SERVICE_UNAVAILABLE: &str = "HTTP/1.1 503 Service Unavailable\r\nContent-Type: text/html; charset=UTF-8\r\n\r\n<html><head><title>Resource Busy</title></head><body><h1>Resource Busy</h1><p>Your request cannot be completed at this time. Please try again later.</p></body></html>";
const INTERNAL_ERROR: &str = "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/html; charset=UTF-8\r\n\r\n<html><head><title>Internal Server Error</title></head><body><h1>Internal Server Error</h1><p>Server internal error.</p></body></html>";
const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\n\r\n";

fn running_flags() -> &'static Mutex<Vec<Weak<AtomicBool>>> {
    static FLAGS: OnceLock<Mutex<Vec<Weak<AtomicBool>>>> = OnceLock::new();
    FLAGS.get_or_init(|| Mutex::new(Vec::new()))
}

extern "C" fn handle_sigint(_signum: libc::c_int) {
    if let Ok(flags) = running_flags().lock() {
        for weak in flags.iter() {
            if let Some(flag) = weak.upgrade() {
                flag.store(false, Ordering::Relaxed);
            }
        }
    }
}

fn install_sigint_handler() {
    static INSTALLED: std::sync::Once = std::sync::Once::new();
    INSTALLED.call_once(|| unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_sigint as usize;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
    });
}

pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    workers: WorkerPool,
    multiplexer: Multiplexer,
    running: Arc<AtomicBool>,
    stats: Arc<Stats>,
}

impl Server {
    pub fn bind(config: ServerConfig, registry: HandlerRegistry) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(("0.0.0.0", config.port))?;
        listener.set_nonblocking(true)?;

        let stats = Arc::new(Stats::default());
        let registry = Arc::new(registry);
        let workers = WorkerPool::new(config.threads, registry, Arc::clone(&stats));

        let running = Arc::new(AtomicBool::new(true));
        install_sigint_handler();
        running_flags().lock().map_err(|_| ServerError::Lock)?.push(Arc::downgrade(&running));

        let multiplexer = Multiplexer::new();
        multiplexer.add(listener.as_raw_fd(), Interest::READ, None)?;

        Ok(Self { listener, config, workers, multiplexer, running, stats })
    }

    pub fn running_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the reactor loop until the running flag is cleared, then
    /// shuts every worker down and closes remaining sockets.
    pub fn run(self) -> Result<(), ServerError> {
        let listen_fd = self.listener.as_raw_fd();

        while self.running.load(Ordering::Relaxed) {
            self.tick(listen_fd)?;
        }

        let stragglers = self.multiplexer.clear()?;
        for fd in stragglers {
            unsafe {
                libc::close(fd);
            }
        }

        let snapshot = self.stats.snapshot();
        info!(
            accepted = snapshot[0],
            correct = snapshot[1],
            rejected = snapshot[2],
            refused = snapshot[3],
            timeout = snapshot[4],
            error = snapshot[5],
            "server shut down"
        );

        self.workers.shutdown_all();
        Ok(())
    }

    fn tick(&self, listen_fd: i32) -> Result<(), ServerError> {
        let ready = self.multiplexer.wait(REACTOR_TICK)?;

        for fd in ready {
            if fd == listen_fd {
                self.accept_one(listen_fd)?;
            } else {
                self.dispatch_one(fd)?;
            }
        }

        for fd in self.multiplexer.sweep_expired()? {
            warn!(fd, "connection timed out");
            refuse(fd, SERVICE_UNAVAILABLE);
            unsafe {
                libc::close(fd);
            }
            self.stats.timeout.fetch_add(1, Ordering::Relaxed);
        }

        self.workers.revive_dead();
        Ok(())
    }

    fn accept_one(&self, listen_fd: i32) -> Result<(), ServerError> {
        match self.listener.accept() {
            Ok((stream, _addr)) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                stream.set_nonblocking(false)?;
                let fd = stream.into_raw_fd();

                if let Err(err) = self.multiplexer.add(fd, Interest::READ | Interest::WRITE, Some(self.config.connection_timeout)) {
                    error!(fd, %err, "unable to register connection, rejecting");
                    unsafe {
                        libc::close(fd);
                    }
                    self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                }

                let _ = listen_fd;
                Ok(())
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(ServerError::Io(err)),
        }
    }

    fn dispatch_one(&self, fd: i32) -> Result<(), ServerError> {
        match self.workers.dispatch(fd) {
            Ok(()) => {}
            Err(WorkerError::Overload) => {
                warn!(fd, "connection refused, worker pool overloaded");
                refuse(fd, SERVICE_UNAVAILABLE);
                unsafe {
                    libc::close(fd);
                }
                self.stats.refused.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                error!(fd, %err, "dispatch failed");
                unsafe {
                    libc::close(fd);
                }
            }
        }

        self.multiplexer.remove(fd)?;
        Ok(())
    }
}

fn refuse(fd: i32, body: &str) {
    // SAFETY: the caller closes `fd` itself right after this call, so
    // the temporary `TcpStream` must not also close it on drop.
    let stream = unsafe { TcpStream::from_raw_fd(fd) };
    let mut stream = std::mem::ManuallyDrop::new(stream);
    let _ = stream.write_all(body.as_bytes());
}

/// Writes the canned error response matching `err`'s kind. Called by a
/// worker after a failed request, before the stream (and so the fd) is
/// closed — this ordering must be preserved, see DESIGN.md.
pub fn write_error_response(stream: &mut TcpStream, err: &WorkerError) {
    let body = match err {
        WorkerError::WrongAction => NOT_IMPLEMENTED,
        WorkerError::Overload => SERVICE_UNAVAILABLE,
        WorkerError::InAction(handler_err) => match handler_err.status_code() {
            404 => NOT_FOUND,
            _ => INTERNAL_ERROR,
        },
        _ => INTERNAL_ERROR,
    };

    let _ = stream.write_all(body.as_bytes());
}

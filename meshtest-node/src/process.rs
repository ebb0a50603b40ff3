//! Node subprocess boundary.
//!
//! Nodes driven through a command-line client run as child processes. Each
//! needs two free ports (API and P2P); [`PortAllocator`] hands them out from
//! a shared set so concurrently running tests never collide. Child output
//! is captured line by line. A process ends when its shutdown signal fires,
//! which drops the child handle and lets the runtime reap it.
//!
//! Nothing in the harness starts processes itself: the in-process client is
//! the only client type, and this module is the spawning half of a
//! command-line one.

use crate::error::{NodeError, NodeResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

/// Attempts at finding a port not already leased.
const MAX_PORT_ATTEMPTS: usize = 32;

/// Hands out free local TCP ports.
#[derive(Debug, Clone, Default)]
pub struct PortAllocator {
    leased: Arc<Mutex<HashSet<u16>>>,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide allocator.
    pub fn global() -> &'static PortAllocator {
        static GLOBAL: OnceLock<PortAllocator> = OnceLock::new();
        GLOBAL.get_or_init(PortAllocator::new)
    }

    /// Leases a free port until the returned lease drops.
    pub fn lease(&self) -> NodeResult<PortLease> {
        for _ in 0..MAX_PORT_ATTEMPTS {
            // Binding port 0 lets the OS pick; the listener closes right away.
            let port = TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
            if self.leased.lock().insert(port) {
                return Ok(PortLease {
                    port,
                    leased: self.leased.clone(),
                });
            }
        }
        Err(NodeError::InvalidOptions("no free port available".into()))
    }

    pub fn leased_count(&self) -> usize {
        self.leased.lock().len()
    }
}

/// A leased port, released on drop.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    leased: Arc<Mutex<HashSet<u16>>>,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.leased.lock().remove(&self.port);
    }
}

/// How to launch a node process.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub program: String,
    /// Arguments placed before the node flags, e.g. a subcommand.
    pub args: Vec<String>,
    pub root_dir: PathBuf,
    pub api_port: u16,
    pub p2p_port: u16,
    /// Log destination handed to the node.
    pub log_output: String,
}

impl ProcessConfig {
    /// Full argument list, node flags last.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend([
            "--rootdir".to_string(),
            self.root_dir.display().to_string(),
            "--url".to_string(),
            format!("127.0.0.1:{}", self.api_port),
            "--tcpaddr".to_string(),
            format!("/ip4/127.0.0.1/tcp/{}", self.p2p_port),
            "--logoutput".to_string(),
            self.log_output.clone(),
        ]);
        args
    }
}

/// Which stream a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One captured output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

/// A running node process.
#[derive(Debug)]
pub struct NodeProcess {
    lines: mpsc::UnboundedReceiver<OutputLine>,
    exit: Option<oneshot::Receiver<Option<ExitStatus>>>,
}

impl NodeProcess {
    /// Spawns the process. It runs until it exits on its own, `shutdown`
    /// turns true, or the shutdown sender is dropped.
    pub fn spawn(config: &ProcessConfig, mut shutdown: watch::Receiver<bool>) -> NodeResult<Self> {
        let mut child = Command::new(&config.program)
            .args(config.command_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        debug!("Spawned {} (pid {:?})", config.program, child.id());

        let (line_tx, lines) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(capture(stdout, OutputStream::Stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(capture(stderr, OutputStream::Stderr, line_tx));
        }

        let (exit_tx, exit) = oneshot::channel();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status.ok(),
                _ = shutdown.wait_for(|stop| *stop) => {
                    // Dropping the handle terminates the child.
                    drop(child);
                    None
                }
            };
            let _ = exit_tx.send(status);
        });

        Ok(Self {
            lines,
            exit: Some(exit),
        })
    }

    /// Next captured line, or `None` once both streams have closed.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }

    /// Waits for the process to end. Returns `None` if it was shut down.
    pub async fn wait(&mut self) -> Option<ExitStatus> {
        match self.exit.take() {
            Some(exit) => exit.await.ok().flatten(),
            None => None,
        }
    }
}

async fn capture<R>(reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(OutputLine { stream, line }).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!("Failed reading node output: {}", e);
                return;
            }
        }
    }
}

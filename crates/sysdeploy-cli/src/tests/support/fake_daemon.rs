//! A socket-level fake of the deployment daemon.
//!
//! Serves both the bus protocol and the transaction protocol on one
//! ephemeral TCP port, so behavioural tests exercise the real socket client.
//! Bus calls and transaction requests use disjoint method names, which lets
//! every connection share one request loop.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use sysdeploy_daemon_types::{
    BusCall, BusMethod, BusReply, CachedUpdate, Deployment, Operation, TransactionMessage,
    TransactionRequest, WatchTopic,
};

use super::fakes::deployment;

/// What the fake daemon reports and how its transaction plays out.
#[derive(Debug, Clone)]
pub(in crate::tests) struct DaemonScript {
    pub deployments: Vec<Deployment>,
    /// Replaces `deployments` on the first reload after a transaction ends.
    pub deployments_after: Option<Vec<Deployment>>,
    pub cached_update: Option<CachedUpdate>,
    /// Starts with a transaction already in flight.
    pub busy: bool,
    pub title: String,
    /// Signals emitted after `start` is acknowledged.
    pub signals: Vec<TransactionMessage>,
}

impl Default for DaemonScript {
    fn default() -> Self {
        Self {
            deployments: vec![deployment("booted", true)],
            deployments_after: None,
            cached_update: None,
            busy: false,
            title: String::from("upgrade"),
            signals: vec![
                TransactionMessage::TaskBegin {
                    label: String::from("Receiving objects"),
                },
                TransactionMessage::TaskEnd {
                    label: String::from("done"),
                },
                TransactionMessage::Finished {
                    success: true,
                    message: String::new(),
                },
            ],
        }
    }
}

struct DaemonState {
    script: DaemonScript,
    address: String,
    active: bool,
    finished: bool,
    requests: Vec<String>,
    operations: Vec<Operation>,
    watchers: Vec<TcpStream>,
}

impl DaemonState {
    fn active_path(&self) -> String {
        if self.active {
            self.address.clone()
        } else {
            String::new()
        }
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
        let change = BusReply::ActiveTransactionChanged {
            path: self.active_path(),
        };
        // Watchers that already hung up are dropped.
        self.watchers
            .retain_mut(|watcher| write_line(watcher, &change).is_ok());
    }
}

/// A fake daemon accepting any number of connections until dropped.
pub(in crate::tests) struct FakeDaemon {
    port: u16,
    state: Arc<Mutex<DaemonState>>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakeDaemon {
    /// Spawns a fake daemon listening on an ephemeral TCP port.
    pub fn spawn(script: DaemonScript) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).context("bind fake daemon")?;
        let port = listener.local_addr().context("local addr")?.port();
        let busy = script.busy;
        let state = Arc::new(Mutex::new(DaemonState {
            script,
            address: format!("tcp://127.0.0.1:{port}"),
            active: busy,
            finished: false,
            requests: Vec::new(),
            operations: Vec::new(),
            watchers: Vec::new(),
        }));
        let stop = Arc::new(AtomicBool::new(false));
        let accept_state = Arc::clone(&state);
        let accept_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_stop.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                let connection_state = Arc::clone(&accept_state);
                thread::spawn(move || {
                    // A client hanging up mid-request is not a test failure.
                    drop(serve_connection(stream, &connection_state));
                });
            }
        });
        Ok(Self {
            port,
            state,
            stop,
            handle: Some(handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Method names received so far, in arrival order.
    pub fn requests(&self) -> Result<Vec<String>> {
        Ok(lock(&self.state)?.requests.clone())
    }

    /// Operations begun so far.
    pub fn operations(&self) -> Result<Vec<Operation>> {
        Ok(lock(&self.state)?.operations.clone())
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Wake the accept loop so it sees the stop flag.
        drop(TcpStream::connect(("127.0.0.1", self.port)));
        if let Some(handle) = self.handle.take() {
            drop(handle.join());
        }
    }
}

fn lock(state: &Mutex<DaemonState>) -> Result<MutexGuard<'_, DaemonState>> {
    state
        .lock()
        .map_err(|error| anyhow!("lock fake daemon state: {error}"))
}

fn write_line(stream: &mut impl Write, message: &impl Serialize) -> io::Result<()> {
    let mut line = serde_json::to_vec(message).map_err(io::Error::other)?;
    line.push(b'\n');
    stream.write_all(&line)?;
    stream.flush()
}

fn serve_connection(stream: TcpStream, state: &Mutex<DaemonState>) -> Result<()> {
    let mut writer = stream.try_clone().context("clone stream")?;
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = line.context("read request")?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(call) = serde_json::from_str::<BusCall>(&line) {
            answer_bus_call(call.method, &mut writer, state)?;
        } else {
            let request: TransactionRequest =
                serde_json::from_str(&line).with_context(|| format!("parse request {line:?}"))?;
            answer_transaction_request(request, &mut writer, state)?;
        }
    }
    Ok(())
}

fn answer_bus_call(
    method: BusMethod,
    writer: &mut TcpStream,
    state: &Mutex<DaemonState>,
) -> Result<()> {
    let mut state = lock(state)?;
    state.requests.push(method.name().to_owned());
    let reply = match method {
        BusMethod::Hello { .. } => BusReply::Hello {
            unique_name: Some(String::from(":1.42")),
        },
        BusMethod::RegisterClient { .. } => BusReply::Ack,
        BusMethod::GetActiveTransaction => BusReply::ActiveTransaction {
            path: state.active_path(),
        },
        BusMethod::GetDeployments => BusReply::Deployments {
            deployments: state.script.deployments.clone(),
        },
        BusMethod::GetCachedUpdate => BusReply::CachedUpdate {
            update: state.script.cached_update.clone(),
        },
        BusMethod::Reload => {
            if state.finished
                && let Some(deployments) = state.script.deployments_after.take()
            {
                state.script.deployments = deployments;
            }
            BusReply::Ack
        }
        BusMethod::Begin { operation, .. } => {
            state.operations.push(operation);
            state.set_active(true);
            BusReply::Transaction {
                address: state.address.clone(),
            }
        }
        BusMethod::Watch { topic } => {
            if topic == WatchTopic::ActiveTransaction {
                let watcher = writer.try_clone().context("clone watcher")?;
                state.watchers.push(watcher);
            }
            BusReply::Ack
        }
    };
    write_line(writer, &reply).context("write bus reply")
}

fn answer_transaction_request(
    request: TransactionRequest,
    writer: &mut TcpStream,
    state: &Mutex<DaemonState>,
) -> Result<()> {
    let mut state = lock(state)?;
    match request {
        TransactionRequest::GetTitle => {
            state.requests.push(String::from("get_title"));
            let title = TransactionMessage::Title {
                title: state.script.title.clone(),
            };
            write_line(writer, &title).context("write title")
        }
        TransactionRequest::Start => {
            state.requests.push(String::from("start"));
            write_line(writer, &TransactionMessage::Started { just_started: true })
                .context("write start reply")?;
            for signal in state.script.signals.clone() {
                let finished = matches!(signal, TransactionMessage::Finished { .. });
                write_line(writer, &signal).context("write signal")?;
                if finished {
                    state.finished = true;
                    state.set_active(false);
                }
            }
            Ok(())
        }
        TransactionRequest::Cancel => {
            state.requests.push(String::from("cancel"));
            let finished = TransactionMessage::Finished {
                success: false,
                message: String::from("Transaction was cancelled"),
            };
            // The cancelling client may already have hung up.
            drop(write_line(writer, &finished));
            state.finished = true;
            state.set_active(false);
            Ok(())
        }
    }
}

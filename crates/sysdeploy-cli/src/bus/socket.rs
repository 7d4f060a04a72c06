use std::io::BufReader;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use sysdeploy_config::SocketEndpoint;
use sysdeploy_daemon_types::{
    BusCall, BusMethod, BusReply, CachedUpdate, Deployment, Operation, TransactionOptions,
    WELL_KNOWN_NAME, WatchTopic,
};
use tracing::debug;

use super::{BUS_TARGET, BusError, BusNotification, DaemonBus, NotificationSink, WatchHandle};
use crate::transaction::TransactionAddress;
use crate::transport::{Connection, TransportError, connect, read_message, write_message};

/// Smallest read timeout the socket layer accepts.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Bus connection speaking JSON lines over a socket.
pub(crate) struct SocketBus {
    endpoint: SocketEndpoint,
    sysroot: String,
    writer: Connection,
    reader: BufReader<Connection>,
    unique_name: Option<String>,
}

struct Opened {
    writer: Connection,
    reader: BufReader<Connection>,
    unique_name: Option<String>,
}

impl SocketBus {
    /// Connects to `endpoint` and performs the hello exchange for `sysroot`.
    pub(crate) fn open(endpoint: &SocketEndpoint, sysroot: &str) -> Result<Self, BusError> {
        let opened = open_connection(endpoint, sysroot)?;
        debug!(
            target: BUS_TARGET,
            %endpoint,
            sysroot,
            unique_name = opened.unique_name.as_deref().unwrap_or("<anonymous>"),
            "connected to daemon bus"
        );
        Ok(Self {
            endpoint: endpoint.clone(),
            sysroot: sysroot.to_owned(),
            writer: opened.writer,
            reader: opened.reader,
            unique_name: opened.unique_name,
        })
    }

    fn destination(&self) -> Option<String> {
        self.unique_name
            .as_ref()
            .map(|_| WELL_KNOWN_NAME.to_owned())
    }

    fn call(&mut self, method: BusMethod) -> Result<BusReply, BusError> {
        let name = method.name();
        let call = BusCall::new(self.destination(), method);
        write_message(&mut self.writer, &call)?;
        expect_reply(&mut self.reader, name)
    }
}

fn open_connection(endpoint: &SocketEndpoint, sysroot: &str) -> Result<Opened, BusError> {
    let writer = connect(endpoint)?;
    let reader = writer
        .try_clone()
        .map(BufReader::new)
        .map_err(|source| TransportError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;
    let mut opened = Opened {
        writer,
        reader,
        unique_name: None,
    };
    let hello = BusMethod::Hello {
        sysroot: sysroot.to_owned(),
    };
    write_message(&mut opened.writer, &BusCall::new(None, hello))?;
    match expect_reply(&mut opened.reader, "hello")? {
        BusReply::Hello { unique_name } => {
            opened.unique_name = unique_name;
            Ok(opened)
        }
        other => Err(unexpected("hello", &other)),
    }
}

fn expect_reply(
    reader: &mut BufReader<Connection>,
    method: &'static str,
) -> Result<BusReply, BusError> {
    match read_message::<_, BusReply>(reader)? {
        None => Err(BusError::Closed { method }),
        Some(BusReply::Error { name, message }) => Err(BusError::Remote {
            method,
            kind: name,
            message,
        }),
        Some(reply) => Ok(reply),
    }
}

fn unexpected(method: &'static str, reply: &BusReply) -> BusError {
    BusError::UnexpectedReply {
        method,
        reply: format!("{reply:?}"),
    }
}

fn expect_ack(method: &'static str, reply: &BusReply) -> Result<(), BusError> {
    match reply {
        BusReply::Ack => Ok(()),
        other => Err(unexpected(method, other)),
    }
}

impl DaemonBus for SocketBus {
    fn is_addressed(&self) -> bool {
        self.unique_name.is_some()
    }

    fn register_client(&mut self, client_id: &str) -> Result<(), BusError> {
        let reply = self.call(BusMethod::RegisterClient {
            id: client_id.to_owned(),
        })?;
        expect_ack("register_client", &reply)
    }

    fn active_transaction(&mut self) -> Result<Option<TransactionAddress>, BusError> {
        match self.call(BusMethod::GetActiveTransaction)? {
            BusReply::ActiveTransaction { path } => Ok(TransactionAddress::from_path(path)),
            other => Err(unexpected("get_active_transaction", &other)),
        }
    }

    fn deployments(&mut self) -> Result<Vec<Deployment>, BusError> {
        match self.call(BusMethod::GetDeployments)? {
            BusReply::Deployments { deployments } => Ok(deployments),
            other => Err(unexpected("get_deployments", &other)),
        }
    }

    fn cached_update(&mut self) -> Result<Option<CachedUpdate>, BusError> {
        match self.call(BusMethod::GetCachedUpdate)? {
            BusReply::CachedUpdate { update } => Ok(update),
            other => Err(unexpected("get_cached_update", &other)),
        }
    }

    fn reload(&mut self, timeout: Duration) -> Result<(), BusError> {
        self.writer
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))
            .map_err(TransportError::Receive)?;
        let result = self.call(BusMethod::Reload);
        if let Err(error) = self.writer.set_read_timeout(None) {
            debug!(target: BUS_TARGET, %error, "failed to clear read timeout");
        }
        match result {
            Ok(reply) => expect_ack("reload", &reply),
            Err(BusError::Transport(error)) if error.is_timeout() => Err(BusError::ReloadTimeout {
                timeout_secs: timeout.as_secs(),
            }),
            Err(error) => Err(error),
        }
    }

    fn begin(
        &mut self,
        operation: Operation,
        options: TransactionOptions,
    ) -> Result<TransactionAddress, BusError> {
        match self.call(BusMethod::Begin { operation, options })? {
            BusReply::Transaction { address } => TransactionAddress::from_path(address)
                .ok_or(BusError::UnexpectedReply {
                    method: "begin",
                    reply: String::from("empty transaction address"),
                }),
            other => Err(unexpected("begin", &other)),
        }
    }

    fn watch(
        &mut self,
        topic: WatchTopic,
        sink: NotificationSink,
    ) -> Result<WatchHandle, BusError> {
        let mut opened = open_connection(&self.endpoint, &self.sysroot)?;
        let call = BusCall::new(self.destination(), BusMethod::Watch { topic });
        write_message(&mut opened.writer, &call)?;
        let reply = expect_reply(&mut opened.reader, "watch")?;
        expect_ack("watch", &reply)?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let reader = opened.reader;
        let thread = thread::Builder::new()
            .name(String::from("sysdeploy-watch"))
            .spawn(move || forward_notifications(reader, &sink, &thread_stop))
            .map_err(BusError::Spawn)?;
        debug!(target: BUS_TARGET, ?topic, "watching for changes");
        Ok(WatchHandle::new(stop, opened.writer, thread))
    }
}

fn forward_notifications(
    mut reader: BufReader<Connection>,
    sink: &NotificationSink,
    stop: &AtomicBool,
) {
    loop {
        match read_message::<_, BusReply>(&mut reader) {
            Ok(Some(BusReply::NameOwnerChanged { owner })) => {
                sink(BusNotification::OwnerChanged(owner));
            }
            Ok(Some(BusReply::ActiveTransactionChanged { path })) => {
                sink(BusNotification::ActiveTransactionChanged(
                    TransactionAddress::from_path(path),
                ));
            }
            Ok(Some(other)) => {
                debug!(target: BUS_TARGET, reply = ?other, "ignoring reply on watch connection");
            }
            Ok(None) => break,
            Err(error) => {
                if !stop.load(Ordering::SeqCst) {
                    debug!(target: BUS_TARGET, %error, "watch connection failed");
                }
                break;
            }
        }
    }
    if !stop.load(Ordering::SeqCst) {
        sink(BusNotification::Closed);
    }
}

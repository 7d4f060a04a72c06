//! In-memory stand-ins for the daemon bus, transaction channels, interrupt
//! source and terminal.
//!
//! Every fake keeps its observable state behind an `Arc`, so a test can hold
//! a clone for inspection after handing the original to the code under test.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sysdeploy_config::Config;
use sysdeploy_daemon_types::{
    CachedUpdate, Deployment, Operation, TransactionOptions, WatchTopic,
};

use crate::bus::{BusError, BusNotification, DaemonBus, NotificationSink, WatchHandle};
use crate::cancel::{InterruptGuard, InterruptSource};
use crate::client::{Client, ClientFactory};
use crate::command::DaemonOptions;
use crate::errors::CommandError;
use crate::progress::{Console, ConsoleAction, ProgressEvent};
use crate::transaction::{
    AttachmentSlot, EventSink, LoopEvent, TransactionAddress, TransactionChannel,
    TransactionConnector, TransactionError, TransactionSignal,
};
use crate::transport::TransportError;

/// Address handed out by [`FakeBus::begin`] unless configured otherwise.
pub(crate) const FAKE_TRANSACTION: &str = "tcp://127.0.0.1:1";

/// Builds a deployment whose checksum is derived from `id`.
pub(crate) fn deployment(id: &str, booted: bool) -> Deployment {
    Deployment {
        id: id.to_owned(),
        osname: String::from("fedora"),
        checksum: format!("{id}-5f1c2a9e"),
        version: Some(format!("40.{id}")),
        origin: String::from("fedora:fedora/40/x86_64/silverblue"),
        serial: 0,
        booted,
        staged: false,
        pinned: false,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("fake state lock poisoned")
}

/// Shared call counter.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Default)]
struct BusState {
    addressed: bool,
    registration_replies: VecDeque<Result<(), BusError>>,
    registrations: Vec<String>,
    active: Option<TransactionAddress>,
    deployments: Vec<Deployment>,
    after_transaction: Option<Vec<Deployment>>,
    cached_update: Option<CachedUpdate>,
    reload_times_out: bool,
    reloads: usize,
    begun: Vec<(Operation, TransactionOptions)>,
    owner_watch_notification: Option<BusNotification>,
    watches: Vec<WatchTopic>,
}

/// A daemon bus answering from in-memory state.
///
/// Deployments configured with [`FakeBus::with_deployments_after_transaction`]
/// replace the current list on the first reload.
#[derive(Clone, Default)]
pub(crate) struct FakeBus {
    state: Arc<Mutex<BusState>>,
}

impl FakeBus {
    pub(crate) fn addressed(self) -> Self {
        lock(&self.state).addressed = true;
        self
    }

    pub(crate) fn with_active_transaction(self, path: &str) -> Self {
        lock(&self.state).active = TransactionAddress::from_path(path);
        self
    }

    pub(crate) fn with_deployments(self, deployments: Vec<Deployment>) -> Self {
        lock(&self.state).deployments = deployments;
        self
    }

    pub(crate) fn with_deployments_after_transaction(self, deployments: Vec<Deployment>) -> Self {
        lock(&self.state).after_transaction = Some(deployments);
        self
    }

    pub(crate) fn with_cached_update(self, update: CachedUpdate) -> Self {
        lock(&self.state).cached_update = Some(update);
        self
    }

    pub(crate) fn with_reload_timeout(self) -> Self {
        lock(&self.state).reload_times_out = true;
        self
    }

    /// Reports a change of name owner as soon as one is watched.
    pub(crate) fn with_owner_change(self) -> Self {
        self.with_owner_notification(BusNotification::OwnerChanged(None))
    }

    /// Closes the name-owner watch as soon as it opens, as a daemon that
    /// exits does.
    pub(crate) fn with_owner_watch_closing(self) -> Self {
        self.with_owner_notification(BusNotification::Closed)
    }

    fn with_owner_notification(self, notification: BusNotification) -> Self {
        let mut state = lock(&self.state);
        state.addressed = true;
        state.owner_watch_notification = Some(notification);
        drop(state);
        self
    }

    /// Queues the reply to the next `register_client`. Unqueued calls succeed.
    pub(crate) fn queue_registration(&self, reply: Result<(), BusError>) {
        lock(&self.state).registration_replies.push_back(reply);
    }

    pub(crate) fn registrations(&self) -> Vec<String> {
        lock(&self.state).registrations.clone()
    }

    pub(crate) fn reloads(&self) -> usize {
        lock(&self.state).reloads
    }

    pub(crate) fn begun(&self) -> Vec<Operation> {
        lock(&self.state)
            .begun
            .iter()
            .map(|(operation, _)| operation.clone())
            .collect()
    }

    pub(crate) fn last_options(&self) -> Option<TransactionOptions> {
        lock(&self.state)
            .begun
            .last()
            .map(|(_, options)| options.clone())
    }

    pub(crate) fn watches(&self) -> Vec<WatchTopic> {
        lock(&self.state).watches.clone()
    }
}

impl DaemonBus for FakeBus {
    fn is_addressed(&self) -> bool {
        lock(&self.state).addressed
    }

    fn register_client(&mut self, client_id: &str) -> Result<(), BusError> {
        let mut state = lock(&self.state);
        state.registrations.push(client_id.to_owned());
        state.registration_replies.pop_front().unwrap_or(Ok(()))
    }

    fn active_transaction(&mut self) -> Result<Option<TransactionAddress>, BusError> {
        Ok(lock(&self.state).active.clone())
    }

    fn deployments(&mut self) -> Result<Vec<Deployment>, BusError> {
        Ok(lock(&self.state).deployments.clone())
    }

    fn cached_update(&mut self) -> Result<Option<CachedUpdate>, BusError> {
        Ok(lock(&self.state).cached_update.clone())
    }

    fn reload(&mut self, timeout: Duration) -> Result<(), BusError> {
        let mut state = lock(&self.state);
        state.reloads += 1;
        if state.reload_times_out {
            return Err(BusError::ReloadTimeout {
                timeout_secs: timeout.as_secs(),
            });
        }
        if let Some(deployments) = state.after_transaction.take() {
            state.deployments = deployments;
        }
        Ok(())
    }

    fn begin(
        &mut self,
        operation: Operation,
        options: TransactionOptions,
    ) -> Result<TransactionAddress, BusError> {
        lock(&self.state).begun.push((operation, options));
        TransactionAddress::from_path(FAKE_TRANSACTION).ok_or(BusError::UnexpectedReply {
            method: "begin",
            reply: String::from("empty transaction address"),
        })
    }

    fn watch(
        &mut self,
        topic: WatchTopic,
        sink: NotificationSink,
    ) -> Result<WatchHandle, BusError> {
        let owner_notification = {
            let mut state = lock(&self.state);
            state.watches.push(topic);
            state.owner_watch_notification.clone()
        };
        if topic == WatchTopic::NameOwner
            && let Some(notification) = owner_notification
        {
            sink(notification);
        }
        Ok(WatchHandle::detached())
    }
}

/// A transaction channel that replays a fixed script.
///
/// Scripted events are emitted from inside `start`, through the sink
/// registered by `subscribe`, mirroring a daemon that begins emitting the
/// moment it sees the start request. A successful cancel makes the channel
/// report a failed finish, as the daemon does for a cancelled run.
pub(crate) struct ScriptedChannel {
    title: String,
    events: Vec<ProgressEvent>,
    closes: bool,
    just_started: bool,
    fail_cancel: bool,
    sink: Option<EventSink>,
    cancels: CallCounter,
}

impl Default for ScriptedChannel {
    fn default() -> Self {
        Self {
            title: String::from("upgrade"),
            events: Vec::new(),
            closes: false,
            just_started: true,
            fail_cancel: false,
            sink: None,
            cancels: CallCounter::default(),
        }
    }
}

impl ScriptedChannel {
    /// A channel whose transaction finishes with `success`.
    pub(crate) fn finishing(success: bool, message: &str) -> Self {
        Self::default().with_events(vec![ProgressEvent::Finished {
            success,
            message: message.to_owned(),
        }])
    }

    pub(crate) fn with_events(mut self, events: Vec<ProgressEvent>) -> Self {
        self.events = events;
        self
    }

    /// Drops the connection after the scripted events.
    pub(crate) fn closing(mut self) -> Self {
        self.closes = true;
        self
    }

    pub(crate) fn already_started(mut self) -> Self {
        self.just_started = false;
        self
    }

    pub(crate) fn failing_cancel(mut self) -> Self {
        self.fail_cancel = true;
        self
    }

    pub(crate) fn cancel_counter(&self) -> CallCounter {
        self.cancels.clone()
    }

    fn emit(&self, signal: TransactionSignal) {
        if let Some(sink) = self.sink.as_ref() {
            sink(signal);
        }
    }
}

impl TransactionChannel for ScriptedChannel {
    fn title(&mut self) -> Result<String, TransactionError> {
        Ok(self.title.clone())
    }

    fn subscribe(&mut self, sink: EventSink) -> Result<(), TransactionError> {
        self.sink = Some(sink);
        Ok(())
    }

    fn start(&mut self) -> Result<bool, TransactionError> {
        if self.sink.is_none() {
            return Err(TransactionError::NotSubscribed);
        }
        for event in std::mem::take(&mut self.events) {
            self.emit(TransactionSignal::Progress(event));
        }
        if self.closes {
            self.emit(TransactionSignal::Closed);
        }
        Ok(self.just_started)
    }

    fn cancel(&mut self) -> Result<(), TransactionError> {
        self.cancels.bump();
        if self.fail_cancel {
            return Err(TransactionError::Closed("cancel"));
        }
        self.emit(TransactionSignal::Progress(ProgressEvent::Finished {
            success: false,
            message: String::from("Transaction was cancelled"),
        }));
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.sink = None;
    }
}

#[derive(Default)]
struct ConnectorState {
    always_fail: bool,
    failures_left: usize,
    channels: VecDeque<ScriptedChannel>,
}

/// Hands out scripted channels, optionally refusing the first attempts.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    state: Arc<Mutex<ConnectorState>>,
    attempts: CallCounter,
}

impl FakeConnector {
    pub(crate) fn with_channels(channels: Vec<ScriptedChannel>) -> Self {
        Self::failing_then(0, channels)
    }

    pub(crate) fn failing_then(failures: usize, channels: Vec<ScriptedChannel>) -> Self {
        let connector = Self::default();
        {
            let mut state = lock(&connector.state);
            state.failures_left = failures;
            state.channels = channels.into();
        }
        connector
    }

    pub(crate) fn always_failing() -> Self {
        let connector = Self::default();
        lock(&connector.state).always_fail = true;
        connector
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.get()
    }
}

impl TransactionConnector for FakeConnector {
    fn connect(
        &self,
        address: &TransactionAddress,
    ) -> Result<Box<dyn TransactionChannel>, TransactionError> {
        let attempt = self.attempts.bump();
        let mut state = lock(&self.state);
        let refuse = state.always_fail || state.failures_left > 0;
        state.failures_left = state.failures_left.saturating_sub(1);
        let channel = if refuse {
            None
        } else {
            state.channels.pop_front()
        };
        channel
            .map(|channel| Box::new(channel) as Box<dyn TransactionChannel>)
            .ok_or_else(|| TransactionError::Attach {
                address: address.to_string(),
                source: TransportError::Connect {
                    endpoint: address.to_string(),
                    source: io::Error::new(
                        io::ErrorKind::ConnectionRefused,
                        format!("refused on attempt {attempt}"),
                    ),
                },
            })
    }
}

/// Delivers a fixed number of interrupts as soon as it is installed.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ScriptedInterrupts {
    pending: usize,
}

impl ScriptedInterrupts {
    pub(crate) const fn firing(pending: usize) -> Self {
        Self { pending }
    }
}

impl InterruptSource for ScriptedInterrupts {
    fn install(&self, sink: Sender<LoopEvent>) -> Result<InterruptGuard, TransactionError> {
        for _ in 0..self.pending {
            sink.send(LoopEvent::Interrupt)
                .map_err(|_| TransactionError::Closed("interrupt"))?;
        }
        Ok(InterruptGuard::default())
    }
}

/// Records everything a command shows the user.
#[derive(Debug, Default)]
pub(crate) struct RecordingConsole {
    pub(crate) actions: Vec<ConsoleAction>,
    pub(crate) lines: Vec<String>,
    pub(crate) notices: Vec<String>,
}

impl Console for RecordingConsole {
    fn render(&mut self, action: &ConsoleAction) -> io::Result<()> {
        self.actions.push(action.clone());
        Ok(())
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        self.lines.push(text.to_owned());
        Ok(())
    }

    fn notice(&mut self, text: &str) -> io::Result<()> {
        self.notices.push(text.to_owned());
        Ok(())
    }
}

/// Connects every run to the same fake bus and connector.
#[derive(Clone, Default)]
pub(crate) struct FakeClients {
    bus: FakeBus,
    connector: FakeConnector,
    connects: CallCounter,
}

impl FakeClients {
    pub(crate) fn new(bus: FakeBus, connector: FakeConnector) -> Self {
        Self {
            bus,
            connector,
            connects: CallCounter::default(),
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.get()
    }

    /// A client over clones of the fakes, for driving helpers directly.
    pub(crate) fn client(&self) -> Client {
        Client {
            bus: Box::new(self.bus.clone()),
            connector: Box::new(self.connector.clone()),
            slot: AttachmentSlot::default(),
        }
    }
}

impl ClientFactory for FakeClients {
    fn connect(&self, _config: &Config, _options: &DaemonOptions) -> Result<Client, CommandError> {
        self.connects.bump();
        Ok(self.client())
    }
}

use std::io::BufReader;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sysdeploy_config::SocketEndpoint;
use sysdeploy_daemon_types::{TransactionMessage, TransactionRequest};
use tracing::debug;

use super::{
    EventSink, TRANSACTION_TARGET, TransactionAddress, TransactionChannel, TransactionConnector,
    TransactionError, TransactionSignal,
};
use crate::progress::ProgressEvent;
use crate::transport::{Connection, read_message, write_message};

/// How long the daemon may take to acknowledge `start`.
const START_TIMEOUT: Duration = Duration::from_secs(60);

/// Opens transaction connections on the socket named by the address.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SocketConnector;

impl TransactionConnector for SocketConnector {
    fn connect(
        &self,
        address: &TransactionAddress,
    ) -> Result<Box<dyn TransactionChannel>, TransactionError> {
        let endpoint: SocketEndpoint =
            address
                .as_str()
                .parse()
                .map_err(|source| TransactionError::InvalidAddress {
                    address: address.to_string(),
                    source,
                })?;
        let attach_error = |source| TransactionError::Attach {
            address: address.to_string(),
            source,
        };
        let writer = crate::transport::connect(&endpoint).map_err(attach_error)?;
        let reader = writer.try_clone().map_err(|source| TransactionError::Attach {
            address: address.to_string(),
            source: crate::transport::TransportError::Connect {
                endpoint: endpoint.to_string(),
                source,
            },
        })?;
        Ok(Box::new(SocketChannel {
            writer,
            reader: Some(BufReader::new(reader)),
            started: None,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }))
    }
}

struct SocketChannel {
    writer: Connection,
    /// Present until a reader thread takes it over.
    reader: Option<BufReader<Connection>>,
    started: Option<Receiver<bool>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TransactionChannel for SocketChannel {
    fn title(&mut self) -> Result<String, TransactionError> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(TransactionError::UnexpectedReply {
                method: "get_title",
                reply: String::from("title requested after subscribing"),
            });
        };
        write_message(&mut self.writer, &TransactionRequest::GetTitle)?;
        loop {
            match read_message::<_, TransactionMessage>(reader)? {
                Some(TransactionMessage::Title { title }) => return Ok(title),
                Some(other) => {
                    debug!(target: TRANSACTION_TARGET, signal = ?other, "skipping signal before title");
                }
                None => return Err(TransactionError::Closed("get_title")),
            }
        }
    }

    fn subscribe(&mut self, sink: EventSink) -> Result<(), TransactionError> {
        let Some(reader) = self.reader.take() else {
            return Ok(());
        };
        let (started_tx, started_rx) = mpsc::channel();
        let stop = Arc::clone(&self.stop);
        let thread = thread::Builder::new()
            .name(String::from("sysdeploy-transaction"))
            .spawn(move || forward_signals(reader, &sink, &started_tx, &stop))
            .map_err(TransactionError::Spawn)?;
        self.started = Some(started_rx);
        self.thread = Some(thread);
        Ok(())
    }

    fn start(&mut self) -> Result<bool, TransactionError> {
        let Some(started) = self.started.as_ref() else {
            return Err(TransactionError::NotSubscribed);
        };
        write_message(&mut self.writer, &TransactionRequest::Start)?;
        match started.recv_timeout(START_TIMEOUT) {
            Ok(just_started) => Ok(just_started),
            Err(RecvTimeoutError::Timeout) => Err(TransactionError::UnexpectedReply {
                method: "start",
                reply: format!("no reply within {}s", START_TIMEOUT.as_secs()),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(TransactionError::Closed("start")),
        }
    }

    fn cancel(&mut self) -> Result<(), TransactionError> {
        write_message(&mut self.writer, &TransactionRequest::Cancel).map_err(Into::into)
    }

    fn unsubscribe(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            self.writer.shutdown();
            if thread.join().is_err() {
                tracing::warn!(target: TRANSACTION_TARGET, "transaction reader panicked");
            }
        }
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

fn forward_signals(
    mut reader: BufReader<Connection>,
    sink: &EventSink,
    started: &Sender<bool>,
    stop: &AtomicBool,
) {
    loop {
        let message = match read_message::<_, TransactionMessage>(&mut reader) {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(error) => {
                if !stop.load(Ordering::SeqCst) {
                    debug!(target: TRANSACTION_TARGET, %error, "transaction stream failed");
                }
                break;
            }
        };
        if stop.load(Ordering::SeqCst) {
            return;
        }
        match message {
            TransactionMessage::Started { just_started } => {
                if started.send(just_started).is_err() {
                    debug!(target: TRANSACTION_TARGET, "start reply arrived after start gave up");
                }
            }
            other => {
                if let Some(event) = ProgressEvent::from_message(other) {
                    sink(TransactionSignal::Progress(event));
                }
            }
        }
    }
    if !stop.load(Ordering::SeqCst) {
        sink(TransactionSignal::Closed);
    }
}

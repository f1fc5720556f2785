/*!
 * Device communication coordinator.
 *
 * One coordinator per device. It owns the transport, the compiled
 * response parser and the state snapshot, and runs the connection
 * lifecycle: connect, listen for pushed data, reconnect after loss, and
 * optionally poll status queries on a timer.
 *
 * A single pending-reply slot pairs a sent query with the next inbound
 * line. A newer waiter replaces the slot; disconnecting drops the slot's
 * sender so a blocked waiter returns immediately instead of running out
 * its timeout.
 */
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use avlink_core::types::{Id, Value};

use crate::codec;
use crate::descriptor::{Command, CommandFormat, DeviceDescriptor, LineEnding, MatrixInput, MatrixOutput};
use crate::error::{DeviceError, Result};
use crate::parser::ResponseParser;
use crate::state::DeviceState;
use crate::transport::{self, Transport};

/// How long a query waits for its reply unless the caller says otherwise
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

type Listener = Arc<dyn Fn(&str, &Value) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Inner {
    device_id: Id,
    name: String,
    descriptor: RwLock<DeviceDescriptor>,
    transport: Box<dyn Transport>,
    parser: ResponseParser,
    state: RwLock<DeviceState>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
    connected: AtomicBool,
    connecting: AtomicBool,
    shutdown: AtomicBool,
    pending: Mutex<Option<oneshot::Sender<String>>>,
    listen_task: Mutex<Option<JoinHandle<()>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("device_id", &self.device_id)
            .field("name", &self.name)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish()
    }
}

/// Coordinates all communication with one device
#[derive(Debug, Clone)]
pub struct DeviceCoordinator {
    inner: Arc<Inner>,
}

/// Handle for a registered state listener
///
/// Call [`StateSubscription::unsubscribe`] to stop receiving updates.
/// Dropping the handle leaves the listener registered.
#[derive(Debug)]
pub struct StateSubscription {
    inner: Weak<Inner>,
    id: u64,
}

impl StateSubscription {
    /// Remove the listener this handle refers to
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            lock(&inner.listeners).retain(|(id, _)| *id != self.id);
        }
    }
}

impl DeviceCoordinator {
    /// Create a coordinator, building the transport from the descriptor
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        let transport = transport::build(&descriptor.transport);
        Self::with_transport(descriptor, transport)
    }

    /// Create a coordinator over an already-built transport
    pub fn with_transport(descriptor: DeviceDescriptor, transport: Box<dyn Transport>) -> Self {
        let parser = ResponseParser::from_descriptor(&descriptor);
        Self {
            inner: Arc::new(Inner {
                device_id: descriptor.device_id.clone(),
                name: descriptor.name.clone(),
                descriptor: RwLock::new(descriptor),
                transport,
                parser,
                state: RwLock::new(DeviceState::new()),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                connected: AtomicBool::new(false),
                connecting: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                pending: Mutex::new(None),
                listen_task: Mutex::new(None),
                reconnect_task: Mutex::new(None),
                poll_task: Mutex::new(None),
            }),
        }
    }

    /// The device id
    pub fn device_id(&self) -> &Id {
        &self.inner.device_id
    }

    /// The device display name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the transport is currently connected
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Snapshot of the current device state
    pub async fn device_state(&self) -> DeviceState {
        self.inner.state.read().await.clone()
    }

    /// Snapshot of the descriptor
    pub async fn descriptor(&self) -> DeviceDescriptor {
        self.inner.descriptor.read().await.clone()
    }

    /// Replace the matrix I/O lists
    ///
    /// The only descriptor mutation allowed after construction; commands
    /// and patterns stay fixed for the coordinator's lifetime.
    pub async fn set_matrix_io(&self, inputs: Vec<MatrixInput>, outputs: Vec<MatrixOutput>) {
        let mut descriptor = self.inner.descriptor.write().await;
        descriptor.matrix_inputs = inputs;
        descriptor.matrix_outputs = outputs;
    }

    /// Register a state listener
    ///
    /// The listener is invoked with `(state_key, value)` for every state
    /// change, including the synthetic "connected" key on lifecycle
    /// transitions.
    pub fn subscribe<F>(&self, listener: F) -> StateSubscription
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.listeners).push((id, Arc::new(listener)));
        StateSubscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Connect to the device
    ///
    /// Returns whether the device is connected afterwards. Already being
    /// connected is success; a connect failure schedules background
    /// reconnect attempts at the descriptor's reconnect interval.
    pub async fn connect(&self) -> bool {
        establish(&self.inner).await
    }

    /// Disconnect and stop all background tasks
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        inner.shutdown.store(true, Ordering::SeqCst);

        for slot in [&inner.listen_task, &inner.reconnect_task, &inner.poll_task] {
            if let Some(task) = lock(slot).take() {
                task.abort();
            }
        }
        // Unblock anyone waiting on a reply
        lock(&inner.pending).take();

        inner.transport.disconnect().await;
        inner.connected.store(false, Ordering::SeqCst);
        {
            let mut state = inner.state.write().await;
            state.connected = false;
            state.last_updated = Some(Utc::now());
        }
        notify(inner, "connected", &Value::Bool(false));
        info!("Disconnected from {}", inner.name);
    }

    /// Send a stored command by id
    ///
    /// With `wait_for_reply`, returns the next inbound line (or `None` on
    /// timeout). Encoding failures are logged and swallowed; transport
    /// failures are returned.
    pub async fn send_command(
        &self,
        command_id: &str,
        wait_for_reply: bool,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let command = self
            .inner
            .descriptor
            .read()
            .await
            .command(command_id)
            .cloned()
            .ok_or_else(|| DeviceError::CommandNotFound(command_id.to_string()))?;
        transmit(&self.inner, &command, wait_for_reply, timeout).await
    }

    /// Send an ad-hoc payload through the normal encoding path
    pub async fn send_raw(
        &self,
        payload: &str,
        format: CommandFormat,
        line_ending: LineEnding,
        wait_for_reply: bool,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let command = Command::raw(payload, format, line_ending);
        transmit(&self.inner, &command, wait_for_reply, timeout).await
    }

    /// Issue every query command once to refresh the state snapshot
    ///
    /// Per-command failures are logged and do not stop the remaining
    /// queries.
    pub async fn query_state(&self) {
        let commands: Vec<Command> = self
            .inner
            .descriptor
            .read()
            .await
            .query_commands()
            .cloned()
            .collect();

        for command in commands {
            if let Err(err) =
                transmit(&self.inner, &command, true, DEFAULT_REPLY_TIMEOUT).await
            {
                error!(
                    "Query {} on {} failed: {}",
                    command.command_id, self.inner.name, err
                );
            }
        }
    }

    /// Start the poll loop
    ///
    /// Every `tick`, each query command with a positive `poll_interval` is
    /// reissued while connected. Calling again while a loop is running is
    /// a no-op.
    pub fn start_polling(&self, tick: Duration) {
        let mut slot = lock(&self.inner.poll_task);
        if let Some(task) = slot.as_ref() {
            if !task.is_finished() {
                return;
            }
        }

        let inner = Arc::clone(&self.inner);
        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await; // immediate first tick

            loop {
                interval.tick().await;
                if inner.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                if !inner.connected.load(Ordering::SeqCst) {
                    continue;
                }

                let commands: Vec<Command> = inner
                    .descriptor
                    .read()
                    .await
                    .query_commands()
                    .filter(|c| c.poll_interval > 0.0)
                    .cloned()
                    .collect();

                for command in commands {
                    if let Err(err) =
                        transmit(&inner, &command, true, DEFAULT_REPLY_TIMEOUT).await
                    {
                        warn!(
                            "Poll {} on {} failed: {}",
                            command.command_id, inner.name, err
                        );
                    }
                }
            }
        }));
    }
}

/// Connect the transport and start the listen loop
async fn establish(inner: &Arc<Inner>) -> bool {
    if inner.connected.load(Ordering::SeqCst) {
        return true;
    }
    if inner.connecting.swap(true, Ordering::SeqCst) {
        // Another task is already connecting
        return inner.connected.load(Ordering::SeqCst);
    }
    inner.shutdown.store(false, Ordering::SeqCst);

    let result = inner.transport.connect().await;
    let connected = match result {
        Ok(channel) => {
            inner.connected.store(true, Ordering::SeqCst);
            {
                let mut state = inner.state.write().await;
                state.connected = true;
                state.last_updated = Some(Utc::now());
            }
            notify(inner, "connected", &Value::Bool(true));
            if let Some(rx) = channel {
                spawn_listener(inner, rx);
            }
            info!("Connected to {}", inner.name);
            true
        }
        Err(err) => {
            error!("Failed to connect to {}: {}", inner.name, err);
            schedule_reconnect(inner);
            false
        }
    };

    inner.connecting.store(false, Ordering::SeqCst);
    connected
}

/// Consume inbound chunks until the transport closes the channel
fn spawn_listener(inner: &Arc<Inner>, mut rx: mpsc::Receiver<Bytes>) {
    let task_inner = Arc::clone(inner);
    let handle = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            dispatch(&task_inner, &chunk).await;
        }
        if !task_inner.shutdown.load(Ordering::SeqCst) {
            warn!("Connection to {} lost", task_inner.name);
            mark_disconnected(&task_inner).await;
            schedule_reconnect(&task_inner);
        }
    });
    if let Some(old) = lock(&inner.listen_task).replace(handle) {
        old.abort();
    }
}

async fn mark_disconnected(inner: &Arc<Inner>) {
    inner.connected.store(false, Ordering::SeqCst);
    {
        let mut state = inner.state.write().await;
        state.connected = false;
        state.last_updated = Some(Utc::now());
    }
    // Drop the pending sender so a blocked waiter returns now
    lock(&inner.pending).take();
    notify(inner, "connected", &Value::Bool(false));
}

/// Retry connecting at the descriptor's reconnect interval
fn schedule_reconnect(inner: &Arc<Inner>) {
    if inner.shutdown.load(Ordering::SeqCst) {
        return;
    }
    let mut slot = lock(&inner.reconnect_task);
    if let Some(task) = slot.as_ref() {
        if !task.is_finished() {
            return;
        }
    }

    let task_inner = Arc::clone(inner);
    *slot = Some(tokio::spawn(async move {
        loop {
            let interval = task_inner
                .descriptor
                .read()
                .await
                .transport
                .reconnect_interval();
            tokio::time::sleep(interval).await;
            if task_inner.shutdown.load(Ordering::SeqCst) {
                break;
            }
            info!("Attempting to reconnect to {}", task_inner.name);
            if establish(&task_inner).await {
                break;
            }
        }
    }));
}

/// Process an inbound chunk: resolve the pending reply, parse state
async fn dispatch(inner: &Arc<Inner>, chunk: &[u8]) {
    let text = String::from_utf8_lossy(chunk);
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        debug!("Received from {}: {}", inner.name, line);

        {
            let mut state = inner.state.write().await;
            state.last_response = line.to_string();
            state.last_updated = Some(Utc::now());
        }

        if let Some(tx) = lock(&inner.pending).take() {
            let _ = tx.send(line.to_string());
        }

        for (key, raw) in inner.parser.parse(line) {
            let value = inner.state.write().await.update(&key, &raw);
            notify(inner, &key, &value);
        }
    }
}

/// Encode and send one command, optionally waiting for the reply
async fn transmit(
    inner: &Arc<Inner>,
    command: &Command,
    wait_for_reply: bool,
    timeout: Duration,
) -> Result<Option<String>> {
    if !inner.connected.load(Ordering::SeqCst) && !establish(inner).await {
        return Err(DeviceError::Connection(format!(
            "Cannot connect to {}",
            inner.name
        )));
    }

    let payload = match codec::encode_command(command) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(
                "Failed to encode command {} for {}: {}",
                command.command_id, inner.name, err
            );
            return Ok(None);
        }
    };

    let receiver = if wait_for_reply {
        let (tx, rx) = oneshot::channel();
        // A newer waiter takes over the slot
        lock(&inner.pending).replace(tx);
        Some(rx)
    } else {
        None
    };

    debug!("Sending {} to {}", command.command_id, inner.name);
    let inline = match inner
        .transport
        .send(&payload, wait_for_reply.then_some(timeout))
        .await
    {
        Ok(inline) => inline,
        Err(err) => {
            lock(&inner.pending).take();
            return Err(err);
        }
    };

    // Request/reply transports hand the reply back inline; route it
    // through the same path as pushed data
    if let Some(chunk) = inline {
        dispatch(inner, &chunk).await;
    }

    let mut reply = None;
    if let Some(rx) = receiver {
        reply = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(line)) => Some(line),
            // Sender dropped: disconnected or displaced by a newer waiter
            Ok(Err(_)) => None,
            Err(_) => {
                warn!(
                    "No reply to {} from {} within {:?}",
                    command.command_id, inner.name, timeout
                );
                None
            }
        };
        lock(&inner.pending).take();
    }

    Ok(reply)
}

/// Deliver a state change to every listener
fn notify(inner: &Inner, key: &str, value: &Value) {
    let listeners: Vec<Listener> = lock(&inner.listeners)
        .iter()
        .map(|(_, listener)| Arc::clone(listener))
        .collect();

    for listener in listeners {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| listener(key, value)));
        if outcome.is_err() {
            warn!("State listener for {} panicked on key {}", inner.name, key);
        }
    }
}

//! In-memory protocol engine.
//!
//! Used by the integration tests and by the binary when no native engine is
//! linked. It keeps the profile in memory, validates inputs the way the real
//! protocol does and raises callbacks on `iterate`, but never touches the
//! overlay network. A shared [`StubProbe`] scripts its behaviour and records
//! what the session did with it.

mod save;

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tern_core::{
    BootstrapError, BootstrapNode, ConnectionStatus, ContactInfo, EngineEvent, EngineFactory,
    EngineOperationError, EngineResult, EngineStartError, FileKind, MAX_MESSAGE_LENGTH,
    MAX_NAME_LENGTH, MAX_REQUEST_MESSAGE_LENGTH, MAX_STATUS_MESSAGE_LENGTH, MessageType,
    ProtocolEngine, ProxyType, PublicKey, SaveOptions, ToxId, UserStatus,
};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tracing::debug;

use self::save::StubProfile;

/// Interval reported when nothing was scripted.
pub const DEFAULT_ITERATION_INTERVAL: Duration = Duration::from_millis(50);
/// How long the factory waits for a proxy to accept a TCP connection.
pub const DEFAULT_PROXY_TIMEOUT: Duration = Duration::from_secs(2);
/// Largest chunk moved per file callback.
pub const MAX_FILE_CHUNK: usize = 1371;
/// Longest file name accepted by `send_file`.
pub const MAX_FILE_NAME_LENGTH: usize = 255;

#[derive(Debug, Default)]
struct ProbeState {
    intervals: VecDeque<Duration>,
    default_interval: Option<Duration>,
    unreachable: HashSet<String>,
    unreachable_proxies: HashSet<String>,
    pending_events: Vec<EngineEvent>,
    pending_offers: Vec<FileOffer>,
    fail_iterate: bool,
    bootstraps: Vec<BootstrapNode>,
    iterations: Vec<Instant>,
    names: Vec<String>,
    shutdowns: usize,
    engines_created: usize,
}

#[derive(Debug, Clone)]
struct FileOffer {
    from: PublicKey,
    kind: FileKind,
    size: u64,
    name: String,
}

/// Shared control and observation point for stub engines.
///
/// Every engine built by one [`StubEngineFactory`] reports to the same probe,
/// so a test can follow a profile across restarts.
#[derive(Debug, Clone, Default)]
pub struct StubProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl StubProbe {
    /// Probe with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().expect("stub probe mutex poisoned")
    }

    /// Interval reported once the scripted queue is empty.
    pub fn set_interval(&self, interval: Duration) {
        self.lock().default_interval = Some(interval);
    }

    /// Intervals reported by the next queries, one per query.
    pub fn queue_intervals(&self, intervals: impl IntoIterator<Item = Duration>) {
        self.lock().intervals.extend(intervals);
    }

    /// Make bootstrapping through `host` fail.
    pub fn mark_unreachable(&self, host: &str) {
        self.lock().unreachable.insert(host.to_string());
    }

    /// Undo [`StubProbe::mark_unreachable`].
    pub fn mark_reachable(&self, host: &str) {
        self.lock().unreachable.remove(host);
    }

    /// Make proxy checks against `host` report the proxy as not found
    /// without connecting.
    pub fn mark_proxy_unreachable(&self, host: &str) {
        self.lock().unreachable_proxies.insert(host.to_string());
    }

    /// Raise `event` from the next `iterate`.
    pub fn inject(&self, event: EngineEvent) {
        self.lock().pending_events.push(event);
    }

    /// Have `from` offer us a file on the next `iterate`.
    pub fn offer_file(&self, from: PublicKey, kind: FileKind, size: u64, name: &str) {
        self.lock().pending_offers.push(FileOffer {
            from,
            kind,
            size,
            name: name.to_string(),
        });
    }

    /// Make `iterate` fail until cleared.
    pub fn set_fail_iterate(&self, fail: bool) {
        self.lock().fail_iterate = fail;
    }

    /// Every bootstrap attempt so far, in order.
    #[must_use]
    pub fn bootstraps(&self) -> Vec<BootstrapNode> {
        self.lock().bootstraps.clone()
    }

    /// When each `iterate` ran.
    #[must_use]
    pub fn iterations(&self) -> Vec<Instant> {
        self.lock().iterations.clone()
    }

    /// Names applied through `set_name`, in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.lock().names.clone()
    }

    /// Engines shut down so far.
    #[must_use]
    pub fn shutdowns(&self) -> usize {
        self.lock().shutdowns
    }

    /// Engines built so far, throwaway probe engines included.
    #[must_use]
    pub fn engines_created(&self) -> usize {
        self.lock().engines_created
    }
}

/// Builds [`StubEngine`]s, validating proxy settings first.
#[derive(Debug, Clone)]
pub struct StubEngineFactory {
    probe: StubProbe,
    proxy_timeout: Duration,
}

impl StubEngineFactory {
    /// Factory reporting to `probe`.
    #[must_use]
    pub const fn new(probe: StubProbe) -> Self {
        Self {
            probe,
            proxy_timeout: DEFAULT_PROXY_TIMEOUT,
        }
    }

    /// Override how long proxy reachability checks may take.
    #[must_use]
    pub const fn with_proxy_timeout(mut self, proxy_timeout: Duration) -> Self {
        self.proxy_timeout = proxy_timeout;
        self
    }

    /// Probe shared by every engine this factory builds.
    #[must_use]
    pub const fn probe(&self) -> &StubProbe {
        &self.probe
    }

    async fn check_proxy(&self, options: &SaveOptions) -> Result<(), EngineStartError> {
        if !options.proxy_type.is_active() {
            return Ok(());
        }
        let host = options.proxy_address.trim();
        if !is_valid_proxy_host(host) {
            return Err(EngineStartError::BadProxyHost {
                host: host.to_string(),
            });
        }
        if options.proxy_port == 0 {
            return Err(EngineStartError::BadProxyPort {
                port: options.proxy_port,
            });
        }

        let not_found = || EngineStartError::ProxyNotFound {
            host: host.to_string(),
            port: options.proxy_port,
        };
        if self.probe.lock().unreachable_proxies.contains(host) {
            debug!(host, port = options.proxy_port, "proxy marked unreachable");
            return Err(not_found());
        }
        match timeout(
            self.proxy_timeout,
            TcpStream::connect((host, options.proxy_port)),
        )
        .await
        {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(error)) => {
                debug!(host, port = options.proxy_port, error = %error, "proxy connect failed");
                Err(not_found())
            }
            Err(_) => {
                debug!(host, port = options.proxy_port, "proxy connect timed out");
                Err(not_found())
            }
        }
    }
}

#[async_trait]
impl EngineFactory for StubEngineFactory {
    async fn create(
        &self,
        options: &SaveOptions,
    ) -> Result<Box<dyn ProtocolEngine>, EngineStartError> {
        self.check_proxy(options).await?;
        let profile = match &options.save_data {
            Some(blob) => StubProfile::decode(blob)?,
            None => StubProfile::generate(),
        };
        self.probe.lock().engines_created += 1;
        debug!(
            public_key = ?profile.public_key,
            udp = options.udp_enabled,
            proxy = ?options.proxy_type,
            "stub engine created"
        );
        Ok(Box::new(StubEngine::new(
            self.probe.clone(),
            profile,
            options.udp_enabled,
            options.proxy_type,
        )))
    }
}

/// IPv4 literals must parse; anything else must look like a DNS name.
fn is_valid_proxy_host(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return host.parse::<Ipv4Addr>().is_ok();
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone)]
struct Transfer {
    direction: Direction,
    size: u64,
    position: u64,
}

/// Engine that keeps all state in memory.
#[derive(Debug)]
pub struct StubEngine {
    probe: StubProbe,
    profile: StubProfile,
    udp_enabled: bool,
    proxy_type: ProxyType,
    bootstrapped: bool,
    connection: ConnectionStatus,
    events: Vec<EngineEvent>,
    transfers: HashMap<(PublicKey, u32), Transfer>,
    next_file_number: u32,
    next_message_id: u32,
}

impl StubEngine {
    fn new(
        probe: StubProbe,
        profile: StubProfile,
        udp_enabled: bool,
        proxy_type: ProxyType,
    ) -> Self {
        Self {
            probe,
            profile,
            udp_enabled,
            proxy_type,
            bootstrapped: false,
            connection: ConnectionStatus::None,
            events: Vec::new(),
            transfers: HashMap::new(),
            next_file_number: 0,
            next_message_id: 1,
        }
    }

    fn require_contact(&self, public_key: &PublicKey) -> EngineResult<()> {
        match self.profile.contact(public_key) {
            Some(_) => Ok(()),
            None => Err(EngineOperationError::UnknownContact {
                public_key: *public_key,
            }),
        }
    }

    fn require_new_contact(&self, public_key: &PublicKey) -> EngineResult<()> {
        if *public_key == self.profile.public_key {
            return Err(EngineOperationError::OwnKey);
        }
        if self.profile.contact(public_key).is_some() {
            return Err(EngineOperationError::ContactExists {
                public_key: *public_key,
            });
        }
        Ok(())
    }

    fn insert_contact(&mut self, public_key: PublicKey) {
        self.profile.contacts.push(ContactInfo {
            public_key,
            name: String::new(),
            status_message: String::new(),
            status: UserStatus::None,
        });
    }

    fn allocate_file_number(&mut self) -> u32 {
        let number = self.next_file_number;
        self.next_file_number = self.next_file_number.wrapping_add(1);
        number
    }

    fn request_chunk(&mut self, public_key: PublicKey, file_number: u32, transfer: &Transfer) {
        let remaining = transfer.size - transfer.position;
        let length = usize::try_from(remaining).map_or(MAX_FILE_CHUNK, |left| left.min(MAX_FILE_CHUNK));
        self.events.push(EngineEvent::FileChunkRequested {
            public_key,
            file_number,
            position: transfer.position,
            length,
        });
    }

    fn deliver_incoming(&mut self, public_key: PublicKey, file_number: u32, size: u64) {
        let mut position = 0;
        while position < size {
            let left = usize::try_from(size - position).unwrap_or(MAX_FILE_CHUNK);
            let length = left.min(MAX_FILE_CHUNK);
            self.events.push(EngineEvent::FileChunkReceived {
                public_key,
                file_number,
                position,
                data: vec![0; length],
            });
            position += length as u64;
        }
        self.events.push(EngineEvent::FileChunkReceived {
            public_key,
            file_number,
            position: size,
            data: Vec::new(),
        });
    }

    fn apply_injected(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::SelfConnectionChanged { status } => {
                self.connection = *status;
                if *status == ConnectionStatus::None {
                    self.bootstrapped = false;
                }
            }
            EngineEvent::ContactNameChanged { public_key, name } => {
                if let Some(contact) = self.contact_mut(public_key) {
                    contact.name.clone_from(name);
                }
            }
            EngineEvent::ContactStatusMessageChanged {
                public_key,
                status_message,
            } => {
                if let Some(contact) = self.contact_mut(public_key) {
                    contact.status_message.clone_from(status_message);
                }
            }
            EngineEvent::ContactStatusChanged { public_key, status } => {
                if let Some(contact) = self.contact_mut(public_key) {
                    contact.status = *status;
                }
            }
            _ => {}
        }
    }

    fn contact_mut(&mut self, public_key: &PublicKey) -> Option<&mut ContactInfo> {
        self.profile
            .contacts
            .iter_mut()
            .find(|contact| contact.public_key == *public_key)
    }
}

fn check_length(field: &'static str, value: &str, max: usize) -> EngineResult<()> {
    if value.len() > max {
        return Err(EngineOperationError::TooLong {
            field,
            max,
            actual: value.len(),
        });
    }
    Ok(())
}

#[async_trait]
impl ProtocolEngine for StubEngine {
    fn iteration_interval(&self) -> Duration {
        let mut state = self.probe.lock();
        state
            .intervals
            .pop_front()
            .or(state.default_interval)
            .unwrap_or(DEFAULT_ITERATION_INTERVAL)
    }

    fn tox_id(&self) -> ToxId {
        ToxId::new(self.profile.public_key, self.profile.nospam)
    }

    fn public_key(&self) -> PublicKey {
        self.profile.public_key
    }

    fn save_data(&self) -> Vec<u8> {
        self.profile.encode()
    }

    fn contacts(&self) -> Vec<ContactInfo> {
        self.profile.contacts.clone()
    }

    fn name(&self) -> String {
        self.profile.name.clone()
    }

    fn status_message(&self) -> String {
        self.profile.status_message.clone()
    }

    async fn iterate(&mut self) -> EngineResult<()> {
        let (fail, injected, offers) = {
            let mut state = self.probe.lock();
            state.iterations.push(Instant::now());
            (
                state.fail_iterate,
                std::mem::take(&mut state.pending_events),
                std::mem::take(&mut state.pending_offers),
            )
        };
        if fail {
            return Err(EngineOperationError::Native {
                message: "scripted iterate failure".to_string(),
            });
        }

        if self.bootstrapped && self.connection == ConnectionStatus::None {
            self.connection = if self.udp_enabled && !self.proxy_type.is_active() {
                ConnectionStatus::Udp
            } else {
                ConnectionStatus::Tcp
            };
            self.events.push(EngineEvent::SelfConnectionChanged {
                status: self.connection,
            });
        }

        for event in injected {
            self.apply_injected(&event);
            self.events.push(event);
        }

        for offer in offers {
            let file_number = self.allocate_file_number();
            self.transfers.insert(
                (offer.from, file_number),
                Transfer {
                    direction: Direction::Incoming,
                    size: offer.size,
                    position: 0,
                },
            );
            self.events.push(EngineEvent::FileOffered {
                public_key: offer.from,
                file_number,
                kind: offer.kind,
                size: offer.size,
                name: offer.name,
            });
        }
        Ok(())
    }

    async fn bootstrap(&mut self, node: &BootstrapNode) -> Result<(), BootstrapError> {
        {
            let mut state = self.probe.lock();
            state.bootstraps.push(node.clone());
            if state.unreachable.contains(&node.host) {
                return Err(BootstrapError::HostUnreachable {
                    host: node.host.clone(),
                    port: node.port,
                });
            }
        }
        self.bootstrapped = true;
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    async fn set_name(&mut self, name: &str) -> EngineResult<()> {
        check_length("name", name, MAX_NAME_LENGTH)?;
        self.profile.name = name.to_string();
        self.probe.lock().names.push(name.to_string());
        Ok(())
    }

    async fn set_status_message(&mut self, status_message: &str) -> EngineResult<()> {
        check_length("status_message", status_message, MAX_STATUS_MESSAGE_LENGTH)?;
        self.profile.status_message = status_message.to_string();
        Ok(())
    }

    async fn set_status(&mut self, status: UserStatus) -> EngineResult<()> {
        self.profile.status = status;
        Ok(())
    }

    async fn add_contact(&mut self, tox_id: &ToxId, message: &str) -> EngineResult<()> {
        let public_key = tox_id.public_key();
        self.require_new_contact(&public_key)?;
        if message.is_empty() {
            return Err(EngineOperationError::EmptyMessage);
        }
        check_length("request_message", message, MAX_REQUEST_MESSAGE_LENGTH)?;
        self.insert_contact(public_key);
        Ok(())
    }

    async fn accept_friend_request(&mut self, public_key: &PublicKey) -> EngineResult<()> {
        self.require_new_contact(public_key)?;
        self.insert_contact(*public_key);
        Ok(())
    }

    async fn delete_contact(&mut self, public_key: &PublicKey) -> EngineResult<()> {
        self.require_contact(public_key)?;
        self.profile
            .contacts
            .retain(|contact| contact.public_key != *public_key);
        self.transfers.retain(|(owner, _), _| owner != public_key);
        Ok(())
    }

    async fn send_message(
        &mut self,
        public_key: &PublicKey,
        text: &str,
        kind: MessageType,
    ) -> EngineResult<u32> {
        self.require_contact(public_key)?;
        if text.is_empty() {
            return Err(EngineOperationError::EmptyMessage);
        }
        check_length("message", text, MAX_MESSAGE_LENGTH)?;
        let message_id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);
        debug!(?kind, message_id, "stub message queued");
        Ok(message_id)
    }

    async fn set_typing(&mut self, public_key: &PublicKey, typing: bool) -> EngineResult<()> {
        self.require_contact(public_key)?;
        debug!(typing, "stub typing indicator");
        Ok(())
    }

    async fn start_file_transfer(
        &mut self,
        public_key: &PublicKey,
        file_number: u32,
    ) -> EngineResult<()> {
        let key = (*public_key, file_number);
        let Some(transfer) = self.transfers.get(&key).cloned() else {
            return Err(EngineOperationError::FileNotFound {
                public_key: *public_key,
                file_number,
            });
        };
        if transfer.direction == Direction::Incoming {
            self.transfers.remove(&key);
            self.deliver_incoming(*public_key, file_number, transfer.size);
        }
        Ok(())
    }

    async fn stop_file_transfer(
        &mut self,
        public_key: &PublicKey,
        file_number: u32,
    ) -> EngineResult<()> {
        match self.transfers.remove(&(*public_key, file_number)) {
            Some(_) => Ok(()),
            None => Err(EngineOperationError::FileNotFound {
                public_key: *public_key,
                file_number,
            }),
        }
    }

    async fn send_file(
        &mut self,
        public_key: &PublicKey,
        kind: FileKind,
        size: u64,
        name: &str,
    ) -> EngineResult<u32> {
        self.require_contact(public_key)?;
        check_length("file_name", name, MAX_FILE_NAME_LENGTH)?;
        let file_number = self.allocate_file_number();
        let transfer = Transfer {
            direction: Direction::Outgoing,
            size,
            position: 0,
        };
        debug!(?kind, file_number, size, "stub file offered");
        self.request_chunk(*public_key, file_number, &transfer);
        if size > 0 {
            self.transfers.insert((*public_key, file_number), transfer);
        }
        Ok(file_number)
    }

    async fn send_file_chunk(
        &mut self,
        public_key: &PublicKey,
        file_number: u32,
        position: u64,
        data: &[u8],
    ) -> EngineResult<()> {
        let key = (*public_key, file_number);
        let Some(transfer) = self.transfers.get_mut(&key) else {
            return Err(EngineOperationError::FileNotFound {
                public_key: *public_key,
                file_number,
            });
        };
        if transfer.direction != Direction::Outgoing || position != transfer.position {
            return Err(EngineOperationError::InvalidPosition {
                file_number,
                position,
            });
        }
        if data.len() > MAX_FILE_CHUNK || position + data.len() as u64 > transfer.size {
            return Err(EngineOperationError::TooLong {
                field: "file_chunk",
                max: MAX_FILE_CHUNK,
                actual: data.len(),
            });
        }

        transfer.position += data.len() as u64;
        let snapshot = transfer.clone();
        if snapshot.position >= snapshot.size {
            self.transfers.remove(&key);
        }
        self.request_chunk(*public_key, file_number, &snapshot);
        Ok(())
    }

    async fn end_call(&mut self, public_key: &PublicKey) -> EngineResult<()> {
        self.require_contact(public_key)?;
        self.events.push(EngineEvent::CallEnded {
            public_key: *public_key,
        });
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.probe.lock().shutdowns += 1;
        debug!("stub engine shut down");
    }
}

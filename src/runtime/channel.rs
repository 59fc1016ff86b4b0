use std::sync::{Arc, PoisonError, RwLock};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::{
    ChainError, Result, ShareLock,
    common::BroadcastQueue,
    events::{Event, Log, Message},
    runtime::ExecuteId,
};

macro_rules! dispatch_event {
    ($handles:expr, $(&$item:ident), +) => {
        let handlers = $handles.read().unwrap_or_else(PoisonError::into_inner).clone();
        for handle in handlers.iter() {
            (handle)($(&$item),+);
        }
    };
}

const EVENT_QUEUE_SIZE: usize = 2048;
const LOG_QUEUE_SIZE: usize = 4096;

pub type RunEventHandle = Arc<dyn Fn(&Event<Message>) + Send + Sync>;
pub type RunLogHandle = Arc<dyn Fn(&Event<Log>) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// use the glob pattern to match the execute id
    /// eg. 0b3f*
    pub execute_id: String,

    /// use the glob pattern to match the node id
    /// eg. confirm*
    pub node_id: String,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            execute_id: "*".to_string(),
            node_id: "*".to_string(),
        }
    }
}

impl ChannelOptions {
    pub fn new(
        execute_id: &str,
        node_id: &str,
    ) -> Self {
        Self {
            execute_id: execute_id.to_string(),
            node_id: node_id.to_string(),
        }
    }

    pub fn with_execute_id(execute_id: &str) -> Self {
        Self::new(execute_id, "*")
    }

    pub fn with_node_id(node_id: &str) -> Self {
        Self::new("*", node_id)
    }
}

/// Event bus of an engine: run/node events and node logs.
///
/// Producers publish into broadcast queues; a listener task fans every
/// message out to the registered handlers.
#[derive(Clone)]
pub struct Channel {
    event_queue: Arc<BroadcastQueue<Event<Message>>>,
    log_queue: Arc<BroadcastQueue<Event<Log>>>,

    events: ShareLock<Vec<RunEventHandle>>,
    logs: ShareLock<Vec<RunLogHandle>>,

    runtime: Handle,
    shutdown: CancellationToken,
}

impl Channel {
    pub(crate) fn new(runtime: Handle) -> Self {
        Self {
            event_queue: BroadcastQueue::new(EVENT_QUEUE_SIZE),
            log_queue: BroadcastQueue::new(LOG_QUEUE_SIZE),
            events: Arc::new(RwLock::new(Vec::new())),
            logs: Arc::new(RwLock::new(Vec::new())),
            runtime,
            shutdown: CancellationToken::new(),
        }
    }

    pub(crate) fn emit(
        &self,
        msg: Message,
    ) {
        // no subscriber is not an error
        let _ = self.event_queue.send(Event::new(&msg));
    }

    pub(crate) fn emit_log(
        &self,
        log: Log,
    ) {
        let _ = self.log_queue.send(Event::new(&log));
    }

    pub(crate) fn listen(&self) {
        let mut event_queue = self.event_queue.subscribe();
        let mut log_queue = self.log_queue.subscribe();
        let events = self.events.clone();
        let logs = self.logs.clone();

        let shutdown = self.shutdown.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    Ok(e) = event_queue.recv() => {
                        dispatch_event!(events, &e);
                    }
                    Ok(log) = log_queue.recv() => {
                        dispatch_event!(logs, &log);
                    }
                }
            }
        });
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn push_event(
        &self,
        handle: RunEventHandle,
    ) {
        self.events.write().unwrap_or_else(PoisonError::into_inner).push(handle);
    }

    fn push_log(
        &self,
        handle: RunLogHandle,
    ) {
        self.logs.write().unwrap_or_else(PoisonError::into_inner).push(handle);
    }
}

/// Filtered subscription to a [`Channel`].
#[derive(Clone)]
pub struct ChannelEvent {
    channel: Arc<Channel>,

    glob: (globset::GlobMatcher, globset::GlobMatcher),
}

impl ChannelEvent {
    pub fn channel(
        channel: Arc<Channel>,
        options: ChannelOptions,
    ) -> Result<Self> {
        let matcher = |pat: &str| globset::Glob::new(pat).map(|g| g.compile_matcher()).map_err(|e| ChainError::Config(format!("invalid channel pattern '{}': {}", pat, e)));
        Ok(Self {
            glob: (matcher(&options.execute_id)?, matcher(&options.node_id)?),
            channel,
        })
    }

    pub fn on_complete(
        &self,
        f: impl Fn(ExecuteId) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.push_event(Arc::new(move |e| {
            if e.event.is_complete() && is_match(&glob, &e.execute_id, &e.node_id) {
                f(e.execute_id.clone());
            }
        }));
    }

    pub fn on_error(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.push_event(Arc::new(move |e| {
            if e.event.is_error() && is_match(&glob, &e.execute_id, &e.node_id) {
                f(e);
            }
        }));
    }

    pub fn on_suspend(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.push_event(Arc::new(move |e| {
            if e.event.is_suspend() && is_match(&glob, &e.execute_id, &e.node_id) {
                f(e);
            }
        }));
    }

    pub fn on_event(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.push_event(Arc::new(move |e| {
            if is_match(&glob, &e.execute_id, &e.node_id) {
                f(e);
            }
        }));
    }

    pub fn on_log(
        &self,
        f: impl Fn(&Event<Log>) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.push_log(Arc::new(move |e| {
            if is_match(&glob, &e.execute_id, &e.node_id) {
                f(e);
            }
        }));
    }
}

fn is_match(
    glob: &(globset::GlobMatcher, globset::GlobMatcher),
    execute_id: &str,
    node_id: &str,
) -> bool {
    let (pat_execute_id, pat_node_id) = glob;
    pat_execute_id.is_match(execute_id) && pat_node_id.is_match(node_id)
}

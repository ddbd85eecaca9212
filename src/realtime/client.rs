use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::message::{ChangePayload, ChannelEvent, PostgresChange, RealtimeMessage, ReplyPayload};
use crate::config::Config;
use crate::error::{Error, Result};

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const SOCKET_BUFFER: usize = 100;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Which table changes to listen for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeParams {
    pub schema: String,
    pub table: String,
    /// Row filter in `column=eq.value` form
    pub filter: Option<String>,
}

impl ChangeParams {
    /// Join payload for the channel.
    ///
    /// Deletes are not delivered to filtered bindings, so a filtered join
    /// also listens to every delete on the table.
    fn to_join_payload(&self, access_token: Option<&str>) -> Value {
        let mut changes = vec![json!({
            "event": "*",
            "schema": self.schema,
            "table": self.table,
        })];
        if let Some(filter) = &self.filter {
            changes[0]["filter"] = json!(filter);
            changes.push(json!({
                "event": "DELETE",
                "schema": self.schema,
                "table": self.table,
            }));
        }

        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": changes,
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = json!(token);
        }
        payload
    }
}

type SocketSender = mpsc::Sender<Message>;
/// A joined channel and the socket it was joined on
struct TopicEntry {
    socket: SocketSender,
    tx: mpsc::UnboundedSender<RealtimeMessage>,
}

type TopicMap = HashMap<String, TopicEntry>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Websocket client for row-change notifications.
///
/// The connection is opened lazily by the first [`subscribe`](Self::subscribe)
/// and shared by every feed. There is no automatic reconnect: when the socket
/// closes every open [`ChangeFeed`] ends and its owner decides what to do.
pub struct RealtimeClient {
    url: String,
    key: String,
    heartbeat_interval: Duration,
    next_ref: Arc<AtomicU32>,
    socket: Arc<Mutex<Option<SocketSender>>>,
    topics: Arc<Mutex<TopicMap>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    connecting: tokio::sync::Mutex<()>,
    state: Arc<RwLock<ConnectionState>>,
    state_change: broadcast::Sender<ConnectionState>,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("url", &self.url)
            .finish()
    }
}

impl RealtimeClient {
    pub fn new(config: &Config, heartbeat_interval: Duration) -> Self {
        let (state_change, _) = broadcast::channel(16);
        Self {
            url: config.base_url(),
            key: config.anon_key.clone(),
            heartbeat_interval,
            next_ref: Arc::new(AtomicU32::new(1)),
            socket: Arc::new(Mutex::new(None)),
            topics: Arc::new(Mutex::new(HashMap::new())),
            reader: Mutex::new(None),
            connecting: tokio::sync::Mutex::new(()),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            state_change,
        }
    }

    /// Receive connection state changes
    pub fn on_state_change(&self) -> broadcast::Receiver<ConnectionState> {
        self.state_change.subscribe()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    fn next_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn websocket_url(&self) -> Result<String> {
        let base = if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else if self.url.starts_with("ws://") || self.url.starts_with("wss://") {
            self.url.clone()
        } else {
            return Err(Error::realtime(format!("Unsupported URL scheme: {}", self.url)));
        };
        Ok(format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            base, self.key
        ))
    }

    async fn set_state(
        state: &RwLock<ConnectionState>,
        state_change: &broadcast::Sender<ConnectionState>,
        next: ConnectionState,
    ) {
        let mut current = state.write().await;
        if *current != next {
            debug!("Realtime state changing from {:?} to {:?}", *current, next);
            *current = next;
            let _ = state_change.send(next);
        }
    }

    fn socket_sender(&self) -> Option<SocketSender> {
        lock(&self.socket).as_ref().filter(|tx| !tx.is_closed()).cloned()
    }

    /// Open the websocket unless it is already open
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connecting.lock().await;
        if self.socket_sender().is_some() {
            return Ok(());
        }

        let ws_url = self.websocket_url()?;
        info!("Connecting to realtime at {}", self.url);
        Self::set_state(&self.state, &self.state_change, ConnectionState::Connecting).await;

        let ws_stream = match connect_async(ws_url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!("Realtime connection failed: {}", e);
                Self::set_state(&self.state, &self.state_change, ConnectionState::Disconnected).await;
                return Err(Error::realtime(format!("WebSocket connection failed: {}", e)));
            }
        };
        Self::set_state(&self.state, &self.state_change, ConnectionState::Connected).await;

        let (mut write, mut read) = ws_stream.split();
        let (socket_tx, mut socket_rx) = mpsc::channel::<Message>(SOCKET_BUFFER);
        *lock(&self.socket) = Some(socket_tx.clone());

        tokio::spawn(async move {
            while let Some(message) = socket_rx.recv().await {
                trace!("Realtime send: {:?}", message);
                let closing = message.is_close();
                if let Err(e) = write.send(message).await {
                    error!("Realtime send failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            debug!("Realtime writer finished");
        });

        let socket = self.socket.clone();
        let topics = self.topics.clone();
        let state = self.state.clone();
        let state_change = self.state_change.clone();
        let next_ref = self.next_ref.clone();
        let heartbeat_interval = self.heartbeat_interval;

        let reader = tokio::spawn(async move {
            let mut heartbeat = interval(heartbeat_interval);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            heartbeat.tick().await;

            loop {
                tokio::select! {
                    incoming = read.next() => match incoming {
                        Some(Ok(Message::Text(text))) => route(&topics, &text),
                        Some(Ok(Message::Close(frame))) => {
                            debug!("Realtime socket closed by server: {:?}", frame);
                            break;
                        }
                        Some(Ok(other)) => trace!("Ignoring realtime frame: {:?}", other),
                        Some(Err(e)) => {
                            error!("Realtime read failed: {}", e);
                            break;
                        }
                        None => break,
                    },
                    _ = heartbeat.tick() => {
                        let message = RealtimeMessage::new(
                            "phoenix",
                            ChannelEvent::Heartbeat,
                            json!({}),
                            Some(next_ref.fetch_add(1, Ordering::SeqCst).to_string()),
                        );
                        if !send_now(&socket_tx, &message) {
                            warn!("Realtime heartbeat could not be queued");
                            break;
                        }
                    }
                }
            }

            if release_connection(&socket, &topics, &socket_tx) {
                Self::set_state(&state, &state_change, ConnectionState::Disconnected).await;
                info!("Realtime connection closed");
            } else {
                debug!("Previous realtime connection closed");
            }
        });
        *lock(&self.reader) = Some(reader);
        Ok(())
    }

    /// Join a channel listening for changes on one table.
    ///
    /// Resolves once the server acknowledged the join.
    pub async fn subscribe(&self, params: ChangeParams, access_token: Option<&str>) -> Result<ChangeFeed> {
        self.connect().await?;
        let socket = self
            .socket_sender()
            .ok_or_else(|| Error::realtime("Realtime socket unavailable"))?;

        let topic = format!("realtime:{}:{}", params.table, uuid::Uuid::new_v4());
        let (tx, mut rx) = mpsc::unbounded_channel();
        lock(&self.topics).insert(
            topic.clone(),
            TopicEntry {
                socket: socket.clone(),
                tx,
            },
        );

        let join_ref = self.next_ref();
        let mut join = RealtimeMessage::new(
            &topic,
            ChannelEvent::PhoenixJoin,
            params.to_join_payload(access_token),
            Some(join_ref.clone()),
        );
        join.join_ref = Some(join_ref.clone());
        debug!("Joining {} for table {}", topic, params.table);

        if let Err(e) = join_channel(&socket, &join, &mut rx).await {
            lock(&self.topics).remove(&topic);
            return Err(e);
        }

        info!("Subscribed to changes on {}", params.table);
        Ok(ChangeFeed {
            topic,
            join_ref,
            rx,
            socket: self.socket.clone(),
            topics: self.topics.clone(),
            next_ref: self.next_ref.clone(),
        })
    }

    /// Close the websocket; open feeds end
    pub async fn disconnect(&self) {
        if let Some(socket) = lock(&self.socket).take() {
            let _ = socket.try_send(Message::Close(None));
        }
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }
        lock(&self.topics).clear();
        Self::set_state(&self.state, &self.state_change, ConnectionState::Disconnected).await;
        info!("Realtime disconnected");
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }
    }
}

/// Forget `own` and every channel joined on it.
///
/// Returns `false` when a newer connection already replaced `own`; that
/// connection and its feeds are left alone. Dropping a feed's sender ends it.
fn release_connection(
    socket: &Mutex<Option<SocketSender>>,
    topics: &Mutex<TopicMap>,
    own: &SocketSender,
) -> bool {
    let current = {
        let mut socket = lock(socket);
        let current = socket.as_ref().map_or(false, |tx| tx.same_channel(own));
        if current {
            socket.take();
        }
        current
    };
    lock(topics).retain(|_, entry| !entry.socket.same_channel(own));
    current
}

fn route(topics: &Mutex<TopicMap>, text: &str) {
    let message = match serde_json::from_str::<RealtimeMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            error!("Failed to parse realtime message: {}. Raw: {}", e, text);
            return;
        }
    };
    trace!("Realtime message on {}: {:?}", message.topic, message.event);

    let mut topics = lock(topics);
    match topics.get(&message.topic) {
        Some(entry) => {
            let topic = message.topic.clone();
            if entry.tx.send(message).is_err() {
                topics.remove(&topic);
            }
        }
        None if message.topic == "phoenix" => trace!("Heartbeat reply"),
        None => debug!("Message for unknown topic {}", message.topic),
    }
}

fn encode(message: &RealtimeMessage) -> Result<Message> {
    Ok(Message::Text(serde_json::to_string(message)?))
}

async fn send(socket: &SocketSender, message: &RealtimeMessage) -> Result<()> {
    socket
        .send(encode(message)?)
        .await
        .map_err(|e| Error::realtime(format!("Failed to send {:?}: {}", message.event, e)))
}

/// Queue a message without waiting for buffer space
fn send_now(socket: &SocketSender, message: &RealtimeMessage) -> bool {
    match encode(message) {
        Ok(frame) => socket.try_send(frame).is_ok(),
        Err(_) => false,
    }
}

async fn wait_for_reply(
    rx: &mut mpsc::UnboundedReceiver<RealtimeMessage>,
    join_ref: &str,
) -> Result<()> {
    while let Some(message) = rx.recv().await {
        if message.event != ChannelEvent::PhoenixReply
            || message.message_ref.as_deref() != Some(join_ref)
        {
            continue;
        }
        let reply: ReplyPayload = serde_json::from_value(message.payload)?;
        if reply.is_ok() {
            return Ok(());
        }
        return Err(Error::realtime(format!(
            "Join rejected ({}): {}",
            reply.status, reply.response
        )));
    }
    Err(Error::realtime("Connection closed while joining"))
}

async fn join_channel(
    socket: &SocketSender,
    join: &RealtimeMessage,
    rx: &mut mpsc::UnboundedReceiver<RealtimeMessage>,
) -> Result<()> {
    send(socket, join).await?;
    let join_ref = join.message_ref.as_deref().unwrap_or_default();
    match timeout(JOIN_TIMEOUT, wait_for_reply(rx, join_ref)).await {
        Ok(result) => result,
        Err(_) => Err(Error::realtime(format!("Timed out joining {}", join.topic))),
    }
}

/// Row changes for one joined channel.
///
/// Dropping the feed leaves the channel.
pub struct ChangeFeed {
    topic: String,
    join_ref: String,
    rx: mpsc::UnboundedReceiver<RealtimeMessage>,
    socket: Arc<Mutex<Option<SocketSender>>>,
    topics: Arc<Mutex<TopicMap>>,
    next_ref: Arc<AtomicU32>,
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed").field("topic", &self.topic).finish()
    }
}

impl ChangeFeed {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next change; `None` once the channel or the connection closed
    pub async fn recv(&mut self) -> Option<Result<PostgresChange>> {
        while let Some(message) = self.rx.recv().await {
            match message.event {
                ChannelEvent::PostgresChanges => {
                    match serde_json::from_value::<ChangePayload>(message.payload) {
                        Ok(payload) => return Some(Ok(payload.data)),
                        Err(e) => warn!("Unreadable change on {}: {}", self.topic, e),
                    }
                }
                ChannelEvent::PhoenixError => {
                    return Some(Err(Error::realtime(format!(
                        "Channel {} failed: {}",
                        self.topic, message.payload
                    ))));
                }
                ChannelEvent::PhoenixClose => {
                    debug!("Channel {} closed by server", self.topic);
                    return None;
                }
                ChannelEvent::System if message.payload["status"] == "error" => {
                    return Some(Err(Error::realtime(format!(
                        "Channel {} error: {}",
                        self.topic, message.payload["message"]
                    ))));
                }
                other => trace!("Ignoring {:?} on {}", other, self.topic),
            }
        }
        None
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        lock(&self.topics).remove(&self.topic);
        let socket = lock(&self.socket).clone();
        if let Some(socket) = socket {
            let mut leave = RealtimeMessage::new(
                &self.topic,
                ChannelEvent::PhoenixLeave,
                json!({}),
                Some(self.next_ref.fetch_add(1, Ordering::SeqCst).to_string()),
            );
            leave.join_ref = Some(self.join_ref.clone());
            if send_now(&socket, &leave) {
                debug!("Left channel {}", self.topic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn params() -> ChangeParams {
        ChangeParams {
            schema: "public".to_string(),
            table: "recipes".to_string(),
            filter: Some("category=eq.Veg".to_string()),
        }
    }

    #[test]
    fn test_join_payload() {
        let payload = params().to_join_payload(Some("jwt"));
        let changes = &payload["config"]["postgres_changes"][0];
        assert_eq!(changes["event"], "*");
        assert_eq!(changes["table"], "recipes");
        assert_eq!(changes["filter"], "category=eq.Veg");
        assert_eq!(payload["access_token"], "jwt");

        let deletes = &payload["config"]["postgres_changes"][1];
        assert_eq!(deletes["event"], "DELETE");
        assert_eq!(deletes["table"], "recipes");
        assert!(deletes.get("filter").is_none());
    }

    #[test]
    fn test_unfiltered_join_has_one_binding() {
        let params = ChangeParams {
            filter: None,
            ..params()
        };
        let payload = params.to_join_payload(None);
        let changes = payload["config"]["postgres_changes"].as_array().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["event"], "*");
        assert!(payload.get("access_token").is_none());
    }

    #[test]
    fn test_stale_reader_keeps_newer_connection() {
        let (old_tx, _old_rx) = mpsc::channel::<Message>(1);
        let (new_tx, _new_rx) = mpsc::channel::<Message>(1);
        let socket = Mutex::new(Some(new_tx.clone()));
        let topics = Mutex::new(TopicMap::new());
        for (topic, tx) in [("realtime:old", &old_tx), ("realtime:new", &new_tx)] {
            let (feed_tx, _) = mpsc::unbounded_channel();
            lock(&topics).insert(
                topic.to_string(),
                TopicEntry {
                    socket: tx.clone(),
                    tx: feed_tx,
                },
            );
        }

        assert!(!release_connection(&socket, &topics, &old_tx));
        assert!(lock(&socket).as_ref().map_or(false, |tx| tx.same_channel(&new_tx)));
        let remaining: Vec<String> = lock(&topics).keys().cloned().collect();
        assert_eq!(remaining, vec!["realtime:new".to_string()]);

        assert!(release_connection(&socket, &topics, &new_tx));
        assert!(lock(&socket).is_none());
        assert!(lock(&topics).is_empty());
    }

    #[test]
    fn test_websocket_url() {
        let config = Config::new("https://abc.supabase.co", "anon").unwrap();
        let client = RealtimeClient::new(&config, Duration::from_secs(30));
        assert_eq!(
            client.websocket_url().unwrap(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[tokio::test]
    async fn test_subscribe_receives_changes_and_leaves_on_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (left_tx, left_rx) = tokio::sync::oneshot::channel::<RealtimeMessage>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let mut left_tx = Some(left_tx);

            while let Some(Ok(frame)) = ws.next().await {
                let Message::Text(text) = frame else { continue };
                let message: RealtimeMessage = serde_json::from_str(&text).unwrap();
                match message.event {
                    ChannelEvent::PhoenixJoin => {
                        let reply = json!({
                            "topic": message.topic,
                            "event": "phx_reply",
                            "payload": { "status": "ok", "response": {} },
                            "ref": message.message_ref,
                        });
                        ws.send(Message::Text(reply.to_string())).await.unwrap();
                        let change = json!({
                            "topic": message.topic,
                            "event": "postgres_changes",
                            "payload": { "data": {
                                "type": "INSERT",
                                "table": "recipes",
                                "record": { "id": "r1", "category": "Veg" }
                            }},
                            "ref": null,
                        });
                        ws.send(Message::Text(change.to_string())).await.unwrap();
                    }
                    ChannelEvent::PhoenixLeave => {
                        if let Some(tx) = left_tx.take() {
                            let _ = tx.send(message);
                        }
                    }
                    _ => {}
                }
            }
        });

        let config = Config::new(&format!("http://{}", addr), "anon").unwrap();
        let client = RealtimeClient::new(&config, Duration::from_secs(30));
        let mut feed = client.subscribe(params(), Some("jwt")).await.unwrap();
        assert_eq!(client.connection_state().await, ConnectionState::Connected);

        let change = feed.recv().await.unwrap().unwrap();
        assert_eq!(change.record["id"], "r1");

        let topic = feed.topic().to_string();
        drop(feed);
        let leave = timeout(Duration::from_secs(5), left_rx).await.unwrap().unwrap();
        assert_eq!(leave.topic, topic);
    }

    #[tokio::test]
    async fn test_subscribe_fails_without_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = Config::new(&format!("http://{}", addr), "anon").unwrap();
        let client = RealtimeClient::new(&config, Duration::from_secs(30));
        assert!(matches!(
            client.subscribe(params(), None).await,
            Err(Error::Realtime(_))
        ));
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
    }
}

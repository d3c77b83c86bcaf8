pub mod error;
pub mod log;
mod sink;
mod source;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

pub use error::BrokerError;
pub use log::TopicLog;
pub use sink::SinkConnector;
pub use source::SourceConnector;

/// Data-директория по умолчанию.
pub const DEFAULT_DATA_DIR: &str = ".data";

/// Ёмкость внутренней fan-out очереди. При заполнении producer-сессии
/// блокируются (back-pressure), очередь не растёт неограниченно.
const FANOUT_QUEUE_CAPACITY: usize = 1024;

/// Ёмкость канала одного consumer'а. Переполнение означает безнадёжно
/// отстающего consumer'а — он удаляется из реестра.
const CONSUMER_BUFFER: usize = 1024;

// ═══════════════════════════════════════════════════════════════
//  Handshake
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Producer,
    Consumer,
}

/// Первая строка новой сессии: `<role>_<topic>`, split по первому `_`.
fn parse_greeting(line: &str) -> Option<(Role, &str)> {
    let (role, topic) = line.split_once('_')?;
    match role {
        "producer" => Some((Role::Producer, topic)),
        "consumer" => Some((Role::Consumer, topic)),
        _ => None,
    }
}

/// Имя topic'а попадает в имя файла verbatim: пустые имена, path-разделители
/// и управляющие символы отклоняются.
fn valid_topic(topic: &str) -> bool {
    !topic.is_empty()
        && topic != "."
        && topic != ".."
        && !topic.contains(['/', '\\'])
        && !topic.chars().any(|c| c.is_control())
}

// ═══════════════════════════════════════════════════════════════
//  Shared broker state
// ═══════════════════════════════════════════════════════════════

struct NewMessage {
    topic: String,
    /// Строка фрейма, включая завершающий `\n`.
    line: String,
    seq: u64,
}

struct ConsumerEntry {
    id: u64,
    /// Фреймы с seq <= min_seq покрыты replay'ем этого consumer'а.
    min_seq: u64,
    tx: mpsc::Sender<String>,
}

/// Счётчик фреймов topic'а. Lock сериализует append + инкремент +
/// постановку в fan-out очередь, поэтому порядок очереди равен порядку
/// файла. Порядок взятия блокировок: appended -> registry.
#[derive(Default)]
struct TopicState {
    appended: Mutex<u64>,
}

struct Shared {
    log: TopicLog,
    registry: Mutex<HashMap<String, Vec<ConsumerEntry>>>,
    topics: Mutex<HashMap<String, Arc<TopicState>>>,
    next_consumer_id: AtomicU64,
    fanout_tx: mpsc::Sender<NewMessage>,
}

impl Shared {
    async fn topic_state(&self, topic: &str) -> Arc<TopicState> {
        let mut topics = self.topics.lock().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(TopicState::default()))
            .clone()
    }

    async fn unregister(&self, topic: &str, id: u64) {
        let mut registry = self.registry.lock().await;
        if let Some(list) = registry.get_mut(topic) {
            list.retain(|e| e.id != id);
            if list.is_empty() {
                registry.remove(topic);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Broker
// ═══════════════════════════════════════════════════════════════

/// Локальный TCP pub/sub broker поверх файловых topic-логов.
///
/// Принимает role-типизированные сессии (producer / consumer), хранит
/// сообщения per-topic как файлы под data-директорией, воспроизводит
/// историю каждому новому consumer'у и раздаёт новые фреймы всем
/// подключённым consumer'ам topic'а.
pub struct Broker {
    addr: String,
    shared: Arc<Shared>,
    fanout_rx: Option<mpsc::Receiver<NewMessage>>,
    token: CancellationToken,
}

impl Broker {
    pub fn new(port: u16, data_dir: impl Into<PathBuf>) -> Self {
        let (fanout_tx, fanout_rx) = mpsc::channel(FANOUT_QUEUE_CAPACITY);
        Self {
            addr: format!("localhost:{port}"),
            shared: Arc::new(Shared {
                log: TopicLog::new(data_dir),
                registry: Mutex::new(HashMap::new()),
                topics: Mutex::new(HashMap::new()),
                next_consumer_id: AtomicU64::new(1),
                fanout_tx,
            }),
            fanout_rx: Some(fanout_rx),
            token: CancellationToken::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.addr
    }

    /// Начать принимать соединения. Возвращается сразу после bind;
    /// accept loop и fan-out работают в фоновых задачах до `stop()`.
    ///
    /// Ошибка bind — единственный фатальный сбой broker'а.
    pub async fn start(&mut self) -> Result<(), BrokerError> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|e| BrokerError::Bind {
                addr: self.addr.clone(),
                source: e,
            })?;
        tracing::info!(addr = %self.addr, "broker listening");

        if let Some(rx) = self.fanout_rx.take() {
            tokio::spawn(fanout_loop(rx, self.shared.clone(), self.token.clone()));
        }

        let shared = self.shared.clone();
        let token = self.token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                tracing::debug!(%peer, "accepted connection");
                                tokio::spawn(handle_connection(stream, shared.clone()));
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "accept error");
                            }
                        }
                    }
                    _ = token.cancelled() => {
                        tracing::info!("broker stopped accepting connections");
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    /// Остановить accept loop и fan-out. Активные сессии не прерываются
    /// принудительно — они завершаются на своих socket-ошибках.
    pub fn stop(&self) {
        self.token.cancel();
    }
}

// ═══════════════════════════════════════════════════════════════
//  Session dispatch
// ═══════════════════════════════════════════════════════════════

async fn handle_connection(stream: TcpStream, shared: Arc<Shared>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".to_string());
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut greeting = String::new();
    match reader.read_line(&mut greeting).await {
        Ok(0) => return,
        Ok(_) => {}
        Err(e) => {
            tracing::error!(%peer, error = %e, "greeting read error");
            return;
        }
    }

    let Some((role, topic)) = parse_greeting(greeting.trim_end_matches(['\r', '\n'])) else {
        tracing::error!(%peer, greeting = %greeting.trim_end(), "unknown client role, closing session");
        return;
    };
    if !valid_topic(topic) {
        tracing::error!(%peer, %topic, "invalid topic name, closing session");
        return;
    }
    let topic = topic.to_string();

    match role {
        Role::Producer => {
            tracing::debug!(%peer, %topic, "producer connected");
            producer_session(reader, topic, shared).await;
        }
        Role::Consumer => {
            tracing::debug!(%peer, %topic, "consumer connected");
            consumer_session(write_half, topic, shared).await;
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Producer session — socket → topic log → fan-out queue
// ═══════════════════════════════════════════════════════════════

async fn producer_session(
    mut reader: BufReader<OwnedReadHalf>,
    topic: String,
    shared: Arc<Shared>,
) {
    if let Err(e) = shared.log.ensure_dir().await {
        tracing::error!(%topic, error = %e, "data dir error, aborting producer");
        return;
    }
    let mut file = match shared.log.open_append(&topic).await {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(%topic, error = %e, "cannot open topic log, aborting producer");
            return;
        }
    };
    let state = shared.topic_state(&topic).await;

    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                tracing::debug!(%topic, "producer disconnected");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(%topic, error = %e, "producer read error");
                return;
            }
        }
        if !line.ends_with('\n') {
            // EOF посреди фрейма — незавершённая строка отбрасывается
            tracing::debug!(%topic, "producer closed mid-frame, discarding partial");
            return;
        }

        let mut appended = state.appended.lock().await;
        if let Err(e) = file.write_all(line.as_bytes()).await {
            tracing::error!(%topic, error = %e, "append error, aborting producer");
            return;
        }
        *appended += 1;
        let seq = *appended;
        // Постановка в очередь под тем же lock'ом: порядок fan-out
        // совпадает с порядком файла
        let queued = shared
            .fanout_tx
            .send(NewMessage {
                topic: topic.clone(),
                line: line.clone(),
                seq,
            })
            .await;
        drop(appended);
        if queued.is_err() {
            tracing::debug!(%topic, "fan-out queue closed, ending producer session");
            return;
        }
        tracing::debug!(%topic, seq, "appended frame");
    }
}

// ═══════════════════════════════════════════════════════════════
//  Consumer session — replay from log, then live frames
// ═══════════════════════════════════════════════════════════════

async fn consumer_session(mut writer: OwnedWriteHalf, topic: String, shared: Arc<Shared>) {
    if let Err(e) = shared.log.ensure_dir().await {
        tracing::error!(%topic, error = %e, "data dir error, aborting consumer");
        return;
    }
    let state = shared.topic_state(&topic).await;

    let (tx, mut rx) = mpsc::channel::<String>(CONSUMER_BUFFER);
    let id = shared.next_consumer_id.fetch_add(1, Ordering::Relaxed);

    // Снимок под lock'ом topic'а: replay покрывает ровно первые
    // `replay_to` фреймов, fan-out доставит только seq > replay_to
    let replay_to = {
        let appended = state.appended.lock().await;
        let mut registry = shared.registry.lock().await;
        registry.entry(topic.clone()).or_default().push(ConsumerEntry {
            id,
            min_seq: *appended,
            tx,
        });
        *appended
    };
    tracing::debug!(%topic, id, replay_to, "consumer registered");

    // scan открывает файл с create-if-missing: attach consumer'а к новому
    // topic'у создаёт его файл, как и attach producer'а
    let mut lines = match shared.log.scan(&topic).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%topic, error = %e, "cannot open topic log, aborting consumer");
            shared.unregister(&topic, id).await;
            return;
        }
    };
    let mut replayed = 0u64;
    while replayed < replay_to {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let mut frame = line.into_bytes();
                frame.push(b'\n');
                if let Err(e) = writer.write_all(&frame).await {
                    tracing::error!(%topic, id, error = %e, "replay write error");
                    shared.unregister(&topic, id).await;
                    return;
                }
                replayed += 1;
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!(%topic, id, error = %e, "replay read error");
                shared.unregister(&topic, id).await;
                return;
            }
        }
    }
    drop(lines);
    tracing::debug!(%topic, id, replayed, "replay complete");

    // Live-фаза: фреймы приходят от fan-out задачи
    while let Some(line) = rx.recv().await {
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            tracing::error!(%topic, id, error = %e, "consumer write error");
            break;
        }
    }
    shared.unregister(&topic, id).await;
    tracing::debug!(%topic, id, "consumer session closed");
}

// ═══════════════════════════════════════════════════════════════
//  Fan-out task — queue → all consumers of the topic
// ═══════════════════════════════════════════════════════════════

async fn fanout_loop(
    mut rx: mpsc::Receiver<NewMessage>,
    shared: Arc<Shared>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                deliver(&shared, &msg).await;
            }
            _ = token.cancelled() => break,
        }
    }
    tracing::debug!("fan-out task stopped");
}

async fn deliver(shared: &Shared, msg: &NewMessage) {
    // Снимок под lock'ом, отправка вне его
    let targets: Vec<(u64, u64, mpsc::Sender<String>)> = {
        let registry = shared.registry.lock().await;
        match registry.get(&msg.topic) {
            Some(list) => list
                .iter()
                .map(|e| (e.id, e.min_seq, e.tx.clone()))
                .collect(),
            None => return,
        }
    };

    let mut dead = Vec::new();
    for (id, min_seq, tx) in targets {
        if msg.seq <= min_seq {
            continue;
        }
        match tx.try_send(msg.line.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(topic = %msg.topic, id, "consumer lagging, removing");
                dead.push(id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
        }
    }

    if !dead.is_empty() {
        let mut registry = shared.registry.lock().await;
        if let Some(list) = registry.get_mut(&msg.topic) {
            list.retain(|e| !dead.contains(&e.id));
            if list.is_empty() {
                registry.remove(&msg.topic);
            }
        }
        tracing::debug!(topic = %msg.topic, removed = dead.len(), "removed dead consumers");
    }
}

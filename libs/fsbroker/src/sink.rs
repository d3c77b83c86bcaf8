use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use pulse_api::ConnectorError;

/// Срок жизни кешированной сессии с момента последнего успешного connect.
const SESSION_TTL: Duration = Duration::from_secs(5 * 60);

// ═══════════════════════════════════════════════════════════════
//  SinkConnector — outbound producer sessions with a TTL cache
// ═══════════════════════════════════════════════════════════════

struct CachedSession {
    stream: TcpStream,
    expires_at: Instant,
}

/// Менеджер исходящих producer-соединений.
///
/// Держит per-topic кеш открытых сессий с дедлайном 5 минут: `connect`
/// до истечения дедлайна переиспользует сессию без повторного dial.
/// Один mutex на кеш — операции по одному topic'у сериализуются.
pub struct SinkConnector {
    broker: String,
    cache: Mutex<HashMap<String, CachedSession>>,
}

impl SinkConnector {
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Обеспечить живую сессию для topic'а: reuse кеша либо новый dial
    /// с отправкой greeting `producer_<topic>`.
    pub async fn connect(&self, topic: &str) -> Result<(), ConnectorError> {
        let mut cache = self.cache.lock().await;

        if let Some(session) = cache.get(topic) {
            if Instant::now() < session.expires_at {
                return Ok(());
            }
            // дедлайн истёк: закрыть протухшую сессию и передоговориться
            if let Some(mut stale) = cache.remove(topic) {
                let _ = stale.stream.shutdown().await;
                tracing::debug!(%topic, "stale sink session evicted");
            }
        }

        let mut stream =
            TcpStream::connect(&self.broker)
                .await
                .map_err(|e| ConnectorError::Unavailable {
                    broker: self.broker.clone(),
                    source: e,
                })?;
        stream
            .write_all(format!("producer_{topic}\n").as_bytes())
            .await?;
        tracing::info!(broker = %self.broker, %topic, "sink connected");

        cache.insert(
            topic.to_string(),
            CachedSession {
                stream,
                expires_at: Instant::now() + SESSION_TTL,
            },
        );
        Ok(())
    }

    /// Записать один фрейм. Требует живой кешированной сессии.
    ///
    /// Один фрейм = одна строка: все байты `\n` вычищаются из payload
    /// до фрейминга, затем добавляется единственный терминатор.
    pub async fn write(&self, topic: &str, payload: &[u8]) -> Result<(), ConnectorError> {
        let mut cache = self.cache.lock().await;
        let Some(session) = cache.get_mut(topic) else {
            return Err(ConnectorError::NotConnected(topic.to_string()));
        };

        let mut frame: Vec<u8> = payload.iter().copied().filter(|&b| b != b'\n').collect();
        frame.push(b'\n');

        if let Err(e) = session.stream.write_all(&frame).await {
            // сессия мертва после первой ошибки записи: новый connect обязателен
            cache.remove(topic);
            tracing::error!(%topic, error = %e, "sink write error, session dropped");
            return Err(ConnectorError::Io(e));
        }
        Ok(())
    }

    /// Закрыть все кешированные сессии. Идемпотентно.
    pub async fn close(&self) {
        let mut cache = self.cache.lock().await;
        for (topic, mut session) in cache.drain() {
            let _ = session.stream.shutdown().await;
            tracing::debug!(%topic, "sink session closed");
        }
    }
}

impl pulse_api::SinkConnector for SinkConnector {
    fn connect(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConnectorError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move { self.connect(&topic).await })
    }

    fn write(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), ConnectorError>> + Send + '_>> {
        let topic = topic.to_string();
        let payload = payload.to_vec();
        Box::pin(async move { self.write(&topic, &payload).await })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.close())
    }
}

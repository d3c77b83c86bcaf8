use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::sink::RecordSink;

// ═══════════════════════════════════════════════════════════════
//  Aggregation — injected operation bundle
// ═══════════════════════════════════════════════════════════════

/// Набор операций, параметризующих агрегатор: извлечь ключ, извлечь
/// сумму, отрендерить результат flush'а в (payload, topic).
pub trait Aggregation: Send + Sync + 'static {
    type Event;

    fn key(&self, event: &Self::Event) -> String;

    fn amount(&self, event: &Self::Event) -> f64;

    fn render(
        &self,
        key: &str,
        window: &str,
        total: f64,
    ) -> Result<(serde_json::Value, String), StreamError>;
}

// ═══════════════════════════════════════════════════════════════
//  MemoryAggregator — time-windowed in-memory sums
// ═══════════════════════════════════════════════════════════════

struct Inner<A: Aggregation> {
    agg: A,
    buffer: Mutex<HashMap<String, f64>>,
    sink: Arc<dyn RecordSink>,
    window: String,
}

/// In-memory агрегатор сумм с периодическим flush'ом.
///
/// `add` накапливает `buffer[key] += amount`; фоновая flush-задача
/// каждые `flush_every` подменяет буфер пустой map'ой и эмитит по одной
/// записи на ключ через sink. Суммы — naive double accumulation, порядок
/// сложений недетерминирован.
pub struct MemoryAggregator<A: Aggregation> {
    inner: Arc<Inner<A>>,
    token: CancellationToken,
}

impl<A: Aggregation> MemoryAggregator<A> {
    /// Создать агрегатор и запустить его flush-задачу.
    pub fn new(agg: A, sink: Arc<dyn RecordSink>, flush_every: Duration) -> Self {
        let token = CancellationToken::new();
        let inner = Arc::new(Inner {
            agg,
            buffer: Mutex::new(HashMap::new()),
            sink,
            window: window_label(flush_every),
        });

        let flush_inner = inner.clone();
        let flush_token = token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(flush_every);
            // первый tick interval'а мгновенный — пропускаем
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => flush_inner.flush_once().await,
                    _ = flush_token.cancelled() => break,
                }
            }
            tracing::debug!("aggregator flush task stopped");
        });

        Self { inner, token }
    }

    /// Учесть событие в текущем окне.
    pub async fn add(&self, event: &A::Event) {
        let key = self.inner.agg.key(event);
        let amount = self.inner.agg.amount(event);
        let mut buffer = self.inner.buffer.lock().await;
        *buffer.entry(key).or_insert(0.0) += amount;
    }

    /// Остановить flush-задачу. Накопленный буфер не эмитится.
    pub fn stop(&self) {
        self.token.cancel();
    }
}

impl<A: Aggregation> Inner<A> {
    async fn flush_once(&self) {
        // подмена буфера под lock'ом, эмиссия — вне его
        let snapshot = {
            let mut buffer = self.buffer.lock().await;
            std::mem::take(&mut *buffer)
        };
        if snapshot.is_empty() {
            return;
        }

        for (key, total) in snapshot {
            // сбой по одному ключу не мешает остальным
            let (payload, topic) = match self.agg.render(&key, &self.window, total) {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(%key, error = %e, "render error, skipping key");
                    continue;
                }
            };
            let data = match serde_json::to_vec(&payload) {
                Ok(d) => d,
                Err(e) => {
                    tracing::error!(%key, error = %e, "serialize error, skipping key");
                    continue;
                }
            };
            if let Err(e) = self.sink.write(&topic, &data).await {
                tracing::error!(%topic, error = %e, "aggregate write error");
            }
        }
    }
}

/// Человекочитаемая метка окна: "10s", "500ms".
fn window_label(d: Duration) -> String {
    if d.as_secs() > 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

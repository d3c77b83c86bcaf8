use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use pulse_api::{FrameHandler, Pulse, SinkConnector, SourceConnector};

use crate::aggregator::MemoryAggregator;
use crate::error::StreamError;
use crate::pulses::{GroupedRecord, PulseAggregation, grouped_topic};
use crate::sink::{RecordSink, StreamSink};

/// Окно агрегации по умолчанию.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

// ═══════════════════════════════════════════════════════════════
//  Options
// ═══════════════════════════════════════════════════════════════

/// Конфигурация pipeline'а: source topic и connector'ы ввода/вывода.
pub struct Options {
    pub source_topic: String,
    pub source: Arc<dyn SourceConnector>,
    pub sink: Arc<dyn SinkConnector>,
    /// Окно агрегации; тесты укорачивают его.
    pub flush_every: Duration,
}

impl Options {
    pub fn new(
        source_topic: impl Into<String>,
        source: Arc<dyn SourceConnector>,
        sink: Arc<dyn SinkConnector>,
    ) -> Self {
        Self {
            source_topic: source_topic.into(),
            source,
            sink,
            flush_every: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Pipeline — source topic → grouped records + windowed aggregates
// ═══════════════════════════════════════════════════════════════

/// Запустить stream pipeline.
///
/// Для каждого входящего pulse'а: (a) обогащённая запись на per-tenant
/// grouped-topic, (b) вклад в оконный агрегат (tenant, SKU, unit).
/// Блокируется в `source.read` и возвращает его терминальную ошибку,
/// предварительно остановив агрегатор.
pub async fn start(opts: Options) -> Result<(), StreamError> {
    let grouped = Arc::new(StreamSink::new(opts.sink.clone()));
    let aggregate: Arc<dyn RecordSink> = Arc::new(StreamSink::new(opts.sink.clone()));
    let aggregator = Arc::new(MemoryAggregator::new(
        PulseAggregation,
        aggregate,
        opts.flush_every,
    ));

    let handler = Arc::new(PulseHandler {
        grouped,
        aggregator: aggregator.clone(),
    });

    tracing::info!(topic = %opts.source_topic, "pipeline started");
    let result = opts.source.read(&opts.source_topic, handler).await;
    aggregator.stop();
    tracing::info!(topic = %opts.source_topic, "pipeline stopped");
    result.map_err(StreamError::from)
}

struct PulseHandler {
    grouped: Arc<StreamSink>,
    aggregator: Arc<MemoryAggregator<PulseAggregation>>,
}

impl PulseHandler {
    async fn route_grouped(&self, pulse: &Pulse) {
        let topic = grouped_topic(&pulse.tenant_id);
        let record = GroupedRecord::from_pulse(pulse);
        let data = match serde_json::to_vec(&record) {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(error = %e, "cannot serialize grouped record");
                return;
            }
        };
        // ошибка записи не останавливает pipeline: сырой фрейм уже
        // сохранён broker'ом и может быть переобработан
        if let Err(e) = self.grouped.write(&topic, &data).await {
            tracing::error!(%topic, error = %e, "grouped write error");
        }
    }
}

impl FrameHandler for PulseHandler {
    fn on_frame(
        &self,
        _topic: &str,
        frame: &[u8],
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let frame = frame.to_vec();
        Box::pin(async move {
            let pulse: Pulse = match serde_json::from_slice(&frame) {
                Ok(p) => p,
                Err(e) => {
                    // сообщение дропается без retry
                    tracing::warn!(error = %e, "bad pulse payload, dropping frame");
                    return;
                }
            };
            self.route_grouped(&pulse).await;
            self.aggregator.add(&pulse).await;
        })
    }
}

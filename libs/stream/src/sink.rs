use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use pulse_api::SinkConnector;

use crate::error::StreamError;

// ═══════════════════════════════════════════════════════════════
//  RecordSink — output port for pipeline stages
// ═══════════════════════════════════════════════════════════════

/// Выходной порт этапов pipeline'а (grouped-записи, агрегаты).
pub trait RecordSink: Send + Sync {
    fn write(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), StreamError>> + Send + '_>>;
}

/// Тонкая обёртка над sink connector'ом: connect перед каждой записью.
///
/// Каждый вызов `write` освежает сессию topic'а (connect переиспользует
/// кеш до истечения дедлайна) — caller'у, пишущему во много топиков,
/// не нужно отслеживать состояние соединений.
pub struct StreamSink {
    connector: Arc<dyn SinkConnector>,
}

impl StreamSink {
    pub fn new(connector: Arc<dyn SinkConnector>) -> Self {
        Self { connector }
    }
}

impl RecordSink for StreamSink {
    fn write(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), StreamError>> + Send + '_>> {
        let topic = topic.to_string();
        let payload = payload.to_vec();
        Box::pin(async move {
            self.connector.connect(&topic).await?;
            self.connector.write(&topic, &payload).await?;
            Ok(())
        })
    }
}

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ConnectorError;

// ════════════════════════════════════════════════════════════════
//  Connector Traits
// ════════════════════════════════════════════════════════════════

/// Исходящая producer-сессия: пишет фреймы в topic.
///
/// Реализация кеширует соединения per-topic; `connect` обязателен перед
/// `write`. Методы возвращают boxed futures — трейт dyn-compatible,
/// реализации клонируют заимствованные аргументы внутрь future.
pub trait SinkConnector: Send + Sync {
    /// Обеспечить живую сессию для topic'а (reuse кеша или новый dial).
    fn connect(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConnectorError>> + Send + '_>>;

    /// Записать один фрейм. Требует предшествующего `connect`.
    fn write(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), ConnectorError>> + Send + '_>>;

    /// Закрыть все кешированные сессии. Идемпотентно.
    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Исходящая consumer-сессия: читает фреймы из topic'а (history + live).
pub trait SourceConnector: Send + Sync {
    /// Подключиться и читать фреймы, вызывая handler для каждого.
    ///
    /// Блокируется до ошибки сессии или `close()`; возвращает
    /// терминальную ошибку.
    fn read(
        &self,
        topic: &str,
        handler: Arc<dyn FrameHandler>,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConnectorError>> + Send + '_>>;

    /// Прервать активный read loop (он вернёт `Closed`).
    fn close(&self);
}

/// Обработчик входящего фрейма.
///
/// Вызывается синхронно per-message на задаче чтения: фреймы из broker'а
/// выстраиваются в очередь позади медленного handler'а.
pub trait FrameHandler: Send + Sync {
    fn on_frame(
        &self,
        topic: &str,
        frame: &[u8],
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

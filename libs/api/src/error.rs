/// Единый тип ошибки для connector-трейтов.
///
/// Все ошибки session-local: caller решает, переподключаться
/// или завершить работу.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Broker недоступен (dial fail) — можно повторить connect позже.
    #[error("broker {broker} unavailable: {source}")]
    Unavailable {
        broker: String,
        source: std::io::Error,
    },

    /// Нет живой сессии для topic'а — требуется connect.
    #[error("not connected to topic '{0}'")]
    NotConnected(String),

    /// Ошибка чтения/записи в открытой сессии — сессия закрыта.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Connector закрыт вызовом close().
    #[error("connector closed")]
    Closed,
}

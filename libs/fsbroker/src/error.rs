/// Ошибки broker'а. Фатальна только `Bind` — все остальные сбои
/// session-local и не покидают задачу сессии.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

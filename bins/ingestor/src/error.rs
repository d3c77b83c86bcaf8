#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config: {0}")]
    Config(String),

    #[error("broker: {0}")]
    Broker(#[from] fsbroker::BrokerError),

    #[error("stream: {0}")]
    Stream(#[from] pulse_stream::StreamError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}

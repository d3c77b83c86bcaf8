use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use pulse_api::{ConnectorError, FrameHandler};

// ═══════════════════════════════════════════════════════════════
//  SourceConnector — subscribe and read history + live frames
// ═══════════════════════════════════════════════════════════════

/// Исходящая consumer-сессия.
///
/// `read` блокируется до ошибки сессии; прервать его можно только
/// вызовом `close()` (токен отменяется, loop возвращает `Closed`).
pub struct SourceConnector {
    broker: String,
    token: CancellationToken,
}

impl SourceConnector {
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            token: CancellationToken::new(),
        }
    }

    /// Подключиться к broker'у, подписаться на topic и вызывать handler
    /// для каждого полученного фрейма (терминатор `\n` отрезан).
    ///
    /// Handler вызывается синхронно per-message: медленный handler
    /// задерживает фреймы в очереди broker'а, а не теряет их.
    pub async fn read(
        &self,
        topic: &str,
        handler: Arc<dyn FrameHandler>,
    ) -> Result<(), ConnectorError> {
        let stream =
            TcpStream::connect(&self.broker)
                .await
                .map_err(|e| ConnectorError::Unavailable {
                    broker: self.broker.clone(),
                    source: e,
                })?;
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(format!("consumer_{topic}\n").as_bytes())
            .await?;
        tracing::info!(broker = %self.broker, %topic, "source connected");

        let mut lines = BufReader::new(read_half).lines();
        loop {
            tokio::select! {
                next = lines.next_line() => {
                    match next? {
                        Some(line) => {
                            handler.on_frame(topic, line.as_bytes()).await;
                            tracing::debug!(%topic, "received frame");
                        }
                        None => {
                            tracing::debug!(%topic, "broker closed the session");
                            return Err(ConnectorError::Io(std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "broker closed the session",
                            )));
                        }
                    }
                }
                _ = self.token.cancelled() => return Err(ConnectorError::Closed),
            }
        }
    }

    /// Прервать активный read loop.
    pub fn close(&self) {
        self.token.cancel();
    }
}

impl pulse_api::SourceConnector for SourceConnector {
    fn read(
        &self,
        topic: &str,
        handler: Arc<dyn FrameHandler>,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConnectorError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move { self.read(&topic, handler).await })
    }

    fn close(&self) {
        self.close();
    }
}

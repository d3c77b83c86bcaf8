use std::sync::Arc;

use fsbroker::{Broker, DEFAULT_DATA_DIR, SinkConnector, SourceConnector};
use pulse_api::ConnectorError;
use pulse_stream::{Options, StreamError};

use crate::cmd::stubs;
use crate::config::Effective;
use crate::error::AppError;

pub async fn run(cfg: Effective) -> Result<(), AppError> {
    tracing::info!(port = cfg.port, topic = %cfg.source_topic, "pulse-ingestor starting");

    // --- Broker ---
    let mut broker = Broker::new(cfg.port, DEFAULT_DATA_DIR);
    broker.start().await?;
    let host = broker.host().to_string();

    // --- Connectors ---
    let source = Arc::new(SourceConnector::new(&host));
    let sink = Arc::new(SinkConnector::new(&host));

    // --- Stub load generator ---
    if cfg.stub {
        let stub_host = host.clone();
        let topic = cfg.source_topic.clone();
        let tenants = cfg.stub_tenants;
        let skus = cfg.stub_skus;
        let clean = cfg.stub_clean;
        tokio::spawn(async move {
            if clean {
                stubs::clean_topics(DEFAULT_DATA_DIR);
            }
            if let Err(e) = stubs::write_random_pulses(&stub_host, &topic, tenants, skus).await {
                tracing::error!(error = %e, "stub generator stopped");
            }
        });
        tracing::info!(tenants = cfg.stub_tenants, skus = cfg.stub_skus, "stub generator enabled");
    }

    // --- Pipeline ---
    let opts = Options::new(cfg.source_topic.clone(), source.clone(), sink.clone());
    let pipeline = tokio::spawn(pulse_stream::start(opts));

    tracing::info!("ingestor ready");

    // --- Ожидание Ctrl+C ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");

    // Прервать чтение pipeline'а, закрыть исходящие сессии, погасить broker
    source.close();
    sink.close().await;
    broker.stop();

    match pipeline.await {
        // close() завершает read loop ошибкой Closed — это штатное выключение
        Ok(Ok(())) | Ok(Err(StreamError::Connector(ConnectorError::Closed))) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "pipeline ended with error"),
        Err(e) => tracing::error!(error = %e, "pipeline task failed"),
    }

    tracing::info!("shutdown complete");
    Ok(())
}

use pulse_api::ConnectorError;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("connector: {0}")]
    Connector(#[from] ConnectorError),

    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Ключ агрегации не разбирается обратно на (tenant, sku, unit).
    #[error("bad aggregation key '{0}'")]
    BadKey(String),
}

pub mod connector;
pub mod error;
pub mod model;
pub mod util;

pub use connector::{FrameHandler, SinkConnector, SourceConnector};
pub use error::ConnectorError;
pub use model::Pulse;
pub use util::now_secs;

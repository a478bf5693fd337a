pub mod config;
pub mod connector;
pub mod connectors;
pub mod error;
pub mod registry;
pub mod sink_runner;
pub mod source_runner;
pub mod transport;

pub use config::{ConnectorDecl, RouteConfig};
pub use connector::{infer_column_types, Column, ColumnType, Connector};
pub use connectors::{CsvConnector, MemoryConnector};
pub use error::{ConfigError, ConnectorError, SourceError, TransportError};
pub use registry::{ConnectorFactory, ConnectorRegistry};
pub use sink_runner::{SinkHandle, SinkRunner};
pub use source_runner::SourceRunner;
pub use transport::{run_route, TransportSummary};

//! Bundled connector implementations. External systems (SQL, SFTP, web
//! APIs) plug in through the same `Connector` trait and a registry entry.

pub mod csv;
pub mod memory;

pub use csv::CsvConnector;
pub use memory::MemoryConnector;

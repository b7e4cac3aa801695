pub mod config;
pub mod connection;
pub mod protocol;

pub use config::{ClientConfig, NodeUri};
pub use connection::{ClientConnection, ConnectionError, ReplyProcessor, TcpClientConnection};

pub mod sink;
pub mod transport;

pub use sink::JsonDirSink;
pub use transport::ReqwestTransport;

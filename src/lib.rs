// Library entrypoint for integration tests and speedtest-cli.
pub mod api;
pub mod byte_stream;
pub mod client;
pub mod client_addr;
pub mod config;
pub mod error;
pub mod ip_info;
pub mod latency;
pub mod records;
pub mod result_store;
pub mod schemas;
pub mod shutdown;
pub mod state;
pub mod storage;
pub mod upload_sink;

pub use api::build_router;
pub use error::SpeedtestError;

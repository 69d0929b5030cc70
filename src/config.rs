//! CLI arguments and server configuration defaults.

use clap::Parser;
use shadow_rs::formatcp;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 0;
pub const DEFAULT_PART_TTL_SECS: u64 = 0;
pub const PART_SWEEP_INTERVAL_SECS: u64 = 900;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "chunk-relay", version = VERSION_INFO, about = "Chunked upload receiver")]
pub struct Args {
    #[arg(
        short = 'd',
        long,
        env = "CHUNK_RELAY_UPLOAD_DIR",
        default_value = DEFAULT_UPLOAD_DIR,
        help = "Directory that receives working and final files"
    )]
    pub upload_dir: String,
    #[arg(
        short = 'b',
        long,
        env = "CHUNK_RELAY_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "CHUNK_RELAY_HTTP_PORT",
        default_value_t = DEFAULT_HTTP_PORT,
        help = "HTTP port"
    )]
    pub http_port: u16,
    #[arg(
        long,
        env = "CHUNK_RELAY_CORS_ORIGINS",
        help = "Comma separated CORS origins"
    )]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "CHUNK_RELAY_MAX_REQUEST_SIZE",
        default_value_t = DEFAULT_MAX_REQUEST_SIZE,
        help = "Max size in bytes of a single chunk request"
    )]
    pub max_request_size: usize,
    #[arg(
        long,
        env = "CHUNK_RELAY_LOCK_TIMEOUT_SECS",
        default_value_t = DEFAULT_LOCK_TIMEOUT_SECS,
        help = "Max seconds to wait for a busy file lock (0 waits forever)"
    )]
    pub lock_timeout_secs: u64,
    #[arg(
        long,
        env = "CHUNK_RELAY_PART_TTL_SECS",
        default_value_t = DEFAULT_PART_TTL_SECS,
        help = "Remove abandoned .part files older than this many seconds (0 to disable)"
    )]
    pub part_ttl_secs: u64,
}

pub mod config;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod socket;

use courtside_shared::clients::db::DbPool;
use courtside_shared::clients::email::EmailClient;
use courtside_shared::clients::media::MediaClient;
use courtside_shared::clients::redis::RedisClient;
use courtside_shared::clients::storage::StorageClient;
use courtside_shared::clients::stripe::StripeClient;
use courtside_shared::middleware::JwtSecretSource;
use socketioxide::SocketIo;

pub struct AppState {
    pub db: DbPool,
    pub config: config::AppConfig,
    pub redis: RedisClient,
    pub email: EmailClient,
    pub storage: StorageClient,
    pub media: MediaClient,
    pub stripe: StripeClient,
    pub io: SocketIo,
    pub http_client: reqwest::Client,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl JwtSecretSource for AppState {
    fn jwt_secret(&self) -> &str {
        &self.config.jwt_secret
    }
}

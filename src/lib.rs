pub mod api;
pub mod config;
pub mod db;
pub mod mail;
pub mod storage;
pub mod utils;

pub use db::DbPool;

use config::Config;
use mail::MailService;
use storage::MediaStorage;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub mailer: MailService,
    pub storage: MediaStorage,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, mailer: MailService, storage: MediaStorage) -> Self {
        Self {
            config,
            db,
            mailer,
            storage,
        }
    }
}

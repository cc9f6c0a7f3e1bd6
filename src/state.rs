use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::rewards::RewardEngine;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub rewards: RewardEngine,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> anyhow::Result<Self> {
        let rewards = RewardEngine::new(db.clone(), config.calendar()?);
        Ok(Self {
            db,
            config,
            rewards,
        })
    }
}

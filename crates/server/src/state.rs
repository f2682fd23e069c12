use crate::{config::Config, db::Database, token::TokenKeys};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub tokens: TokenKeys,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        let tokens = TokenKeys::new(&config.auth);
        Self { db, config, tokens }
    }
}

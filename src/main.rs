mod logging;

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use roomsync_core::{Config, KeyValueStore, Repository};
use roomsync_memory::{MemoryRepository, MemoryStore};
use roomsync_runtime::RuntimeContext;
use roomsync_server::auth::DevTokenAuth;

#[tokio::main]
async fn main() {
    logging::init_logger();

    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let repository = Arc::new(MemoryRepository::new());

    let tokens = seed_dev_tokens(&repository).await;
    let auth: Arc<dyn roomsync_core::Auth> = Arc::new(DevTokenAuth::new(tokens));

    let broadcaster = roomsync_server::wire_broadcaster(kv.clone());
    let repository: Arc<dyn Repository> = repository;
    let runtime = RuntimeContext::new(kv, repository, Config::default(), broadcaster);

    roomsync_server::run_server(runtime, auth).await;
}

/// Seeds a handful of demo users from `ROOMSYNC_DEV_TOKENS`
/// (`token:username,token:username,...`) so the bundled in-memory backend
/// is reachable without a real identity provider. Absent the variable,
/// logs in as a single `alice` user under a fixed development token.
async fn seed_dev_tokens(repository: &Arc<MemoryRepository>) -> HashMap<String, roomsync_core::UserId> {
    let spec = env::var("ROOMSYNC_DEV_TOKENS").unwrap_or_else(|_| "dev-token:alice".to_string());

    let mut tokens = HashMap::new();
    for pair in spec.split(',') {
        let Some((token, username)) = pair.split_once(':') else {
            log::warn!("ignoring malformed ROOMSYNC_DEV_TOKENS entry: {pair}");
            continue;
        };

        let user_id = repository.seed_user(username).await;
        tokens.insert(token.to_string(), user_id);
    }

    tokens
}

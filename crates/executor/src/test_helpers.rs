//! Shared helpers for executor tests: an in-process HTTP server and a
//! secret store whose values can change between calls.

use async_trait::async_trait;
use flowhand_core::error::StoreError;
use flowhand_core::store::SecretStore;
use std::collections::HashMap;
use std::sync::Mutex;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A secret store backed by a mutable map, counting lookups.
#[derive(Default)]
pub struct MapSecrets {
    values: Mutex<HashMap<(String, String), String>>,
    lookups: Mutex<usize>,
}

impl MapSecrets {
    pub fn set(&self, name: &str, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert((name.into(), key.into()), value.into());
    }

    pub fn lookups(&self) -> usize {
        *self.lookups.lock().unwrap()
    }
}

#[async_trait]
impl SecretStore for MapSecrets {
    async fn get_secret(
        &self,
        _namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Vec<u8>, StoreError> {
        *self.lookups.lock().unwrap() += 1;
        self.values
            .lock()
            .unwrap()
            .get(&(name.to_string(), key.to_string()))
            .map(|v| v.clone().into_bytes())
            .ok_or_else(|| StoreError::NotFound(format!("secret {name}/{key}")))
    }
}

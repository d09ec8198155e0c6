use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::warn;

use super::{backend::KeyValueBackend, cache::CachedStore};

/// A collection stored as one JSON array.
///
/// Elements that don't deserialize into `T` are kept as they are and written back after the
/// readable ones, so rewriting the collection never loses them.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredList<T> {
    pub items: Vec<T>,
    pub unreadable: Vec<Value>,
}

impl<T> Default for StoredList<T> {
    fn default() -> Self {
        Self {
            items: vec![],
            unreadable: vec![],
        }
    }
}

impl<T: Serialize + DeserializeOwned> StoredList<T> {
    /// Fails when the stored value can't be read at all, for example when it isn't an array.
    pub async fn load<B: KeyValueBackend>(store: &CachedStore<B>, key: &str) -> Result<Self> {
        let Some(values) = store.get::<Vec<Value>>(key).await? else {
            return Ok(Self::default());
        };

        let mut list = Self::default();
        for value in values {
            match serde_json::from_value(value.clone()) {
                Ok(item) => list.items.push(item),
                Err(e) => {
                    warn!("Keeping unreadable element of {key} as is: {e}");
                    list.unreadable.push(value);
                }
            }
        }
        Ok(list)
    }

    pub fn save<B: KeyValueBackend>(&self, store: &CachedStore<B>, key: &str) -> Result<()> {
        let mut values = self
            .items
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        values.extend(self.unreadable.iter().cloned());
        store.set_item(key, Value::Array(values));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use crate::{
        storage::{backend::MockKeyValueBackend, cache::CachedStore, StoreConfig},
        utils::clock::FixedClock,
    };

    use super::StoredList;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: u32,
    }

    fn store(stored: &'static str) -> CachedStore<MockKeyValueBackend> {
        let mut backend = MockKeyValueBackend::new();
        backend
            .expect_get()
            .returning(move |_| Ok(Some(stored.to_string())));
        backend.expect_multi_set().returning(|_| Ok(()));
        CachedStore::new(
            backend,
            StoreConfig::default(),
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())),
        )
    }

    #[tokio::test]
    async fn test_unreadable_elements_survive_rewrite() -> Result<()> {
        let store = store(r#"[{"id": 1}, {"id": "two"}, {"id": 3}]"#);

        let mut list = StoredList::<Entry>::load(&store, "entries").await?;
        assert_eq!(list.items, vec![Entry { id: 1 }, Entry { id: 3 }]);
        assert_eq!(list.unreadable, vec![json!({"id": "two"})]);

        list.items.remove(0);
        list.save(&store, "entries")?;
        assert_eq!(
            store.get_item("entries").await,
            Some(json!([{"id": 3}, {"id": "two"}]))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_non_array_value_is_an_error() -> Result<()> {
        let store = store(r#"{"id": 1}"#);
        assert!(StoredList::<Entry>::load(&store, "entries").await.is_err());
        Ok(())
    }
}

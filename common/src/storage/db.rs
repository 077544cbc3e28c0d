use crate::error::AppError;

use super::types::StoredObject;
use serde::Serialize;
use std::ops::Deref;
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};

/// Upper bound on records per transactional write, mirroring the commit
/// group limit of the backing store.
pub const MAX_WRITE_GROUP_SIZE: usize = 500;

#[derive(Debug, Clone, Copy)]
pub enum QueryOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
}

impl QueryOperator {
    fn as_str(&self) -> &'static str {
        match self {
            QueryOperator::Equals => "=",
            QueryOperator::NotEquals => "!=",
            QueryOperator::GreaterThan => ">",
            QueryOperator::LessThan => "<",
        }
    }
}

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    /// # Initialize a new database client
    ///
    /// # Arguments
    ///
    /// # Returns
    /// * `SurrealDbClient` initialized
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        // Sign in to database
        db.signin(Root { username, password }).await?;

        // Set namespace
        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    pub async fn ensure_initialized(&self) -> Result<(), AppError> {
        Self::build_indexes(self).await?;

        Ok(())
    }

    pub async fn build_indexes(&self) -> Result<(), Error> {
        self.client
            .query("DEFINE INDEX idx_chunk_state ON chunk_stat FIELDS state")
            .await?;
        self.client
            .query("DEFINE INDEX idx_chunk_load_date ON chunk_stat FIELDS load_date")
            .await?;

        Ok(())
    }

    /// Upsert a single object, keyed by its natural key. Requires the struct
    /// to implement StoredObject.
    ///
    /// # Arguments
    /// * `item` - The item to be stored
    ///
    /// # Returns
    /// * `Result` - Item or Error
    pub async fn set_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .upsert((T::table_name(), item.get_id().to_owned()))
            .content(item)
            .await
    }

    /// Upsert a group of objects in a single transaction. The group must not
    /// exceed [`MAX_WRITE_GROUP_SIZE`]; use [`Self::set_large_bulk`] for
    /// arbitrarily sized inputs.
    pub async fn set_bulk<T>(&self, items: Vec<T>) -> Result<(), AppError>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        if items.is_empty() {
            return Ok(());
        }
        if items.len() > MAX_WRITE_GROUP_SIZE {
            return Err(AppError::InvalidArgument(format!(
                "Write group of {} records exceeds the limit of {MAX_WRITE_GROUP_SIZE}",
                items.len()
            )));
        }

        let statement = format!(
            "BEGIN;
             FOR $record IN $records {{
                 UPSERT type::thing($table, $record.{key}) CONTENT $record;
             }};
             COMMIT;",
            key = T::key_field()
        );

        self.client
            .query(statement)
            .bind(("table", T::table_name()))
            .bind(("records", items))
            .await?
            .check()?;

        Ok(())
    }

    /// Upsert any number of objects by splitting them into transactional
    /// groups of at most [`MAX_WRITE_GROUP_SIZE`].
    pub async fn set_large_bulk<T>(&self, mut items: Vec<T>) -> Result<(), AppError>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        while !items.is_empty() {
            let rest = items.split_off(items.len().min(MAX_WRITE_GROUP_SIZE));
            let group = std::mem::replace(&mut items, rest);
            self.set_bulk(group).await?;
        }

        Ok(())
    }

    /// Select all objects from a table matching a single field predicate.
    pub async fn query_by_field<T, V>(
        &self,
        field: &str,
        operator: QueryOperator,
        value: V,
    ) -> Result<Vec<T>, AppError>
    where
        T: StoredObject + Send + Sync + 'static,
        V: Serialize + Send + Sync + 'static,
    {
        let statement = format!(
            "SELECT * FROM type::table($table) WHERE type::field($field) {} $value",
            operator.as_str()
        );

        let mut result = self
            .client
            .query(statement)
            .bind(("table", T::table_name()))
            .bind(("field", field.to_string()))
            .bind(("value", value))
            .await?;

        Ok(result.take(0)?)
    }

    /// Operation to retrieve a single object by its key, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `id` - The key of the item to retrieve
    ///
    /// # Returns
    /// * `Result<Option<T>, Error>` - The found item or Error
    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// Operation to delete a single object by its key, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `id` - The key of the item to delete
    ///
    /// # Returns
    /// * `Result<Option<T>, Error>` - The deleted item or Error
    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        name: String,
        rank: i64,
    }

    impl StoredObject for Dummy {
        fn table_name() -> &'static str {
            "dummy"
        }

        fn key_field() -> &'static str {
            "name"
        }

        fn get_id(&self) -> &str {
            &self.name
        }
    }

    fn dummy(name: &str, rank: i64) -> Dummy {
        Dummy {
            name: name.to_string(),
            rank,
        }
    }

    async fn memory_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = Uuid::new_v4().to_string(); // ensures isolation per test run
        SurrealDbClient::memory(namespace, &database)
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn test_initialization_and_crud() {
        let db = memory_db().await;

        db.ensure_initialized()
            .await
            .expect("Failed to initialize schema");

        let item = dummy("first", 1);

        // Store
        let stored = db.set_item(item.clone()).await.expect("Failed to store");
        assert_eq!(stored, Some(item.clone()));

        // Read
        let fetched = db.get_item::<Dummy>("first").await.expect("Failed to fetch");
        assert_eq!(fetched, Some(item.clone()));

        // Upsert overwrites in place
        let updated = dummy("first", 2);
        db.set_item(updated.clone()).await.expect("Failed to update");
        let fetched = db.get_item::<Dummy>("first").await.expect("Failed to fetch");
        assert_eq!(fetched, Some(updated));

        // Delete
        let deleted = db
            .delete_item::<Dummy>("first")
            .await
            .expect("Failed to delete");
        assert!(deleted.is_some());

        let fetch_post = db
            .get_item::<Dummy>("first")
            .await
            .expect("Failed fetch post delete");
        assert!(fetch_post.is_none());
    }

    #[tokio::test]
    async fn test_set_bulk_rejects_oversized_group() {
        let db = memory_db().await;
        let items: Vec<Dummy> = (0..=MAX_WRITE_GROUP_SIZE)
            .map(|i| dummy(&format!("item-{i}"), i as i64))
            .collect();

        let result = db.set_bulk(items).await;
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_set_bulk_empty_is_noop() {
        let db = memory_db().await;
        db.set_bulk(Vec::<Dummy>::new()).await.expect("empty bulk");
    }

    #[tokio::test]
    async fn test_set_large_bulk_splits_groups() {
        let db = memory_db().await;
        let total = MAX_WRITE_GROUP_SIZE * 2 + 200;
        let items: Vec<Dummy> = (0..total)
            .map(|i| dummy(&format!("item-{i}"), i as i64))
            .collect();

        db.set_large_bulk(items).await.expect("large bulk");

        let all: Vec<Dummy> = db.select(Dummy::table_name()).await.expect("select all");
        assert_eq!(all.len(), total);
    }

    #[tokio::test]
    async fn test_query_by_field() {
        let db = memory_db().await;
        db.set_bulk(vec![dummy("a", 1), dummy("b", 2), dummy("c", 2)])
            .await
            .expect("bulk");

        let matched: Vec<Dummy> = db
            .query_by_field("rank", QueryOperator::Equals, 2)
            .await
            .expect("query");
        assert_eq!(matched.len(), 2);

        let above: Vec<Dummy> = db
            .query_by_field("rank", QueryOperator::GreaterThan, 1)
            .await
            .expect("query");
        assert_eq!(above.len(), 2);
    }
}

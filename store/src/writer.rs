use crate::{
    client::{
        InfluxClient,
        SeriesStore,
    },
    error::{
        SchemaSetupError,
        WriteError,
    },
    line_protocol,
    point::Batch,
};

/// Named retention policy the dumper creates and writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub name: String,
    /// InfluxQL duration literal such as `5d`, or `INF`.
    pub duration: String,
}

impl RetentionPolicy {
    pub fn new(name: impl Into<String>, duration: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration: duration.into(),
        }
    }
}

/// Sets up the schema once and writes batches into it.
pub struct StoreWriter<S = InfluxClient> {
    store: S,
    database: String,
    policy: RetentionPolicy,
}

impl<S: SeriesStore> StoreWriter<S> {
    pub fn new(store: S, database: impl Into<String>, policy: RetentionPolicy) -> Self {
        Self {
            store,
            database: database.into(),
            policy,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn schema_statements(&self) -> [String; 2] {
        let database = quote_identifier(&self.database);
        [
            format!("CREATE DATABASE {database}"),
            format!(
                "CREATE RETENTION POLICY {} ON {database} DURATION {} REPLICATION 1 DEFAULT",
                quote_identifier(&self.policy.name),
                self.policy.duration,
            ),
        ]
    }

    /// Create the database and retention policy. Existing ones are accepted.
    pub async fn ensure_schema(&self) -> Result<(), SchemaSetupError> {
        for statement in self.schema_statements() {
            match self.store.query(&statement).await {
                Ok(()) => debug!(%statement, "schema statement applied"),
                Err(err) if err.is_already_exists() => debug!(%statement, "schema already present"),
                Err(source) => return Err(SchemaSetupError { statement, source }),
            }
        }
        info!(database = %self.database, policy = %self.policy.name, duration = %self.policy.duration, "store schema ready");
        Ok(())
    }

    /// Send one batch in a single write. The batch is consumed either way.
    pub async fn flush(&self, batch: Batch) -> Result<(), WriteError> {
        if batch.is_empty() {
            return Ok(());
        }
        let points = batch.len();
        let body = line_protocol::encode_batch(&batch);
        drop(batch);

        self.store
            .write(&self.database, &self.policy.name, body)
            .await
            .map_err(|source| WriteError {
                database: self.database.clone(),
                points,
                source,
            })?;
        debug!(points, database = %self.database, "batch written");
        Ok(())
    }
}

/// Double-quoted InfluxQL identifier.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::StoreError,
        point::{
            DerivedPoint,
            Fields,
            Tags,
        },
        testing::MemoryStore,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn writer(store: &MemoryStore) -> StoreWriter<MemoryStore> {
        StoreWriter::new(store.clone(), "statistics", RetentionPolicy::new("dumper", "5d"))
    }

    fn batch(n: usize) -> Batch {
        let tags = Arc::new(Tags::from([("node".to_string(), "box".to_string())]));
        (0..n)
            .map(|i| DerivedPoint::new(format!("k{i}|h"), 60, Fields { value: 1.0, max: 2.0 }, tags.clone()))
            .collect()
    }

    #[tokio::test]
    async fn creates_database_then_policy() {
        let store = MemoryStore::new();
        writer(&store).ensure_schema().await.unwrap();

        assert_eq!(
            store.queries(),
            vec![
                r#"CREATE DATABASE "statistics""#.to_string(),
                r#"CREATE RETENTION POLICY "dumper" ON "statistics" DURATION 5d REPLICATION 1 DEFAULT"#.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn existing_schema_is_accepted() {
        let store = MemoryStore::new();
        store.fail_queries_with(Some(StoreError::Statement("database already exists".to_string())));
        writer(&store).ensure_schema().await.unwrap();
        assert_eq!(store.queries().len(), 2);
    }

    #[tokio::test]
    async fn other_setup_failures_are_fatal() {
        let store = MemoryStore::new();
        store.fail_queries_with(Some(StoreError::Status {
            status: 401,
            body: "authorization failed".to_string(),
        }));

        let err = writer(&store).ensure_schema().await.unwrap_err();
        assert_eq!(err.statement, r#"CREATE DATABASE "statistics""#);
        assert_eq!(store.queries().len(), 1);
    }

    #[tokio::test]
    async fn flush_sends_one_write_into_policy() {
        let store = MemoryStore::new();
        writer(&store).flush(batch(3)).await.unwrap();

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].database, "statistics");
        assert_eq!(writes[0].policy, "dumper");
        assert_eq!(writes[0].body.lines().count(), 3);
        assert_eq!(writes[0].body.lines().next(), Some("k0|h,node=box value=1,max=2 60"));
    }

    #[tokio::test]
    async fn empty_batch_is_not_sent() {
        let store = MemoryStore::new();
        writer(&store).flush(Batch::new()).await.unwrap();
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn write_failure_reports_batch_size() {
        let store = MemoryStore::new();
        store.fail_writes(true);

        let err = writer(&store).flush(batch(4)).await.unwrap_err();
        assert_eq!(err.points, 4);
        assert_eq!(err.database, "statistics");
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_identifier("stats"), "\"stats\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\\\"b\"");
    }
}

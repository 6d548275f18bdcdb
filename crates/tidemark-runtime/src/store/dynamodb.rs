use std::collections::HashMap;
use std::time::{Duration, Instant};

use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::scan::ScanError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType, TableStatus,
};
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use tidemark_core::config::{HistoryConfig, StoreConfig};
use tidemark_core::error::{MigrateError, Result};
use tidemark_core::migration::{
    history_table_spec, HistoryStore, MigrationRecord, SchemaGateway, Timestamp, HISTORY_KEY,
};
use tidemark_core::schema::{AttributeType, TableSpec};

/// Delay between table status polls while waiting for creation.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// DynamoDB implementation of the table primitives.
#[derive(Clone, Debug)]
pub struct DynamoStore {
    client: Client,
    create_timeout: Duration,
}

impl DynamoStore {
    /// Wrap an existing client.
    pub fn new(client: Client, create_timeout: Duration) -> Self {
        Self {
            client,
            create_timeout,
        }
    }

    /// Build a client from configuration.
    pub async fn from_config(store: &StoreConfig, history: &HistoryConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(store.region.clone()));
        if let Some(endpoint) = &store.endpoint {
            debug!("Using store endpoint {}", endpoint);
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        Self::new(
            Client::new(&sdk_config),
            Duration::from_secs(history.create_timeout_secs),
        )
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// History store bound to a table in this store.
    pub fn history(&self, table: impl Into<String>) -> DynamoHistory {
        DynamoHistory {
            store: self.clone(),
            table: table.into(),
        }
    }

    async fn wait_until_active(&self, name: &str) -> Result<()> {
        let deadline = Instant::now() + self.create_timeout;
        loop {
            let output = self
                .client
                .describe_table()
                .table_name(name)
                .send()
                .await
                .map_err(|e| sdk_error("describe table", e))?;

            let status = output.table().and_then(|t| t.table_status());
            if matches!(status, Some(TableStatus::Active)) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(MigrateError::Store(format!(
                    "table '{}' not active after {:?} (status {:?})",
                    name, self.create_timeout, status
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl SchemaGateway for DynamoStore {
    async fn table_exists(&self, name: &str) -> Result<bool> {
        match self.client.describe_table().table_name(name).send().await {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                Ok(false)
            }
            Err(e) => Err(sdk_error("describe table", e)),
        }
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<()> {
        spec.validate()?;
        let (attributes, keys) = key_definitions(spec)?;

        let result = self
            .client
            .create_table()
            .table_name(&spec.name)
            .set_attribute_definitions(Some(attributes))
            .set_key_schema(Some(keys))
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        match result {
            Ok(_) => {}
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_in_use_exception()) =>
            {
                return Err(MigrateError::TableExists(spec.name.clone()));
            }
            Err(e) => return Err(sdk_error("create table", e)),
        }

        info!("Created table {}", spec.name);
        self.wait_until_active(&spec.name).await
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        match self.client.delete_table().table_name(name).send().await {
            Ok(_) => {
                info!("Dropped table {}", name);
                Ok(())
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                debug!("Table {} does not exist, nothing to drop", name);
                Ok(())
            }
            Err(e) => Err(sdk_error("delete table", e)),
        }
    }
}

/// History store backed by a DynamoDB table.
#[derive(Clone, Debug)]
pub struct DynamoHistory {
    store: DynamoStore,
    table: String,
}

impl HistoryStore for DynamoHistory {
    fn table_name(&self) -> &str {
        &self.table
    }

    async fn exists(&self) -> Result<bool> {
        self.store.table_exists(&self.table).await
    }

    async fn create(&self) -> Result<()> {
        self.store.create_table(&history_table_spec(&self.table)).await
    }

    async fn all(&self) -> Result<Vec<MigrationRecord>> {
        let mut pages = self
            .store
            .client
            .scan()
            .table_name(&self.table)
            .into_paginator()
            .items()
            .send();

        let mut records = Vec::new();
        while let Some(item) = pages.next().await {
            let item = item.map_err(|e| {
                history_error(
                    "scan history",
                    &self.table,
                    e,
                    ScanError::is_resource_not_found_exception,
                )
            })?;
            records.push(record_from_item(&item)?);
        }

        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn put(&self, record: &MigrationRecord) -> Result<()> {
        let result = self
            .store
            .client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(record_to_item(record)))
            .condition_expression("attribute_not_exists(#id)")
            .expression_attribute_names("#id", HISTORY_KEY)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Err(MigrateError::HistoryConflict {
                    id: record.id.clone(),
                })
            }
            Err(e) => Err(history_error(
                "put history record",
                &self.table,
                e,
                PutItemError::is_resource_not_found_exception,
            )),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.store
            .client
            .delete_item()
            .table_name(&self.table)
            .key(HISTORY_KEY, AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| {
                history_error(
                    "delete history record",
                    &self.table,
                    e,
                    DeleteItemError::is_resource_not_found_exception,
                )
            })?;
        Ok(())
    }
}

fn sdk_error<E, R>(action: &str, err: SdkError<E, R>) -> MigrateError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{} failed: {}", action, DisplayErrorContext(&err));
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            MigrateError::Connection(message)
        }
        _ => MigrateError::Store(message),
    }
}

/// Like [`sdk_error`], but a missing history table becomes `TableNotFound`.
fn history_error<E, R>(
    action: &str,
    table: &str,
    err: SdkError<E, R>,
    is_not_found: fn(&E) -> bool,
) -> MigrateError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if err.as_service_error().is_some_and(is_not_found) {
        return MigrateError::TableNotFound(table.to_string());
    }
    sdk_error(action, err)
}

fn scalar_type(attribute_type: AttributeType) -> ScalarAttributeType {
    match attribute_type {
        AttributeType::String => ScalarAttributeType::S,
        AttributeType::Number => ScalarAttributeType::N,
        AttributeType::Binary => ScalarAttributeType::B,
    }
}

fn key_definitions(spec: &TableSpec) -> Result<(Vec<AttributeDefinition>, Vec<KeySchemaElement>)> {
    let build_error = |e: aws_sdk_dynamodb::error::BuildError| {
        MigrateError::InvalidArgument(format!("table '{}': {}", spec.name, e))
    };

    let attributes = spec
        .attributes
        .iter()
        .map(|a| {
            AttributeDefinition::builder()
                .attribute_name(&a.name)
                .attribute_type(scalar_type(a.attribute_type))
                .build()
                .map_err(build_error)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut keys = vec![KeySchemaElement::builder()
        .attribute_name(&spec.key.hash_key)
        .key_type(KeyType::Hash)
        .build()
        .map_err(build_error)?];
    if let Some(range) = &spec.key.range_key {
        keys.push(
            KeySchemaElement::builder()
                .attribute_name(range)
                .key_type(KeyType::Range)
                .build()
                .map_err(build_error)?,
        );
    }

    Ok((attributes, keys))
}

fn record_to_item(record: &MigrationRecord) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert(HISTORY_KEY.to_string(), AttributeValue::S(record.id.clone()));
    item.insert(
        "timestamp".to_string(),
        AttributeValue::S(record.timestamp.to_string()),
    );
    item.insert(
        "namespace".to_string(),
        AttributeValue::S(record.namespace.clone()),
    );
    if let Some(name) = &record.name {
        item.insert("name".to_string(), AttributeValue::S(name.clone()));
    }
    if let Some(applied_at) = &record.applied_at {
        item.insert(
            "applied_at".to_string(),
            AttributeValue::S(applied_at.to_rfc3339()),
        );
    }
    item
}

fn record_from_item(item: &HashMap<String, AttributeValue>) -> Result<MigrationRecord> {
    let string = |field: &str| -> Option<String> {
        item.get(field).and_then(|v| v.as_s().ok()).cloned()
    };
    let required = |field: &str| -> Result<String> {
        string(field).ok_or_else(|| {
            MigrateError::Serialization(format!("history item is missing '{}'", field))
        })
    };

    let id = required(HISTORY_KEY)?;
    // Rows written by older tooling may only carry the id
    let timestamp = Timestamp::parse(&string("timestamp").unwrap_or_else(|| id.clone()))?;
    let applied_at = string("applied_at")
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| MigrateError::Serialization(format!("bad applied_at '{}': {}", s, e)))
        })
        .transpose()?;

    Ok(MigrationRecord {
        id,
        timestamp,
        namespace: required("namespace")?,
        name: string("name"),
        applied_at,
    })
}

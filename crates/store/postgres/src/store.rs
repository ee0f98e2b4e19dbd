use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use argus_core::{
    AsnRecord, ConfigProfile, ConnectionRow, Host, Node, ProviderType, SyncMetadata, SyncStatus,
    User, UserStatus,
};
use argus_store::{LedgerStore, NewConnection, StoreError};

use crate::config::PostgresConfig;
use crate::migrations;

/// PostgreSQL-backed [`LedgerStore`].
///
/// Uses `sqlx::PgPool`; the schema is bootstrapped on connect. Stale-closure
/// runs through the trait's default sweep over `open_connections` + the
/// atomic `close_connection` update.
pub struct PostgresLedgerStore {
    pool: PgPool,
    /// Country tables already bootstrapped this process.
    asn_tables: Mutex<HashSet<String>>,
}

impl PostgresLedgerStore {
    /// Connect, build the pool, and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transient`] when the database is unreachable
    /// and [`StoreError::Backend`] when migrations fail.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(StdDuration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?;

        migrations::run_migrations(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self {
            pool,
            asn_tables: Mutex::new(HashSet::new()),
        })
    }

    /// Build a store from an existing pool. Runs migrations.
    pub async fn from_pool(pool: PgPool) -> Result<Self, StoreError> {
        migrations::run_migrations(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self {
            pool,
            asn_tables: Mutex::new(HashSet::new()),
        })
    }

    async fn ensure_asn_table(&self, country_code: &str) -> Result<String, StoreError> {
        let table = migrations::asn_table_name(country_code)
            .ok_or_else(|| StoreError::Constraint(format!("bad country code: {country_code}")))?;
        {
            let known = self.asn_tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if known.contains(&table) {
                return Ok(table);
            }
        }
        sqlx::query(&migrations::asn_table_ddl(&table))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        self.asn_tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(table.clone());
        Ok(table)
    }
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db)
            if db.is_unique_violation()
                || db.is_foreign_key_violation()
                || db.is_check_violation() =>
        {
            StoreError::Constraint(db.message().to_owned())
        }
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Transient(e.to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let status: String = row.try_get("status").map_err(map_sqlx)?;
    Ok(User {
        uuid: row.try_get("uuid").map_err(map_sqlx)?,
        short_uuid: row.try_get("short_uuid").map_err(map_sqlx)?,
        username: row.try_get("username").map_err(map_sqlx)?,
        subscription_uuid: row.try_get("subscription_uuid").map_err(map_sqlx)?,
        telegram_id: row.try_get("telegram_id").map_err(map_sqlx)?,
        email: row.try_get("email").map_err(map_sqlx)?,
        status: UserStatus::from_str(&status).map_err(StoreError::Backend)?,
        expire_at: row.try_get("expire_at").map_err(map_sqlx)?,
        traffic_limit_bytes: row.try_get("traffic_limit_bytes").map_err(map_sqlx)?,
        used_traffic_bytes: row.try_get("used_traffic_bytes").map_err(map_sqlx)?,
        hwid_device_limit: row.try_get("hwid_device_limit").map_err(map_sqlx)?,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
        updated_at: row.try_get("updated_at").map_err(map_sqlx)?,
        raw_data: row
            .try_get::<Option<serde_json::Value>, _>("raw_data")
            .map_err(map_sqlx)?
            .unwrap_or(serde_json::Value::Null),
    })
}

fn node_from_row(row: &PgRow) -> Result<Node, StoreError> {
    Ok(Node {
        uuid: row.try_get("uuid").map_err(map_sqlx)?,
        name: row.try_get("name").map_err(map_sqlx)?,
        address: row.try_get("address").map_err(map_sqlx)?,
        port: row.try_get("port").map_err(map_sqlx)?,
        is_disabled: row.try_get("is_disabled").map_err(map_sqlx)?,
        is_connected: row.try_get("is_connected").map_err(map_sqlx)?,
        traffic_limit_bytes: row.try_get("traffic_limit_bytes").map_err(map_sqlx)?,
        traffic_used_bytes: row.try_get("traffic_used_bytes").map_err(map_sqlx)?,
        updated_at: row.try_get("updated_at").map_err(map_sqlx)?,
        agent_token: row.try_get("agent_token").map_err(map_sqlx)?,
        raw_data: row
            .try_get::<Option<serde_json::Value>, _>("raw_data")
            .map_err(map_sqlx)?
            .unwrap_or(serde_json::Value::Null),
    })
}

fn connection_from_row(row: &PgRow) -> Result<ConnectionRow, StoreError> {
    Ok(ConnectionRow {
        id: row.try_get("id").map_err(map_sqlx)?,
        user_uuid: row.try_get("user_uuid").map_err(map_sqlx)?,
        ip_address: row.try_get("ip_address").map_err(map_sqlx)?,
        node_uuid: row.try_get("node_uuid").map_err(map_sqlx)?,
        connected_at: row.try_get("connected_at").map_err(map_sqlx)?,
        disconnected_at: row.try_get("disconnected_at").map_err(map_sqlx)?,
        device_info: row
            .try_get::<Option<serde_json::Value>, _>("device_info")
            .map_err(map_sqlx)?
            .unwrap_or(serde_json::Value::Null),
    })
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO users (
                uuid, short_uuid, username, subscription_uuid, telegram_id, email,
                status, expire_at, traffic_limit_bytes, used_traffic_bytes,
                hwid_device_limit, created_at, updated_at, raw_data
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW(), $13)
            ON CONFLICT (uuid) DO UPDATE SET
                short_uuid = EXCLUDED.short_uuid,
                username = EXCLUDED.username,
                subscription_uuid = EXCLUDED.subscription_uuid,
                telegram_id = EXCLUDED.telegram_id,
                email = EXCLUDED.email,
                status = EXCLUDED.status,
                expire_at = EXCLUDED.expire_at,
                traffic_limit_bytes = EXCLUDED.traffic_limit_bytes,
                used_traffic_bytes = EXCLUDED.used_traffic_bytes,
                hwid_device_limit = EXCLUDED.hwid_device_limit,
                updated_at = NOW(),
                raw_data = EXCLUDED.raw_data",
        )
        .bind(user.uuid)
        .bind(&user.short_uuid)
        .bind(&user.username)
        .bind(&user.subscription_uuid)
        .bind(user.telegram_id)
        .bind(&user.email)
        .bind(user.status.as_str())
        .bind(user.expire_at)
        .bind(user.traffic_limit_bytes)
        .bind(user.used_traffic_bytes)
        .bind(user.hwid_device_limit)
        .bind(user.created_at)
        .bind(&user.raw_data)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn delete_user(&self, uuid: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE uuid = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn user_by_uuid(&self, uuid: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query("SELECT * FROM users WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn user_by_short_uuid(&self, short_uuid: &str) -> Result<Option<User>, StoreError> {
        sqlx::query("SELECT * FROM users WHERE short_uuid = $1")
            .bind(short_uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        sqlx::query("SELECT * FROM users WHERE LOWER(username) = LOWER($1)")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn user_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, StoreError> {
        sqlx::query("SELECT * FROM users WHERE telegram_id = $1")
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn user_by_subscription_uuid(
        &self,
        subscription_uuid: &str,
    ) -> Result<Option<User>, StoreError> {
        sqlx::query("SELECT * FROM users WHERE subscription_uuid = $1")
            .bind(subscription_uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn user_uuid_from_raw_data(&self, id: &str) -> Result<Option<Uuid>, StoreError> {
        let row = sqlx::query("SELECT uuid FROM users WHERE raw_data->>'id' = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(|r| r.try_get("uuid").map_err(map_sqlx)).transpose()
    }

    async fn upsert_node(&self, node: &Node) -> Result<(), StoreError> {
        // Mirror refreshes never carry a token; COALESCE keeps the
        // provisioned one across syncs.
        sqlx::query(
            r"INSERT INTO nodes (
                uuid, name, address, port, is_disabled, is_connected,
                traffic_limit_bytes, traffic_used_bytes, updated_at, agent_token, raw_data
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), $9, $10)
            ON CONFLICT (uuid) DO UPDATE SET
                name = EXCLUDED.name,
                address = EXCLUDED.address,
                port = EXCLUDED.port,
                is_disabled = EXCLUDED.is_disabled,
                is_connected = EXCLUDED.is_connected,
                traffic_limit_bytes = EXCLUDED.traffic_limit_bytes,
                traffic_used_bytes = EXCLUDED.traffic_used_bytes,
                updated_at = NOW(),
                agent_token = COALESCE(EXCLUDED.agent_token, nodes.agent_token),
                raw_data = EXCLUDED.raw_data",
        )
        .bind(node.uuid)
        .bind(&node.name)
        .bind(&node.address)
        .bind(node.port)
        .bind(node.is_disabled)
        .bind(node.is_connected)
        .bind(node.traffic_limit_bytes)
        .bind(node.traffic_used_bytes)
        .bind(&node.agent_token)
        .bind(&node.raw_data)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn delete_node(&self, uuid: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM nodes WHERE uuid = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn node_by_uuid(&self, uuid: Uuid) -> Result<Option<Node>, StoreError> {
        sqlx::query("SELECT * FROM nodes WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(|row| node_from_row(&row))
            .transpose()
    }

    async fn node_by_agent_token(&self, token: &str) -> Result<Option<Node>, StoreError> {
        sqlx::query("SELECT * FROM nodes WHERE agent_token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(|row| node_from_row(&row))
            .transpose()
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        sqlx::query("SELECT * FROM nodes ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?
            .iter()
            .map(node_from_row)
            .collect()
    }

    async fn set_agent_token(
        &self,
        node_uuid: Uuid,
        token: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE nodes SET agent_token = $1 WHERE uuid = $2")
            .bind(token)
            .bind(node_uuid)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_host(&self, host: &Host) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO hosts (uuid, remark, updated_at, raw_data)
            VALUES ($1, $2, NOW(), $3)
            ON CONFLICT (uuid) DO UPDATE SET
                remark = EXCLUDED.remark,
                updated_at = NOW(),
                raw_data = EXCLUDED.raw_data",
        )
        .bind(host.uuid)
        .bind(&host.remark)
        .bind(&host.raw_data)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn delete_host(&self, uuid: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM hosts WHERE uuid = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_config_profile(&self, profile: &ConfigProfile) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO config_profiles (uuid, name, updated_at, raw_data)
            VALUES ($1, $2, NOW(), $3)
            ON CONFLICT (uuid) DO UPDATE SET
                name = EXCLUDED.name,
                updated_at = NOW(),
                raw_data = EXCLUDED.raw_data",
        )
        .bind(profile.uuid)
        .bind(&profile.name)
        .bind(&profile.raw_data)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn insert_connection(&self, conn: NewConnection) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r"INSERT INTO user_connections
                (user_uuid, ip_address, node_uuid, connected_at, device_info)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id",
        )
        .bind(conn.user_uuid)
        .bind(&conn.ip_address)
        .bind(conn.node_uuid)
        .bind(conn.connected_at)
        .bind(&conn.device_info)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.try_get("id").map_err(map_sqlx)
    }

    async fn close_connection(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"UPDATE user_connections SET disconnected_at = NOW()
            WHERE id = $1 AND disconnected_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    async fn open_connections(
        &self,
        user_uuid: Uuid,
        limit: usize,
    ) -> Result<Vec<ConnectionRow>, StoreError> {
        sqlx::query(
            r"SELECT * FROM user_connections
            WHERE user_uuid = $1 AND disconnected_at IS NULL
            ORDER BY connected_at DESC
            LIMIT $2",
        )
        .bind(user_uuid)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?
        .iter()
        .map(connection_from_row)
        .collect()
    }

    async fn active_connections(
        &self,
        user_uuid: Uuid,
        max_age: Duration,
    ) -> Result<Vec<ConnectionRow>, StoreError> {
        let cutoff = Utc::now() - max_age;
        sqlx::query(
            r"SELECT * FROM user_connections
            WHERE user_uuid = $1 AND disconnected_at IS NULL AND connected_at > $2
            ORDER BY connected_at DESC",
        )
        .bind(user_uuid)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?
        .iter()
        .map(connection_from_row)
        .collect()
    }

    async fn connection_history(
        &self,
        user_uuid: Uuid,
        window: Duration,
    ) -> Result<Vec<ConnectionRow>, StoreError> {
        let cutoff = Utc::now() - window;
        sqlx::query(
            r"SELECT * FROM user_connections
            WHERE user_uuid = $1 AND connected_at > $2
            ORDER BY connected_at DESC",
        )
        .bind(user_uuid)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?
        .iter()
        .map(connection_from_row)
        .collect()
    }

    async fn unique_ip_count(&self, user_uuid: Uuid, window: Duration) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - window;
        let row = sqlx::query(
            r"SELECT COUNT(DISTINCT ip_address) AS n FROM user_connections
            WHERE user_uuid = $1 AND connected_at > $2",
        )
        .bind(user_uuid)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        let n: i64 = row.try_get("n").map_err(map_sqlx)?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    async fn sync_metadata(&self, key: &str) -> Result<Option<SyncMetadata>, StoreError> {
        let row = sqlx::query("SELECT * FROM sync_metadata WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(|r| {
            let status: Option<String> = r.try_get("sync_status").map_err(map_sqlx)?;
            Ok(SyncMetadata {
                key: r.try_get("key").map_err(map_sqlx)?,
                last_sync_at: r.try_get("last_sync_at").map_err(map_sqlx)?,
                sync_status: match status.as_deref() {
                    Some("success") => SyncStatus::Success,
                    Some("in_progress") => SyncStatus::InProgress,
                    _ => SyncStatus::Error,
                },
                records_synced: r.try_get("records_synced").map_err(map_sqlx)?,
                error_message: r.try_get("error_message").map_err(map_sqlx)?,
            })
        })
        .transpose()
    }

    async fn record_sync(
        &self,
        key: &str,
        status: SyncStatus,
        records_synced: i64,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let status = match status {
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
            SyncStatus::InProgress => "in_progress",
        };
        sqlx::query(
            r"INSERT INTO sync_metadata (key, last_sync_at, sync_status, records_synced, error_message)
            VALUES ($1, NOW(), $2, $3, $4)
            ON CONFLICT (key) DO UPDATE SET
                last_sync_at = NOW(),
                sync_status = EXCLUDED.sync_status,
                records_synced = EXCLUDED.records_synced,
                error_message = EXCLUDED.error_message",
        )
        .bind(key)
        .bind(status)
        .bind(records_synced)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn asn_record(
        &self,
        country_code: &str,
        asn: u32,
    ) -> Result<Option<AsnRecord>, StoreError> {
        let table = self.ensure_asn_table(country_code).await?;
        let query = format!("SELECT * FROM {table} WHERE asn = $1");
        let row = sqlx::query(&query)
            .bind(i64::from(asn))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(|r| {
            let asn: i64 = r.try_get("asn").map_err(map_sqlx)?;
            let provider_type: Option<String> = r.try_get("provider_type").map_err(map_sqlx)?;
            Ok(AsnRecord {
                asn: u32::try_from(asn).unwrap_or(0),
                org_name: r.try_get("org_name").map_err(map_sqlx)?,
                org_name_en: r.try_get("org_name_en").map_err(map_sqlx)?,
                provider_type: provider_type.and_then(|t| ProviderType::from_str(&t).ok()),
                region: r.try_get("region").map_err(map_sqlx)?,
                city: r.try_get("city").map_err(map_sqlx)?,
                country_code: r.try_get("country_code").map_err(map_sqlx)?,
                description: r.try_get("description").map_err(map_sqlx)?,
                ip_ranges: r.try_get("ip_ranges").map_err(map_sqlx)?,
                is_active: r.try_get("is_active").map_err(map_sqlx)?,
                last_synced_at: r.try_get("last_synced_at").map_err(map_sqlx)?,
            })
        })
        .transpose()
    }

    async fn upsert_asn_record(&self, record: &AsnRecord) -> Result<(), StoreError> {
        let table = self.ensure_asn_table(&record.country_code).await?;
        let query = format!(
            r"INSERT INTO {table} (
                asn, org_name, org_name_en, provider_type, region, city,
                country_code, description, ip_ranges, is_active, updated_at, last_synced_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
            ON CONFLICT (asn) DO UPDATE SET
                org_name = EXCLUDED.org_name,
                org_name_en = EXCLUDED.org_name_en,
                provider_type = EXCLUDED.provider_type,
                region = EXCLUDED.region,
                city = EXCLUDED.city,
                description = EXCLUDED.description,
                ip_ranges = EXCLUDED.ip_ranges,
                is_active = EXCLUDED.is_active,
                updated_at = NOW(),
                last_synced_at = NOW()"
        );
        sqlx::query(&query)
            .bind(i64::from(record.asn))
            .bind(&record.org_name)
            .bind(&record.org_name_en)
            .bind(record.provider_type.map(ProviderType::as_str))
            .bind(&record.region)
            .bind(&record.city)
            .bind(&record.country_code)
            .bind(&record.description)
            .bind(&record.ip_ranges)
            .bind(record.is_active)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}

//! Schema bootstrap, run once on connect.
//!
//! Tables are created idempotently. The per-country ASN cache tables are
//! created lazily by the store when a country is first touched.

use sqlx::PgPool;

const SCHEMA: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS users (
        uuid UUID PRIMARY KEY,
        short_uuid TEXT,
        username TEXT,
        subscription_uuid TEXT,
        telegram_id BIGINT,
        email TEXT,
        status TEXT NOT NULL DEFAULT 'ACTIVE',
        expire_at TIMESTAMPTZ,
        traffic_limit_bytes BIGINT,
        used_traffic_bytes BIGINT NOT NULL DEFAULT 0,
        hwid_device_limit INTEGER,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        raw_data JSONB
    )",
    r"CREATE INDEX IF NOT EXISTS idx_users_username ON users(LOWER(username))",
    r"CREATE INDEX IF NOT EXISTS idx_users_telegram_id ON users(telegram_id)",
    r"CREATE INDEX IF NOT EXISTS idx_users_status ON users(status)",
    r"CREATE INDEX IF NOT EXISTS idx_users_short_uuid ON users(short_uuid)",
    r"CREATE INDEX IF NOT EXISTS idx_users_subscription_uuid ON users(subscription_uuid)",
    r"CREATE TABLE IF NOT EXISTS nodes (
        uuid UUID PRIMARY KEY,
        name TEXT NOT NULL,
        address TEXT NOT NULL,
        port INTEGER,
        is_disabled BOOLEAN NOT NULL DEFAULT FALSE,
        is_connected BOOLEAN NOT NULL DEFAULT FALSE,
        traffic_limit_bytes BIGINT,
        traffic_used_bytes BIGINT NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        agent_token TEXT UNIQUE,
        raw_data JSONB
    )",
    r"CREATE TABLE IF NOT EXISTS hosts (
        uuid UUID PRIMARY KEY,
        remark TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        raw_data JSONB
    )",
    r"CREATE TABLE IF NOT EXISTS config_profiles (
        uuid UUID PRIMARY KEY,
        name TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        raw_data JSONB
    )",
    r"CREATE TABLE IF NOT EXISTS sync_metadata (
        key TEXT PRIMARY KEY,
        last_sync_at TIMESTAMPTZ,
        sync_status TEXT,
        error_message TEXT,
        records_synced BIGINT NOT NULL DEFAULT 0
    )",
    r"CREATE TABLE IF NOT EXISTS user_connections (
        id BIGSERIAL PRIMARY KEY,
        user_uuid UUID REFERENCES users(uuid) ON DELETE CASCADE,
        ip_address TEXT NOT NULL,
        node_uuid UUID REFERENCES nodes(uuid) ON DELETE SET NULL,
        connected_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        disconnected_at TIMESTAMPTZ,
        device_info JSONB
    )",
    r"CREATE INDEX IF NOT EXISTS idx_user_connections_user
        ON user_connections(user_uuid, connected_at DESC)",
    r"CREATE INDEX IF NOT EXISTS idx_user_connections_ip ON user_connections(ip_address)",
    r"CREATE INDEX IF NOT EXISTS idx_user_connections_node ON user_connections(node_uuid)",
];

/// DDL for one per-country ASN cache table. The table name must come from
/// [`asn_table_name`] so it is never attacker-controlled.
pub(crate) fn asn_table_ddl(table: &str) -> String {
    format!(
        r"CREATE TABLE IF NOT EXISTS {table} (
            asn BIGINT PRIMARY KEY,
            org_name TEXT NOT NULL,
            org_name_en TEXT,
            provider_type TEXT,
            region TEXT,
            city TEXT,
            country_code TEXT NOT NULL,
            description TEXT,
            ip_ranges JSONB,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            last_synced_at TIMESTAMPTZ
        )"
    )
}

/// Derive the `asn_<country>` table name from an ISO country code.
/// Returns `None` for anything but 2–3 ASCII letters.
pub(crate) fn asn_table_name(country_code: &str) -> Option<String> {
    let normalized = country_code.to_ascii_lowercase();
    if (2..=3).contains(&normalized.len()) && normalized.bytes().all(|b| b.is_ascii_lowercase()) {
        Some(format!("asn_{normalized}"))
    } else {
        None
    }
}

/// Apply the base schema.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

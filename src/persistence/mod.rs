//! Persistence Layer
//!
//! SQLite storage for the exchange back-office, accessed through sqlx.
//!
//! # Conventions
//! - Money and rates are stored as decimal TEXT and decoded into `Decimal`
//!   by the record types in [`models`]; nothing is ever stored as REAL.
//! - Repository functions take `&mut SqliteConnection` so the same call works
//!   on a pooled connection or inside a transaction (`&mut *tx`).
//! - Soft-deleted house configurations keep their row; every query that
//!   resolves a configuration filters `deleted_at IS NULL`.
//!
//! # Tables
//! - exchange_houses, currency_pairs, exchange_house_currency_pairs
//! - payment_methods, customers, customer_activities
//! - operator_cash_balances (unique per operator/method/currency), cash_movements
//! - orders, commissions
//! - commission_payment_requests, commission_payments
//! - settings

pub mod catalog_repository;
pub mod commission_repository;
pub mod customer_repository;
pub mod ledger_repository;
pub mod models;
pub mod order_repository;
pub mod payout_repository;
pub mod settings_repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Corrupt {table} row {id}: {reason}")]
    DecodeError {
        table: &'static str,
        id: i64,
        reason: String,
    },
}

/// Build a `map_err` adapter that logs a failed query and wraps it
pub(crate) fn query_failed(action: &'static str) -> impl FnOnce(sqlx::Error) -> DatabaseError {
    move |e| {
        error!("Failed to {}: {}", action, e);
        DatabaseError::QueryError(format!("Failed to {}: {}", action, e))
    }
}

/// Initialize the database connection pool and run migrations
///
/// # Arguments
/// - `config`: connection settings (e.g. `sqlite://data/fxdesk.db`)
///
/// # Errors
/// Returns error if the connection fails or a migration fails
pub async fn init_database(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", config.url);

    if let Some(db_path) = config.url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let level = if config.log_queries {
        tracing::log::LevelFilter::Debug
    } else {
        tracing::log::LevelFilter::Off
    };
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
        .log_statements(level);

    // Every connection to an in-memory database gets its own empty database,
    // so the pool is pinned to one connection that never expires.
    let pool = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?
    };

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "exchange_houses",
        r#"
        CREATE TABLE IF NOT EXISTS exchange_houses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT 1,
            zero_commission_promo BOOLEAN NOT NULL DEFAULT 0,
            promo_expires_at DATETIME,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "currency_pairs",
        r#"
        CREATE TABLE IF NOT EXISTS currency_pairs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            base_currency TEXT NOT NULL,
            quote_currency TEXT NOT NULL,
            base_rate TEXT NOT NULL,
            min_amount TEXT NOT NULL DEFAULT '0',
            max_amount TEXT,
            is_active BOOLEAN NOT NULL DEFAULT 1,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            UNIQUE (base_currency, quote_currency)
        )
        "#,
    ),
    (
        "exchange_house_currency_pairs",
        r#"
        CREATE TABLE IF NOT EXISTS exchange_house_currency_pairs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exchange_house_id INTEGER NOT NULL REFERENCES exchange_houses(id),
            currency_pair_id INTEGER NOT NULL REFERENCES currency_pairs(id),
            commission_model TEXT NOT NULL CHECK(commission_model IN ('percentage', 'spread', 'mixed')),
            commission_percent TEXT,
            buy_rate TEXT,
            sell_rate TEXT,
            min_amount TEXT NOT NULL DEFAULT '0',
            max_amount TEXT,
            is_active BOOLEAN NOT NULL DEFAULT 1,
            deleted_at DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "payment_methods",
        r#"
        CREATE TABLE IF NOT EXISTS payment_methods (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exchange_house_id INTEGER NOT NULL REFERENCES exchange_houses(id),
            name TEXT NOT NULL,
            method_type TEXT NOT NULL CHECK(method_type IN
                ('bank_transfer', 'mobile_payment', 'cash', 'crypto', 'card', 'other')),
            currency TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT 1,
            is_default BOOLEAN NOT NULL DEFAULT 0,
            min_amount TEXT,
            max_amount TEXT,
            daily_limit TEXT,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "customers",
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exchange_house_id INTEGER NOT NULL REFERENCES exchange_houses(id),
            name TEXT NOT NULL,
            total_orders INTEGER NOT NULL DEFAULT 0,
            total_volume TEXT NOT NULL DEFAULT '0',
            last_order_at DATETIME,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "customer_activities",
        r#"
        CREATE TABLE IF NOT EXISTS customer_activities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_id INTEGER NOT NULL REFERENCES customers(id),
            order_id INTEGER,
            activity_type TEXT NOT NULL,
            details TEXT NOT NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "operator_cash_balances",
        r#"
        CREATE TABLE IF NOT EXISTS operator_cash_balances (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            operator_id INTEGER NOT NULL,
            payment_method_id INTEGER NOT NULL REFERENCES payment_methods(id),
            currency TEXT NOT NULL,
            balance TEXT NOT NULL DEFAULT '0',
            reserved TEXT NOT NULL DEFAULT '0',
            version INTEGER NOT NULL DEFAULT 0,
            updated_at DATETIME NOT NULL,
            UNIQUE (operator_id, payment_method_id, currency)
        )
        "#,
    ),
    (
        "cash_movements",
        r#"
        CREATE TABLE IF NOT EXISTS cash_movements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            operator_id INTEGER NOT NULL,
            payment_method_id INTEGER NOT NULL REFERENCES payment_methods(id),
            order_id INTEGER,
            movement_type TEXT NOT NULL CHECK(movement_type IN
                ('deposit', 'withdrawal', 'order_in', 'order_out', 'adjustment')),
            currency TEXT NOT NULL,
            amount TEXT NOT NULL,
            balance_before TEXT NOT NULL,
            balance_after TEXT NOT NULL,
            description TEXT NOT NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "orders",
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exchange_house_id INTEGER NOT NULL REFERENCES exchange_houses(id),
            currency_pair_id INTEGER NOT NULL REFERENCES currency_pairs(id),
            operator_id INTEGER NOT NULL,
            customer_id INTEGER REFERENCES customers(id),
            inbound_payment_method_id INTEGER NOT NULL REFERENCES payment_methods(id),
            outbound_payment_method_id INTEGER NOT NULL REFERENCES payment_methods(id),
            base_currency TEXT NOT NULL,
            quote_currency TEXT NOT NULL,
            base_amount TEXT NOT NULL,
            quote_amount TEXT NOT NULL,
            market_rate TEXT NOT NULL,
            applied_rate TEXT NOT NULL,
            actual_rate TEXT,
            commission_model TEXT NOT NULL CHECK(commission_model IN ('percentage', 'spread', 'mixed')),
            commission_percent TEXT,
            buy_rate TEXT,
            sell_rate TEXT,
            house_commission_amount TEXT NOT NULL,
            spread_profit TEXT NOT NULL,
            spread_profit_base TEXT NOT NULL,
            total_profit TEXT NOT NULL,
            platform_commission_rate TEXT NOT NULL,
            platform_commission TEXT NOT NULL,
            exchange_commission TEXT NOT NULL,
            margin_percent TEXT NOT NULL,
            expected_margin_percent TEXT NOT NULL,
            actual_margin_percent TEXT,
            reserved_amount TEXT NOT NULL DEFAULT '0',
            status TEXT NOT NULL CHECK(status IN
                ('pending', 'processing', 'completed', 'cancelled', 'failed')),
            notes TEXT,
            cancellation_reason TEXT,
            cancelled_by INTEGER,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            completed_at DATETIME,
            cancelled_at DATETIME
        )
        "#,
    ),
    (
        "commission_payment_requests",
        r#"
        CREATE TABLE IF NOT EXISTS commission_payment_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exchange_house_id INTEGER NOT NULL REFERENCES exchange_houses(id),
            amount TEXT NOT NULL,
            period_start DATETIME NOT NULL,
            period_end DATETIME NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('pending', 'approved', 'rejected', 'paid')),
            requested_by INTEGER NOT NULL,
            approved_by INTEGER,
            paid_by INTEGER,
            rejection_reason TEXT,
            bank_name TEXT,
            account_holder TEXT,
            account_number TEXT,
            payment_reference TEXT,
            requested_at DATETIME NOT NULL,
            approved_at DATETIME,
            paid_at DATETIME
        )
        "#,
    ),
    (
        "commissions",
        r#"
        CREATE TABLE IF NOT EXISTS commissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id INTEGER NOT NULL REFERENCES orders(id),
            exchange_house_id INTEGER NOT NULL REFERENCES exchange_houses(id),
            beneficiary TEXT NOT NULL CHECK(beneficiary IN ('platform', 'exchange_house')),
            rate_percent TEXT NOT NULL,
            amount TEXT NOT NULL,
            base_amount TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('pending', 'paid')),
            payment_request_id INTEGER REFERENCES commission_payment_requests(id),
            paid_at DATETIME,
            created_at DATETIME NOT NULL,
            UNIQUE (order_id, beneficiary)
        )
        "#,
    ),
    (
        "commission_payments",
        r#"
        CREATE TABLE IF NOT EXISTS commission_payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id INTEGER NOT NULL UNIQUE REFERENCES commission_payment_requests(id),
            exchange_house_id INTEGER NOT NULL REFERENCES exchange_houses(id),
            period_start DATETIME NOT NULL,
            period_end DATETIME NOT NULL,
            total_amount TEXT NOT NULL,
            commission_count INTEGER NOT NULL,
            paid_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "settings",
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    // One live configuration per house and pair; detached rows are history
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_house_pair_live
        ON exchange_house_currency_pairs(exchange_house_id, currency_pair_id)
        WHERE deleted_at IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_payment_methods_house
        ON payment_methods(exchange_house_id, currency)",
    "CREATE INDEX IF NOT EXISTS idx_movements_key
        ON cash_movements(operator_id, payment_method_id, currency)",
    "CREATE INDEX IF NOT EXISTS idx_movements_order ON cash_movements(order_id)",
    "CREATE INDEX IF NOT EXISTS idx_orders_house_status ON orders(exchange_house_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders(customer_id)",
    "CREATE INDEX IF NOT EXISTS idx_commissions_house_status
        ON commissions(exchange_house_id, beneficiary, status)",
    "CREATE INDEX IF NOT EXISTS idx_requests_house
        ON commission_payment_requests(exchange_house_id, status)",
];

/// Run database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    for (table, ddl) in MIGRATIONS {
        sqlx::query(ddl).execute(pool).await.map_err(|e| {
            DatabaseError::MigrationError(format!("Failed to create {} table: {}", table, e))
        })?;
    }

    for ddl in INDEXES {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;
    }

    info!("✓ Database migrations completed successfully");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/fxdesk.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Log every statement at debug level
    pub log_queries: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/fxdesk.db".to_string(),
            max_connections: 5,
            log_queries: cfg!(debug_assertions),
        }
    }
}

impl DatabaseConfig {
    /// Private in-memory database, used by tests
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            log_queries: false,
        }
    }

    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let url = std::env::var("DATABASE_URL").unwrap_or(defaults.url);

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_connections);

        let log_queries = std::env::var("DATABASE_LOG_QUERIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.log_queries);

        Self {
            url,
            max_connections,
            log_queries,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

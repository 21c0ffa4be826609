use duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_cache_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS daily_bars (
    trade_date TEXT NOT NULL,
    instrument_code TEXT NOT NULL,
    open DOUBLE,
    high DOUBLE,
    low DOUBLE,
    close DOUBLE,
    vol DOUBLE,
    amount DOUBLE,
    adj_factor DOUBLE,
    PRIMARY KEY (trade_date, instrument_code)
);

CREATE TABLE IF NOT EXISTS moneyflow (
    trade_date TEXT NOT NULL,
    instrument_code TEXT NOT NULL,
    buy_sm_amount DOUBLE,
    sell_sm_amount DOUBLE,
    buy_md_amount DOUBLE,
    sell_md_amount DOUBLE,
    buy_lg_amount DOUBLE,
    sell_lg_amount DOUBLE,
    buy_elg_amount DOUBLE,
    sell_elg_amount DOUBLE,
    net_mf_amount DOUBLE,
    PRIMARY KEY (trade_date, instrument_code)
);
"#,
    },
    Migration {
        version: "0002_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_daily_bars_code_date ON daily_bars(instrument_code, trade_date);
CREATE INDEX IF NOT EXISTS idx_moneyflow_date ON moneyflow(trade_date);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let query = format!(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = '{}'",
            escape_sql_string(migration.version)
        );
        let applied_count: i64 = connection.query_row(query.as_str(), [], |row| row.get(0))?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            let insert = format!(
                "INSERT INTO schema_migrations (version) VALUES ('{}')",
                escape_sql_string(migration.version)
            );
            connection.execute_batch(insert.as_str())?;
            tracing::info!(version = migration.version, "applied schema migration");
        }
    }

    Ok(())
}

fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

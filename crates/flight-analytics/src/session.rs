//! Compute session backed by DuckDB.
//!
//! The session is the only place plans are executed. Everything else in the
//! crate builds [`QueryPlan`]s and hands them to one of the materialization
//! calls here: [`Session::collect`], [`Session::count`],
//! [`Session::save_table`] or [`Session::cache_table`].

use crate::error::{AnalyticsError, Result};
use crate::plan::{quote_ident, validate_identifier, QueryPlan};
use crate::rows::FromRow;
use duckdb::{params, Config, Connection, Row};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Master addresses that open an in-memory engine.
const IN_MEMORY_MASTERS: [&str; 2] = [":memory:", "local"];

/// Connection parameters for a compute session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// `:memory:`/`local` for an in-memory engine, otherwise a database file
    pub master: String,
    /// Engine options, passed through unmodified
    pub options: BTreeMap<String, String>,
}

impl SessionConfig {
    /// Session at `master` with no engine options.
    pub fn new(master: &str) -> Self {
        Self {
            master: master.to_string(),
            options: BTreeMap::new(),
        }
    }

    /// In-memory engine with default options.
    pub fn local() -> Self {
        Self::new("local")
    }

    /// Add an engine option.
    #[must_use]
    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    fn is_in_memory(&self) -> bool {
        IN_MEMORY_MASTERS.contains(&self.master.as_str())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::local()
    }
}

/// Open compute session exposing named tables as lazy plans.
pub struct Session {
    pub(crate) conn: Connection,
    master: String,
    /// Logical table name -> resident temp table
    cached: HashMap<String, String>,
}

impl Session {
    /// Open a session. Any failure here, including a rejected engine option,
    /// is reported as [`AnalyticsError::Connection`].
    pub fn connect(config: &SessionConfig) -> Result<Self> {
        let connection_error = |source| AnalyticsError::Connection {
            master: config.master.clone(),
            source,
        };

        let mut engine_config = Config::default();
        for (key, value) in &config.options {
            engine_config = engine_config
                .with(key, value)
                .map_err(connection_error)?;
        }

        let conn = if config.is_in_memory() {
            Connection::open_in_memory_with_flags(engine_config)
        } else {
            Connection::open_with_flags(&config.master, engine_config)
        }
        .map_err(connection_error)?;

        info!(
            master = %config.master,
            options = config.options.len(),
            "Connected to compute session"
        );

        Ok(Self {
            conn,
            master: config.master.clone(),
            cached: HashMap::new(),
        })
    }

    /// In-memory session with default options.
    pub fn in_memory() -> Result<Self> {
        Self::connect(&SessionConfig::local())
    }

    /// Master address the session was opened with.
    pub fn master(&self) -> &str {
        &self.master
    }

    /// Lowercased column names of a relation, empty if it does not exist.
    fn relation_columns(&self, relation: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT lower(column_name)
            FROM information_schema.columns
            WHERE lower(table_name) = lower(?)
            ORDER BY ordinal_position
            "#,
        )?;
        let rows = stmt.query_map(params![relation], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }

    /// Whether a table or view named `name` exists.
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(!self.relation_columns(name)?.is_empty())
    }

    /// Lazy handle on a named table. Resolves to the resident copy when the
    /// table has been cached.
    pub fn table(&self, name: &str) -> Result<QueryPlan> {
        validate_identifier(name)?;
        let relation = self
            .cached
            .get(name)
            .map_or(name, String::as_str);
        let columns = self.relation_columns(relation)?;
        if columns.is_empty() {
            return Err(AnalyticsError::MissingTable(name.to_string()));
        }
        Ok(QueryPlan::scan(name, relation, columns))
    }

    /// Make a table resident in engine memory. Returns its row count.
    pub fn cache_table(&mut self, name: &str) -> Result<i64> {
        validate_identifier(name)?;
        if !self.table_exists(name)? {
            return Err(AnalyticsError::MissingTable(name.to_string()));
        }
        let resident = format!("cached_{name}");
        self.conn.execute_batch(&format!(
            "CREATE OR REPLACE TEMP TABLE {} AS SELECT * FROM {}",
            quote_ident(&resident),
            quote_ident(name)
        ))?;
        self.cached.insert(name.to_string(), resident);
        let rows = self.count(&self.table(name)?)?;
        info!(table = name, rows, "Cached table");
        Ok(rows)
    }

    /// Drop the resident copy of a table. Returns whether one existed.
    pub fn uncache_table(&mut self, name: &str) -> Result<bool> {
        match self.cached.remove(name) {
            Some(resident) => {
                self.conn
                    .execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(&resident)))?;
                debug!(table = name, "Uncached table");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether `name` currently resolves to a resident copy.
    pub fn is_cached(&self, name: &str) -> bool {
        self.cached.contains_key(name)
    }

    /// Execute a plan and map every row with `f`.
    pub fn query_map<T, F>(&self, plan: &QueryPlan, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> duckdb::Result<T>,
    {
        let sql = plan.to_sql();
        debug!(source = plan.source(), %sql, "Executing plan");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| f(row))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }

    /// Execute a plan and pull its rows into local memory.
    pub fn collect<T: FromRow>(&self, plan: &QueryPlan) -> Result<Vec<T>> {
        self.query_map(plan, T::from_row)
    }

    /// Number of rows a plan produces.
    pub fn count(&self, plan: &QueryPlan) -> Result<i64> {
        let sql = format!("SELECT count(*) FROM ({}) AS c", plan.to_sql());
        debug!(source = plan.source(), %sql, "Counting plan");
        let count = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }

    /// Persist a plan as a named table, replacing any table of that name.
    /// Returns the number of rows written.
    pub fn save_table(&mut self, plan: &QueryPlan, name: &str) -> Result<i64> {
        validate_identifier(name)?;
        if self.is_cached(name) {
            self.uncache_table(name)?;
        }
        let sql = format!(
            "CREATE OR REPLACE TABLE {} AS {}",
            quote_ident(name),
            plan.to_sql()
        );
        debug!(table = name, %sql, "Saving table");
        self.conn.execute_batch(&sql)?;
        let rows = self.count(&self.table(name)?)?;
        info!(table = name, rows, "Saved table");
        Ok(rows)
    }
}

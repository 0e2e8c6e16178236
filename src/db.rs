use std::time::Duration;

use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::QueryResult;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

pub const DEFAULT_MAX_POOL_SIZE: u32 = 4;

pub fn init_pool_with_size(database_url: &str, max_size: u32) -> anyhow::Result<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool_size = max_size.max(1);
    let pool = Pool::builder()
        .max_size(pool_size)
        .connection_timeout(Duration::from_secs(10))
        .build(manager)?;
    Ok(pool)
}

// The access pipeline awaits blob and render calls while its transaction is
// open, which `Connection::transaction` cannot express, so it drives the
// transaction manager directly.

pub fn begin(conn: &mut PgConnection) -> QueryResult<()> {
    AnsiTransactionManager::begin_transaction(conn)
}

pub fn commit(conn: &mut PgConnection) -> QueryResult<()> {
    AnsiTransactionManager::commit_transaction(conn)
}

pub fn rollback(conn: &mut PgConnection) -> QueryResult<()> {
    AnsiTransactionManager::rollback_transaction(conn)
}

pub mod functions {
    use diesel::define_sql_function;
    use diesel::sql_types::{Integer, Numeric};

    define_sql_function! {
        /// Postgres `GREATEST` over two integers; used to floor counters at zero.
        fn greatest(a: Integer, b: Integer) -> Integer;
    }

    define_sql_function! {
        #[sql_name = "GREATEST"]
        fn greatest_numeric(a: Numeric, b: Numeric) -> Numeric;
    }
}

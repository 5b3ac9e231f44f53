//! Database layer
//!
//! SQLite (default) or MySQL behind the [`DatabasePool`] trait, schema
//! migrations embedded in the binary, and one repository per table.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, mysql_pool, sqlite_pool, DatabasePool, DynDatabasePool,
    MysqlDatabase, SqliteDatabase,
};

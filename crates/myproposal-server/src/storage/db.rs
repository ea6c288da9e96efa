//! `SQLite` database handle for the myproposal server.

pub use myproposal_core::db::DatabaseError;

myproposal_core::define_database!(AppDatabase, "Database migrations complete");

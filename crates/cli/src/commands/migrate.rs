//! Database migration command.
//!
//! Migrations live in `crates/admin/migrations/` and are embedded at build
//! time, so the binary can migrate a database without the source tree.

use sqlx::PgPool;

/// Apply pending migrations.
///
/// # Errors
///
/// Returns the migrator's error if a migration fails or the recorded
/// checksums no longer match the files.
pub async fn run(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    let migrator = sqlx::migrate!("../admin/migrations");
    tracing::info!(count = migrator.iter().count(), "Running migrations...");
    migrator.run(pool).await?;
    tracing::info!("Migrations complete");
    Ok(())
}

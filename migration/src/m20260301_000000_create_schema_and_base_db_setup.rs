use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("CREATE SCHEMA IF NOT EXISTS lifecycle_engine;")
            .await?;

        manager
            .get_connection()
            .execute_unprepared("SET search_path TO lifecycle_engine, public;")
            .await?;

        // The worker connects as `lifecycle`
        manager
            .get_connection()
            .execute_unprepared(r#"
                DO $$ BEGIN
                    GRANT ALL PRIVILEGES ON DATABASE lifecycle TO lifecycle;
                    GRANT ALL ON SCHEMA lifecycle_engine TO lifecycle;

                    ALTER DEFAULT PRIVILEGES IN SCHEMA lifecycle_engine GRANT ALL ON TABLES TO lifecycle;
                    ALTER DEFAULT PRIVILEGES IN SCHEMA lifecycle_engine GRANT ALL ON SEQUENCES TO lifecycle;
                    ALTER DEFAULT PRIVILEGES IN SCHEMA lifecycle_engine GRANT ALL ON FUNCTIONS TO lifecycle;
                END $$;
            "#)
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(r#"
                DO $$ BEGIN
                    ALTER DEFAULT PRIVILEGES IN SCHEMA lifecycle_engine REVOKE ALL ON FUNCTIONS FROM lifecycle;
                    ALTER DEFAULT PRIVILEGES IN SCHEMA lifecycle_engine REVOKE ALL ON SEQUENCES FROM lifecycle;
                    ALTER DEFAULT PRIVILEGES IN SCHEMA lifecycle_engine REVOKE ALL ON TABLES FROM lifecycle;
                    REVOKE ALL ON SCHEMA lifecycle_engine FROM lifecycle;
                    REVOKE ALL PRIVILEGES ON DATABASE lifecycle FROM lifecycle;
                END $$;
            "#)
            .await?;

        // CASCADE removes every table and type in the schema
        manager
            .get_connection()
            .execute_unprepared("DROP SCHEMA IF EXISTS lifecycle_engine CASCADE;")
            .await?;

        Ok(())
    }
}

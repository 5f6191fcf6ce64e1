use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const CREATE_TYPES: &[&str] = &[
    "CREATE TYPE lifecycle_engine.segment_kind AS ENUM ('system', 'custom')",
    "CREATE TYPE lifecycle_engine.trigger_type AS ENUM (
        'after_booking', 'after_contact', 'after_subscribe', 'after_stamp_complete',
        'no_visit_30d', 'no_visit_60d', 'no_visit_90d', 'birthday'
    )",
    "CREATE TYPE lifecycle_engine.execution_status AS ENUM (
        'scheduled', 'in_flight', 'sent', 'failed', 'skipped'
    )",
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        for statement in CREATE_TYPES {
            db.execute_unprepared(statement).await?;
        }

        // Mirrors the product's customers table; the engine only writes `tags`.
        db.execute_unprepared(
            r#"
            CREATE TABLE IF NOT EXISTS lifecycle_engine.customers (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                profile_id UUID NOT NULL,
                display_name VARCHAR(255),
                email VARCHAR(255),
                tags JSONB NOT NULL DEFAULT '[]',
                source VARCHAR(255),
                total_bookings INTEGER NOT NULL DEFAULT 0,
                total_messages INTEGER NOT NULL DEFAULT 0,
                is_subscriber BOOLEAN NOT NULL DEFAULT FALSE,
                birthday DATE,
                last_seen_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .await?;

        db.execute_unprepared(
            r#"
            CREATE TABLE IF NOT EXISTS lifecycle_engine.segments (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                profile_id UUID NOT NULL,
                kind lifecycle_engine.segment_kind NOT NULL DEFAULT 'custom',
                name VARCHAR(255) NOT NULL,
                color VARCHAR(32) NOT NULL DEFAULT '#6b7280',
                criteria JSONB NOT NULL,
                auto_actions JSONB NOT NULL DEFAULT '[]',
                member_ids JSONB NOT NULL DEFAULT '[]',
                member_count INTEGER NOT NULL DEFAULT 0,
                membership_version BIGINT NOT NULL DEFAULT 0,
                refreshed_at TIMESTAMPTZ,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .await?;

        db.execute_unprepared(
            r#"
            CREATE TABLE IF NOT EXISTS lifecycle_engine.automation_rules (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                profile_id UUID NOT NULL,
                name VARCHAR(255) NOT NULL,
                trigger lifecycle_engine.trigger_type NOT NULL,
                action JSONB NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                sent_count INTEGER NOT NULL DEFAULT 0,
                scheduled_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .await?;

        // No foreign keys to rules or segments: executions outlive their owners and are
        // skipped as `owner_deleted` at dispatch time.
        db.execute_unprepared(
            r#"
            CREATE TABLE IF NOT EXISTS lifecycle_engine.scheduled_executions (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                profile_id UUID NOT NULL,
                rule_id UUID,
                segment_id UUID,
                customer_id UUID NOT NULL,
                action JSONB NOT NULL,
                trigger_key TEXT NOT NULL,
                due_at TIMESTAMPTZ NOT NULL,
                status lifecycle_engine.execution_status NOT NULL DEFAULT 'scheduled',
                version INTEGER NOT NULL DEFAULT 0,
                reason TEXT,
                claimed_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                resolved_at TIMESTAMPTZ,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                CONSTRAINT scheduled_executions_single_owner
                    CHECK (rule_id IS NULL OR segment_id IS NULL)
            )
        "#,
        )
        .await?;

        for table in [
            "customers",
            "segments",
            "automation_rules",
            "scheduled_executions",
        ] {
            db.execute_unprepared(&format!(
                "ALTER TABLE lifecycle_engine.{table} OWNER TO lifecycle"
            ))
            .await?;
        }

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_customers_profile_id
             ON lifecycle_engine.customers(profile_id)",
            "CREATE INDEX IF NOT EXISTS idx_segments_profile_id
             ON lifecycle_engine.segments(profile_id)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_segments_system_name
             ON lifecycle_engine.segments(profile_id, name) WHERE kind = 'system'",
            "CREATE INDEX IF NOT EXISTS idx_automation_rules_profile_trigger
             ON lifecycle_engine.automation_rules(profile_id, trigger) WHERE is_active",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_scheduled_executions_trigger_key
             ON lifecycle_engine.scheduled_executions(trigger_key)",
            "CREATE INDEX IF NOT EXISTS idx_scheduled_executions_status_due_at
             ON lifecycle_engine.scheduled_executions(status, due_at)",
            "CREATE INDEX IF NOT EXISTS idx_scheduled_executions_profile_created_at
             ON lifecycle_engine.scheduled_executions(profile_id, created_at DESC)",
        ] {
            db.execute_unprepared(index).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        for table in [
            "scheduled_executions",
            "automation_rules",
            "segments",
            "customers",
        ] {
            db.execute_unprepared(&format!("DROP TABLE IF EXISTS lifecycle_engine.{table}"))
                .await?;
        }

        for enum_type in ["execution_status", "trigger_type", "segment_kind"] {
            db.execute_unprepared(&format!("DROP TYPE IF EXISTS lifecycle_engine.{enum_type}"))
                .await?;
        }

        Ok(())
    }
}

//! ScyllaDB schema creation
//!
//! Time-ordered tables cluster on (created_at DESC, id DESC) so "latest row"
//! reads are a LIMIT 1 on the partition.

use crate::error::PersistenceError;
use scylla::Session;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

async fn create(session: &Session, name: &str, ddl: String) -> Result<(), PersistenceError> {
    session
        .query_unpaged(ddl, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create {}: {}", name, e)))?;
    Ok(())
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    // User profiles, partitioned by user id; phone lookup goes through the
    // profiles_by_phone companion table
    create(
        session,
        "user_profiles",
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {}.user_profiles (
            user_id UUID,
            phone TEXT,
            full_name TEXT,
            age INT,
            goal_type TEXT,
            activity_level TEXT,
            current_weight_kg FLOAT,
            target_weight_kg FLOAT,
            height_cm FLOAT,
            gender TEXT,
            billing_status TEXT,
            notifications_enabled BOOLEAN,
            cultural_context TEXT,
            spiritual_belief TEXT,
            created_at BIGINT,
            PRIMARY KEY (user_id)
        )
    "#,
            keyspace
        ),
    )
    .await?;

    create(
        session,
        "profiles_by_phone",
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {}.profiles_by_phone (
            phone TEXT,
            user_id UUID,
            PRIMARY KEY (phone)
        )
    "#,
            keyspace
        ),
    )
    .await?;

    // Stage log: append-only, latest row is the current stage
    create(
        session,
        "client_stages",
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {}.client_stages (
            user_id UUID,
            created_at BIGINT,
            stage_id UUID,
            stage TEXT,
            bant_score INT,
            stage_metadata TEXT,
            transition_reason TEXT,
            PRIMARY KEY ((user_id), created_at, stage_id)
        ) WITH CLUSTERING ORDER BY (created_at DESC, stage_id DESC)
    "#,
            keyspace
        ),
    )
    .await?;

    // Append-only conversation log per user
    create(
        session,
        "conversation_memory",
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {}.conversation_memory (
            user_id UUID,
            created_at BIGINT,
            entry_id UUID,
            role TEXT,
            content TEXT,
            stage TEXT,
            PRIMARY KEY ((user_id), created_at, entry_id)
        ) WITH CLUSTERING ORDER BY (created_at DESC, entry_id DESC)
    "#,
            keyspace
        ),
    )
    .await?;

    // Raw WhatsApp inbox, keyed by the raw phone string (pre-normalization)
    create(
        session,
        "whatsapp_messages",
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {}.whatsapp_messages (
            phone TEXT,
            received_at BIGINT,
            message_id UUID,
            message TEXT,
            event TEXT,
            PRIMARY KEY ((phone), received_at, message_id)
        ) WITH CLUSTERING ORDER BY (received_at DESC, message_id DESC)
    "#,
            keyspace
        ),
    )
    .await?;

    // Plans: at most one active row per (user, plan_type); old rows are
    // deactivated, never updated in place
    create(
        session,
        "plans",
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {}.plans (
            user_id UUID,
            created_at BIGINT,
            plan_id UUID,
            plan_type TEXT,
            content TEXT,
            is_active BOOLEAN,
            PRIMARY KEY ((user_id), created_at, plan_id)
        ) WITH CLUSTERING ORDER BY (created_at DESC, plan_id DESC)
    "#,
            keyspace
        ),
    )
    .await?;

    create(
        session,
        "plan_feedback",
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {}.plan_feedback (
            user_id UUID,
            created_at BIGINT,
            feedback_id UUID,
            plan_type TEXT,
            feedback_text TEXT,
            status TEXT,
            plan_updated BOOLEAN,
            ai_response TEXT,
            processed_at BIGINT,
            PRIMARY KEY ((user_id), created_at, feedback_id)
        ) WITH CLUSTERING ORDER BY (created_at DESC, feedback_id DESC)
    "#,
            keyspace
        ),
    )
    .await?;

    // Gamification summary (mutated by the activity pipeline, read here)
    create(
        session,
        "gamification",
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {}.gamification (
            user_id UUID,
            total_points BIGINT,
            level BIGINT,
            current_streak BIGINT,
            longest_streak BIGINT,
            last_activity_date TEXT,
            PRIMARY KEY (user_id)
        )
    "#,
            keyspace
        ),
    )
    .await?;

    create(
        session,
        "daily_activities",
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {}.daily_activities (
            user_id UUID,
            completed_at BIGINT,
            activity_id UUID,
            activity_date TEXT,
            is_completed BOOLEAN,
            PRIMARY KEY ((user_id), completed_at, activity_id)
        ) WITH CLUSTERING ORDER BY (completed_at DESC, activity_id DESC)
    "#,
            keyspace
        ),
    )
    .await?;

    create(
        session,
        "reward_redemptions",
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {}.reward_redemptions (
            user_id UUID,
            created_at BIGINT,
            redemption_id UUID,
            reward TEXT,
            points_spent BIGINT,
            PRIMARY KEY ((user_id), created_at, redemption_id)
        ) WITH CLUSTERING ORDER BY (created_at DESC, redemption_id DESC)
    "#,
            keyspace
        ),
    )
    .await?;

    // Proactive messages: write-once per send, one update when answered
    create(
        session,
        "proactive_messages",
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {}.proactive_messages (
            user_id UUID,
            sent_at BIGINT,
            message_id UUID,
            message_type TEXT,
            message_content TEXT,
            metadata TEXT,
            response_received BOOLEAN,
            response_at BIGINT,
            PRIMARY KEY ((user_id), sent_at, message_id)
        ) WITH CLUSTERING ORDER BY (sent_at DESC, message_id DESC)
    "#,
            keyspace
        ),
    )
    .await?;

    // Emergency protocol hits (keyword screen on inbound messages)
    create(
        session,
        "emergency_alerts",
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {}.emergency_alerts (
            phone TEXT,
            created_at BIGINT,
            alert_id UUID,
            user_id UUID,
            message_content TEXT,
            PRIMARY KEY ((phone), created_at, alert_id)
        ) WITH CLUSTERING ORDER BY (created_at DESC, alert_id DESC)
    "#,
            keyspace
        ),
    )
    .await?;

    // Guard decision audit trail
    create(
        session,
        "conversation_metrics",
        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {}.conversation_metrics (
            user_id UUID,
            created_at BIGINT,
            metric_id UUID,
            stage_before TEXT,
            stage_after TEXT,
            issues TEXT,
            hints TEXT,
            guard_action TEXT,
            PRIMARY KEY ((user_id), created_at, metric_id)
        ) WITH CLUSTERING ORDER BY (created_at DESC, metric_id DESC)
    "#,
            keyspace
        ),
    )
    .await?;

    tracing::info!("All tables created successfully");
    Ok(())
}

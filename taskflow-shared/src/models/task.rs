use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// A concrete instance of a `NamedTask`: the unit the Coordinator drives.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Task {
    pub uuid: Uuid,
    pub named_task_uuid: Uuid,
    /// Context payload, validated against the `NamedTask`'s `context_schema`
    /// at creation time.
    pub context: Value,
    /// Deterministic hash of `(named_task_uuid, context)` used to deduplicate
    /// submissions of an otherwise-identical task.
    pub identity_hash: String,
    pub complete: bool,
    pub priority: i32,
    pub correlation_id: Uuid,
    pub parent_correlation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn identity_hash_for(named_task_uuid: Uuid, context: &Value) -> String {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        named_task_uuid.hash(&mut hasher);
        context.to_string().hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

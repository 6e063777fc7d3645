use super::InteractionStore;
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::models::*;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::{MySql, QueryBuilder};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{info, warn};

#[derive(sqlx::FromRow)]
struct EventRow {
    user_id: i64,
    item_id: i64,
    kind: Option<String>,
    created_at: Option<NaiveDateTime>,
}

#[derive(sqlx::FromRow)]
struct TypedInteractionRow {
    item_id: i64,
    kind: Option<String>,
    type_cid: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: i64,
    title: Option<String>,
    description: Option<String>,
    type_pid: Option<i64>,
    type_cid: Option<String>,
    like_num: i64,
    collect_num: i64,
    browse_num: i64,
    create_time: Option<NaiveDateTime>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            title: row.title.unwrap_or_default(),
            description: row.description,
            type_parent_id: row.type_pid,
            type_child_ids: TypeKey::parse_opt(row.type_cid.as_deref()),
            like_num: row.like_num,
            collect_num: row.collect_num,
            browse_num: row.browse_num,
            create_time: row.create_time,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FeedbackRow {
    user_id: i64,
    item_id: i64,
    feedback: Option<String>,
    reward: Option<i64>,
    type_cid: Option<String>,
    created_at: Option<NaiveDateTime>,
}

#[derive(sqlx::FromRow)]
struct ItemTypeRow {
    id: i64,
    type_cid: Option<String>,
}

const ITEM_COLUMNS: &str = r#"
    CAST(id AS SIGNED) AS id,
    tweets_title AS title,
    tweets_describe AS description,
    CAST(tweets_type_pid AS SIGNED) AS type_pid,
    tweets_type_cid AS type_cid,
    CAST(COALESCE(like_num, 0) AS SIGNED) AS like_num,
    CAST(COALESCE(collect_num, 0) AS SIGNED) AS collect_num,
    CAST(COALESCE(browse_num, 0) AS SIGNED) AS browse_num,
    create_time
"#;

const ACTIVE_ITEMS: &str = "(status IS NULL OR status != '0')";

/// MySQL-backed store over the `tweets`, `tweets_records`, `client_user`
/// and `recommendation_feedback` tables.
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections())
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .max_lifetime(Duration::from_secs(config.pool_recycle_secs))
            .test_before_acquire(true)
            .connect(&config.url())
            .await?;

        info!(
            "Connected to MySQL at {}:{}/{} (max {} connections)",
            config.host,
            config.port,
            config.name,
            config.max_connections()
        );

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl InteractionStore for MySqlStore {
    async fn rating_events(&self) -> Result<Vec<InteractionEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT
                CAST(tr.client_user_id AS SIGNED) AS user_id,
                CAST(tr.tweets_id AS SIGNED) AS item_id,
                tr.type AS kind,
                tr.create_time AS created_at
            FROM tweets_records tr
            WHERE tr.type IN ('like', 'collect', 'browse')
              AND tr.client_user_id IS NOT NULL
              AND tr.tweets_id IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InteractionEvent {
                user_id: row.user_id,
                item_id: row.item_id,
                kind: InteractionKind::parse(row.kind.as_deref().unwrap_or_default()),
                timestamp: row.created_at,
            })
            .collect())
    }

    async fn user_interactions(&self, user_id: UserId) -> Result<Vec<TypedInteraction>> {
        let rows: Vec<TypedInteractionRow> = sqlx::query_as(
            r#"
            SELECT
                CAST(tr.tweets_id AS SIGNED) AS item_id,
                tr.type AS kind,
                t.tweets_type_cid AS type_cid
            FROM tweets_records tr
            LEFT JOIN tweets t ON tr.tweets_id = t.id
            WHERE tr.client_user_id = ?
              AND tr.tweets_id IS NOT NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TypedInteraction {
                item_id: row.item_id,
                kind: InteractionKind::parse(row.kind.as_deref().unwrap_or_default()),
                item_type: TypeKey::parse_opt(row.type_cid.as_deref()),
            })
            .collect())
    }

    async fn user_tags(&self, user_id: UserId) -> Result<BTreeSet<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT tags FROM client_user WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(parse_tags(row.and_then(|(tags,)| tags).as_deref()))
    }

    async fn candidate_items(&self, limit: usize) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM tweets WHERE {ACTIVE_ITEMS} \
             ORDER BY (COALESCE(like_num, 0) * 3 + COALESCE(collect_num, 0) * 2 + COALESCE(browse_num, 0)) DESC, id \
             LIMIT ?"
        );
        let rows: Vec<ItemRow> = sqlx::query_as(&sql)
            .bind(limit as u64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn active_items(&self) -> Result<Vec<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM tweets WHERE {ACTIVE_ITEMS} ORDER BY id");
        let rows: Vec<ItemRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn recent_feedback(&self, user_id: UserId, limit: usize) -> Result<Vec<FeedbackRecord>> {
        let rows: Vec<FeedbackRow> = sqlx::query_as(
            r#"
            SELECT
                CAST(rf.client_user_id AS SIGNED) AS user_id,
                CAST(rf.tweets_id AS SIGNED) AS item_id,
                rf.feedback,
                CAST(rf.reward AS SIGNED) AS reward,
                t.tweets_type_cid AS type_cid,
                rf.create_time AS created_at
            FROM recommendation_feedback rf
            LEFT JOIN tweets t ON rf.tweets_id = t.id
            WHERE rf.client_user_id = ?
              AND rf.tweets_id IS NOT NULL
            ORDER BY rf.create_time DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as u64)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(kind) = row.feedback.as_deref().and_then(FeedbackKind::parse) else {
                warn!(user_id, item_id = row.item_id, feedback = ?row.feedback, "Skipping feedback row with unknown kind");
                continue;
            };
            records.push(FeedbackRecord {
                user_id: row.user_id,
                item_id: row.item_id,
                kind,
                reward: row.reward.map(|r| r as f64).unwrap_or_else(|| kind.default_reward()),
                item_type: TypeKey::parse_opt(row.type_cid.as_deref()),
                timestamp: row.created_at,
            });
        }

        Ok(records)
    }

    async fn item_types(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, Option<TypeKey>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query: QueryBuilder<MySql> = QueryBuilder::new(
            "SELECT CAST(id AS SIGNED) AS id, tweets_type_cid AS type_cid FROM tweets WHERE id IN (",
        );
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows: Vec<ItemTypeRow> = query.build_query_as().fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.id, TypeKey::parse_opt(row.type_cid.as_deref())))
            .collect())
    }
}

//! SQLite-backed campaign document store.
//!
//! Campaigns, turns and game states are stored as JSON documents in TEXT
//! columns, keyed by campaign id. Reads and writes are independent statements;
//! concurrent interactions on the same campaign are last-writer-wins for the
//! state document.

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use worldarchitect_domain::{Campaign, CampaignId, StoryTurn, UserId};

use crate::infrastructure::ports::{CampaignRepo, ClockPort, RepoError};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS campaigns (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        last_played TEXT NOT NULL,
        campaign_json TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_campaigns_user ON campaigns (user_id, last_played)",
    r#"
    CREATE TABLE IF NOT EXISTS story_turns (
        campaign_id TEXT NOT NULL,
        sequence INTEGER NOT NULL,
        turn_json TEXT NOT NULL,
        PRIMARY KEY (campaign_id, sequence)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS game_states (
        campaign_id TEXT PRIMARY KEY,
        state_json TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
];

/// SQLite implementation of [`CampaignRepo`].
pub struct SqliteCampaignRepo {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteCampaignRepo {
    pub async fn new(db_path: &str, clock: Arc<dyn ClockPort>) -> Result<Self, RepoError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| RepoError::database("connect", e))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| RepoError::database("migrate", e))?;
        }

        Ok(Self { pool, clock })
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepoError> {
    serde_json::to_string(value).map_err(RepoError::serialization)
}

fn decode_turns(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<StoryTurn>, RepoError> {
    rows.into_iter()
        .map(|row| {
            let json: String = row.get("turn_json");
            serde_json::from_str(&json).map_err(RepoError::serialization)
        })
        .collect()
}

#[async_trait]
impl CampaignRepo for SqliteCampaignRepo {
    async fn save_campaign(&self, campaign: &Campaign) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO campaigns (id, user_id, last_played, campaign_json)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                last_played = excluded.last_played,
                campaign_json = excluded.campaign_json
            "#,
        )
        .bind(campaign.id.to_string())
        .bind(campaign.user_id.as_str())
        .bind(
            campaign
                .last_played
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        )
        .bind(to_json(campaign)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("save_campaign", e))?;

        Ok(())
    }

    async fn get_campaign(&self, id: CampaignId) -> Result<Option<Campaign>, RepoError> {
        let row = sqlx::query("SELECT campaign_json FROM campaigns WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get_campaign", e))?;

        match row {
            Some(row) => {
                let json: String = row.get("campaign_json");
                let campaign = serde_json::from_str(&json).map_err(RepoError::serialization)?;
                Ok(Some(campaign))
            }
            None => Ok(None),
        }
    }

    async fn list_campaigns(&self, user_id: &UserId) -> Result<Vec<Campaign>, RepoError> {
        let rows = sqlx::query(
            "SELECT campaign_json FROM campaigns WHERE user_id = ? ORDER BY last_played DESC",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("list_campaigns", e))?;

        rows.into_iter()
            .map(|row| {
                let json: String = row.get("campaign_json");
                serde_json::from_str(&json).map_err(RepoError::serialization)
            })
            .collect()
    }

    async fn append_turns(&self, id: CampaignId, turns: &[StoryTurn]) -> Result<(), RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("append_turns", e))?;

        for turn in turns {
            sqlx::query(
                "INSERT INTO story_turns (campaign_id, sequence, turn_json) VALUES (?, ?, ?)",
            )
            .bind(id.to_string())
            .bind(i64::from(turn.sequence))
            .bind(to_json(turn)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepoError::database("append_turns", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepoError::database("append_turns", e))?;
        Ok(())
    }

    async fn list_turns(&self, id: CampaignId) -> Result<Vec<StoryTurn>, RepoError> {
        let rows = sqlx::query(
            "SELECT turn_json FROM story_turns WHERE campaign_id = ? ORDER BY sequence ASC",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("list_turns", e))?;

        decode_turns(rows)
    }

    async fn list_turns_range(
        &self,
        id: CampaignId,
        start: u32,
        end: u32,
    ) -> Result<Vec<StoryTurn>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT turn_json FROM story_turns
            WHERE campaign_id = ? AND sequence >= ? AND sequence < ?
            ORDER BY sequence ASC
            "#,
        )
        .bind(id.to_string())
        .bind(i64::from(start))
        .bind(i64::from(end))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("list_turns_range", e))?;

        decode_turns(rows)
    }

    async fn count_turns(&self, id: CampaignId) -> Result<u32, RepoError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM story_turns WHERE campaign_id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepoError::database("count_turns", e))?;

        let total: i64 = row.get("total");
        u32::try_from(total).map_err(|e| RepoError::database("count_turns", e))
    }

    async fn get_state(&self, id: CampaignId) -> Result<Option<Value>, RepoError> {
        let row = sqlx::query("SELECT state_json FROM game_states WHERE campaign_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get_state", e))?;

        match row {
            Some(row) => {
                let json: String = row.get("state_json");
                // Text that is not JSON at all is surfaced as a string document,
                // which the state merger rejects as corrupt.
                Ok(Some(
                    serde_json::from_str(&json).unwrap_or(Value::String(json)),
                ))
            }
            None => Ok(None),
        }
    }

    async fn save_state(&self, id: CampaignId, state: &Value) -> Result<(), RepoError> {
        let now = self.clock.now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO game_states (campaign_id, state_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(campaign_id) DO UPDATE SET
                state_json = excluded.state_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id.to_string())
        .bind(to_json(state)?)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("save_state", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use worldarchitect_domain::{InteractionMode, TurnStructuredFields};

    use super::*;
    use crate::infrastructure::clock::FixedClock;

    async fn repo(dir: &tempfile::TempDir) -> SqliteCampaignRepo {
        let path = dir.path().join("campaigns.db");
        let clock = Arc::new(FixedClock(Utc::now()));
        SqliteCampaignRepo::new(path.to_str().expect("utf-8 path"), clock)
            .await
            .expect("open database")
    }

    fn campaign(user: &str, title: &str, minutes: i64) -> Campaign {
        let start = Utc
            .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid date");
        let mut campaign = Campaign::new(
            UserId::new(user).expect("valid user"),
            title,
            "A quiet valley",
            start,
        )
        .expect("valid campaign");
        campaign.touch(start + Duration::minutes(minutes));
        campaign
    }

    #[tokio::test]
    async fn campaigns_round_trip_and_list_newest_first() {
        let dir = tempfile::tempdir().expect("temp dir");
        let repo = repo(&dir).await;

        let older = campaign("alice", "Older", 1);
        let newer = campaign("alice", "Newer", 5);
        let other = campaign("bob", "Not mine", 9);
        for c in [&older, &newer, &other] {
            repo.save_campaign(c).await.expect("save");
        }

        let loaded = repo
            .get_campaign(older.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(loaded, older);

        let listed = repo
            .list_campaigns(&older.user_id)
            .await
            .expect("list");
        let titles: Vec<&str> = listed.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Newer", "Older"]);

        assert!(repo
            .get_campaign(CampaignId::new())
            .await
            .expect("get")
            .is_none());
    }

    #[tokio::test]
    async fn turns_come_back_in_sequence_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let repo = repo(&dir).await;
        let id = CampaignId::new();
        let now = Utc::now();

        let opening =
            StoryTurn::narrator(0, InteractionMode::Character, "It begins.", now, TurnStructuredFields::default());
        let user = StoryTurn::user(1, InteractionMode::Character, "I wave.", now);
        let reply = StoryTurn::narrator(
            2,
            InteractionMode::Character,
            "Someone waves back.",
            now,
            TurnStructuredFields {
                entities_mentioned: vec!["Mara".into()],
                ..TurnStructuredFields::default()
            },
        );

        repo.append_turns(id, &[user.clone(), reply.clone()])
            .await
            .expect("append");
        repo.append_turns(id, &[opening.clone()])
            .await
            .expect("append");

        let turns = repo.list_turns(id).await.expect("list");
        let sequences: Vec<u32> = turns.iter().map(|t| t.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(turns[2].structured.entities_mentioned, vec!["Mara"]);

        assert_eq!(repo.count_turns(id).await.expect("count"), 3);
        let page = repo.list_turns_range(id, 1, 3).await.expect("range");
        assert_eq!(page, vec![user, reply]);
    }

    #[tokio::test]
    async fn duplicate_sequence_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let repo = repo(&dir).await;
        let id = CampaignId::new();
        let turn = StoryTurn::user(0, InteractionMode::God, "Make it rain.", Utc::now());

        repo.append_turns(id, &[turn.clone()]).await.expect("append");
        let err = repo.append_turns(id, &[turn]).await.unwrap_err();
        assert!(matches!(err, RepoError::Database { .. }));
    }

    #[tokio::test]
    async fn state_documents_are_overwritten() {
        let dir = tempfile::tempdir().expect("temp dir");
        let repo = repo(&dir).await;
        let id = CampaignId::new();

        assert!(repo.get_state(id).await.expect("get").is_none());

        repo.save_state(id, &json!({"debug_mode": false}))
            .await
            .expect("save");
        repo.save_state(id, &json!({"debug_mode": true, "game_state_version": 1}))
            .await
            .expect("save");

        let state = repo.get_state(id).await.expect("get").expect("exists");
        assert_eq!(state, json!({"debug_mode": true, "game_state_version": 1}));
    }
}

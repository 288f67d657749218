use brandwatch_core::{AlertConfig, CoreError, DatabaseError, SentimentLabel};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::info;

use crate::{corrupt, from_json, from_millis, is_unique_violation, sql, Database};

const ALERT_COLUMNS: &str = "id, name, keywords, subreddits, threat_threshold, sentiment_filter, \
    active, created_at, updated_at";

fn alert_from_row(row: &SqliteRow) -> Result<AlertConfig, CoreError> {
    let sentiment_filter = row
        .try_get::<Option<String>, _>("sentiment_filter")
        .map_err(sql)?
        .map(|raw| {
            raw.parse::<SentimentLabel>()
                .map_err(|e| corrupt(format!("sentiment_filter: {e}")))
        })
        .transpose()?;

    Ok(AlertConfig {
        id: Some(row.try_get("id").map_err(sql)?),
        name: row.try_get("name").map_err(sql)?,
        keywords: from_json(&row.try_get::<String, _>("keywords").map_err(sql)?, "keywords")?,
        subreddits: from_json(
            &row.try_get::<String, _>("subreddits").map_err(sql)?,
            "subreddits",
        )?,
        threat_threshold: row.try_get("threat_threshold").map_err(sql)?,
        sentiment_filter,
        active: row.try_get("active").map_err(sql)?,
        created_at: from_millis(row.try_get("created_at").map_err(sql)?, "created_at")?,
        updated_at: from_millis(row.try_get("updated_at").map_err(sql)?, "updated_at")?,
    })
}

fn name_taken(error: sqlx::Error) -> CoreError {
    if is_unique_violation(&error) {
        DatabaseError::ConstraintViolation {
            constraint: "alert_configs.name".to_string(),
        }
        .into()
    } else {
        sql(error)
    }
}

fn validate(alert: &AlertConfig) -> Result<(), CoreError> {
    if alert.name.trim().is_empty() {
        return Err(CoreError::InvalidInput {
            message: "alert name must not be empty".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&alert.threat_threshold) {
        return Err(CoreError::InvalidInput {
            message: format!(
                "alert threat threshold {} is outside [0, 1]",
                alert.threat_threshold
            ),
        });
    }
    Ok(())
}

/// Saved alert rules. Rules are evaluated on demand; nothing here fires them.
impl Database {
    pub async fn create_alert(&self, alert: &AlertConfig) -> Result<AlertConfig, CoreError> {
        validate(alert)?;

        let result = sqlx::query(
            "INSERT INTO alert_configs (
                name, keywords, subreddits, threat_threshold, sentiment_filter,
                active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&alert.name)
        .bind(serde_json::to_string(&alert.keywords)?)
        .bind(serde_json::to_string(&alert.subreddits)?)
        .bind(alert.threat_threshold)
        .bind(alert.sentiment_filter.map(|label| label.as_str()))
        .bind(alert.active)
        .bind(alert.created_at.timestamp_millis())
        .bind(alert.updated_at.timestamp_millis())
        .execute(self.pool())
        .await
        .map_err(name_taken)?;

        info!("Created alert '{}'", alert.name);
        Ok(AlertConfig {
            id: Some(result.last_insert_rowid()),
            ..alert.clone()
        })
    }

    pub async fn get_alert(&self, id: i64) -> Result<Option<AlertConfig>, CoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM alert_configs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(sql)?;
        row.as_ref().map(alert_from_row).transpose()
    }

    pub async fn list_alerts(&self, active_only: bool) -> Result<Vec<AlertConfig>, CoreError> {
        let query = if active_only {
            format!("SELECT {ALERT_COLUMNS} FROM alert_configs WHERE active = 1 ORDER BY name")
        } else {
            format!("SELECT {ALERT_COLUMNS} FROM alert_configs ORDER BY name")
        };

        let rows = sqlx::query(&query)
            .fetch_all(self.pool())
            .await
            .map_err(sql)?;
        rows.iter().map(alert_from_row).collect()
    }

    /// Overwrites every field of the stored rule and bumps `updated_at`.
    /// Returns false when the rule no longer exists.
    pub async fn update_alert(&self, alert: &AlertConfig) -> Result<bool, CoreError> {
        let id = alert.id.ok_or_else(|| CoreError::InvalidInput {
            message: "cannot update an alert that was never stored".to_string(),
        })?;
        validate(alert)?;

        let result = sqlx::query(
            "UPDATE alert_configs SET
                name = ?, keywords = ?, subreddits = ?, threat_threshold = ?,
                sentiment_filter = ?, active = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&alert.name)
        .bind(serde_json::to_string(&alert.keywords)?)
        .bind(serde_json::to_string(&alert.subreddits)?)
        .bind(alert.threat_threshold)
        .bind(alert.sentiment_filter.map(|label| label.as_str()))
        .bind(alert.active)
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(name_taken)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_alert_active(&self, id: i64, active: bool) -> Result<bool, CoreError> {
        let result =
            sqlx::query("UPDATE alert_configs SET active = ?, updated_at = ? WHERE id = ?")
                .bind(active)
                .bind(Utc::now().timestamp_millis())
                .bind(id)
                .execute(self.pool())
                .await
                .map_err(sql)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_alert(&self, id: i64) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM alert_configs WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(sql)?;
        Ok(result.rows_affected() > 0)
    }
}

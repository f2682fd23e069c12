use anyhow::Result;
use shared::{ChatSession, HistoryEntry, MedicalReport, ProfileUpdate, Role};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::path::Path;
use std::str::FromStr;

mod models;

pub use models::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, mobile, blood_group, personal_notes, created_at";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(path: &str) -> Result<Self> {
        // Ensure the directory exists
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Single-connection in-memory database; every pooled connection to
    /// `:memory:` would otherwise see its own empty database.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                mobile TEXT,
                blood_group TEXT,
                personal_notes TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                title TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                session_id INTEGER REFERENCES chat_sessions(id),
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS medical_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                filename TEXT NOT NULL,
                analysis TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_sessions_user ON chat_sessions(user_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_history_user_session ON chat_history(user_id, session_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_medical_reports_user ON medical_reports(user_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    // User operations
    pub async fn create_user(&self, user: &NewUser) -> StoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, first_name, last_name) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::DuplicateEmail
            }
            other => StoreError::Sqlx(other),
        })?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Returns false when no user has this id.
    pub async fn update_profile(&self, id: i64, update: &ProfileUpdate) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                first_name = COALESCE(?, first_name),
                last_name = COALESCE(?, last_name),
                mobile = COALESCE(?, mobile),
                blood_group = COALESCE(?, blood_group),
                personal_notes = COALESCE(?, personal_notes)
            WHERE id = ?
            "#,
        )
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.mobile)
        .bind(&update.blood_group)
        .bind(&update.personal_notes)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // Chat session operations
    pub async fn create_chat_session(&self, user_id: i64, title: &str) -> StoreResult<i64> {
        let result = sqlx::query("INSERT INTO chat_sessions (user_id, title) VALUES (?, ?)")
            .bind(user_id)
            .bind(title)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_chat_sessions_for_user(&self, user_id: i64) -> StoreResult<Vec<ChatSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT id, user_id, title, created_at FROM chat_sessions WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ChatSession::from).collect())
    }

    pub async fn get_chat_session_owner(&self, session_id: i64) -> StoreResult<Option<i64>> {
        let owner = sqlx::query_scalar::<_, i64>("SELECT user_id FROM chat_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner)
    }

    // Chat history operations
    pub async fn append_history(
        &self,
        user_id: i64,
        session_id: Option<i64>,
        role: Role,
        content: &str,
    ) -> StoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO chat_history (user_id, session_id, role, content) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Without a session id every entry the user owns comes back as one
    /// timeline, interleaving conversations by creation time.
    pub async fn get_history_for_user(
        &self,
        user_id: i64,
        session_id: Option<i64>,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let rows = match session_id {
            Some(session_id) => {
                sqlx::query_as::<_, HistoryRow>(
                    "SELECT id, user_id, session_id, role, content, created_at FROM chat_history WHERE user_id = ? AND session_id = ? ORDER BY created_at ASC, id ASC",
                )
                .bind(user_id)
                .bind(session_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, HistoryRow>(
                    "SELECT id, user_id, session_id, role, content, created_at FROM chat_history WHERE user_id = ? ORDER BY created_at ASC, id ASC",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(HistoryEntry::try_from).collect()
    }

    // Report operations
    pub async fn create_report(
        &self,
        user_id: i64,
        filename: &str,
        analysis: &str,
    ) -> StoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO medical_reports (user_id, filename, analysis) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(filename)
        .bind(analysis)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_reports_for_user(&self, user_id: i64) -> StoreResult<Vec<MedicalReport>> {
        let rows = sqlx::query_as::<_, ReportRow>(
            "SELECT id, user_id, filename, analysis, created_at FROM medical_reports WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MedicalReport::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (Database, i64) {
        let db = Database::in_memory().await.unwrap();
        let user_id = db
            .create_user(&NewUser {
                email: "a@x.com".to_string(),
                password_hash: "hash".to_string(),
                first_name: "A".to_string(),
                last_name: "B".to_string(),
            })
            .await
            .unwrap();
        (db, user_id)
    }

    #[tokio::test]
    async fn test_duplicate_email_keeps_original() {
        let (db, user_id) = setup().await;

        let result = db
            .create_user(&NewUser {
                email: "a@x.com".to_string(),
                password_hash: "other".to_string(),
                first_name: "C".to_string(),
                last_name: "D".to_string(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::DuplicateEmail)));

        let user = db.get_user_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(user.password_hash, "hash");
        assert_eq!(user.first_name, "A");
    }

    #[tokio::test]
    async fn test_update_profile_leaves_unspecified_fields() {
        let (db, user_id) = setup().await;

        let first = ProfileUpdate {
            mobile: Some("555-0100".to_string()),
            blood_group: Some("O+".to_string()),
            ..Default::default()
        };
        assert!(db.update_profile(user_id, &first).await.unwrap());

        let second = ProfileUpdate {
            first_name: Some("Ada".to_string()),
            personal_notes: Some("penicillin allergy".to_string()),
            ..Default::default()
        };
        assert!(db.update_profile(user_id, &second).await.unwrap());

        let user = db.get_user_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.first_name, "Ada");
        assert_eq!(user.last_name, "B");
        assert_eq!(user.mobile.as_deref(), Some("555-0100"));
        assert_eq!(user.blood_group.as_deref(), Some("O+"));
        assert_eq!(user.personal_notes.as_deref(), Some("penicillin allergy"));
        assert_eq!(user.email, "a@x.com");
    }

    #[tokio::test]
    async fn test_update_profile_unknown_user() {
        let (db, _) = setup().await;
        let update = ProfileUpdate {
            mobile: Some("1".to_string()),
            ..Default::default()
        };
        assert!(!db.update_profile(9999, &update).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_user_has_empty_lists() {
        let (db, user_id) = setup().await;
        assert!(db.get_chat_sessions_for_user(user_id).await.unwrap().is_empty());
        assert!(db.get_history_for_user(user_id, None).await.unwrap().is_empty());
        assert!(db.get_history_for_user(user_id, Some(1)).await.unwrap().is_empty());
        assert!(db.get_reports_for_user(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sessions_most_recent_first() {
        let (db, user_id) = setup().await;
        let first = db.create_chat_session(user_id, "first").await.unwrap();
        let second = db.create_chat_session(user_id, "second").await.unwrap();

        let sessions = db.get_chat_sessions_for_user(user_id).await.unwrap();
        let ids: Vec<i64> = sessions.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![second, first]);
        assert_eq!(sessions[0].title, "second");
        assert_eq!(db.get_chat_session_owner(first).await.unwrap(), Some(user_id));
        assert_eq!(db.get_chat_session_owner(4242).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_history_in_append_order_per_session() {
        let (db, user_id) = setup().await;
        let session = db.create_chat_session(user_id, "T").await.unwrap();
        let other = db.create_chat_session(user_id, "U").await.unwrap();

        let contents = ["one", "two", "three", "four", "five"];
        for (i, content) in contents.iter().enumerate() {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            db.append_history(user_id, Some(session), role, content)
                .await
                .unwrap();
        }
        db.append_history(user_id, Some(other), Role::User, "elsewhere")
            .await
            .unwrap();

        let entries = db.get_history_for_user(user_id, Some(session)).await.unwrap();
        assert_eq!(entries.len(), contents.len());
        let got: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(got, contents);
        assert!(entries
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at));
        assert_eq!(entries[1].role, Role::Assistant);

        let all = db.get_history_for_user(user_id, None).await.unwrap();
        assert_eq!(all.len(), contents.len() + 1);
    }

    #[tokio::test]
    async fn test_history_without_session() {
        let (db, user_id) = setup().await;
        db.append_history(user_id, None, Role::User, "orphan")
            .await
            .unwrap();
        let all = db.get_history_for_user(user_id, None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].session_id, None);
    }

    #[tokio::test]
    async fn test_history_rejects_unknown_session() {
        let (db, user_id) = setup().await;
        let result = db.append_history(user_id, Some(77), Role::User, "hi").await;
        assert!(matches!(result, Err(StoreError::Sqlx(_))));
    }

    #[tokio::test]
    async fn test_history_scoped_to_user() {
        let (db, user_id) = setup().await;
        let other_user = db
            .create_user(&NewUser {
                email: "b@x.com".to_string(),
                password_hash: "hash".to_string(),
                first_name: "C".to_string(),
                last_name: "D".to_string(),
            })
            .await
            .unwrap();
        let session = db.create_chat_session(user_id, "T").await.unwrap();
        db.append_history(user_id, Some(session), Role::User, "mine")
            .await
            .unwrap();

        assert!(db
            .get_history_for_user(other_user, Some(session))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_reports_most_recent_first() {
        let (db, user_id) = setup().await;
        db.create_report(user_id, "blood.pdf", "normal ranges").await.unwrap();
        db.create_report(user_id, "xray.png", "no fracture").await.unwrap();

        let reports = db.get_reports_for_user(user_id).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].filename, "xray.png");
        assert_eq!(reports[1].analysis, "normal ranges");
    }
}

use shared::{ChatSession, HistoryEntry, MedicalReport, Profile, Role, UserSummary};
use sqlx::FromRow;

use super::StoreError;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub mobile: Option<String>,
    pub blood_group: Option<String>,
    pub personal_notes: Option<String>,
    pub created_at: Option<String>,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Profile {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            mobile: user.mobile,
            blood_group: user.blood_group,
            personal_notes: user.personal_notes,
            created_at: user.created_at,
        }
    }
}

/// Fields accepted at registration, password already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub created_at: Option<String>,
}

impl From<SessionRow> for ChatSession {
    fn from(row: SessionRow) -> Self {
        ChatSession {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub id: i64,
    pub user_id: i64,
    pub session_id: Option<i64>,
    pub role: String,
    pub content: String,
    pub created_at: Option<String>,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("chat_history {}: {}", row.id, e)))?;
        Ok(HistoryEntry {
            id: row.id,
            user_id: row.user_id,
            session_id: row.session_id,
            role,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ReportRow {
    pub id: i64,
    pub user_id: i64,
    pub filename: String,
    pub analysis: String,
    pub created_at: Option<String>,
}

impl From<ReportRow> for MedicalReport {
    fn from(row: ReportRow) -> Self {
        MedicalReport {
            id: row.id,
            user_id: row.user_id,
            filename: row.filename,
            analysis: row.analysis,
            created_at: row.created_at,
        }
    }
}

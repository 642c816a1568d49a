use chrono::{NaiveDateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Serialize;

use crate::error::AppError;

use super::{Permission, Role};

const SESSION_TOKEN_LENGTH: usize = 48;

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub student_number: Option<String>,
    pub name: Option<String>,
    pub grade: Option<i64>,
    pub graduation_year: Option<i64>,
    pub bio: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub role: Option<String>,
    pub student_number: Option<String>,
    pub name: Option<String>,
    pub grade: Option<i64>,
    pub graduation_year: Option<i64>,
    pub bio: Option<String>,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(user: DbUser) -> Result<Self, Self::Error> {
        let role = user.role.unwrap_or_default().parse::<Role>()?;

        Ok(Self {
            id: user.id.unwrap_or_default(),
            username: user.username.unwrap_or_default(),
            role,
            student_number: user.student_number,
            name: user.name,
            grade: user.grade,
            graduation_year: user.graduation_year,
            bio: user.bio,
        })
    }
}

impl User {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                username = %self.username,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Authorization(
                "You do not have permission to access this page.".to_string(),
            ))
        }
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone)]
pub struct UserSession {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUserSession {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub token: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
}

impl From<DbUserSession> for UserSession {
    fn from(session: DbUserSession) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: session.id.unwrap_or_default(),
            user_id: session.user_id.unwrap_or_default(),
            token: session.token.unwrap_or_default(),
            created_at: session.created_at.unwrap_or(now),
            // A row without an expiry is treated as already expired
            expires_at: session.expires_at.unwrap_or(now),
        }
    }
}

impl UserSession {
    pub fn generate_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now().naive_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_user(role: &str) -> DbUser {
        DbUser {
            id: Some(7),
            username: Some("hana".to_string()),
            role: Some(role.to_string()),
            student_number: Some("S-001".to_string()),
            name: None,
            grade: Some(11),
            graduation_year: Some(2027),
            bio: None,
        }
    }

    #[test]
    fn test_db_user_conversion() {
        let user = User::try_from(db_user("student")).expect("valid role");
        assert_eq!(user.id, 7);
        assert_eq!(user.role, Role::Student);
        assert_eq!(user.grade, Some(11));
        assert_eq!(user.display_name(), "hana");
    }

    #[test]
    fn test_db_user_with_unknown_role_is_rejected() {
        let result = User::try_from(db_user("principal"));
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[test]
    fn test_require_permission() {
        let student = User::try_from(db_user("student")).unwrap();
        assert!(
            student
                .require_permission(Permission::ManageOwnPortfolios)
                .is_ok()
        );
        assert!(matches!(
            student.require_permission(Permission::ManageTags),
            Err(AppError::Authorization(_))
        ));
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = UserSession::generate_token();
        let b = UserSession::generate_token();
        assert_eq!(a.len(), SESSION_TOKEN_LENGTH);
        assert_ne!(a, b);
    }
}

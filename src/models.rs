use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}

#[derive(Debug, Serialize, Clone)]
pub struct Portfolio {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbPortfolio {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbPortfolio> for Portfolio {
    fn from(portfolio: DbPortfolio) -> Self {
        Self {
            id: portfolio.id.unwrap_or_default(),
            user_id: portfolio.user_id.unwrap_or_default(),
            title: portfolio.title.unwrap_or_default(),
            content: portfolio.content.unwrap_or_default(),
            created_at: to_utc(portfolio.created_at),
        }
    }
}

/// A portfolio as listed in search results, with its author denormalized.
#[derive(Debug, Serialize, Clone)]
pub struct PortfolioSummary {
    pub id: i64,
    pub user_id: i64,
    pub author_username: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbPortfolioSummary {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub author_username: Option<String>,
    pub title: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbPortfolioSummary> for PortfolioSummary {
    fn from(summary: DbPortfolioSummary) -> Self {
        Self {
            id: summary.id.unwrap_or_default(),
            user_id: summary.user_id.unwrap_or_default(),
            author_username: summary.author_username.unwrap_or_default(),
            title: summary.title.unwrap_or_default(),
            created_at: to_utc(summary.created_at),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTag {
    pub id: Option<i64>,
    pub name: Option<String>,
}

impl From<DbTag> for Tag {
    fn from(tag: DbTag) -> Self {
        Self {
            id: tag.id.unwrap_or_default(),
            name: tag.name.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct Comment {
    pub id: i64,
    pub portfolio_id: i64,
    pub teacher_id: i64,
    pub teacher_name: String, // Denormalized for display
    pub comment: String,
    pub rating: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbComment {
    pub id: Option<i64>,
    pub portfolio_id: Option<i64>,
    pub teacher_id: Option<i64>,
    pub teacher_name: Option<String>,
    pub comment: Option<String>,
    pub rating: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbComment> for Comment {
    fn from(comment: DbComment) -> Self {
        Self {
            id: comment.id.unwrap_or_default(),
            portfolio_id: comment.portfolio_id.unwrap_or_default(),
            teacher_id: comment.teacher_id.unwrap_or_default(),
            teacher_name: comment.teacher_name.unwrap_or_default(),
            comment: comment.comment.unwrap_or_default(),
            rating: comment.rating.unwrap_or_default(),
            created_at: to_utc(comment.created_at),
        }
    }
}

/// Everything a portfolio page shows besides the page chrome.
#[derive(Debug, Serialize)]
pub struct PortfolioDetail {
    pub portfolio: Portfolio,
    pub author: crate::auth::User,
    pub tags: Vec<Tag>,
    pub comments: Vec<Comment>,
}

/// A student's portfolio with its tags, as listed on the teacher view.
#[derive(Debug, Serialize)]
pub struct TaggedPortfolio {
    pub portfolio: Portfolio,
    pub tags: Vec<Tag>,
}

/// Columns a user may change on their own profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub student_number: Option<String>,
    pub name: Option<String>,
    pub grade: Option<i64>,
    pub graduation_year: Option<i64>,
    pub bio: Option<String>,
}

use crate::{
    auth::{DbUser, DbUserSession, Role, User, UserSession},
    error::AppError,
};
use chrono::{NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::models::{
    Comment, DbComment, DbPortfolio, DbPortfolioSummary, DbTag, Portfolio, PortfolioDetail,
    PortfolioSummary, ProfileUpdate, Tag, TaggedPortfolio,
};

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

const USER_COLUMNS: &str = "id, username, role, student_number, name, grade, graduation_year, bio";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

fn into_users(rows: Vec<DbUser>) -> Result<Vec<User>, AppError> {
    rows.into_iter().map(User::try_from).collect()
}

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(user) => User::try_from(user),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found",
            id
        ))),
    }
}

#[instrument]
pub async fn get_student(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching student by ID");
    let user = get_user(pool, id).await?;

    if user.role != Role::Student {
        return Err(AppError::NotFound(format!(
            "Student with id {} not found",
            id
        )));
    }

    Ok(user)
}

#[instrument]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    info!("Finding user by username");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;

    row.map(User::try_from).transpose()
}

#[instrument(skip_all, fields(username = %username, role = %role))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    role: &str,
) -> Result<i64, AppError> {
    info!("Creating new user");

    if find_user_by_username(pool, username).await?.is_some() {
        return Err(AppError::Validation(format!(
            "Username '{}' already exists",
            username
        )));
    }

    let hashed_password = bcrypt::hash(password, HASH_COST)?;

    let res = sqlx::query("INSERT INTO users (username, password, role) VALUES (?, ?, ?)")
        .bind(username)
        .bind(hashed_password)
        .bind(role)
        .execute(pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::Validation(format!("Username '{}' already exists", username))
            } else {
                AppError::Database(err)
            }
        })?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all, fields(username = %username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");

    #[derive(sqlx::FromRow)]
    struct Credentials {
        id: i64,
        password: String,
    }

    let credentials = sqlx::query_as::<_, Credentials>(
        "SELECT id, password FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    match credentials {
        Some(credentials) => match bcrypt::verify(password, &credentials.password) {
            Ok(true) => Ok(Some(get_user(pool, credentials.id).await?)),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[instrument]
pub async fn get_users_by_role(pool: &Pool<Sqlite>, role: Role) -> Result<Vec<User>, AppError> {
    info!(role = %role, "Getting users by role");

    let rows = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE role = ? ORDER BY username"
    ))
    .bind(role.as_str())
    .fetch_all(pool)
    .await?;

    into_users(rows)
}

/// Case-insensitive literal substring match on usernames. `instr` is used
/// instead of `LIKE` so `%` and `_` in the query match themselves.
#[instrument]
pub async fn search_students(pool: &Pool<Sqlite>, query: &str) -> Result<Vec<User>, AppError> {
    info!("Searching students by username");

    let rows = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users
         WHERE role = 'student' AND instr(lower(username), lower(?)) > 0
         ORDER BY username"
    ))
    .bind(query)
    .fetch_all(pool)
    .await?;

    into_users(rows)
}

#[instrument]
pub async fn update_user_profile(
    pool: &Pool<Sqlite>,
    user_id: i64,
    profile: &ProfileUpdate,
) -> Result<(), AppError> {
    info!("Updating user profile");
    let res = sqlx::query(
        "UPDATE users
         SET student_number = ?, name = ?, grade = ?, graduation_year = ?, bio = ?
         WHERE id = ?",
    )
    .bind(&profile.student_number)
    .bind(&profile.name)
    .bind(profile.grade)
    .bind(profile.graduation_year)
    .bind(&profile.bio)
    .bind(user_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "User with id {} not found",
            user_id
        )));
    }

    Ok(())
}

#[instrument(skip_all, fields(user_id = user_id))]
pub async fn update_user_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    new_password: &str,
) -> Result<(), AppError> {
    info!("Updating user password");
    let hashed_password = bcrypt::hash(new_password, HASH_COST)?;

    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(hashed_password)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Inserts join rows for every id in `tag_ids` that names an existing tag.
/// Unknown ids and repeats are skipped.
async fn insert_portfolio_tags(
    conn: &mut SqliteConnection,
    portfolio_id: i64,
    tag_ids: &[i64],
) -> Result<(), AppError> {
    for tag_id in tag_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO portfolio_tags (portfolio_id, tag_id)
             SELECT ?, id FROM tags WHERE id = ?",
        )
        .bind(portfolio_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[instrument(skip(pool, content))]
pub async fn create_portfolio(
    pool: &Pool<Sqlite>,
    user_id: i64,
    title: &str,
    content: &str,
    tag_ids: &[i64],
) -> Result<i64, AppError> {
    info!("Creating portfolio");
    let mut tx = pool.begin().await?;

    let res = sqlx::query("INSERT INTO portfolios (user_id, title, content) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(title)
        .bind(content)
        .execute(&mut *tx)
        .await?;
    let portfolio_id = res.last_insert_rowid();

    insert_portfolio_tags(&mut *tx, portfolio_id, tag_ids).await?;

    tx.commit().await?;

    Ok(portfolio_id)
}

#[instrument]
pub async fn get_portfolio(pool: &Pool<Sqlite>, id: i64) -> Result<Portfolio, AppError> {
    info!("Getting portfolio");
    let row = sqlx::query_as::<_, DbPortfolio>(
        "SELECT id, user_id, title, content, created_at FROM portfolios WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(portfolio) => Ok(Portfolio::from(portfolio)),
        _ => Err(AppError::NotFound("Portfolio not found.".to_string())),
    }
}

/// Fetches a portfolio only if `owner_id` owns it.
#[instrument]
pub async fn get_owned_portfolio(
    pool: &Pool<Sqlite>,
    id: i64,
    owner_id: i64,
) -> Result<Portfolio, AppError> {
    let portfolio = get_portfolio(pool, id).await?;

    if portfolio.user_id != owner_id {
        tracing::warn!(portfolio_id = id, owner_id, "Portfolio ownership mismatch");
        return Err(AppError::Authorization(
            "You do not have permission to modify this portfolio.".to_string(),
        ));
    }

    Ok(portfolio)
}

#[instrument]
pub async fn get_portfolios_for_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<Portfolio>, AppError> {
    info!("Getting portfolios for user");
    let rows = sqlx::query_as::<_, DbPortfolio>(
        "SELECT id, user_id, title, content, created_at FROM portfolios
         WHERE user_id = ?
         ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Portfolio::from).collect())
}

#[instrument]
pub async fn get_tagged_portfolios_for_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<TaggedPortfolio>, AppError> {
    let portfolios = get_portfolios_for_user(pool, user_id).await?;

    let mut tagged = Vec::with_capacity(portfolios.len());
    for portfolio in portfolios {
        let tags = get_tags_for_portfolio(pool, portfolio.id).await?;
        tagged.push(TaggedPortfolio { portfolio, tags });
    }

    Ok(tagged)
}

#[instrument(skip(pool, content))]
pub async fn update_portfolio(
    pool: &Pool<Sqlite>,
    id: i64,
    owner_id: i64,
    title: &str,
    content: &str,
) -> Result<(), AppError> {
    info!("Updating portfolio");
    get_owned_portfolio(pool, id, owner_id).await?;

    let res = sqlx::query("UPDATE portfolios SET title = ?, content = ? WHERE id = ? AND user_id = ?")
        .bind(title)
        .bind(content)
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Portfolio not found.".to_string()));
    }

    Ok(())
}

#[instrument]
pub async fn delete_portfolio(pool: &Pool<Sqlite>, id: i64, owner_id: i64) -> Result<(), AppError> {
    info!("Deleting portfolio");
    get_owned_portfolio(pool, id, owner_id).await?;

    // Tag links and comments go with it through ON DELETE CASCADE
    let res = sqlx::query("DELETE FROM portfolios WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Portfolio not found.".to_string()));
    }

    Ok(())
}

#[instrument]
pub async fn get_portfolio_detail(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<PortfolioDetail, AppError> {
    let portfolio = get_portfolio(pool, id).await?;
    let author = get_user(pool, portfolio.user_id).await?;
    let tags = get_tags_for_portfolio(pool, id).await?;
    let comments = get_comments_for_portfolio(pool, id).await?;

    Ok(PortfolioDetail {
        portfolio,
        author,
        tags,
        comments,
    })
}

#[instrument]
pub async fn create_tag(pool: &Pool<Sqlite>, name: &str) -> Result<i64, AppError> {
    info!("Creating tag");
    let res = sqlx::query("INSERT INTO tags (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::Validation(format!("Tag '{}' already exists", name))
            } else {
                AppError::Database(err)
            }
        })?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_tag(pool: &Pool<Sqlite>, id: i64) -> Result<Tag, AppError> {
    let row = sqlx::query_as::<_, DbTag>("SELECT id, name FROM tags WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(tag) => Ok(Tag::from(tag)),
        _ => Err(AppError::NotFound("Tag not found.".to_string())),
    }
}

#[instrument]
pub async fn get_all_tags(pool: &Pool<Sqlite>) -> Result<Vec<Tag>, AppError> {
    info!("Getting all tags");
    let rows = sqlx::query_as::<_, DbTag>("SELECT id, name FROM tags ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Tag::from).collect())
}

#[instrument]
pub async fn get_tags_for_portfolio(
    pool: &Pool<Sqlite>,
    portfolio_id: i64,
) -> Result<Vec<Tag>, AppError> {
    let rows = sqlx::query_as::<_, DbTag>(
        "SELECT t.id, t.name FROM tags t
         JOIN portfolio_tags pt ON pt.tag_id = t.id
         WHERE pt.portfolio_id = ?
         ORDER BY t.name",
    )
    .bind(portfolio_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Tag::from).collect())
}

/// Replaces the whole tag set of a portfolio.
#[instrument]
pub async fn set_portfolio_tags(
    pool: &Pool<Sqlite>,
    portfolio_id: i64,
    tag_ids: &[i64],
) -> Result<(), AppError> {
    info!("Replacing portfolio tags");
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM portfolio_tags WHERE portfolio_id = ?")
        .bind(portfolio_id)
        .execute(&mut *tx)
        .await?;

    insert_portfolio_tags(&mut *tx, portfolio_id, tag_ids).await?;

    tx.commit().await?;

    Ok(())
}

#[instrument]
pub async fn search_portfolios_by_tag(
    pool: &Pool<Sqlite>,
    tag_id: i64,
) -> Result<Vec<PortfolioSummary>, AppError> {
    info!("Searching portfolios by tag");
    let rows = sqlx::query_as::<_, DbPortfolioSummary>(
        "SELECT p.id, p.user_id, u.username AS author_username, p.title, p.created_at
         FROM portfolios p
         JOIN portfolio_tags pt ON pt.portfolio_id = p.id
         JOIN users u ON u.id = p.user_id
         WHERE pt.tag_id = ?
         ORDER BY p.created_at DESC, p.id DESC",
    )
    .bind(tag_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(PortfolioSummary::from).collect())
}

#[instrument(skip(pool, comment))]
pub async fn create_comment(
    pool: &Pool<Sqlite>,
    portfolio_id: i64,
    teacher_id: i64,
    comment: &str,
    rating: i64,
) -> Result<i64, AppError> {
    info!("Creating comment");
    get_portfolio(pool, portfolio_id).await?;

    let res = sqlx::query(
        "INSERT INTO comments (portfolio_id, teacher_id, comment, rating) VALUES (?, ?, ?, ?)",
    )
    .bind(portfolio_id)
    .bind(teacher_id)
    .bind(comment)
    .bind(rating)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_comments_for_portfolio(
    pool: &Pool<Sqlite>,
    portfolio_id: i64,
) -> Result<Vec<Comment>, AppError> {
    let rows = sqlx::query_as::<_, DbComment>(
        "SELECT c.id, c.portfolio_id, c.teacher_id,
                COALESCE(NULLIF(u.name, ''), u.username) AS teacher_name,
                c.comment, c.rating, c.created_at
         FROM comments c
         JOIN users u ON u.id = c.teacher_id
         WHERE c.portfolio_id = ?
         ORDER BY c.created_at, c.id",
    )
    .bind(portfolio_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Comment::from).collect())
}

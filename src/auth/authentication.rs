use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::{Flash, Redirect};
use sqlx::SqlitePool;
use tracing::{Instrument, warn};

use crate::db::{get_session_by_token, get_user};

use super::User;

pub const SESSION_COOKIE: &str = "session_token";

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let token = request
            .cookies()
            .get_private(SESSION_COOKIE)
            .map(|c| c.value().to_string());

        let Some(token) = token else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        let db = match request.rocket().state::<SqlitePool>() {
            Some(pool) => pool,
            _ => {
                tracing::error!("Database pool not found in managed state");
                return Outcome::Error((Status::InternalServerError, ()));
            }
        };

        resolve_session(db, &token)
            .instrument(tracing::info_span!("user_auth_guard"))
            .await
    }
}

async fn resolve_session(db: &SqlitePool, token: &str) -> Outcome<User, ()> {
    match get_session_by_token(db, token).await {
        Ok(session) => {
            if !session.is_valid() {
                tracing::warn!(user_id = session.user_id, "Session token expired");
                return Outcome::Error((Status::Unauthorized, ()));
            }

            match get_user(db, session.user_id).await {
                Ok(user) => {
                    tracing::info!(username = %user.username, role = %user.role.as_str(), "User authenticated via session token");
                    Outcome::Success(user)
                }
                Err(err) => {
                    tracing::error!(user_id = %session.user_id, error = ?err, "Failed to fetch user for valid session");
                    Outcome::Error((Status::InternalServerError, ()))
                }
            }
        }
        Err(err) => {
            tracing::warn!(error = ?err, "Invalid session token");
            Outcome::Error((Status::Unauthorized, ()))
        }
    }
}

#[catch(401)]
pub fn unauthorized(_req: &Request) -> Flash<Redirect> {
    warn!("Unauthorized access attempt");
    Flash::error(
        Redirect::to("/login"),
        "You need to be logged in to view this page.",
    )
}

#[catch(403)]
pub fn forbidden(_req: &Request) -> Flash<Redirect> {
    warn!("Forbidden access attempt");
    Flash::error(
        Redirect::to("/"),
        "You do not have permission to access this page.",
    )
}

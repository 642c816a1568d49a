#[macro_use]
extern crate rocket;

mod auth;
mod db;
mod env;
mod error;
mod forms;
mod models;
mod routes;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;
mod views;

use std::str::FromStr;
use std::time::Duration;

use auth::{
    change_password, forbidden, login, logout, process_change_password, process_login,
    process_register, register, unauthorized,
};
use db::clean_expired_sessions;
use env::{AppConfig, database_url, load_environment};
use error::AppError;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, tokio};
use rocket_dyn_templates::Template;
use routes::{
    create_portfolio_route, edit_portfolio, edit_profile, health, index, portfolio,
    portfolio_detail, portfolio_tags, process_comment, process_create_tag,
    process_delete_portfolio, process_edit_portfolio, process_edit_profile,
    process_portfolio_tags, profile, search_by_tag, students_list, tags, teacher_dashboard,
    view_portfolio,
};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use telemetry::{TelemetryFairing, init_tracing, shutdown_telemetry};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Figment(rocket::figment::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("{0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::figment::Error> for Error {
    fn from(value: rocket::figment::Error) -> Self {
        Error::Figment(value)
    }
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

fn spawn_session_cleanup(pool: SqlitePool, interval: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(interval).await;
        }
    });
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {e}");
    }

    init_tracing();

    let config: AppConfig = rocket::Config::figment().extract()?;

    let options = SqliteConnectOptions::from_str(&database_url())?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed successfully");

    spawn_session_cleanup(
        pool.clone(),
        Duration::from_secs(config.session_cleanup_interval_secs),
    );

    let result = init_rocket(pool).await.launch().await;

    shutdown_telemetry();

    result?;
    Ok(())
}

pub async fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    info!("Starting e-portfolio");

    rocket::build()
        .manage(pool)
        .mount(
            "/",
            routes![
                index,
                health,
                login,
                process_login,
                logout,
                register,
                process_register,
                change_password,
                process_change_password,
                portfolio,
                create_portfolio_route,
                portfolio_detail,
                edit_portfolio,
                process_edit_portfolio,
                process_delete_portfolio,
                portfolio_tags,
                process_portfolio_tags,
                process_comment,
                profile,
                edit_profile,
                process_edit_profile,
                teacher_dashboard,
                students_list,
                view_portfolio,
                tags,
                process_create_tag,
                search_by_tag,
            ],
        )
        .register("/", catchers![unauthorized, forbidden])
        .attach(Template::fairing())
        .attach(AdHoc::config::<AppConfig>())
        .attach(TelemetryFairing)
}

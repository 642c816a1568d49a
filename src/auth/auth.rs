use chrono::Utc;
use rocket::State;
use rocket::form::Form;
use rocket::http::{Cookie, CookieJar, SameSite};
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket_dyn_templates::{Template, context};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

use crate::db::{
    authenticate_user, create_user, create_user_session, invalidate_session, update_user_password,
};
use crate::env::AppConfig;
use crate::error::FlashResultExt;
use crate::forms::{LoginForm, PasswordChangeForm, RegistrationForm};
use crate::validation::{FormErrors, ValidateFormExt};
use crate::views::{FlashView, Reply};

use super::{SESSION_COOKIE, User, UserSession};

const LOGIN_FAILED: &str = "Login failed. Check your username and/or password.";

fn session_cookie(token: String, ttl_hours: i64) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .same_site(SameSite::Lax)
        .http_only(true)
        .max_age(rocket::time::Duration::hours(ttl_hours))
        .build()
}

fn render_login(form: &LoginForm, errors: &FormErrors, flash: Option<FlashView>) -> Template {
    Template::render(
        "login",
        context! {
            title: "Login",
            form: form,
            errors: errors,
            flash: flash,
            current_route: "login",
        },
    )
}

fn render_register(form: &RegistrationForm, errors: &FormErrors) -> Template {
    Template::render(
        "register",
        context! {
            title: "Register",
            form: form,
            errors: errors,
            current_route: "register",
        },
    )
}

#[get("/login")]
pub fn login(flash: Option<FlashMessage<'_>>) -> Template {
    render_login(
        &LoginForm::default(),
        &FormErrors::new(),
        FlashView::from_message(flash),
    )
}

#[post("/login", data = "<form>")]
pub async fn process_login(
    form: Form<LoginForm>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Reply {
    if let Err(errors) = form.validate_form() {
        return render_login(&form, &errors, None).into();
    }

    info!("Login attempt: {}", &form.username);

    let user = match authenticate_user(db, &form.username, &form.password).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(username = %form.username, "Authentication failed");
            return render_login(&form, &FormErrors::with_error("form", LOGIN_FAILED), None)
                .into();
        }
        Err(err) => {
            return render_login(&form, &FormErrors::from_app_error("form", err), None).into();
        }
    };

    let token = UserSession::generate_token();
    let expires_at = Utc::now() + chrono::Duration::hours(config.session_ttl_hours);

    if let Err(err) = create_user_session(db, user.id, &token, expires_at.naive_utc()).await {
        return render_login(&form, &FormErrors::from_app_error("form", err), None).into();
    }

    cookies.add_private(session_cookie(token, config.session_ttl_hours));

    info!(username = %user.username, role = %user.role, "Authentication successful");

    Flash::success(Redirect::to(user.role.home()), "Login successful!").into()
}

#[get("/logout")]
pub async fn logout(cookies: &CookieJar<'_>, db: &State<Pool<Sqlite>>) -> Flash<Redirect> {
    let token = cookies
        .get_private(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        if let Err(err) = invalidate_session(db, &token).await {
            err.log_and_record("Logout");
        }
    }

    cookies.remove_private(Cookie::build(SESSION_COOKIE));

    Flash::new(Redirect::to("/"), "info", "You have been logged out.")
}

#[get("/register")]
pub fn register() -> Template {
    render_register(&RegistrationForm::default(), &FormErrors::new())
}

#[post("/register", data = "<form>")]
pub async fn process_register(form: Form<RegistrationForm>, db: &State<Pool<Sqlite>>) -> Reply {
    if let Err(errors) = form.validate_form() {
        return render_register(&form, &errors).into();
    }

    match create_user(db, &form.username, &form.password, &form.role).await {
        Ok(user_id) => {
            info!(user_id, username = %form.username, role = %form.role, "Registered user");
            Flash::success(Redirect::to("/login"), "Registration successful!").into()
        }
        Err(err) => render_register(&form, &FormErrors::from_app_error("username", err)).into(),
    }
}

fn render_change_password(user: &User, errors: &FormErrors) -> Template {
    Template::render(
        "change_password",
        context! {
            title: "Change password",
            current_user: user,
            errors: errors,
            current_route: "change_password",
        },
    )
}

#[get("/change_password")]
pub fn change_password(user: User) -> Template {
    render_change_password(&user, &FormErrors::new())
}

#[post("/change_password", data = "<form>")]
pub async fn process_change_password(
    form: Form<PasswordChangeForm>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Reply, Flash<Redirect>> {
    if let Err(errors) = form.validate_form() {
        return Ok(render_change_password(&user, &errors).into());
    }

    let verified = authenticate_user(db, &user.username, &form.current_password)
        .await
        .or_flash("/change_password")?;

    if verified.is_none() {
        let errors = FormErrors::with_error("current_password", "Current password is incorrect.");
        return Ok(render_change_password(&user, &errors).into());
    }

    update_user_password(db, user.id, &form.new_password)
        .await
        .or_flash("/change_password")?;

    Ok(Flash::success(Redirect::to("/profile"), "Your password has been updated.").into())
}

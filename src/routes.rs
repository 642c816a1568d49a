use rocket::State;
use rocket::form::Form;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket_dyn_templates::{Template, context};
use serde_json::json;
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::auth::{Permission, Role, User};
use crate::db::{
    create_comment, create_portfolio, create_tag, delete_portfolio, get_all_tags,
    get_owned_portfolio, get_portfolio_detail, get_student, get_tag,
    get_tagged_portfolios_for_user, get_tags_for_portfolio, get_users_by_role,
    search_portfolios_by_tag, search_students, set_portfolio_tags, update_portfolio,
    update_user_profile,
};
use crate::error::{AppError, FlashResultExt};
use crate::forms::{
    CommentForm, PortfolioForm, PortfolioTagsForm, ProfileForm, SearchForm, TagForm,
};
use crate::models::{PortfolioDetail, ProfileUpdate, Tag};
use crate::validation::{FormErrors, ValidateFormExt};
use crate::views::{FlashView, Reply};

#[get("/")]
pub fn index(user: Option<User>, flash: Option<FlashMessage<'_>>) -> Template {
    Template::render(
        "index",
        context! {
            title: "Student e-Portfolio",
            current_user: user,
            flash: FlashView::from_message(flash),
            current_route: "index",
        },
    )
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

async fn render_portfolio_list(
    db: &Pool<Sqlite>,
    user: &User,
    form: &PortfolioForm,
    errors: &FormErrors,
    flash: Option<FlashView>,
) -> Result<Template, AppError> {
    let entries = get_tagged_portfolios_for_user(db, user.id).await?;
    let all_tags = get_all_tags(db).await?;

    Ok(Template::render(
        "portfolio",
        context! {
            title: "My portfolio",
            current_user: user,
            portfolios: entries,
            all_tags: all_tags,
            form: form,
            errors: errors,
            flash: flash,
            current_route: "portfolio",
        },
    ))
}

#[get("/portfolio")]
pub async fn portfolio(
    user: User,
    db: &State<Pool<Sqlite>>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Template, Flash<Redirect>> {
    user.require_permission(Permission::ManageOwnPortfolios)
        .or_flash(user.role.home())?;

    render_portfolio_list(
        db,
        &user,
        &PortfolioForm::default(),
        &FormErrors::new(),
        FlashView::from_message(flash),
    )
    .await
    .or_flash("/")
}

#[post("/portfolio", data = "<form>")]
pub async fn create_portfolio_route(
    form: Form<PortfolioForm>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Reply, Flash<Redirect>> {
    user.require_permission(Permission::ManageOwnPortfolios)
        .or_flash(user.role.home())?;

    if let Err(errors) = form.validate_form() {
        let page = render_portfolio_list(db, &user, &form, &errors, None)
            .await
            .or_flash("/portfolio")?;
        return Ok(page.into());
    }

    let portfolio_id = create_portfolio(db, user.id, &form.title, &form.content, &form.tag_ids)
        .await
        .or_flash("/portfolio")?;

    info!(portfolio_id, user_id = user.id, "Portfolio entry added");

    Ok(Flash::success(Redirect::to(uri!(portfolio)), "Portfolio entry added!").into())
}

fn render_portfolio_detail(
    user: &User,
    detail: &PortfolioDetail,
    comment_form: &CommentForm,
    errors: &FormErrors,
    flash: Option<FlashView>,
) -> Template {
    // Teachers review; the owning student manages
    let template = match user.role {
        Role::Teacher => "teacher_portfolio_detail",
        Role::Student => "portfolio_detail",
    };

    Template::render(
        template,
        context! {
            title: &detail.portfolio.title,
            current_user: user,
            portfolio: &detail.portfolio,
            author: &detail.author,
            tags: &detail.tags,
            comments: &detail.comments,
            comment_count: detail.comments.len(),
            form: comment_form,
            errors: errors,
            flash: flash,
            current_route: "portfolio_detail",
        },
    )
}

async fn load_viewable_portfolio(
    db: &Pool<Sqlite>,
    user: &User,
    id: i64,
) -> Result<PortfolioDetail, AppError> {
    let detail = get_portfolio_detail(db, id).await?;

    if detail.portfolio.user_id != user.id && !user.has_permission(Permission::ViewAllPortfolios)
    {
        tracing::warn!(portfolio_id = id, user_id = user.id, "Portfolio view denied");
        return Err(AppError::Authorization(
            "You do not have permission to view this portfolio.".to_string(),
        ));
    }

    Ok(detail)
}

#[get("/portfolio/<id>")]
pub async fn portfolio_detail(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Template, Flash<Redirect>> {
    let detail = load_viewable_portfolio(db, &user, id)
        .await
        .or_flash(user.role.home())?;

    Ok(render_portfolio_detail(
        &user,
        &detail,
        &CommentForm::default(),
        &FormErrors::new(),
        FlashView::from_message(flash),
    ))
}

fn render_edit_portfolio(user: &User, id: i64, form: &PortfolioForm, errors: &FormErrors) -> Template {
    Template::render(
        "edit_portfolio",
        context! {
            title: "Edit portfolio entry",
            current_user: user,
            portfolio_id: id,
            form: form,
            errors: errors,
            current_route: "edit_portfolio",
        },
    )
}

#[get("/portfolio/<id>/edit")]
pub async fn edit_portfolio(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Template, Flash<Redirect>> {
    user.require_permission(Permission::ManageOwnPortfolios)
        .or_flash(user.role.home())?;

    let portfolio = get_owned_portfolio(db, id, user.id)
        .await
        .or_flash("/portfolio")?;

    let form = PortfolioForm {
        title: portfolio.title,
        content: portfolio.content,
        tag_ids: Vec::new(),
    };

    Ok(render_edit_portfolio(&user, id, &form, &FormErrors::new()))
}

#[post("/portfolio/<id>/edit", data = "<form>")]
pub async fn process_edit_portfolio(
    id: i64,
    form: Form<PortfolioForm>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Reply, Flash<Redirect>> {
    user.require_permission(Permission::ManageOwnPortfolios)
        .or_flash(user.role.home())?;

    get_owned_portfolio(db, id, user.id)
        .await
        .or_flash("/portfolio")?;

    if let Err(errors) = form.validate_form() {
        return Ok(render_edit_portfolio(&user, id, &form, &errors).into());
    }

    update_portfolio(db, id, user.id, &form.title, &form.content)
        .await
        .or_flash("/portfolio")?;

    Ok(Flash::success(
        Redirect::to(uri!(portfolio_detail(id))),
        "Portfolio entry updated!",
    )
    .into())
}

#[post("/portfolio/<id>/delete")]
pub async fn process_delete_portfolio(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Flash<Redirect>, Flash<Redirect>> {
    user.require_permission(Permission::ManageOwnPortfolios)
        .or_flash(user.role.home())?;

    delete_portfolio(db, id, user.id)
        .await
        .or_flash("/portfolio")?;

    info!(portfolio_id = id, user_id = user.id, "Portfolio entry deleted");

    Ok(Flash::success(
        Redirect::to(uri!(portfolio)),
        "Portfolio entry deleted.",
    ))
}

#[get("/portfolio/<id>/tags")]
pub async fn portfolio_tags(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Template, Flash<Redirect>> {
    user.require_permission(Permission::TagOwnPortfolios)
        .or_flash(user.role.home())?;

    let portfolio = get_owned_portfolio(db, id, user.id)
        .await
        .or_flash("/portfolio")?;
    let all_tags = get_all_tags(db).await.or_flash("/portfolio")?;
    let selected: Vec<i64> = get_tags_for_portfolio(db, id)
        .await
        .or_flash("/portfolio")?
        .into_iter()
        .map(|tag| tag.id)
        .collect();

    Ok(Template::render(
        "portfolio_tags",
        context! {
            title: "Tag portfolio entry",
            current_user: &user,
            portfolio: portfolio,
            all_tags: all_tags,
            selected: selected,
            current_route: "portfolio_tags",
        },
    ))
}

#[post("/portfolio/<id>/tags", data = "<form>")]
pub async fn process_portfolio_tags(
    id: i64,
    form: Form<PortfolioTagsForm>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Flash<Redirect>, Flash<Redirect>> {
    user.require_permission(Permission::TagOwnPortfolios)
        .or_flash(user.role.home())?;

    get_owned_portfolio(db, id, user.id)
        .await
        .or_flash("/portfolio")?;

    set_portfolio_tags(db, id, &form.tag_ids)
        .await
        .or_flash("/portfolio")?;

    Ok(Flash::success(
        Redirect::to(uri!(portfolio_detail(id))),
        "Tags updated!",
    ))
}

#[post("/portfolio/<id>/comment", data = "<form>")]
pub async fn process_comment(
    id: i64,
    form: Form<CommentForm>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Reply, Flash<Redirect>> {
    user.require_permission(Permission::CommentOnPortfolios)
        .or_flash(user.role.home())?;

    let detail = load_viewable_portfolio(db, &user, id)
        .await
        .or_flash("/teacher_dashboard")?;

    if let Err(errors) = form.validate_form() {
        return Ok(render_portfolio_detail(&user, &detail, &form, &errors, None).into());
    }

    let rating = form
        .rating
        .ok_or_else(|| AppError::Validation("Rating is required.".to_string()))
        .or_flash("/teacher_dashboard")?;

    let comment_id = create_comment(db, id, user.id, &form.comment, rating)
        .await
        .or_flash("/teacher_dashboard")?;

    info!(comment_id, portfolio_id = id, teacher_id = user.id, rating, "Comment added");

    Ok(Flash::success(Redirect::to(uri!(portfolio_detail(id))), "Comment added!").into())
}

#[get("/profile")]
pub fn profile(user: User, flash: Option<FlashMessage<'_>>) -> Result<Template, Flash<Redirect>> {
    user.require_permission(Permission::ViewOwnProfile)
        .or_flash("/")?;

    Ok(Template::render(
        "profile",
        context! {
            title: "My profile",
            current_user: &user,
            profile: &user,
            flash: FlashView::from_message(flash),
            current_route: "profile",
        },
    ))
}

fn render_edit_profile(user: &User, form: &ProfileForm, errors: &FormErrors) -> Template {
    Template::render(
        "edit_profile",
        context! {
            title: "Edit profile",
            current_user: user,
            form: form,
            errors: errors,
            current_route: "edit_profile",
        },
    )
}

#[get("/edit_profile")]
pub fn edit_profile(user: User) -> Result<Template, Flash<Redirect>> {
    user.require_permission(Permission::EditOwnProfile)
        .or_flash("/profile")?;

    Ok(render_edit_profile(&user, &ProfileForm::from(&user), &FormErrors::new()))
}

#[post("/edit_profile", data = "<form>")]
pub async fn process_edit_profile(
    form: Form<ProfileForm>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Reply, Flash<Redirect>> {
    user.require_permission(Permission::EditOwnProfile)
        .or_flash("/profile")?;

    if let Err(errors) = form.validate_form() {
        return Ok(render_edit_profile(&user, &form, &errors).into());
    }

    update_user_profile(db, user.id, &ProfileUpdate::from(&*form))
        .await
        .or_flash("/edit_profile")?;

    Ok(Flash::success(Redirect::to(uri!(profile)), "Profile updated!").into())
}

#[get("/teacher_dashboard?<search..>")]
pub async fn teacher_dashboard(
    search: SearchForm,
    user: User,
    db: &State<Pool<Sqlite>>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Template, Flash<Redirect>> {
    user.require_permission(Permission::ViewAllStudents)
        .or_flash(user.role.home())?;

    let (students, errors) = match search.validate_form() {
        Err(errors) => (Vec::new(), errors),
        Ok(()) if search.query().is_empty() => (Vec::new(), FormErrors::new()),
        Ok(()) => (
            search_students(db, search.query())
                .await
                .or_flash("/")?,
            FormErrors::new(),
        ),
    };

    Ok(Template::render(
        "teacher_dashboard",
        context! {
            title: "Teacher dashboard",
            current_user: &user,
            query: search.query(),
            searched: !search.query().is_empty(),
            students: students,
            errors: errors,
            flash: FlashView::from_message(flash),
            current_route: "teacher_dashboard",
        },
    ))
}

#[get("/students_list")]
pub async fn students_list(
    user: User,
    db: &State<Pool<Sqlite>>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Template, Flash<Redirect>> {
    user.require_permission(Permission::ViewAllStudents)
        .or_flash(user.role.home())?;

    let students = get_users_by_role(db, Role::Student)
        .await
        .or_flash("/teacher_dashboard")?;

    Ok(Template::render(
        "students_list",
        context! {
            title: "Students",
            current_user: &user,
            students: students,
            flash: FlashView::from_message(flash),
            current_route: "students_list",
        },
    ))
}

#[get("/view_portfolio/<student_id>")]
pub async fn view_portfolio(
    student_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Template, Flash<Redirect>> {
    user.require_permission(Permission::ViewAllPortfolios)
        .or_flash(user.role.home())?;

    let student = get_student(db, student_id)
        .await
        .or_flash("/students_list")?;
    let portfolios = get_tagged_portfolios_for_user(db, student_id)
        .await
        .or_flash("/students_list")?;

    let context = json!({
        "title": format!("Portfolio of {}", student.display_name()),
        "current_user": user,
        "student": student,
        "portfolios": portfolios,
        "current_route": "view_portfolio",
    });

    Ok(Template::render("view_portfolio", context))
}

fn render_tags(
    user: &User,
    tags: &[Tag],
    form: &TagForm,
    errors: &FormErrors,
    flash: Option<FlashView>,
) -> Template {
    Template::render(
        "tags",
        context! {
            title: "Tags",
            current_user: user,
            tags: tags,
            can_manage_tags: user.has_permission(Permission::ManageTags),
            form: form,
            errors: errors,
            flash: flash,
            current_route: "tags",
        },
    )
}

#[get("/tags")]
pub async fn tags(
    user: User,
    db: &State<Pool<Sqlite>>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Template, Flash<Redirect>> {
    let all_tags = get_all_tags(db).await.or_flash("/")?;

    Ok(render_tags(
        &user,
        &all_tags,
        &TagForm::default(),
        &FormErrors::new(),
        FlashView::from_message(flash),
    ))
}

#[post("/tags", data = "<form>")]
pub async fn process_create_tag(
    form: Form<TagForm>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Reply, Flash<Redirect>> {
    user.require_permission(Permission::ManageTags)
        .or_flash("/tags")?;

    let name = form.name.trim().to_string();
    let form = TagForm { name };

    let errors = match form.validate_form() {
        Ok(()) => match create_tag(db, &form.name).await {
            Ok(tag_id) => {
                info!(tag_id, name = %form.name, "Tag created");
                return Ok(Flash::success(Redirect::to(uri!(tags)), "Tag created!").into());
            }
            Err(err) => FormErrors::from_app_error("name", err),
        },
        Err(errors) => errors,
    };

    let all_tags = get_all_tags(db).await.or_flash("/tags")?;
    Ok(render_tags(&user, &all_tags, &form, &errors, None).into())
}

#[get("/search_by_tag?<tag_id>")]
pub async fn search_by_tag(
    tag_id: Option<i64>,
    user: User,
    db: &State<Pool<Sqlite>>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Template, Flash<Redirect>> {
    user.require_permission(Permission::SearchByTag)
        .or_flash(user.role.home())?;

    let all_tags = get_all_tags(db).await.or_flash("/teacher_dashboard")?;

    let (selected, results) = match tag_id {
        Some(tag_id) => {
            let tag = get_tag(db, tag_id).await.or_flash("/search_by_tag")?;
            let results = search_portfolios_by_tag(db, tag.id)
                .await
                .or_flash("/search_by_tag")?;
            (Some(tag), results)
        }
        None => (None, Vec::new()),
    };

    Ok(Template::render(
        "search_by_tag",
        context! {
            title: "Search by tag",
            current_user: &user,
            tags: all_tags,
            selected: selected,
            results: results,
            flash: FlashView::from_message(flash),
            current_route: "search_by_tag",
        },
    ))
}

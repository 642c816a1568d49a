#[cfg(test)]
pub mod test_utils {
    use crate::auth::Role;
    use crate::db::{create_portfolio, create_tag, create_user, update_user_profile};
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::models::ProfileUpdate;
    use rocket::http::ContentType;
    use rocket::local::asynchronous::{Client, LocalResponse};
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        tags: Vec<String>,
        portfolios: Vec<TestPortfolio>,
    }

    pub struct TestUser {
        pub username: String,
        pub name: Option<String>,
        pub role: Role,
        pub password: String,
    }

    pub struct TestPortfolio {
        pub owner: String,
        pub title: String,
        pub content: String,
        pub tags: Vec<String>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn student(self, username: &str, name: Option<&str>) -> Self {
            self.user_with_password(username, name, Role::Student, STANDARD_PASSWORD)
        }

        pub fn teacher(self, username: &str, name: Option<&str>) -> Self {
            self.user_with_password(username, name, Role::Teacher, STANDARD_PASSWORD)
        }

        pub fn user_with_password(
            mut self,
            username: &str,
            name: Option<&str>,
            role: Role,
            password: &str,
        ) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                name: name.map(String::from),
                role,
                password: password.to_string(),
            });
            self
        }

        pub fn tag(mut self, name: &str) -> Self {
            self.tags.push(name.to_string());
            self
        }

        /// Adds a portfolio entry. Tags are looked up by name, so declare them
        /// with `tag` first.
        pub fn portfolio(mut self, owner: &str, title: &str, content: &str, tags: &[&str]) -> Self {
            self.portfolios.push(TestPortfolio {
                owner: owner.to_string(),
                title: title.to_string(),
                content: content.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .parse_filters("debug")
                    .is_test(true)
                    .try_init();
            });

            // A single connection that never recycles keeps the in-memory
            // database alive for the whole test.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut tag_id_map: HashMap<String, i64> = HashMap::new();
            let mut portfolio_id_map: HashMap<String, i64> = HashMap::new();

            for user in &self.users {
                let user_id =
                    create_user(&pool, &user.username, &user.password, user.role.as_str()).await?;

                if user.name.is_some() {
                    let profile = ProfileUpdate {
                        name: user.name.clone(),
                        ..ProfileUpdate::default()
                    };
                    update_user_profile(&pool, user_id, &profile).await?;
                }

                user_id_map.insert(user.username.clone(), user_id);
            }

            for name in &self.tags {
                let tag_id = create_tag(&pool, name).await?;
                tag_id_map.insert(name.clone(), tag_id);
            }

            for entry in &self.portfolios {
                let owner_id = user_id_map.get(&entry.owner).copied().ok_or_else(|| {
                    AppError::NotFound(format!("Test user {} not declared", entry.owner))
                })?;
                let tag_ids: Vec<i64> = entry
                    .tags
                    .iter()
                    .filter_map(|name| tag_id_map.get(name).copied())
                    .collect();

                let portfolio_id =
                    create_portfolio(&pool, owner_id, &entry.title, &entry.content, &tag_ids)
                        .await?;
                portfolio_id_map.insert(entry.title.clone(), portfolio_id);
            }

            Ok(TestDb {
                pool,
                user_id_map,
                tag_id_map,
                portfolio_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub tag_id_map: HashMap<String, i64>,
        pub portfolio_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        pub fn tag_id(&self, name: &str) -> Option<i64> {
            self.tag_id_map.get(name).copied()
        }

        pub fn portfolio_id(&self, title: &str) -> Option<i64> {
            self.portfolio_id_map.get(title).copied()
        }
    }

    /// Two students, one teacher, two tags and a tagged entry per student.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .student("student_user", Some("Aiko Sato"))
            .student("other_student", None)
            .teacher("teacher_user", Some("Ms Tanaka"))
            .tag("Science")
            .tag("Art")
            .portfolio(
                "student_user",
                "Volcano project",
                "Baking soda and vinegar, scaled up.",
                &["Science"],
            )
            .portfolio(
                "other_student",
                "Watercolours",
                "Three landscapes from the school trip.",
                &["Art"],
            )
            .build()
            .await
            .expect("Failed to build test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = init_rocket(test_db.pool.clone()).await;
        let client = Client::tracked(rocket)
            .await
            .expect("valid rocket instance");

        (client, test_db)
    }

    pub async fn login_test_user<'c>(
        client: &'c Client,
        username: &str,
        password: &str,
    ) -> LocalResponse<'c> {
        client
            .post("/login")
            .header(ContentType::Form)
            .body(format!("username={}&password={}", username, password))
            .dispatch()
            .await
    }

    pub async fn post_form<'c>(
        client: &'c Client,
        uri: impl std::fmt::Display,
        body: &str,
    ) -> LocalResponse<'c> {
        client
            .post(uri.to_string())
            .header(ContentType::Form)
            .body(body.to_string())
            .dispatch()
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        db::{create_comment, get_comments_for_portfolio, get_portfolio_detail},
        error::AppError,
        test::test_utils::TestDbBuilder,
    };

    #[rocket::async_test]
    async fn test_comments_in_order_with_teacher_name() {
        let test_db = TestDbBuilder::new()
            .student("aiko", None)
            .teacher("ms_tanaka", Some("Ms Tanaka"))
            .teacher("mr_ito", None)
            .portfolio("aiko", "Volcano project", "Lava", &[])
            .build()
            .await
            .expect("Failed to build test database");

        let id = test_db.portfolio_id("Volcano project").expect("Portfolio not found");
        let tanaka = test_db.user_id("ms_tanaka").expect("User not found");
        let ito = test_db.user_id("mr_ito").expect("User not found");

        create_comment(&test_db.pool, id, tanaka, "Clear write-up", 4)
            .await
            .expect("Failed to comment");
        create_comment(&test_db.pool, id, ito, "Cite your sources", 2)
            .await
            .expect("Failed to comment");

        let comments = get_comments_for_portfolio(&test_db.pool, id)
            .await
            .expect("Failed to get comments");

        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].teacher_name, "Ms Tanaka");
        assert_eq!(comments[0].rating, 4);
        // Falls back to the username when no name is set
        assert_eq!(comments[1].teacher_name, "mr_ito");
        assert_eq!(comments[1].comment, "Cite your sources");

        let detail = get_portfolio_detail(&test_db.pool, id)
            .await
            .expect("Failed to get detail");
        assert_eq!(detail.comments.len(), 2);
        assert_eq!(detail.author.username, "aiko");
    }

    #[rocket::async_test]
    async fn test_comment_on_missing_portfolio() {
        let test_db = TestDbBuilder::new()
            .teacher("ms_tanaka", None)
            .build()
            .await
            .expect("Failed to build test database");
        let teacher = test_db.user_id("ms_tanaka").expect("User not found");

        let result = create_comment(&test_db.pool, 42, teacher, "Hello?", 3).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[rocket::async_test]
    async fn test_rating_outside_range_rejected_by_schema() {
        let test_db = TestDbBuilder::new()
            .student("aiko", None)
            .teacher("ms_tanaka", None)
            .portfolio("aiko", "Volcano project", "Lava", &[])
            .build()
            .await
            .expect("Failed to build test database");

        let id = test_db.portfolio_id("Volcano project").expect("Portfolio not found");
        let teacher = test_db.user_id("ms_tanaka").expect("User not found");

        let result = create_comment(&test_db.pool, id, teacher, "Too generous", 6).await;
        assert!(matches!(result, Err(AppError::Database(_))));
    }
}

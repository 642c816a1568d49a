use once_cell::sync::Lazy;
use regex::Regex;
use rocket::FromForm;
use serde::Serialize;
use validator::Validate;

use crate::models::ProfileUpdate;

static RE_ROLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(student|teacher)$").expect("role pattern compiles"));
// Blank or 1..=12
static RE_GRADE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(1[0-2]|[1-9])?\s*$").expect("grade pattern compiles"));
// Blank or 1900..=2200
static RE_GRADUATION_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(19[0-9]{2}|2[01][0-9]{2}|2200)?\s*$")
        .expect("graduation year pattern compiles")
});

#[derive(Debug, Clone, Default, FromForm, Serialize, Validate)]
pub struct RegistrationForm {
    #[validate(length(min = 1, max = 64, message = "Username is required (at most 64 characters)."))]
    pub username: String,
    #[serde(skip)]
    #[validate(length(min = 1, max = 128, message = "Password is required."))]
    pub password: String,
    #[validate(regex(path = *RE_ROLE, message = "Choose either student or teacher."))]
    pub role: String,
}

#[derive(Debug, Clone, Default, FromForm, Serialize, Validate)]
pub struct LoginForm {
    #[validate(length(min = 1, max = 64, message = "Username is required (at most 64 characters)."))]
    pub username: String,
    #[serde(skip)]
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, Clone, Default, FromForm, Serialize, Validate)]
pub struct PortfolioForm {
    #[validate(length(min = 1, max = 128, message = "Title is required (at most 128 characters)."))]
    pub title: String,
    #[validate(length(min = 1, message = "Content is required."))]
    pub content: String,
    #[field(default = Vec::new())]
    pub tag_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, FromForm, Serialize)]
pub struct PortfolioTagsForm {
    #[field(default = Vec::new())]
    pub tag_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, FromForm, Serialize, Validate)]
pub struct ProfileForm {
    #[validate(length(max = 32, message = "Student number is at most 32 characters."))]
    pub student_number: Option<String>,
    #[validate(length(max = 64, message = "Name is at most 64 characters."))]
    pub name: Option<String>,
    // Kept as text so non-numeric input fails validation instead of parsing to None
    #[validate(regex(path = *RE_GRADE, message = "Grade must be between 1 and 12."))]
    pub grade: Option<String>,
    #[validate(regex(path = *RE_GRADUATION_YEAR, message = "Enter a valid graduation year."))]
    pub graduation_year: Option<String>,
    #[validate(length(max = 2000, message = "Bio is at most 2000 characters."))]
    pub bio: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn non_blank_number(value: &Option<String>) -> Option<i64> {
    non_blank(value).and_then(|v| v.parse().ok())
}

impl From<&ProfileForm> for ProfileUpdate {
    fn from(form: &ProfileForm) -> Self {
        Self {
            student_number: non_blank(&form.student_number),
            name: non_blank(&form.name),
            grade: non_blank_number(&form.grade),
            graduation_year: non_blank_number(&form.graduation_year),
            bio: non_blank(&form.bio),
        }
    }
}

impl From<&crate::auth::User> for ProfileForm {
    fn from(user: &crate::auth::User) -> Self {
        Self {
            student_number: user.student_number.clone(),
            name: user.name.clone(),
            grade: user.grade.map(|grade| grade.to_string()),
            graduation_year: user.graduation_year.map(|year| year.to_string()),
            bio: user.bio.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, FromForm, Serialize, Validate)]
pub struct SearchForm {
    #[validate(length(max = 64, message = "Search is at most 64 characters."))]
    pub query: Option<String>,
}

impl SearchForm {
    pub fn query(&self) -> &str {
        self.query.as_deref().map(str::trim).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, FromForm, Serialize, Validate)]
pub struct CommentForm {
    #[validate(length(min = 1, max = 2000, message = "Comment is required (at most 2000 characters)."))]
    pub comment: String,
    // Lenient so a blank or garbled rating reaches validation instead of failing the form
    #[validate(
        required(message = "Rating is required."),
        range(min = 1, max = 5, message = "Rating must be between 1 and 5.")
    )]
    pub rating: Option<i64>,
}

#[derive(Debug, Clone, Default, FromForm, Serialize, Validate)]
pub struct TagForm {
    #[validate(length(min = 1, max = 32, message = "Tag name is required (at most 32 characters)."))]
    pub name: String,
}

#[derive(Debug, Clone, Default, FromForm, Validate)]
pub struct PasswordChangeForm {
    #[validate(length(min = 1, message = "Current password is required."))]
    pub current_password: String,
    #[validate(length(min = 1, max = 128, message = "New password is required."))]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidateFormExt;

    fn registration(username: &str, role: &str) -> RegistrationForm {
        RegistrationForm {
            username: username.to_string(),
            password: "password123".to_string(),
            role: role.to_string(),
        }
    }

    #[test]
    fn test_registration_form() {
        assert!(registration("aiko.s", "student").validate_form().is_ok());
        assert!(registration("mr_tanaka", "teacher").validate_form().is_ok());

        let errors = registration("", "student").validate_form().unwrap_err();
        assert!(!errors.field("username").is_empty());

        assert!(registration("Aiko Sato", "student").validate_form().is_ok());
        assert!(registration("田中", "student").validate_form().is_ok());

        let errors = registration(&"a".repeat(65), "student")
            .validate_form()
            .unwrap_err();
        assert!(!errors.field("username").is_empty());

        let errors = registration("aiko", "admin").validate_form().unwrap_err();
        assert_eq!(errors.field("role"), ["Choose either student or teacher."]);
    }

    #[test]
    fn test_portfolio_form_limits() {
        let form = PortfolioForm {
            title: "t".repeat(129),
            content: String::new(),
            tag_ids: vec![],
        };
        let errors = form.validate_form().unwrap_err();
        assert!(!errors.field("title").is_empty());
        assert_eq!(errors.field("content"), ["Content is required."]);
    }

    #[test]
    fn test_comment_rating_bounds() {
        for rating in [1, 3, 5] {
            let form = CommentForm {
                comment: "Nice work".to_string(),
                rating: Some(rating),
            };
            assert!(form.validate_form().is_ok(), "rating {} rejected", rating);
        }

        for rating in [Some(0), Some(6), None] {
            let form = CommentForm {
                comment: "Nice work".to_string(),
                rating,
            };
            let errors = form.validate_form().unwrap_err();
            assert_eq!(errors.field("rating").len(), 1, "rating {:?} accepted", rating);
        }
    }

    #[test]
    fn test_profile_form_normalizes_blanks() {
        let form = ProfileForm {
            student_number: Some("  ".to_string()),
            name: Some(" Aiko Sato ".to_string()),
            grade: Some(" 11 ".to_string()),
            graduation_year: Some(String::new()),
            bio: Some(String::new()),
        };
        assert!(form.validate_form().is_ok());

        let update = ProfileUpdate::from(&form);
        assert_eq!(update.student_number, None);
        assert_eq!(update.name.as_deref(), Some("Aiko Sato"));
        assert_eq!(update.grade, Some(11));
        assert_eq!(update.graduation_year, None);
        assert_eq!(update.bio, None);
    }

    #[test]
    fn test_profile_form_rejects_bad_numbers() {
        for grade in ["13", "0", "ten", "1.5"] {
            let form = ProfileForm {
                grade: Some(grade.to_string()),
                ..Default::default()
            };
            let errors = form.validate_form().unwrap_err();
            assert_eq!(errors.field("grade"), ["Grade must be between 1 and 12."], "{}", grade);
        }

        for year in ["20x8", "1899", "2201", "99"] {
            let form = ProfileForm {
                graduation_year: Some(year.to_string()),
                ..Default::default()
            };
            let errors = form.validate_form().unwrap_err();
            assert!(!errors.field("graduation_year").is_empty(), "{}", year);
        }

        let form = ProfileForm {
            grade: Some("12".to_string()),
            graduation_year: Some("2200".to_string()),
            ..Default::default()
        };
        assert!(form.validate_form().is_ok());
    }

    #[test]
    fn test_search_query_is_trimmed() {
        let form = SearchForm {
            query: Some("  ai ".to_string()),
        };
        assert_eq!(form.query(), "ai");
        assert_eq!(SearchForm::default().query(), "");
    }
}

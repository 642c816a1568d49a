use anyhow::Error;
use once_cell::sync::Lazy;
use rocket::serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewOwnProfile,
    EditOwnProfile,
    ManageOwnPortfolios,
    TagOwnPortfolios,

    ViewAllStudents,
    ViewAllPortfolios,
    ManageTags,
    CommentOnPortfolios,
    SearchByTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

static SHARED_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnProfile);
    permissions.insert(Permission::EditOwnProfile);

    permissions
});

static STUDENT_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(SHARED_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageOwnPortfolios);
    permissions.insert(Permission::TagOwnPortfolios);

    permissions
});

// Teachers review portfolios but never author them.
static TEACHER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(SHARED_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ViewAllStudents);
    permissions.insert(Permission::ViewAllPortfolios);
    permissions.insert(Permission::ManageTags);
    permissions.insert(Permission::CommentOnPortfolios);
    permissions.insert(Permission::SearchByTag);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Student => &STUDENT_PERMISSIONS,
            Role::Teacher => &TEACHER_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }

    /// Where a freshly logged in user lands.
    pub fn home(&self) -> &'static str {
        match self {
            Role::Student => "/portfolio",
            Role::Teacher => "/teacher_dashboard",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        assert_eq!("student".parse::<Role>().unwrap(), Role::Student);
        assert_eq!("teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert!("admin".parse::<Role>().is_err());
        assert_eq!(Role::Teacher.to_string(), "teacher");
    }

    #[test]
    fn test_teacher_only_permissions() {
        for permission in [
            Permission::ViewAllStudents,
            Permission::ViewAllPortfolios,
            Permission::ManageTags,
            Permission::CommentOnPortfolios,
            Permission::SearchByTag,
        ] {
            assert!(Role::Teacher.has_permission(permission));
            assert!(!Role::Student.has_permission(permission));
        }
    }

    #[test]
    fn test_student_only_permissions() {
        assert!(Role::Student.has_permission(Permission::ManageOwnPortfolios));
        assert!(Role::Student.has_permission(Permission::TagOwnPortfolios));
        assert!(!Role::Teacher.has_permission(Permission::ManageOwnPortfolios));
        assert!(!Role::Teacher.has_permission(Permission::TagOwnPortfolios));
    }

    #[test]
    fn test_shared_permissions() {
        for role in [Role::Student, Role::Teacher] {
            assert!(role.has_permission(Permission::ViewOwnProfile));
            assert!(role.has_permission(Permission::EditOwnProfile));
        }
    }
}

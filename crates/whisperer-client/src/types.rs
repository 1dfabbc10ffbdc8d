//! Domain types shared across the client.
//!
//! Records coming from the backend are parsed into these types at the trust
//! boundary. [`User`] in particular is never built from raw JSON without
//! passing [`User::try_from`], so a `User` held by the session store is
//! always well formed and carries a derived [`Role`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Backend student identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(pub i64);

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Student id the backend reserves for the administrator account.
pub const ADMIN_STUDENT_ID: StudentId = StudentId(1);

/// What a user may do in the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    /// The one place roles are derived. The backend has no role claim; the
    /// administrator is the account with [`ADMIN_STUDENT_ID`].
    #[must_use]
    pub fn for_student_id(id: StudentId) -> Self {
        if id == ADMIN_STUDENT_ID {
            Self::Admin
        } else {
            Self::Student
        }
    }

    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Student => write!(f, "student"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// User record as the backend sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUser {
    pub student_id: i64,
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// Validated user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawUser", into = "RawUser")]
pub struct User {
    pub student_id: StudentId,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl User {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl TryFrom<RawUser> for User {
    type Error = ClientError;

    fn try_from(raw: RawUser) -> Result<Self, Self::Error> {
        if raw.student_id <= 0 {
            return Err(ClientError::invalid_user(format!(
                "student_id must be positive, got {}",
                raw.student_id
            )));
        }
        let email = raw.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ClientError::invalid_user("email is missing or malformed"));
        }
        let name = raw.name.trim();
        if name.is_empty() {
            return Err(ClientError::invalid_user("name is empty"));
        }

        let student_id = StudentId(raw.student_id);
        Ok(Self {
            student_id,
            email: email.to_string(),
            name: name.to_string(),
            role: Role::for_student_id(student_id),
        })
    }
}

impl From<User> for RawUser {
    fn from(user: User) -> Self {
        Self {
            student_id: user.student_id.0,
            email: user.email,
            name: user.name,
        }
    }
}

/// How the current application token was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthSource {
    /// Email and password against the backend.
    Local,
    /// Token exchanged for an external identity-provider token.
    External,
}

impl AuthSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::External => "external",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Self::Local),
            "external" => Some(Self::External),
            _ => None,
        }
    }
}

/// Application token plus the user it belongs to, as returned by the login
/// and token-exchange endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthGrant {
    pub token: String,
    pub user: User,
}

/// Latest token consumption for the signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenUsageSnapshot {
    pub usage: u64,
    pub limit: u64,
    pub percentage_used: f64,
}

impl TokenUsageSnapshot {
    /// Snapshot used when the first fetch fails.
    #[must_use]
    pub fn zeroed() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.usage)
    }
}

/// One row of the admin usage report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTokenUsage {
    pub student_id: i64,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tokens_used: u64,
}

/// Monthly token usage across all users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminTokenUsage {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u8>,
    pub global_limit: u64,
    pub active_users: u64,
    #[serde(default)]
    pub usage_data: Vec<UserTokenUsage>,
}

impl AdminTokenUsage {
    /// The global budget split evenly across active users.
    #[must_use]
    pub fn per_user_limit(&self) -> u64 {
        if self.active_users == 0 {
            self.global_limit
        } else {
            self.global_limit / self.active_users
        }
    }

    /// Share of the per-user budget `row` has consumed, in percent.
    #[must_use]
    pub fn percentage_for(&self, row: &UserTokenUsage) -> f64 {
        let limit = self.per_user_limit();
        if limit == 0 {
            0.0
        } else {
            row.tokens_used as f64 / limit as f64 * 100.0
        }
    }
}

/// Global budget configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLimit {
    pub global_limit: u64,
    #[serde(default)]
    pub active_users: u64,
    #[serde(default)]
    pub per_user_limit: u64,
}

/// Calendar month used to select admin reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReportMonth {
    pub year: i32,
    pub month: u8,
}

impl ReportMonth {
    /// Builds a month, rejecting anything outside 1..=12.
    pub fn new(year: i32, month: u8) -> Result<Self, ClientError> {
        if !(1..=12).contains(&month) {
            return Err(ClientError::validation(format!("month must be 1-12, got {month}")));
        }
        Ok(Self { year, month })
    }

    #[must_use]
    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    /// The following month, or `None` when that would pass `current`.
    #[must_use]
    pub fn next(self, current: Self) -> Option<Self> {
        if self >= current {
            return None;
        }
        Some(if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        })
    }
}

/// Study program the student is enrolled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    #[serde(default)]
    pub credits_completed: Option<f64>,
    #[serde(default)]
    pub credits_required: Option<f64>,
}

/// A graded course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub course_name: String,
    pub grade: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Program and grades for one student.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StudentCourses {
    #[serde(default)]
    pub program: Option<Program>,
    #[serde(default)]
    pub grades: Vec<Grade>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: i64, email: &str, name: &str) -> RawUser {
        RawUser {
            student_id: id,
            email: email.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn role_is_derived_from_student_id() {
        assert_eq!(Role::for_student_id(StudentId(1)), Role::Admin);
        assert_eq!(Role::for_student_id(StudentId(2)), Role::Student);
        assert_eq!(Role::for_student_id(StudentId(1000)), Role::Student);
    }

    #[test]
    fn user_validation_accepts_well_formed_record() {
        let user = User::try_from(raw(7, " ada@uni.example ", "Ada")).unwrap();
        assert_eq!(user.student_id, StudentId(7));
        assert_eq!(user.email, "ada@uni.example");
        assert_eq!(user.role, Role::Student);
    }

    #[test]
    fn user_validation_rejects_bad_records() {
        assert!(User::try_from(raw(0, "a@b.c", "A")).is_err());
        assert!(User::try_from(raw(3, "not-an-email", "A")).is_err());
        assert!(User::try_from(raw(3, "a@b.c", "   ")).is_err());
    }

    #[test]
    fn user_deserializes_through_validation() {
        let user: User =
            serde_json::from_str(r#"{"student_id":1,"email":"root@uni.example","name":"Root"}"#)
                .unwrap();
        assert!(user.is_admin());

        let err = serde_json::from_str::<User>(r#"{"student_id":5,"email":"","name":"X"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn user_serializes_without_role() {
        let user = User::try_from(raw(4, "bo@uni.example", "Bo")).unwrap();
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"student_id": 4, "email": "bo@uni.example", "name": "Bo"})
        );
    }

    #[test]
    fn auth_source_parse() {
        assert_eq!(AuthSource::parse("local"), Some(AuthSource::Local));
        assert_eq!(AuthSource::parse("external"), Some(AuthSource::External));
        assert_eq!(AuthSource::parse("azure_ad"), None);
    }

    #[test]
    fn admin_usage_splits_budget() {
        let report = AdminTokenUsage {
            year: Some(2026),
            month: Some(3),
            global_limit: 100_000,
            active_users: 4,
            usage_data: vec![UserTokenUsage {
                student_id: 9,
                email: "x@uni.example".into(),
                name: "X".into(),
                tokens_used: 12_500,
            }],
        };
        assert_eq!(report.per_user_limit(), 25_000);
        assert!((report.percentage_for(&report.usage_data[0]) - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn report_month_navigation() {
        let current = ReportMonth::new(2026, 10).unwrap();
        let jan = ReportMonth::new(2026, 1).unwrap();
        assert_eq!(jan.previous(), ReportMonth::new(2025, 12).unwrap());
        assert_eq!(current.next(current), None);
        assert_eq!(
            ReportMonth::new(2025, 12).unwrap().next(current),
            Some(ReportMonth::new(2026, 1).unwrap())
        );
        assert!(ReportMonth::new(2026, 13).is_err());
    }

    #[test]
    fn courses_parse_leniently() {
        let courses: StudentCourses = serde_json::from_str(
            r#"{"grades":[{"course_name":"Databases","grade":"A"}]}"#,
        )
        .unwrap();
        assert!(courses.program.is_none());
        assert_eq!(courses.grades[0].course_name, "Databases");
    }
}

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Backend record identifier, kept opaque. Arrives as a UUID string from some
/// endpoints and as an integer from others.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct Id(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for Id {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => Id(s),
            RawId::Number(n) => Id(n.to_string()),
        }
    }
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id(s.to_string())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id(s)
    }
}

impl Id {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request body for login.
#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token pair returned by a successful login.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
}

/// Request body for user registration.
#[derive(Debug, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub access: Option<String>,
}

/// Profile of the signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_company_admin: Option<bool>,
    #[serde(default)]
    pub company_id: Option<Id>,
}

#[derive(Debug, Serialize)]
pub struct ConsultRequest {
    pub question: String,
    pub history_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsultResponse {
    pub response: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSession {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl ChatSession {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("Untitled")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn is_user(&self) -> bool {
        self.role == "user"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub mission_statement: Option<String>,
    #[serde(default)]
    pub career_url: Option<String>,
    #[serde(default)]
    pub core_values: Vec<String>,
    #[serde(default)]
    pub culture_keywords: Vec<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

/// The companies endpoint answers either with a bare array or a paginated
/// `{"results": [...]}` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CompanyList {
    Bare(Vec<Company>),
    Paged { results: Vec<Company> },
}

impl From<CompanyList> for Vec<Company> {
    fn from(list: CompanyList) -> Self {
        match list {
            CompanyList::Bare(items) | CompanyList::Paged { results: items } => items,
        }
    }
}

/// Editable company profile (the EVP form and the admin company form).
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CompanyForm {
    pub name: String,
    pub career_url: String,
    pub mission_statement: String,
    pub core_values: Vec<String>,
    pub culture_keywords: Vec<String>,
}

impl From<&Company> for CompanyForm {
    fn from(c: &Company) -> Self {
        Self {
            name: c.name.clone(),
            career_url: c.career_url.clone().unwrap_or_default(),
            mission_statement: c.mission_statement.clone().unwrap_or_default(),
            core_values: c.core_values.clone(),
            culture_keywords: c.culture_keywords.clone(),
        }
    }
}

/// Image uploaded alongside a company form.
#[derive(Debug, Clone)]
pub struct LogoUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssessmentQuestion {
    pub id: Id,
    pub statement: String,
    pub dimension: String,
    #[serde(default)]
    pub scale: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionSet {
    #[serde(default)]
    pub questions: Vec<AssessmentQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    #[serde(rename = "questionId")]
    pub question_id: Id,
    pub score: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssessmentSubmission {
    pub company: Id,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionAverage {
    pub id: Id,
    pub statement: String,
    pub dimension: String,
    pub average_score_all_candidates: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyAssessmentOverview {
    pub company_name: String,
    pub overall_average_score: Option<f64>,
    #[serde(default)]
    pub questions: Vec<QuestionAverage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidateUser {
    pub id: Id,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub full_name: String,
}

impl CandidateUser {
    /// Full name when the backend has one, the username otherwise.
    pub fn display_name(&self) -> &str {
        let full = self.full_name.trim();
        if full.is_empty() {
            &self.username
        } else {
            full
        }
    }
}

/// One candidate's completed questionnaire, as listed for a company admin.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateSession {
    pub id: Id,
    pub user: CandidateUser,
    #[serde(default, rename = "companyId")]
    pub company_id: Option<Id>,
    #[serde(default)]
    pub company_name: String,
    pub overall_score: Option<f64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionAnswer {
    pub question_id: Id,
    pub question_statement: String,
    pub dimension: String,
    pub score: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionDetails {
    pub id: Id,
    pub user: CandidateUser,
    #[serde(default)]
    pub company_name: String,
    pub overall_score: Option<f64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub dimension_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub answers: Vec<SessionAnswer>,
}

/// Account as seen from the platform-admin user screen.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminUser {
    pub id: Id,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub is_candidate: bool,
    #[serde(default)]
    pub is_company_admin: bool,
    #[serde(default)]
    pub is_fitwork_admin: bool,
    #[serde(default)]
    pub company: Option<Id>,
    #[serde(default)]
    pub company_name: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UserFormError {
    #[error("a company admin must belong to a company")]
    CompanyRequired,
    #[error("a password is required for new users")]
    PasswordRequired,
}

/// Create/update payload for `/api/v1/admin/users/`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct AdminUserForm {
    pub email: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub is_candidate: bool,
    pub is_company_admin: bool,
    pub is_fitwork_admin: bool,
    pub company: Option<Id>,
}

impl AdminUserForm {
    /// Applies the admin screen's rules before sending: only company admins
    /// keep a company, new users need a password, an empty password on update
    /// leaves the current one alone, and platform admins are never granted
    /// through this form.
    pub fn prepare(mut self, creating: bool) -> Result<Self, UserFormError> {
        if self.password.as_deref().is_some_and(str::is_empty) {
            self.password = None;
        }
        if creating && self.password.is_none() {
            return Err(UserFormError::PasswordRequired);
        }
        if self.is_company_admin {
            if self.company.is_none() {
                return Err(UserFormError::CompanyRequired);
            }
        } else {
            self.company = None;
        }
        self.is_fitwork_admin = false;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DimensionAverage {
    pub dimension: String,
    pub average_score: Option<f64>,
}

/// Platform-wide counters for the platform-admin dashboard.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformOverview {
    pub total_companies: u64,
    pub total_candidates_registered: u64,
    pub total_assessments_completed: u64,
    #[serde(default)]
    pub average_scores_by_dimension: Vec<DimensionAverage>,
}

impl PlatformOverview {
    /// Dimensions that have a score, sorted by name.
    pub fn scored_dimensions(&self) -> Vec<(&str, f64)> {
        let mut scored: Vec<_> = self
            .average_scores_by_dimension
            .iter()
            .filter_map(|d| d.average_score.map(|s| (d.dimension.as_str(), s)))
            .collect();
        scored.sort_by(|a, b| a.0.cmp(b.0));
        scored
    }
}

/// Error body in the backend's usual `{"detail": "..."}` shape.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub detail: String,
}

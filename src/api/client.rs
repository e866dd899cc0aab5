use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::dto::{
    AdminUser, AdminUserForm, AssessmentQuestion, AssessmentSubmission, CandidateSession,
    ChatMessage, ChatSession, Company, CompanyAssessmentOverview, CompanyForm, CompanyList,
    ConsultRequest, ConsultResponse, ErrorBody, Id, LoginRequest, LoginResponse, LogoUpload,
    MeResponse, PlatformOverview, QuestionSet, RefreshRequest, RefreshResponse, RegisterRequest,
    SessionDetails, UserFormError,
};
use crate::auth::gate::TokenRefresher;
use crate::config::ApiConfig;
use crate::storage::{CredentialPair, TokenStore, ACCESS_TOKEN};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("response did not contain a token")]
    MissingToken,

    #[error("invalid user form: {0}")]
    Form(#[from] UserFormError),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Typed client for the FitWork REST API.
///
/// Requests made through the `secured` path carry the stored access token as
/// a bearer header when one is present.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            store,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn secured(&self, req: RequestBuilder) -> RequestBuilder {
        match self.store.get(ACCESS_TOKEN).await {
            Ok(Some(token)) => req.bearer_auth(token),
            Ok(None) => req,
            Err(e) => {
                warn!(error = %e, "token store unreadable; sending request without bearer");
                req
            }
        }
    }

    #[instrument(skip(self, body), fields(email = %body.email))]
    pub async fn login(&self, body: &LoginRequest) -> Result<CredentialPair, ApiError> {
        let res = self.http.post(self.url("/api/v1/login/")).json(body).send().await?;
        let tokens: LoginResponse = read_json(res).await?;
        if tokens.access.is_empty() || tokens.refresh.is_empty() {
            return Err(ApiError::MissingToken);
        }
        Ok(CredentialPair {
            access: tokens.access,
            refresh: tokens.refresh,
        })
    }

    #[instrument(skip(self, body), fields(email = %body.email, username = %body.username))]
    pub async fn register(&self, body: &RegisterRequest) -> Result<(), ApiError> {
        let res = self
            .http
            .post(self.url("/api/v1/register/"))
            .json(body)
            .send()
            .await?;
        ensure_success(res).await?;
        Ok(())
    }

    /// Exchanges a refresh token for a new access token. Anything but a 200
    /// carrying `access` is a failure.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, ApiError> {
        let res = self
            .http
            .post(self.url("/api/v1/refresh/"))
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await?;
        if res.status() != StatusCode::OK {
            return Err(status_error(res).await);
        }
        let body: RefreshResponse = res.json().await?;
        match body.access {
            Some(access) if !access.is_empty() => Ok(access),
            _ => Err(ApiError::MissingToken),
        }
    }

    #[instrument(skip(self))]
    pub async fn me(&self) -> Result<MeResponse, ApiError> {
        let req = self.secured(self.http.get(self.url("/api/v1/me/"))).await;
        read_json(req.send().await?).await
    }

    #[instrument(skip(self, body), fields(history_id = ?body.history_id))]
    pub async fn consult(&self, body: &ConsultRequest) -> Result<ConsultResponse, ApiError> {
        let req = self
            .secured(self.http.post(self.url("/api/v1/ai/consult/")).json(body))
            .await;
        read_json(req.send().await?).await
    }

    #[instrument(skip(self))]
    pub async fn chat_sessions(&self) -> Result<Vec<ChatSession>, ApiError> {
        let req = self
            .secured(self.http.get(self.url("/api/v1/ai/sessions/")))
            .await;
        read_json(req.send().await?).await
    }

    #[instrument(skip(self))]
    pub async fn chat_history(&self, history_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        let req = self
            .secured(
                self.http
                    .get(self.url(&format!("/api/v1/ai/history/{history_id}"))),
            )
            .await;
        read_json(req.send().await?).await
    }

    #[instrument(skip(self))]
    pub async fn companies(&self) -> Result<Vec<Company>, ApiError> {
        let req = self
            .secured(self.http.get(self.url("/api/v1/companies/")))
            .await;
        let list: CompanyList = read_json(req.send().await?).await?;
        Ok(list.into())
    }

    #[instrument(skip(self))]
    pub async fn company(&self, company_id: &Id) -> Result<Company, ApiError> {
        let req = self
            .secured(
                self.http
                    .get(self.url(&format!("/api/v1/companies/{company_id}/"))),
            )
            .await;
        read_json(req.send().await?).await
    }

    /// Creates a company from the admin form. Sent as multipart so a logo
    /// can ride along.
    #[instrument(skip(self, form, logo), fields(name = %form.name))]
    pub async fn create_company(
        &self,
        form: &CompanyForm,
        logo: Option<LogoUpload>,
    ) -> Result<(), ApiError> {
        let body = company_multipart(form, logo)?;
        let req = self
            .secured(
                self.http
                    .post(self.url("/api/v1/companies/create/"))
                    .multipart(body),
            )
            .await;
        ensure_success(req.send().await?).await?;
        Ok(())
    }

    #[instrument(skip(self, form, logo), fields(name = %form.name))]
    pub async fn update_company(
        &self,
        company_id: &Id,
        form: &CompanyForm,
        logo: Option<LogoUpload>,
    ) -> Result<(), ApiError> {
        let body = company_multipart(form, logo)?;
        let req = self
            .secured(
                self.http
                    .put(self.url(&format!("/api/v1/companies/{company_id}/update/")))
                    .multipart(body),
            )
            .await;
        ensure_success(req.send().await?).await?;
        Ok(())
    }

    /// Saves the company admin's EVP edits as plain JSON.
    #[instrument(skip(self, form))]
    pub async fn update_evp(&self, company_id: &Id, form: &CompanyForm) -> Result<(), ApiError> {
        let req = self
            .secured(
                self.http
                    .put(self.url(&format!("/api/v1/companies/{company_id}/update/")))
                    .json(form),
            )
            .await;
        ensure_success(req.send().await?).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_company(&self, company_id: &Id) -> Result<(), ApiError> {
        let req = self
            .secured(
                self.http
                    .delete(self.url(&format!("/api/v1/companies/{company_id}/"))),
            )
            .await;
        ensure_success(req.send().await?).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn assessment_questions(
        &self,
        company_id: &Id,
    ) -> Result<Vec<AssessmentQuestion>, ApiError> {
        let req = self
            .secured(self.http.get(
                self.url(&format!("/api/v1/assessments/question/{company_id}/")),
            ))
            .await;
        let set: QuestionSet = read_json(req.send().await?).await?;
        Ok(set.questions)
    }

    #[instrument(
        skip(self, submission),
        fields(company = %submission.company, answers = submission.answers.len())
    )]
    pub async fn submit_assessment(
        &self,
        submission: &AssessmentSubmission,
    ) -> Result<serde_json::Value, ApiError> {
        let req = self
            .secured(
                self.http
                    .post(self.url("/api/v1/assessments/submit/"))
                    .json(submission),
            )
            .await;
        read_json(req.send().await?).await
    }

    #[instrument(skip(self))]
    pub async fn assessment_overview(
        &self,
        company_id: &Id,
    ) -> Result<CompanyAssessmentOverview, ApiError> {
        let req = self
            .secured(self.http.get(
                self.url(&format!("/api/v1/assessments/overview/{company_id}/")),
            ))
            .await;
        read_json(req.send().await?).await
    }

    /// Completed questionnaires for the signed-in company admin's company.
    #[instrument(skip(self))]
    pub async fn candidate_sessions(&self) -> Result<Vec<CandidateSession>, ApiError> {
        let req = self
            .secured(
                self.http
                    .get(self.url("/api/v1/assessments/company/candidate-sessions/")),
            )
            .await;
        read_json(req.send().await?).await
    }

    #[instrument(skip(self))]
    pub async fn session_details(&self, session_id: &Id) -> Result<SessionDetails, ApiError> {
        let req = self
            .secured(self.http.get(
                self.url(&format!("/api/v1/assessments/session-details/{session_id}/")),
            ))
            .await;
        read_json(req.send().await?).await
    }

    #[instrument(skip(self))]
    pub async fn platform_overview(&self) -> Result<PlatformOverview, ApiError> {
        let req = self
            .secured(self.http.get(self.url("/api/v1/admin/overview/")))
            .await;
        read_json(req.send().await?).await
    }

    #[instrument(skip(self))]
    pub async fn users(&self) -> Result<Vec<AdminUser>, ApiError> {
        let req = self
            .secured(self.http.get(self.url("/api/v1/admin/users/")))
            .await;
        read_json(req.send().await?).await
    }

    /// The form is checked with [`AdminUserForm::prepare`] before sending.
    #[instrument(skip(self, form), fields(username = %form.username))]
    pub async fn create_user(&self, form: AdminUserForm) -> Result<(), ApiError> {
        let payload = form.prepare(true)?;
        let req = self
            .secured(self.http.post(self.url("/api/v1/admin/users/")).json(&payload))
            .await;
        ensure_success(req.send().await?).await?;
        Ok(())
    }

    #[instrument(skip(self, form), fields(username = %form.username))]
    pub async fn update_user(&self, user_id: &Id, form: AdminUserForm) -> Result<(), ApiError> {
        let payload = form.prepare(false)?;
        let req = self
            .secured(
                self.http
                    .put(self.url(&format!("/api/v1/admin/users/{user_id}/")))
                    .json(&payload),
            )
            .await;
        ensure_success(req.send().await?).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: &Id) -> Result<(), ApiError> {
        let req = self
            .secured(
                self.http
                    .delete(self.url(&format!("/api/v1/admin/users/{user_id}/"))),
            )
            .await;
        ensure_success(req.send().await?).await?;
        Ok(())
    }
}

/// List fields travel as JSON strings inside the form.
fn company_multipart(form: &CompanyForm, logo: Option<LogoUpload>) -> Result<Form, ApiError> {
    let mut body = Form::new()
        .text("name", form.name.clone())
        .text("career_url", form.career_url.clone())
        .text("mission_statement", form.mission_statement.clone())
        .text("core_values", serde_json::to_string(&form.core_values)?)
        .text("culture_keywords", serde_json::to_string(&form.culture_keywords)?);
    if let Some(logo) = logo {
        body = body.part("logo", Part::bytes(logo.bytes).file_name(logo.file_name));
    }
    Ok(body)
}

#[async_trait]
impl TokenRefresher for ApiClient {
    async fn refresh_access(&self, refresh_token: &str) -> Result<String, ApiError> {
        self.refresh(refresh_token).await
    }
}

async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T, ApiError> {
    let res = ensure_success(res).await?;
    let bytes = res.bytes().await?;
    let value = serde_json::from_slice(&bytes)?;
    Ok(value)
}

async fn ensure_success(res: Response) -> Result<Response, ApiError> {
    if res.status().is_success() {
        Ok(res)
    } else {
        Err(status_error(res).await)
    }
}

async fn status_error(res: Response) -> ApiError {
    let status = res.status().as_u16();
    let body = res.text().await.unwrap_or_default();
    let message = error_message(body);
    debug!(status, %message, "api call rejected");
    ApiError::Status { status, message }
}

/// `{"detail": ...}` when present, otherwise the first field of a validation
/// error body such as `{"email": ["already taken"]}`, otherwise the raw text.
fn error_message(body: String) -> String {
    if let Ok(e) = serde_json::from_str::<ErrorBody>(&body) {
        return e.detail;
    }
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(&body) {
        let first = fields.iter().find_map(|(field, value)| {
            let text = match value {
                Value::Array(items) => items.first().and_then(Value::as_str),
                Value::String(s) => Some(s.as_str()),
                _ => None,
            }?;
            Some(format!("{field}: {text}"))
        });
        if let Some(message) = first {
            return message;
        }
    }
    body
}

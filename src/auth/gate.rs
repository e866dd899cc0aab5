//! Authorization gate run before a protected screen renders.
//!
//! Each navigation re-derives the session from the stored token pair: the
//! access token is decoded, refreshed once if it has expired, and its role
//! flags are matched against the screen's requirement. Every failure along
//! the way collapses into a redirect to the login screen.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::jwt::decode_access;
use super::roles::{Requirement, Role, RolePolicy};
use crate::api::ApiError;
use crate::routes::{route_access, Access, LOGIN_PATH};
use crate::storage::{clear_pair, TokenStore, ACCESS_TOKEN, REFRESH_TOKEN};

/// Exchanges a refresh token for a fresh access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh_access(&self, refresh_token: &str) -> Result<String, ApiError>;
}

pub trait Clock: Send + Sync {
    /// Current time as unix seconds.
    fn now(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }
}

pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RedirectToLogin {
        return_path: String,
    },
    RedirectToRoleHome {
        role: Role,
        notice: Option<&'static str>,
    },
}

impl Decision {
    /// Where the caller should navigate, `None` when the screen may render.
    pub fn location(&self) -> Option<&'static str> {
        match self {
            Decision::Allow => None,
            Decision::RedirectToLogin { .. } => Some(LOGIN_PATH),
            Decision::RedirectToRoleHome { role, .. } => Some(role.home_path()),
        }
    }
}

/// Outcome of one credential check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GateState {
    #[default]
    Unchecked,
    Authorized(Role),
    Unauthorized,
}

impl GateState {
    /// `None` until the check has run.
    pub fn authorized(&self) -> Option<bool> {
        match self {
            GateState::Unchecked => None,
            GateState::Authorized(_) => Some(true),
            GateState::Unauthorized => Some(false),
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            GateState::Authorized(role) => Some(*role),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Gate {
    store: Arc<dyn TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    policy: RolePolicy,
    refresh_timeout: Duration,
}

impl Gate {
    pub fn new(
        store: Arc<dyn TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        policy: RolePolicy,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            store,
            refresher,
            clock: Arc::new(SystemClock),
            policy,
            refresh_timeout,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &RolePolicy {
        &self.policy
    }

    pub async fn evaluate(&self, requirement: Requirement, return_path: &str) -> Decision {
        let never = CancellationToken::new();
        match self.evaluate_until(requirement, return_path, &never).await {
            Some(decision) => decision,
            None => login_redirect(return_path),
        }
    }

    /// Like [`Gate::evaluate`], but gives up once `cancel` fires. A refresh
    /// that resolves after cancellation is dropped unapplied and `None` is
    /// returned.
    pub async fn evaluate_until(
        &self,
        requirement: Requirement,
        return_path: &str,
        cancel: &CancellationToken,
    ) -> Option<Decision> {
        let state = self.check(cancel).await?;
        Some(decide(state, requirement, return_path))
    }

    /// Resolves the requirement from the route table. Public screens are
    /// allowed without looking at the stored credentials.
    pub async fn evaluate_path(&self, path: &str) -> Decision {
        match route_access(path) {
            Access::Public => Decision::Allow,
            Access::Protected(requirement) => self.evaluate(requirement, path).await,
        }
    }

    #[instrument(skip_all)]
    pub async fn check(&self, cancel: &CancellationToken) -> Option<GateState> {
        let access = match self.store.get(ACCESS_TOKEN).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("no access token stored");
                return Some(GateState::Unauthorized);
            }
            Err(e) => {
                warn!(error = %e, "token store unreadable");
                return Some(GateState::Unauthorized);
            }
        };

        let claims = match decode_access(&access) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, "stored access token undecodable; clearing session");
                self.clear_all().await;
                return Some(GateState::Unauthorized);
            }
        };

        let now = self.clock.now();
        if !claims.is_expired_at(now) {
            let role = self.policy.role_for(&claims);
            debug!(%role, exp = claims.exp, "access token valid");
            return Some(GateState::Authorized(role));
        }

        let refresh = match self.store.get(REFRESH_TOKEN).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(exp = claims.exp, now, "access token expired and no refresh token");
                self.clear_access().await;
                return Some(GateState::Unauthorized);
            }
            Err(e) => {
                warn!(error = %e, "token store unreadable");
                self.clear_access().await;
                return Some(GateState::Unauthorized);
            }
        };

        debug!(exp = claims.exp, now, "access token expired; refreshing");
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("navigation cancelled; discarding refresh");
                return None;
            }
            res = tokio::time::timeout(
                self.refresh_timeout,
                self.refresher.refresh_access(&refresh),
            ) => res,
        };

        let fresh = match outcome {
            Ok(Ok(token)) => token,
            Ok(Err(e)) => {
                warn!(error = %e, status = ?e.status(), "token refresh failed");
                self.clear_all().await;
                return Some(GateState::Unauthorized);
            }
            Err(_) => {
                warn!(timeout = ?self.refresh_timeout, "token refresh timed out");
                self.clear_all().await;
                return Some(GateState::Unauthorized);
            }
        };

        let claims = match decode_access(&fresh) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, "refreshed access token undecodable");
                self.clear_all().await;
                return Some(GateState::Unauthorized);
            }
        };
        // bearer calls read the token back from the store
        if let Err(e) = self.store.set(ACCESS_TOKEN, &fresh).await {
            warn!(error = %e, "could not persist refreshed access token");
            self.clear_all().await;
            return Some(GateState::Unauthorized);
        }

        let role = self.policy.role_for(&claims);
        info!(%role, exp = claims.exp, "access token refreshed");
        Some(GateState::Authorized(role))
    }

    async fn clear_all(&self) {
        if let Err(e) = clear_pair(self.store.as_ref()).await {
            warn!(error = %e, "failed to clear stored tokens");
        }
    }

    async fn clear_access(&self) {
        if let Err(e) = self.store.remove(ACCESS_TOKEN).await {
            warn!(error = %e, "failed to clear access token");
        }
    }
}

fn login_redirect(return_path: &str) -> Decision {
    Decision::RedirectToLogin {
        return_path: return_path.to_string(),
    }
}

fn decide(state: GateState, requirement: Requirement, return_path: &str) -> Decision {
    match state {
        GateState::Authorized(role) if requirement.is_satisfied_by(role) => Decision::Allow,
        GateState::Authorized(role) => {
            debug!(%role, ?requirement, "role does not satisfy requirement");
            Decision::RedirectToRoleHome {
                role,
                notice: requirement.denial_notice(),
            }
        }
        GateState::Unchecked | GateState::Unauthorized => login_redirect(return_path),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::auth::claims::{Claims, TokenKind};
    use crate::auth::jwt::mint;
    use crate::storage::MemoryTokenStore;

    const NOW: i64 = 1_700_000_000;

    enum Reply {
        Token(String),
        Reject(u16),
        Hang,
    }

    struct FakeRefresher {
        reply: Reply,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl FakeRefresher {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh_access(&self, refresh_token: &str) -> Result<String, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(refresh_token.to_string());
            match &self.reply {
                Reply::Token(t) => Ok(t.clone()),
                Reply::Reject(status) => Err(ApiError::Status {
                    status: *status,
                    message: "Token is invalid or expired".into(),
                }),
                Reply::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    /// Memory store whose reads or writes can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryTokenStore,
        fail_get: Option<&'static str>,
        fail_set: bool,
    }

    #[async_trait]
    impl TokenStore for FlakyStore {
        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            if self.fail_get == Some(key) {
                anyhow::bail!("disk unreadable");
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            if self.fail_set {
                anyhow::bail!("disk full");
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.inner.remove(key).await
        }
    }

    async fn flaky_gate(
        access: &str,
        store: FlakyStore,
        reply: Reply,
    ) -> (Gate, Arc<FlakyStore>, Arc<FakeRefresher>) {
        store.inner.set(ACCESS_TOKEN, access).await.unwrap();
        store.inner.set(REFRESH_TOKEN, "r").await.unwrap();
        let store = Arc::new(store);
        let refresher = FakeRefresher::new(reply);
        let gate = Gate::new(
            store.clone(),
            refresher.clone(),
            RolePolicy::default(),
            Duration::from_secs(5),
        )
        .with_clock(Arc::new(FixedClock(NOW)));
        (gate, store, refresher)
    }

    fn token(exp: i64, candidate: bool, company_admin: bool) -> String {
        let claims = Claims {
            exp,
            kind: Some(TokenKind::Access),
            is_candidate: candidate,
            is_company_admin: company_admin,
            is_fitwork_admin: false,
        };
        mint(&claims, b"backend-secret").expect("mint")
    }

    async fn setup(
        access: Option<&str>,
        refresh: Option<&str>,
        reply: Reply,
    ) -> (Gate, Arc<MemoryTokenStore>, Arc<FakeRefresher>) {
        let store = Arc::new(MemoryTokenStore::new());
        if let Some(a) = access {
            store.set(ACCESS_TOKEN, a).await.unwrap();
        }
        if let Some(r) = refresh {
            store.set(REFRESH_TOKEN, r).await.unwrap();
        }
        let refresher = FakeRefresher::new(reply);
        let gate = Gate::new(
            store.clone(),
            refresher.clone(),
            RolePolicy::default(),
            Duration::from_secs(5),
        )
        .with_clock(Arc::new(FixedClock(NOW)));
        (gate, store, refresher)
    }

    fn to_login(path: &str) -> Decision {
        Decision::RedirectToLogin {
            return_path: path.into(),
        }
    }

    #[tokio::test]
    async fn no_token_redirects_to_login_for_every_requirement() {
        let (gate, _, refresher) = setup(None, Some("r"), Reply::Reject(401)).await;
        for req in [
            Requirement::Any,
            Requirement::Candidate,
            Requirement::CompanyAdmin,
            Requirement::FitworkAdmin,
        ] {
            assert_eq!(
                gate.evaluate(req, "/app/u/chat").await,
                to_login("/app/u/chat")
            );
        }
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn undecodable_token_clears_storage() {
        let (gate, store, _) = setup(Some("garbage"), Some("r"), Reply::Reject(401)).await;
        let decision = gate.evaluate(Requirement::Any, "/app/u/dashboard").await;
        assert_eq!(decision, to_login("/app/u/dashboard"));
        assert_eq!(store.get(ACCESS_TOKEN).await.unwrap(), None);
        assert_eq!(store.get(REFRESH_TOKEN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn company_admin_reaches_company_screen() {
        let t = token(NOW + 60, false, true);
        let (gate, _, _) = setup(Some(&t), None, Reply::Reject(401)).await;
        let decision = gate
            .evaluate(Requirement::CompanyAdmin, "/app/c/dashboard")
            .await;
        assert_eq!(decision, Decision::Allow);
    }

    #[tokio::test]
    async fn candidate_is_sent_home_from_company_screen() {
        let t = token(NOW + 60, true, false);
        let (gate, _, _) = setup(Some(&t), None, Reply::Reject(401)).await;
        let decision = gate.evaluate(Requirement::CompanyAdmin, "/app/c/evp").await;
        assert_eq!(
            decision,
            Decision::RedirectToRoleHome {
                role: Role::Candidate,
                notice: Requirement::CompanyAdmin.denial_notice(),
            }
        );
        assert_eq!(decision.location(), Some("/app/u/dashboard"));
    }

    #[tokio::test]
    async fn token_without_role_flags_is_sent_to_landing() {
        let t = token(NOW + 60, false, false);
        let (gate, _, _) = setup(Some(&t), None, Reply::Reject(401)).await;

        assert_eq!(
            gate.evaluate(Requirement::Any, "/app").await,
            Decision::Allow
        );

        let decision = gate.evaluate(Requirement::Candidate, "/app/u/chat").await;
        assert_eq!(
            decision,
            Decision::RedirectToRoleHome {
                role: Role::None,
                notice: Requirement::Candidate.denial_notice(),
            }
        );
        assert_eq!(decision.location(), Some("/"));
    }

    #[tokio::test]
    async fn unreadable_access_slot_redirects_without_clearing() {
        let t = token(NOW + 60, true, false);
        let store = FlakyStore {
            fail_get: Some(ACCESS_TOKEN),
            ..FlakyStore::default()
        };
        let (gate, store, refresher) = flaky_gate(&t, store, Reply::Reject(401)).await;

        assert_eq!(
            gate.evaluate(Requirement::Candidate, "/app/u/chat").await,
            to_login("/app/u/chat")
        );
        assert_eq!(refresher.calls(), 0);
        assert_eq!(store.inner.get(ACCESS_TOKEN).await.unwrap(), Some(t));
        assert_eq!(
            store.inner.get(REFRESH_TOKEN).await.unwrap().as_deref(),
            Some("r")
        );
    }

    #[tokio::test]
    async fn unreadable_refresh_slot_clears_expired_access() {
        let old = token(NOW - 10, true, false);
        let store = FlakyStore {
            fail_get: Some(REFRESH_TOKEN),
            ..FlakyStore::default()
        };
        let (gate, store, refresher) = flaky_gate(&old, store, Reply::Reject(401)).await;

        assert_eq!(
            gate.evaluate(Requirement::Candidate, "/app/u/chat").await,
            to_login("/app/u/chat")
        );
        assert_eq!(refresher.calls(), 0);
        assert_eq!(store.inner.get(ACCESS_TOKEN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn refreshed_token_that_cannot_be_saved_ends_the_session() {
        let old = token(NOW - 10, true, false);
        let new = token(NOW + 3600, true, false);
        let store = FlakyStore {
            fail_set: true,
            ..FlakyStore::default()
        };
        let (gate, store, refresher) = flaky_gate(&old, store, Reply::Token(new)).await;

        assert_eq!(
            gate.evaluate(Requirement::Candidate, "/app/u/chat").await,
            to_login("/app/u/chat")
        );
        assert_eq!(refresher.calls(), 1);
        assert_eq!(store.inner.get(ACCESS_TOKEN).await.unwrap(), None);
        assert_eq!(store.inner.get(REFRESH_TOKEN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn token_expiring_exactly_now_is_still_valid() {
        let t = token(NOW, true, false);
        let (gate, _, refresher) = setup(Some(&t), Some("r"), Reply::Reject(401)).await;
        assert_eq!(
            gate.evaluate(Requirement::Candidate, "/app/u/chat").await,
            Decision::Allow
        );
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_stored() {
        let old = token(NOW - 10, true, false);
        let new = token(NOW + 3600, true, false);
        let (gate, store, refresher) =
            setup(Some(&old), Some("refresh-1"), Reply::Token(new.clone())).await;

        let decision = gate.evaluate(Requirement::Candidate, "/app/u/compare").await;
        assert_eq!(decision, Decision::Allow);
        assert_eq!(refresher.calls(), 1);
        assert_eq!(refresher.seen.lock().unwrap().as_slice(), ["refresh-1"]);
        assert_eq!(store.get(ACCESS_TOKEN).await.unwrap(), Some(new));
        assert_eq!(
            store.get(REFRESH_TOKEN).await.unwrap().as_deref(),
            Some("refresh-1")
        );
    }

    #[tokio::test]
    async fn refreshed_role_is_rederived_before_matching() {
        let old = token(NOW - 10, false, true);
        let new = token(NOW + 3600, false, true);
        let (gate, _, _) = setup(Some(&old), Some("r"), Reply::Token(new)).await;

        let decision = gate.evaluate(Requirement::Candidate, "/app/u/dashboard").await;
        assert_eq!(
            decision,
            Decision::RedirectToRoleHome {
                role: Role::CompanyAdmin,
                notice: Requirement::Candidate.denial_notice(),
            }
        );
    }

    #[tokio::test]
    async fn rejected_refresh_clears_both_tokens() {
        let old = token(NOW - 10, true, false);
        let (gate, store, refresher) = setup(Some(&old), Some("r"), Reply::Reject(401)).await;

        let decision = gate.evaluate(Requirement::Candidate, "/app/u/chat").await;
        assert_eq!(decision, to_login("/app/u/chat"));
        assert_eq!(refresher.calls(), 1);
        assert_eq!(store.get(ACCESS_TOKEN).await.unwrap(), None);
        assert_eq!(store.get(REFRESH_TOKEN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn refresh_returning_garbage_clears_both_tokens() {
        let old = token(NOW - 10, true, false);
        let (gate, store, _) =
            setup(Some(&old), Some("r"), Reply::Token("nope".into())).await;

        assert_eq!(
            gate.evaluate(Requirement::Any, "/app").await,
            to_login("/app")
        );
        assert_eq!(store.get(ACCESS_TOKEN).await.unwrap(), None);
        assert_eq!(store.get(REFRESH_TOKEN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_without_refresh_token_clears_access_only() {
        let old = token(NOW - 10, true, false);
        let (gate, store, refresher) = setup(Some(&old), None, Reply::Reject(401)).await;

        assert_eq!(
            gate.evaluate(Requirement::Candidate, "/app/u/chat").await,
            to_login("/app/u/chat")
        );
        assert_eq!(refresher.calls(), 0);
        assert_eq!(store.get(ACCESS_TOKEN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn repeated_evaluation_is_stable_and_offline() {
        let t = token(NOW + 600, true, false);
        let (gate, _, refresher) = setup(Some(&t), Some("r"), Reply::Reject(500)).await;

        let first = gate.evaluate(Requirement::CompanyAdmin, "/app/c/dashboard").await;
        let second = gate.evaluate(Requirement::CompanyAdmin, "/app/c/dashboard").await;
        assert_eq!(first, second);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn both_flags_resolve_through_policy() {
        let t = token(NOW + 600, true, true);
        let (gate, _, _) = setup(Some(&t), None, Reply::Reject(401)).await;
        assert_eq!(
            gate.evaluate(Requirement::CompanyAdmin, "/app/c/dashboard").await,
            Decision::Allow
        );

        let store = Arc::new(MemoryTokenStore::new());
        store.set(ACCESS_TOKEN, &t).await.unwrap();
        let candidate_first = Gate::new(
            store,
            FakeRefresher::new(Reply::Reject(401)),
            RolePolicy::new(vec![Role::Candidate, Role::CompanyAdmin]).unwrap(),
            Duration::from_secs(5),
        )
        .with_clock(Arc::new(FixedClock(NOW)));
        assert_eq!(
            candidate_first
                .evaluate(Requirement::CompanyAdmin, "/app/c/dashboard")
                .await,
            Decision::RedirectToRoleHome {
                role: Role::Candidate,
                notice: Requirement::CompanyAdmin.denial_notice(),
            }
        );
    }

    #[tokio::test]
    async fn cancelled_refresh_leaves_storage_untouched() {
        let old = token(NOW - 10, true, false);
        let (gate, store, refresher) = setup(Some(&old), Some("r"), Reply::Hang).await;
        let cancel = CancellationToken::new();

        let pending = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                gate.evaluate_until(Requirement::Candidate, "/app/u/chat", &cancel)
                    .await
            })
        };
        while refresher.calls() == 0 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        assert_eq!(pending.await.unwrap(), None);
        assert_eq!(store.get(ACCESS_TOKEN).await.unwrap(), Some(old));
        assert_eq!(store.get(REFRESH_TOKEN).await.unwrap().as_deref(), Some("r"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_refresh_times_out_to_login() {
        let old = token(NOW - 10, true, false);
        let (gate, store, _) = setup(Some(&old), Some("r"), Reply::Hang).await;

        let decision = gate.evaluate(Requirement::Candidate, "/app/u/chat").await;
        assert_eq!(decision, to_login("/app/u/chat"));
        assert_eq!(store.get(REFRESH_TOKEN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn public_paths_skip_the_store() {
        let (gate, _, refresher) = setup(Some("garbage"), None, Reply::Reject(401)).await;
        assert_eq!(gate.evaluate_path("/about").await, Decision::Allow);
        assert_eq!(refresher.calls(), 0);
        assert_eq!(gate.evaluate_path("/app/a/users").await, to_login("/app/a/users"));
    }

    #[test]
    fn gate_state_is_tri_state() {
        assert_eq!(GateState::default().authorized(), None);
        assert_eq!(GateState::Unauthorized.authorized(), Some(false));
        assert_eq!(
            GateState::Authorized(Role::Candidate).role(),
            Some(Role::Candidate)
        );
        assert_eq!(
            decide(GateState::Unchecked, Requirement::Any, "/app"),
            to_login("/app")
        );
    }
}

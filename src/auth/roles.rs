use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::claims::Claims;

/// The role a visitor acts under, derived from the access token's flags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Candidate,
    CompanyAdmin,
    FitworkAdmin,
    None,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Candidate => "candidate",
            Role::CompanyAdmin => "company_admin",
            Role::FitworkAdmin => "fitwork_admin",
            Role::None => "none",
        }
    }

    /// Default screen for the role; visitors denied a page are sent here.
    pub fn home_path(&self) -> &'static str {
        match self {
            Role::Candidate => "/app/u/dashboard",
            Role::CompanyAdmin => "/app/c/dashboard",
            Role::FitworkAdmin => "/app/a/dashboard",
            Role::None => "/",
        }
    }

    fn flagged_in(&self, claims: &Claims) -> bool {
        match self {
            Role::Candidate => claims.is_candidate,
            Role::CompanyAdmin => claims.is_company_admin,
            Role::FitworkAdmin => claims.is_fitwork_admin,
            Role::None => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "candidate" => Ok(Role::Candidate),
            "company_admin" => Ok(Role::CompanyAdmin),
            "fitwork_admin" => Ok(Role::FitworkAdmin),
            other => anyhow::bail!("unknown role '{other}'"),
        }
    }
}

/// What a screen demands of the visitor before it renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requirement {
    Any,
    Candidate,
    CompanyAdmin,
    FitworkAdmin,
}

impl Requirement {
    pub fn is_satisfied_by(&self, role: Role) -> bool {
        match self {
            Requirement::Any => true,
            Requirement::Candidate => role == Role::Candidate,
            Requirement::CompanyAdmin => role == Role::CompanyAdmin,
            Requirement::FitworkAdmin => role == Role::FitworkAdmin,
        }
    }

    /// Message shown alongside a redirect when the role does not fit.
    pub fn denial_notice(&self) -> Option<&'static str> {
        match self {
            Requirement::Any => None,
            Requirement::Candidate => Some("Access denied: this page is for candidates only."),
            Requirement::CompanyAdmin => {
                Some("Access denied: this page is for company administrators only.")
            }
            Requirement::FitworkAdmin => {
                Some("Access denied: this page is for administrators only.")
            }
        }
    }
}

/// Order in which role flags are consulted when a token carries several.
///
/// The first role in the list whose flag is set wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    precedence: Vec<Role>,
}

impl Default for RolePolicy {
    /// Company admin outranks candidate, platform admin comes last.
    fn default() -> Self {
        Self {
            precedence: vec![Role::CompanyAdmin, Role::Candidate, Role::FitworkAdmin],
        }
    }
}

impl RolePolicy {
    pub fn new(precedence: Vec<Role>) -> anyhow::Result<Self> {
        anyhow::ensure!(!precedence.is_empty(), "role precedence must not be empty");
        anyhow::ensure!(
            !precedence.contains(&Role::None),
            "'none' cannot appear in the role precedence"
        );
        for (i, role) in precedence.iter().enumerate() {
            anyhow::ensure!(
                !precedence[..i].contains(role),
                "role '{role}' listed twice in precedence"
            );
        }
        Ok(Self { precedence })
    }

    /// Parses a comma separated list such as `company_admin,candidate`.
    pub fn parse(list: &str) -> anyhow::Result<Self> {
        let roles = list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Role::from_str)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Self::new(roles)
    }

    pub fn precedence(&self) -> &[Role] {
        &self.precedence
    }

    pub fn role_for(&self, claims: &Claims) -> Role {
        self.precedence
            .iter()
            .copied()
            .find(|role| role.flagged_in(claims))
            .unwrap_or(Role::None)
    }
}

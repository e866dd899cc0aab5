//! Navigable surface of the FitWork client and the access each screen needs.

use crate::auth::roles::Requirement;

pub const LOGIN_PATH: &str = "/login";
pub const REGISTER_PATH: &str = "/register";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Protected(Requirement),
}

#[derive(Debug, Clone, Copy)]
pub struct Screen {
    pub path: &'static str,
    pub title: &'static str,
    pub access: Access,
}

const fn public(path: &'static str, title: &'static str) -> Screen {
    Screen {
        path,
        title,
        access: Access::Public,
    }
}

const fn gated(path: &'static str, title: &'static str, requirement: Requirement) -> Screen {
    Screen {
        path,
        title,
        access: Access::Protected(requirement),
    }
}

#[rustfmt::skip]
pub const SCREENS: &[Screen] = &[
    public("/", "Landing"),
    public(LOGIN_PATH, "Login"),
    public(REGISTER_PATH, "Register"),
    public("/about", "About"),
    gated("/app/u/dashboard", "Candidate dashboard", Requirement::Candidate),
    gated("/app/u/assessment", "Company directory", Requirement::Candidate),
    gated("/app/u/assessment/:company_id", "Culture-fit questionnaire", Requirement::Candidate),
    gated("/app/u/chat", "Career consultation", Requirement::Candidate),
    gated("/app/u/compare", "Company comparison", Requirement::Candidate),
    gated("/app/c/dashboard", "Company dashboard", Requirement::CompanyAdmin),
    gated("/app/c/evp", "Employer value proposition", Requirement::CompanyAdmin),
    gated("/app/c/assessment", "Assessment results", Requirement::CompanyAdmin),
    gated("/app/c/candidates", "Candidates", Requirement::CompanyAdmin),
    gated("/app/a/dashboard", "Admin dashboard", Requirement::FitworkAdmin),
    gated("/app/a/companies", "Company management", Requirement::FitworkAdmin),
    gated("/app/a/users", "User management", Requirement::FitworkAdmin),
];

/// Strips query string, fragment and trailing slashes.
pub fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

fn under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Everything below `/app` sits behind the gate; the second segment picks the
/// role the screen belongs to.
pub fn route_access(path: &str) -> Access {
    let path = normalize(path);
    if under(path, "/app/u") {
        Access::Protected(Requirement::Candidate)
    } else if under(path, "/app/c") {
        Access::Protected(Requirement::CompanyAdmin)
    } else if under(path, "/app/a") {
        Access::Protected(Requirement::FitworkAdmin)
    } else if under(path, "/app") {
        Access::Protected(Requirement::Any)
    } else {
        Access::Public
    }
}

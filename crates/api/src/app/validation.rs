//! Request input rules: names, emails, passwords and list filters.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use pktracker_auth::PasswordPolicy;
use pktracker_auth::user::normalize_email;
use pktracker_core::PageRequest;
use pktracker_infra::{InMemoryRoleRepository, SortField, SortOrder, StatusFilter, UserFilter};

use crate::app::errors::{ApiError, ValidationErrors};
use crate::config::ApiConfig;

const NAME_PATTERN: &str = r"^[a-zA-Z\s\-'\.]+$";
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";
const MAX_LEN: usize = 255;

static NAME_RE: OnceLock<Option<Regex>> = OnceLock::new();
static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn matches(cell: &'static OnceLock<Option<Regex>>, pattern: &str, value: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(value))
}

/// Trim and check a person's name; `None` when absent or invalid.
pub fn name(errs: &mut ValidationErrors, raw: Option<&str>, required: bool) -> Option<String> {
    let Some(raw) = raw else {
        if required {
            errs.add("name", "The name field is required.");
        }
        return None;
    };

    let value = raw.trim();
    if value.is_empty() {
        errs.add("name", "The name field is required.");
        return None;
    }
    if value.chars().count() > MAX_LEN {
        errs.add("name", "The name may not be greater than 255 characters.");
        return None;
    }
    if !matches(&NAME_RE, NAME_PATTERN, value) {
        errs.add(
            "name",
            "The name field may only contain letters, spaces, hyphens, apostrophes, and periods.",
        );
        return None;
    }
    Some(value.to_string())
}

/// Trim, lower-case and shape-check an email address. Uniqueness is
/// checked by the repository.
pub fn email(errs: &mut ValidationErrors, raw: Option<&str>, required: bool) -> Option<String> {
    let Some(raw) = raw else {
        if required {
            errs.add("email", "The email field is required.");
        }
        return None;
    };

    let value = normalize_email(raw);
    if value.is_empty() {
        errs.add("email", "The email field is required.");
        return None;
    }
    if value.chars().count() > MAX_LEN {
        errs.add("email", "The email may not be greater than 255 characters.");
        return None;
    }
    if !matches(&EMAIL_RE, EMAIL_PATTERN, &value) {
        errs.add("email", "Please provide a valid email address.");
        return None;
    }
    Some(value)
}

/// Check a new password and its confirmation against `policy`.
pub fn password(
    errs: &mut ValidationErrors,
    policy: &PasswordPolicy,
    raw: Option<&str>,
    confirmation: Option<&str>,
    required: bool,
) -> Option<String> {
    let Some(raw) = raw else {
        if required {
            errs.add("password", "The password field is required.");
        }
        return None;
    };

    let problems = policy.check(raw);
    let confirmed = confirmation == Some(raw);
    for problem in &problems {
        errs.add("password", problem.clone());
    }
    if !confirmed {
        errs.add("password", "Password confirmation does not match.");
    }

    (problems.is_empty() && confirmed).then(|| raw.to_string())
}

/// Every named role must exist; reports each unknown one by position.
pub fn role_names(errs: &mut ValidationErrors, roles: &InMemoryRoleRepository, names: &[String]) -> Result<(), ApiError> {
    for (i, name) in names.iter().enumerate() {
        if roles.find_by_name(name)?.is_none() {
            errs.add(format!("roles.{i}"), "One or more selected roles are invalid.");
        }
    }
    Ok(())
}

fn parse_date(errs: &mut ValidationErrors, field: &str, raw: &str) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(_) => {
            errs.add(field, format!("The {field} is not a valid date."));
            None
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Parse the user list query string into a filter and a page request.
pub fn user_filter(
    query: &HashMap<String, String>,
    roles: &InMemoryRoleRepository,
    api: &ApiConfig,
) -> Result<(UserFilter, PageRequest), ApiError> {
    let mut errs = ValidationErrors::new();
    let mut filter = UserFilter::default();

    let page = match query.get("page").map(|p| p.trim().parse::<u64>()) {
        None => 1,
        Some(Ok(p)) if p >= 1 => p,
        Some(_) => {
            errs.add("page", "The page must be at least 1.");
            1
        }
    };
    let per_page = match query.get("per_page").map(|p| p.trim().parse::<u64>()) {
        None => api.default_page_size,
        Some(Ok(n)) if (1..=api.max_page_size).contains(&n) => n,
        Some(_) => {
            errs.add(
                "per_page",
                format!("You can only retrieve up to {} users per page.", api.max_page_size),
            );
            api.default_page_size
        }
    };

    if let Some(search) = query.get("search") {
        let search = search.trim();
        if search.chars().count() > MAX_LEN {
            errs.add("search", "The search may not be greater than 255 characters.");
        } else if !search.is_empty() {
            filter.search = Some(search.to_string());
        }
    }

    if let Some(sort_by) = query.get("sort_by") {
        filter.sort_by = match sort_by.as_str() {
            "name" => SortField::Name,
            "email" => SortField::Email,
            "created_at" => SortField::CreatedAt,
            "updated_at" => SortField::UpdatedAt,
            "last_login_at" => SortField::LastLoginAt,
            _ => {
                errs.add(
                    "sort_by",
                    "You can only sort by: name, email, created_at, updated_at, or last_login_at.",
                );
                SortField::default()
            }
        };
    }

    if let Some(order) = query.get("sort_order") {
        filter.sort_order = match order.as_str() {
            "asc" => SortOrder::Asc,
            "desc" => SortOrder::Desc,
            _ => {
                errs.add("sort_order", "Sort order must be either asc or desc.");
                SortOrder::default()
            }
        };
    }

    if let Some(status) = query.get("status") {
        filter.status = match status.as_str() {
            "active" => StatusFilter::Active,
            "inactive" => StatusFilter::Inactive,
            "all" => StatusFilter::All,
            _ => {
                errs.add("status", "Status must be either active, inactive, or all.");
                StatusFilter::default()
            }
        };
    }

    if let Some(role) = query.get("role") {
        match roles.find_by_name(role.trim())? {
            Some(r) => filter.role = Some(r.id),
            None => errs.add("role", "The selected role does not exist."),
        }
    }

    if let Some(verified) = query.get("verified") {
        match parse_bool(verified) {
            Some(v) => filter.verified = Some(v),
            None => errs.add("verified", "The verified field must be true or false."),
        }
    }

    filter.created_from = query.get("date_from").and_then(|d| parse_date(&mut errs, "date_from", d));
    filter.created_to = query.get("date_to").and_then(|d| parse_date(&mut errs, "date_to", d));
    if let (Some(from), Some(to)) = (filter.created_from, filter.created_to) {
        if to < from {
            errs.add("date_to", "End date must be after or equal to start date.");
        }
    }

    errs.into_result()?;
    let page = PageRequest::new(page, per_page)?;
    Ok((filter, page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn names_are_trimmed_and_restricted() {
        let mut errs = ValidationErrors::new();
        assert_eq!(name(&mut errs, Some("  Mary-Jane O'Neil Jr. "), true).as_deref(), Some("Mary-Jane O'Neil Jr."));
        assert!(errs.is_empty());

        assert_eq!(name(&mut errs, Some("R2-D2"), true), None);
        assert!(errs.has("name"));

        let mut errs = ValidationErrors::new();
        assert_eq!(name(&mut errs, None, false), None);
        assert!(errs.is_empty());
    }

    #[test]
    fn emails_are_normalized() {
        let mut errs = ValidationErrors::new();
        assert_eq!(
            email(&mut errs, Some("  Ash@Pallet.Town "), true).as_deref(),
            Some("ash@pallet.town")
        );
        assert_eq!(email(&mut errs, Some("not-an-email"), true), None);
        assert!(errs.has("email"));
    }

    #[test]
    fn password_needs_confirmation() {
        let policy = PasswordPolicy::default();
        let mut errs = ValidationErrors::new();
        assert!(password(&mut errs, &policy, Some("Str0ng!Pass"), Some("Str0ng!Pass"), true).is_some());
        assert!(errs.is_empty());

        assert!(password(&mut errs, &policy, Some("Str0ng!Pass"), Some("different"), true).is_none());
        assert!(errs.has("password"));
    }

    #[test]
    fn filter_defaults_and_validation() {
        let roles = InMemoryRoleRepository::new();
        let api = AppConfig::default().api;

        let (filter, page) = user_filter(&query(&[]), &roles, &api).unwrap();
        assert_eq!(filter, UserFilter::default());
        assert_eq!((page.page(), page.per_page()), (1, 15));

        let (filter, page) = user_filter(
            &query(&[("per_page", "50"), ("sort_by", "email"), ("sort_order", "asc"), ("status", "active")]),
            &roles,
            &api,
        )
        .unwrap();
        assert_eq!(page.per_page(), 50);
        assert_eq!(filter.sort_by, SortField::Email);
        assert_eq!(filter.status, StatusFilter::Active);

        let err = user_filter(
            &query(&[("per_page", "500"), ("role", "ghost"), ("date_from", "2024-05-02"), ("date_to", "2024-05-01")]),
            &roles,
            &api,
        )
        .unwrap_err();
        match err {
            ApiError::Validation(errs) => {
                assert!(errs.has("per_page"));
                assert!(errs.has("role"));
                assert!(errs.has("date_to"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}

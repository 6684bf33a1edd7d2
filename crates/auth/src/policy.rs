//! Resource policies and named gates.
//!
//! Both are plain boolean checks over a resolved [`Principal`]; handlers turn
//! a `false` into a 403.

use core::str::FromStr;

use pktracker_core::UserId;

use crate::Principal;
use crate::permissions::{
    ACCESS_PREMIUM, CREATE_USERS, DELETE_USERS, EDIT_USERS, VIEW_ALL_TRACKING_DATA, VIEW_USERS,
};
use crate::roles::{ADMIN, PREMIUM};

/// Who may do what to a user account.
pub struct UserPolicy;

impl UserPolicy {
    pub fn view_any(actor: &Principal) -> bool {
        actor.has_permission(VIEW_USERS)
    }

    pub fn view(actor: &Principal, target: UserId) -> bool {
        actor.user_id == target || actor.has_permission(VIEW_USERS)
    }

    pub fn create(actor: &Principal) -> bool {
        actor.has_permission(CREATE_USERS)
    }

    pub fn update(actor: &Principal, target: UserId) -> bool {
        actor.user_id == target || actor.has_permission(EDIT_USERS)
    }

    /// Nobody deletes their own account through the API.
    pub fn delete(actor: &Principal, target: UserId) -> bool {
        actor.user_id != target && actor.has_permission(DELETE_USERS)
    }

    pub fn access_premium_features(actor: &Principal) -> bool {
        actor.has_any_role(&[PREMIUM, ADMIN]) || actor.has_permission(ACCESS_PREMIUM)
    }

    pub fn view_tracking_analytics(actor: &Principal, target: UserId) -> bool {
        actor.user_id == target || actor.has_permission(VIEW_ALL_TRACKING_DATA)
    }
}

/// Named authorization gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    ManageSystem,
    ManageOwnProfile,
    ViewTrackingData,
    ApiPremiumAccess,
}

impl Gate {
    pub fn name(self) -> &'static str {
        match self {
            Gate::ManageSystem => "manage-system",
            Gate::ManageOwnProfile => "manage-own-profile",
            Gate::ViewTrackingData => "view-tracking-data",
            Gate::ApiPremiumAccess => "api-premium-access",
        }
    }

    pub fn check(self, actor: &Principal, target: Option<UserId>) -> bool {
        match self {
            Gate::ManageSystem => actor.has_role(ADMIN),
            Gate::ManageOwnProfile => {
                target.is_some_and(|t| t == actor.user_id) || actor.has_role(ADMIN)
            }
            Gate::ViewTrackingData => match target {
                None => true,
                Some(t) => t == actor.user_id || actor.has_permission(VIEW_ALL_TRACKING_DATA),
            },
            Gate::ApiPremiumAccess => actor.has_any_role(&[PREMIUM, ADMIN]),
        }
    }

    /// Look up a gate by name and evaluate it. Unknown gates deny.
    pub fn allows(name: &str, actor: &Principal, target: Option<UserId>) -> bool {
        name.parse::<Gate>()
            .map(|gate| gate.check(actor, target))
            .unwrap_or(false)
    }
}

impl FromStr for Gate {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manage-system" => Ok(Gate::ManageSystem),
            "manage-own-profile" => Ok(Gate::ManageOwnProfile),
            "view-tracking-data" => Ok(Gate::ViewTrackingData),
            "api-premium-access" => Ok(Gate::ApiPremiumAccess),
            _ => Err(()),
        }
    }
}

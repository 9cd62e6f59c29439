use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// An enumerated metric kind tracked per scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KpiCategory {
    Views,
    Likes,
    Comments,
    Shares,
    Saves,
    QtyPost,
    VideoCount,
}

impl KpiCategory {
    pub const ALL: [KpiCategory; 7] = [
        KpiCategory::Views,
        KpiCategory::Likes,
        KpiCategory::Comments,
        KpiCategory::Shares,
        KpiCategory::Saves,
        KpiCategory::QtyPost,
        KpiCategory::VideoCount,
    ];

    /// Storage name, identical to the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            KpiCategory::Views => "VIEWS",
            KpiCategory::Likes => "LIKES",
            KpiCategory::Comments => "COMMENTS",
            KpiCategory::Shares => "SHARES",
            KpiCategory::Saves => "SAVES",
            KpiCategory::QtyPost => "QTY_POST",
            KpiCategory::VideoCount => "VIDEO_COUNT",
        }
    }
}

impl std::fmt::Display for KpiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KpiCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KpiCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::UnknownCategory(s.to_string()))
    }
}

/// The population a KPI is computed over: one account inside a campaign, or
/// the whole campaign when `account_id` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub campaign_id: i64,
    pub account_id: Option<i64>,
}

impl Scope {
    #[must_use]
    pub fn account(campaign_id: i64, account_id: i64) -> Self {
        Self {
            campaign_id,
            account_id: Some(account_id),
        }
    }

    #[must_use]
    pub fn campaign(campaign_id: i64) -> Self {
        Self {
            campaign_id,
            account_id: None,
        }
    }

    #[must_use]
    pub fn is_campaign_wide(&self) -> bool {
        self.account_id.is_none()
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.account_id {
            Some(account_id) => write!(f, "campaign {}/account {account_id}", self.campaign_id),
            None => write!(f, "campaign {}/all accounts", self.campaign_id),
        }
    }
}

/// A target vs. actual record for one category within one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kpi {
    pub id: i64,
    pub campaign_id: i64,
    pub account_id: Option<i64>,
    pub category: KpiCategory,
    /// User-owned; the engine never changes it on an existing row.
    pub target: i64,
    /// Engine-owned; a pure function of the posts in scope.
    pub actual: i64,
    pub updated_at: DateTime<Utc>,
}

impl Kpi {
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope {
            campaign_id: self.campaign_id,
            account_id: self.account_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Linked,
    Unlinked,
}

impl LinkStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LinkStatus::Linked => "linked",
            LinkStatus::Unlinked => "unlinked",
        }
    }
}

impl FromStr for LinkStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linked" => Ok(LinkStatus::Linked),
            "unlinked" => Ok(LinkStatus::Unlinked),
            other => Err(CoreError::InvalidLinkStatus(other.to_string())),
        }
    }
}

/// Campaign ↔ account membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub campaign_id: i64,
    pub account_id: i64,
}

impl Link {
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope::account(self.campaign_id, self.account_id)
    }
}

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Completed,
    Archived,
}

impl CampaignStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Active => "active",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Archived => "archived",
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "active" => Ok(CampaignStatus::Active),
            "completed" => Ok(CampaignStatus::Completed),
            "archived" => Ok(CampaignStatus::Archived),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    /// Free-form content categories the campaign targets (e.g. `"beauty"`).
    pub categories: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: CampaignStatus,
    pub goal: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Returns `true` when `date` falls inside the campaign's inclusive date range.
    #[must_use]
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

/// Returns `true` when the range is non-empty (`end >= start`).
#[must_use]
pub fn is_valid_date_range(start: NaiveDate, end: NaiveDate) -> bool {
    end >= start
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub account_type: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            CampaignStatus::Draft,
            CampaignStatus::Active,
            CampaignStatus::Completed,
            CampaignStatus::Archived,
        ] {
            assert_eq!(status.as_str().parse::<CampaignStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            "paused".parse::<CampaignStatus>(),
            Err(CoreError::InvalidStatus(ref s)) if s == "paused"
        ));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&CampaignStatus::Active).unwrap();
        assert_eq!(json, "\"active\"");
    }

    #[test]
    fn date_range_validation() {
        assert!(is_valid_date_range(date(2026, 1, 1), date(2026, 1, 1)));
        assert!(is_valid_date_range(date(2026, 1, 1), date(2026, 2, 1)));
        assert!(!is_valid_date_range(date(2026, 2, 1), date(2026, 1, 1)));
    }

    #[test]
    fn covers_is_inclusive() {
        let campaign = Campaign {
            id: 1,
            name: "Spring Launch".to_string(),
            categories: vec!["beauty".to_string()],
            start_date: date(2026, 3, 1),
            end_date: date(2026, 3, 31),
            status: CampaignStatus::Active,
            goal: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(campaign.covers(date(2026, 3, 1)));
        assert!(campaign.covers(date(2026, 3, 31)));
        assert!(!campaign.covers(date(2026, 4, 1)));
    }
}

//! Maps CRUD mutations to engine calls.
//!
//! [`plan`] is pure so the lifecycle rules can be tested without a store;
//! [`Dispatcher`] runs a plan and never fails the parent mutation.

use camdb_core::{Post, PostCounter};

use crate::engine::KpiEngine;
use crate::error::EngineError;

/// A committed mutation the KPI rows may depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEvent {
    /// `linked_now` is `true` when creating the post also linked a
    /// previously unlinked (campaign, account) pair.
    PostCreated { post: Post, linked_now: bool },
    PostUpdated {
        before: Post,
        after: Post,
        linked_now: bool,
    },
    PostDeleted { post: Post },
    /// Only sent when the pair actually transitioned to linked.
    LinkCreated { campaign_id: i64, account_id: i64 },
    /// Only sent when the pair actually transitioned to unlinked.
    LinkDeleted { campaign_id: i64, account_id: i64 },
    /// Membership list of a campaign before and after an update.
    MembershipUpdated {
        campaign_id: i64,
        before: Vec<i64>,
        after: Vec<i64>,
    },
}

/// One engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    LinkScope { campaign_id: i64, account_id: i64 },
    Recalc { campaign_id: i64, account_id: i64 },
    RecalcCampaign { campaign_id: i64 },
}

/// Ordered, duplicate-free engine calls required by `event`.
#[must_use]
pub fn plan(event: &MutationEvent) -> Vec<Trigger> {
    let mut triggers = Vec::new();
    match event {
        MutationEvent::PostCreated { post, linked_now } => {
            triggers.push(account_trigger(post, *linked_now));
            triggers.push(Trigger::RecalcCampaign {
                campaign_id: post.campaign_id,
            });
        }
        MutationEvent::PostUpdated {
            before,
            after,
            linked_now,
        } => {
            if !affects_kpis(before, after) {
                return triggers;
            }
            triggers.push(Trigger::Recalc {
                campaign_id: before.campaign_id,
                account_id: before.account_id,
            });
            triggers.push(account_trigger(after, *linked_now));
            triggers.push(Trigger::RecalcCampaign {
                campaign_id: before.campaign_id,
            });
            triggers.push(Trigger::RecalcCampaign {
                campaign_id: after.campaign_id,
            });
        }
        MutationEvent::PostDeleted { post } => {
            triggers.push(Trigger::Recalc {
                campaign_id: post.campaign_id,
                account_id: post.account_id,
            });
            triggers.push(Trigger::RecalcCampaign {
                campaign_id: post.campaign_id,
            });
        }
        MutationEvent::LinkCreated {
            campaign_id,
            account_id,
        } => triggers.push(Trigger::LinkScope {
            campaign_id: *campaign_id,
            account_id: *account_id,
        }),
        MutationEvent::LinkDeleted {
            campaign_id,
            account_id,
        } => triggers.push(Trigger::Recalc {
            campaign_id: *campaign_id,
            account_id: *account_id,
        }),
        MutationEvent::MembershipUpdated {
            campaign_id,
            before,
            after,
        } => {
            for account_id in after.iter().filter(|a| !before.contains(a)) {
                triggers.push(Trigger::LinkScope {
                    campaign_id: *campaign_id,
                    account_id: *account_id,
                });
            }
            for account_id in before.iter().filter(|a| !after.contains(a)) {
                triggers.push(Trigger::Recalc {
                    campaign_id: *campaign_id,
                    account_id: *account_id,
                });
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    triggers.retain(|t| seen.insert(*t));
    triggers
}

fn account_trigger(post: &Post, linked_now: bool) -> Trigger {
    if linked_now {
        Trigger::LinkScope {
            campaign_id: post.campaign_id,
            account_id: post.account_id,
        }
    } else {
        Trigger::Recalc {
            campaign_id: post.campaign_id,
            account_id: post.account_id,
        }
    }
}

/// Whether an update can change any aggregate. Content type only matters
/// through its video classification.
fn affects_kpis(before: &Post, after: &Post) -> bool {
    before.campaign_id != after.campaign_id
        || before.account_id != after.account_id
        || before.is_video() != after.is_video()
        || PostCounter::ALL
            .iter()
            .any(|&c| before.counter(c) != after.counter(c))
}

/// Outcome of dispatching one event.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub executed: Vec<Trigger>,
    pub failures: Vec<(Trigger, EngineError)>,
}

impl DispatchReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs [`plan`] against an engine.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    engine: KpiEngine,
}

impl Dispatcher {
    #[must_use]
    pub fn new(engine: KpiEngine) -> Self {
        Self { engine }
    }

    #[must_use]
    pub fn engine(&self) -> &KpiEngine {
        &self.engine
    }

    /// Executes every planned trigger in order. A failed trigger is logged
    /// and recorded; the remaining triggers still run.
    pub async fn dispatch(&self, event: &MutationEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        for trigger in plan(event) {
            let result = match trigger {
                Trigger::LinkScope {
                    campaign_id,
                    account_id,
                } => self.engine.link_scope(campaign_id, account_id).await,
                Trigger::Recalc {
                    campaign_id,
                    account_id,
                } => self.engine.recalc(campaign_id, account_id).await,
                Trigger::RecalcCampaign { campaign_id } => {
                    self.engine.recalc_campaign(campaign_id).await
                }
            };
            match result {
                Ok(_) => report.executed.push(trigger),
                Err(e) => {
                    tracing::warn!(?trigger, error = %e, "kpi trigger failed");
                    report.failures.push((trigger, e));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn post(campaign_id: i64, account_id: i64, views: Option<i64>) -> Post {
        Post {
            id: 1,
            campaign_id,
            account_id,
            post_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            total_view: views,
            total_like: None,
            total_comment: None,
            total_share: None,
            total_saved: None,
            content_type: Some("image".to_string()),
            platform: None,
            url: None,
            caption: None,
        }
    }

    #[test]
    fn post_created_on_linked_pair_recalcs_both_scopes() {
        let triggers = plan(&MutationEvent::PostCreated {
            post: post(1, 2, Some(10)),
            linked_now: false,
        });
        assert_eq!(
            triggers,
            vec![
                Trigger::Recalc {
                    campaign_id: 1,
                    account_id: 2
                },
                Trigger::RecalcCampaign { campaign_id: 1 },
            ]
        );
    }

    #[test]
    fn first_post_links_the_scope() {
        let triggers = plan(&MutationEvent::PostCreated {
            post: post(1, 2, Some(10)),
            linked_now: true,
        });
        assert_eq!(
            triggers[0],
            Trigger::LinkScope {
                campaign_id: 1,
                account_id: 2
            }
        );
        assert_eq!(triggers.len(), 2);
    }

    #[test]
    fn caption_only_update_plans_nothing() {
        let before = post(1, 2, Some(10));
        let mut after = before.clone();
        after.caption = Some("new caption".to_string());
        after.content_type = Some("photo".to_string());
        let triggers = plan(&MutationEvent::PostUpdated {
            before,
            after,
            linked_now: false,
        });
        assert!(triggers.is_empty());
    }

    #[test]
    fn missing_counter_set_to_zero_plans_nothing() {
        let before = post(1, 2, None);
        let after = post(1, 2, Some(0));
        assert!(plan(&MutationEvent::PostUpdated {
            before,
            after,
            linked_now: false,
        })
        .is_empty());
    }

    #[test]
    fn counter_update_recalcs_once_per_scope() {
        let before = post(1, 2, Some(10));
        let after = post(1, 2, Some(20));
        let triggers = plan(&MutationEvent::PostUpdated {
            before,
            after,
            linked_now: false,
        });
        assert_eq!(
            triggers,
            vec![
                Trigger::Recalc {
                    campaign_id: 1,
                    account_id: 2
                },
                Trigger::RecalcCampaign { campaign_id: 1 },
            ]
        );
    }

    #[test]
    fn content_type_becoming_video_triggers_recalc() {
        let before = post(1, 2, Some(10));
        let mut after = before.clone();
        after.content_type = Some("Reel".to_string());
        assert_eq!(
            plan(&MutationEvent::PostUpdated {
                before,
                after,
                linked_now: false,
            })
            .len(),
            2
        );
    }

    #[test]
    fn moving_a_post_recalcs_old_and_new_scopes() {
        let before = post(1, 2, Some(10));
        let after = post(3, 4, Some(10));
        let triggers = plan(&MutationEvent::PostUpdated {
            before,
            after,
            linked_now: true,
        });
        assert_eq!(
            triggers,
            vec![
                Trigger::Recalc {
                    campaign_id: 1,
                    account_id: 2
                },
                Trigger::LinkScope {
                    campaign_id: 3,
                    account_id: 4
                },
                Trigger::RecalcCampaign { campaign_id: 1 },
                Trigger::RecalcCampaign { campaign_id: 3 },
            ]
        );
    }

    #[test]
    fn unlink_recalcs_the_account_scope() {
        assert_eq!(
            plan(&MutationEvent::LinkDeleted {
                campaign_id: 5,
                account_id: 6
            }),
            vec![Trigger::Recalc {
                campaign_id: 5,
                account_id: 6
            }]
        );
    }

    #[test]
    fn membership_update_diffs_old_and_new_lists() {
        let triggers = plan(&MutationEvent::MembershipUpdated {
            campaign_id: 1,
            before: vec![10, 11, 12],
            after: vec![11, 12, 13, 13],
        });
        assert_eq!(
            triggers,
            vec![
                Trigger::LinkScope {
                    campaign_id: 1,
                    account_id: 13
                },
                Trigger::Recalc {
                    campaign_id: 1,
                    account_id: 10
                },
            ]
        );
    }

    #[test]
    fn unchanged_membership_plans_nothing() {
        assert!(plan(&MutationEvent::MembershipUpdated {
            campaign_id: 1,
            before: vec![1, 2],
            after: vec![2, 1],
        })
        .is_empty());
    }
}

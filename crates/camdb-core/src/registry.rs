//! Category → aggregate function registry.
//!
//! Every aggregate is pure and total: it never fails and yields 0 for an
//! empty post sequence. Recalculation iterates the registry, so adding a
//! category means adding an entry here and nothing else.

use crate::kpi::KpiCategory;
use crate::posts::{Post, PostCounter};

pub type AggregateFn = fn(&[Post]) -> i64;

#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    entries: Vec<(KpiCategory, AggregateFn)>,
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl CategoryRegistry {
    /// A registry with no categories.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// All supported categories, in [`KpiCategory::ALL`] order.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with(KpiCategory::Views, sum_views)
            .with(KpiCategory::Likes, sum_likes)
            .with(KpiCategory::Comments, sum_comments)
            .with(KpiCategory::Shares, sum_shares)
            .with(KpiCategory::Saves, sum_saves)
            .with(KpiCategory::QtyPost, count_posts)
            .with(KpiCategory::VideoCount, count_videos)
    }

    /// Registers `aggregate` for `category`, replacing any previous entry.
    #[must_use]
    pub fn with(mut self, category: KpiCategory, aggregate: AggregateFn) -> Self {
        if let Some(entry) = self.entries.iter_mut().find(|(c, _)| *c == category) {
            entry.1 = aggregate;
        } else {
            self.entries.push((category, aggregate));
        }
        self
    }

    pub fn categories(&self) -> impl Iterator<Item = KpiCategory> + '_ {
        self.entries.iter().map(|(c, _)| *c)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aggregate for a single category, or `None` if it is not registered.
    #[must_use]
    pub fn aggregate(&self, category: KpiCategory, posts: &[Post]) -> Option<i64> {
        self.entries
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, f)| f(posts))
    }

    /// Every registered category's aggregate over `posts`, in registration order.
    #[must_use]
    pub fn compute(&self, posts: &[Post]) -> Vec<(KpiCategory, i64)> {
        self.entries.iter().map(|(c, f)| (*c, f(posts))).collect()
    }
}

fn sum_counter(posts: &[Post], counter: PostCounter) -> i64 {
    posts
        .iter()
        .fold(0_i64, |acc, p| acc.saturating_add(p.counter(counter)))
}

fn sum_views(posts: &[Post]) -> i64 {
    sum_counter(posts, PostCounter::Views)
}

fn sum_likes(posts: &[Post]) -> i64 {
    sum_counter(posts, PostCounter::Likes)
}

fn sum_comments(posts: &[Post]) -> i64 {
    sum_counter(posts, PostCounter::Comments)
}

fn sum_shares(posts: &[Post]) -> i64 {
    sum_counter(posts, PostCounter::Shares)
}

fn sum_saves(posts: &[Post]) -> i64 {
    sum_counter(posts, PostCounter::Saves)
}

fn count_posts(posts: &[Post]) -> i64 {
    i64::try_from(posts.len()).unwrap_or(i64::MAX)
}

fn count_videos(posts: &[Post]) -> i64 {
    i64::try_from(posts.iter().filter(|p| p.is_video()).count()).unwrap_or(i64::MAX)
}

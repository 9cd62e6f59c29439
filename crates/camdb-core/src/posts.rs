use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Content types (lowercased) that count as video formats.
const VIDEO_CONTENT_TYPES: &[&str] = &["video", "reel", "reels", "short", "shorts", "live", "igtv"];

/// A published post inside a campaign, attributed to one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub campaign_id: i64,
    pub account_id: i64,
    pub post_date: NaiveDate,
    pub total_view: Option<i64>,
    pub total_like: Option<i64>,
    pub total_comment: Option<i64>,
    pub total_share: Option<i64>,
    pub total_saved: Option<i64>,
    /// e.g. `"video"`, `"image"`, `"carousel"`, or a MIME type.
    pub content_type: Option<String>,
    pub platform: Option<String>,
    pub url: Option<String>,
    pub caption: Option<String>,
}

/// The engagement counters carried by every [`Post`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostCounter {
    Views,
    Likes,
    Comments,
    Shares,
    Saves,
}

impl PostCounter {
    pub const ALL: [PostCounter; 5] = [
        PostCounter::Views,
        PostCounter::Likes,
        PostCounter::Comments,
        PostCounter::Shares,
        PostCounter::Saves,
    ];
}

impl Post {
    /// Value of one engagement counter. Missing and negative values read as 0.
    #[must_use]
    pub fn counter(&self, counter: PostCounter) -> i64 {
        let raw = match counter {
            PostCounter::Views => self.total_view,
            PostCounter::Likes => self.total_like,
            PostCounter::Comments => self.total_comment,
            PostCounter::Shares => self.total_share,
            PostCounter::Saves => self.total_saved,
        };
        raw.unwrap_or(0).max(0)
    }

    #[must_use]
    pub fn is_video(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(is_video_content_type)
    }
}

/// Returns `true` when a content-type attribute denotes a video format.
///
/// Accepts platform labels (`reel`, `short`, ...) and `video/*` MIME types,
/// case-insensitively.
#[must_use]
pub fn is_video_content_type(content_type: &str) -> bool {
    let normalized = content_type.trim().to_ascii_lowercase();
    VIDEO_CONTENT_TYPES.contains(&normalized.as_str()) || normalized.starts_with("video/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(content_type: Option<&str>) -> Post {
        Post {
            id: 1,
            campaign_id: 1,
            account_id: 1,
            post_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            total_view: Some(10),
            total_like: None,
            total_comment: Some(-3),
            total_share: Some(2),
            total_saved: Some(0),
            content_type: content_type.map(str::to_string),
            platform: None,
            url: None,
            caption: None,
        }
    }

    #[test]
    fn missing_counter_reads_as_zero() {
        assert_eq!(post(None).counter(PostCounter::Likes), 0);
    }

    #[test]
    fn negative_counter_reads_as_zero() {
        assert_eq!(post(None).counter(PostCounter::Comments), 0);
    }

    #[test]
    fn present_counter_is_returned() {
        let p = post(None);
        assert_eq!(p.counter(PostCounter::Views), 10);
        assert_eq!(p.counter(PostCounter::Shares), 2);
    }

    #[test]
    fn video_labels_are_detected() {
        for ct in ["video", "Reel", " SHORTS ", "live", "igtv", "video/mp4"] {
            assert!(is_video_content_type(ct), "{ct} should be video");
        }
    }

    #[test]
    fn non_video_labels_are_rejected() {
        for ct in ["image", "carousel", "", "image/png", "text"] {
            assert!(!is_video_content_type(ct), "{ct} should not be video");
        }
    }

    #[test]
    fn post_without_content_type_is_not_video() {
        assert!(!post(None).is_video());
        assert!(post(Some("video")).is_video());
    }
}

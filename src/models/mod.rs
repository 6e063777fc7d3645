use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub type UserId = i64;
pub type ItemId = i64;

/// Kind of a recorded user/item interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Like,
    Collect,
    Browse,
    Other,
}

impl InteractionKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "like" => Self::Like,
            "collect" => Self::Collect,
            "browse" => Self::Browse,
            _ => Self::Other,
        }
    }

    /// Weight of the event in the user-item rating matrix. Only likes,
    /// collects and browses count as ratings.
    pub fn rating_weight(&self) -> Option<f64> {
        match self {
            Self::Like => Some(5.0),
            Self::Collect => Some(4.0),
            Self::Browse => Some(1.0),
            Self::Other => None,
        }
    }

    /// Weight of the event when building a user's type preferences.
    pub fn preference_weight(&self) -> f64 {
        match self {
            Self::Like => 5.0,
            Self::Collect => 4.0,
            Self::Browse | Self::Other => 1.0,
        }
    }
}

/// Canonical set of child type ids attached to an item.
///
/// Stored upstream as a comma separated string; parsed once at the data
/// source boundary into a sorted, de-duplicated list so that the same set of
/// types always yields the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeKey(Vec<String>);

impl TypeKey {
    pub fn parse(raw: &str) -> Option<Self> {
        let ids: BTreeSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if ids.is_empty() {
            None
        } else {
            Some(Self(ids.into_iter().collect()))
        }
    }

    pub fn parse_opt(raw: Option<&str>) -> Option<Self> {
        raw.and_then(Self::parse)
    }

    pub fn ids(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// Splits a free-text comma separated tag field into a tag set.
pub fn parse_tags(raw: Option<&str>) -> BTreeSet<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub kind: InteractionKind,
    pub timestamp: Option<NaiveDateTime>,
}

/// A user's interaction joined with the interacted item's type set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedInteraction {
    pub item_id: ItemId,
    pub kind: InteractionKind,
    pub item_type: Option<TypeKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub description: Option<String>,
    pub type_parent_id: Option<i64>,
    pub type_child_ids: Option<TypeKey>,
    pub like_num: i64,
    pub collect_num: i64,
    pub browse_num: i64,
    pub create_time: Option<NaiveDateTime>,
}

impl Item {
    pub fn new(id: ItemId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            type_parent_id: None,
            type_child_ids: None,
            like_num: 0,
            collect_num: 0,
            browse_num: 0,
            create_time: None,
        }
    }

    pub fn with_types(mut self, raw: &str) -> Self {
        self.type_child_ids = TypeKey::parse(raw);
        self
    }

    pub fn with_counts(mut self, like_num: i64, collect_num: i64, browse_num: i64) -> Self {
        self.like_num = like_num;
        self.collect_num = collect_num;
        self.browse_num = browse_num;
        self
    }

    pub fn with_create_time(mut self, create_time: NaiveDateTime) -> Self {
        self.create_time = Some(create_time);
        self
    }

    /// Engagement proxy used for candidate ordering and popularity.
    pub fn engagement(&self) -> i64 {
        self.like_num * 3 + self.collect_num * 2 + self.browse_num
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Like,
    Dislike,
}

impl FeedbackKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "like" => Some(Self::Like),
            "dislike" => Some(Self::Dislike),
            _ => None,
        }
    }

    pub fn default_reward(&self) -> f64 {
        match self {
            Self::Like => 1.0,
            Self::Dislike => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub kind: FeedbackKind,
    pub reward: f64,
    pub item_type: Option<TypeKey>,
    pub timestamp: Option<NaiveDateTime>,
}

impl FeedbackRecord {
    pub fn new(user_id: UserId, item_id: ItemId, kind: FeedbackKind) -> Self {
        Self {
            user_id,
            item_id,
            kind,
            reward: kind.default_reward(),
            item_type: None,
            timestamp: None,
        }
    }

    pub fn with_reward(mut self, reward: f64) -> Self {
        self.reward = reward;
        self
    }

    pub fn with_type(mut self, raw: &str) -> Self {
        self.item_type = TypeKey::parse(raw);
        self
    }
}

/// Strategy requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Collaborative,
    Content,
    Hybrid,
    Popular,
}

impl Method {
    /// Unrecognized names fall back to hybrid.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("collaborative") | Some("cf") => Self::Collaborative,
            Some("content") | Some("cb") => Self::Content,
            Some("popular") => Self::Popular,
            _ => Self::Hybrid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collaborative => "collaborative",
            Self::Content => "content",
            Self::Hybrid => "hybrid",
            Self::Popular => "popular",
        }
    }
}

impl Default for Method {
    fn default() -> Self {
        Self::Hybrid
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response envelope shared by the CLI entry points and the HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub data: Option<T>,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            data: Some(data),
            message: "success".to_string(),
        }
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            data: None,
            message: message.into(),
        }
    }

    /// Caller mistakes keep their message under code 400; everything else
    /// is reported as an internal error under 500.
    pub fn from_result(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(e) => {
                let code = e.status_code();
                if code >= 500 {
                    tracing::error!("Request failed: {}", e);
                    Self::error(code, format!("Internal server error: {}", e))
                } else {
                    Self::error(code, e.to_string())
                }
            }
        }
    }
}

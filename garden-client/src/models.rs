use crate::error::GardenClientError;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Client-side checks run before any request leaves the process.
pub trait Validate {
    fn validate(&self) -> Result<(), GardenClientError>;
}

fn require_text(field: &str, value: &str) -> Result<(), GardenClientError> {
    if value.trim().is_empty() {
        return Err(GardenClientError::Validation(format!(
            "{} cannot be empty",
            field
        )));
    }
    Ok(())
}

fn require_optional_text(field: &str, value: Option<&String>) -> Result<(), GardenClientError> {
    match value {
        Some(value) => require_text(field, value),
        None => Ok(()),
    }
}

fn require_change(changed: bool) -> Result<(), GardenClientError> {
    if !changed {
        return Err(GardenClientError::Validation(
            "Nothing to update".to_string(),
        ));
    }
    Ok(())
}

// ==================== Авторизация ====================

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), GardenClientError> {
        require_text("Username", &self.username)?;
        require_text("Email", &self.email)?;
        require_text("Password", &self.password)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), GardenClientError> {
        require_text("Email", &self.email)?;
        require_text("Password", &self.password)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Registration either signs the user in right away or only confirms the account.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

// ==================== Растения ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub img_url: Option<String>,
    #[serde(default, alias = "owner")]
    pub user_id: Option<i64>,
}

impl Plant {
    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == Some(user_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlantDraft {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_url: Option<String>,
}

impl PlantDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Validate for PlantDraft {
    fn validate(&self) -> Result<(), GardenClientError> {
        require_text("Plant name", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlantPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_url: Option<String>,
}

impl From<&Plant> for PlantPatch {
    fn from(plant: &Plant) -> Self {
        Self {
            name: Some(plant.name.clone()),
            species: plant.species.clone(),
            description: plant.description.clone(),
            img_url: plant.img_url.clone(),
        }
    }
}

impl Validate for PlantPatch {
    fn validate(&self) -> Result<(), GardenClientError> {
        require_optional_text("Plant name", self.name.as_ref())?;
        require_change(
            self.name.is_some()
                || self.species.is_some()
                || self.description.is_some()
                || self.img_url.is_some(),
        )
    }
}

// ==================== Расписание ухода ====================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CareTask {
    Watering,
    Pruning,
    Fertilizing,
    Harvesting,
    Other(String),
}

impl CareTask {
    pub fn as_str(&self) -> &str {
        match self {
            CareTask::Watering => "WATERING",
            CareTask::Pruning => "PRUNING",
            CareTask::Fertilizing => "FERTILIZING",
            CareTask::Harvesting => "HARVESTING",
            CareTask::Other(task) => task,
        }
    }
}

impl From<&str> for CareTask {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "WATERING" => CareTask::Watering,
            "PRUNING" => CareTask::Pruning,
            "FERTILIZING" => CareTask::Fertilizing,
            "HARVESTING" => CareTask::Harvesting,
            _ => CareTask::Other(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for CareTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CareTask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CareTask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(CareTask::from(raw.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Interval {
    Daily,
    Weekly,
    Fortnightly,
    Monthly,
    /// Unrecognized value as sent by the server; never due. Empty when the server sent none.
    Other(String),
}

impl Default for Interval {
    fn default() -> Self {
        Interval::Other(String::new())
    }
}

impl Interval {
    pub fn as_str(&self) -> &str {
        match self {
            Interval::Daily => "DAILY",
            Interval::Weekly => "WEEKLY",
            Interval::Fortnightly => "FORTNIGHTLY",
            Interval::Monthly => "MONTHLY",
            Interval::Other(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Interval::Other(_))
    }
}

impl From<&str> for Interval {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" => Interval::Daily,
            "weekly" => Interval::Weekly,
            "fortnightly" | "biweekly" => Interval::Fortnightly,
            "monthly" => Interval::Monthly,
            _ => Interval::Other(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|raw| Interval::from(raw.as_str())).unwrap_or_default())
    }
}

/// `schedule_date` travels as `YYYY-MM-DD`, though some payloads carry a full timestamp.
mod schedule_date {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid schedule_date: {}", raw)))
    }

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        NaiveDate::parse_from_str(raw, FORMAT)
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|dt| dt.date())
            })
    }
}

pub fn parse_schedule_date(raw: &str) -> Option<NaiveDate> {
    schedule_date::parse(raw)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareSchedule {
    pub id: i64,
    pub plant_id: i64,
    pub task: CareTask,
    #[serde(with = "schedule_date")]
    pub schedule_date: NaiveDate,
    #[serde(default)]
    pub interval: Interval,
    #[serde(default)]
    pub plant_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CareScheduleDraft {
    pub plant_id: i64,
    pub task: CareTask,
    #[serde(with = "schedule_date")]
    pub schedule_date: NaiveDate,
    pub interval: Interval,
}

impl Validate for CareScheduleDraft {
    fn validate(&self) -> Result<(), GardenClientError> {
        require_text("Task", self.task.as_str())?;
        if !self.interval.is_recognized() {
            return Err(GardenClientError::Validation(format!(
                "Unknown interval: {}",
                self.interval
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CareSchedulePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<CareTask>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_optional_date"
    )]
    pub schedule_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
}

fn serialize_optional_date<S: Serializer>(
    date: &Option<NaiveDate>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match date {
        Some(date) => schedule_date::serialize(date, serializer),
        None => serializer.serialize_none(),
    }
}

impl Validate for CareSchedulePatch {
    fn validate(&self) -> Result<(), GardenClientError> {
        if let Some(task) = &self.task {
            require_text("Task", task.as_str())?;
        }
        if let Some(interval) = &self.interval {
            if !interval.is_recognized() {
                return Err(GardenClientError::Validation(format!(
                    "Unknown interval: {}",
                    interval
                )));
            }
        }
        require_change(
            self.task.is_some() || self.schedule_date.is_some() || self.interval.is_some(),
        )
    }
}

// ==================== Форум ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub id: Option<i64>,
    pub username: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reactions {
    #[serde(default)]
    pub like: u32,
    #[serde(default)]
    pub dislike: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Dislike,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ReactionRequest {
    #[serde(rename = "type")]
    pub kind: ReactionKind,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ReactionResponse {
    pub reactions: Reactions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default, rename = "isOwner", alias = "is_owner")]
    pub is_owner: bool,
    #[serde(default)]
    pub replies: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumPost {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub reactions: Reactions,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default, rename = "isOwner", alias = "is_owner")]
    pub is_owner: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForumPostDraft {
    pub title: String,
    pub content: String,
}

impl Validate for ForumPostDraft {
    fn validate(&self) -> Result<(), GardenClientError> {
        require_text("Title", &self.title)?;
        require_text("Content", &self.content)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForumPostPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl From<&ForumPost> for ForumPostPatch {
    fn from(post: &ForumPost) -> Self {
        Self {
            title: Some(post.title.clone()),
            content: Some(post.content.clone()),
        }
    }
}

impl Validate for ForumPostPatch {
    fn validate(&self) -> Result<(), GardenClientError> {
        require_optional_text("Title", self.title.as_ref())?;
        require_optional_text("Content", self.content.as_ref())?;
        require_change(self.title.is_some() || self.content.is_some())
    }
}

/// Body for both new comments and comment edits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentDraft {
    pub content: String,
}

impl CommentDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

impl Validate for CommentDraft {
    fn validate(&self) -> Result<(), GardenClientError> {
        require_text("Comment", &self.content)
    }
}

// ==================== Советы ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub author_id: Option<i64>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TipDraft {
    pub title: String,
    pub content: String,
}

impl Validate for TipDraft {
    fn validate(&self) -> Result<(), GardenClientError> {
        require_text("Title", &self.title)?;
        require_text("Content", &self.content)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TipPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Validate for TipPatch {
    fn validate(&self) -> Result<(), GardenClientError> {
        require_optional_text("Title", self.title.as_ref())?;
        require_optional_text("Content", self.content.as_ref())?;
        require_change(self.title.is_some() || self.content.is_some())
    }
}

// ==================== Планировки сада ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bed {
    pub name: String,
    #[serde(default)]
    pub plants: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    #[serde(alias = "plantId")]
    pub plant_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub img_url: Option<String>,
    #[serde(default)]
    pub position: Position,
}

/// Both shapes a layout has been persisted in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum LayoutShape {
    Beds { beds: Vec<Bed> },
    Placements(Vec<Placement>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutData {
    Beds(Vec<Bed>),
    Placements(Vec<Placement>),
}

impl Default for LayoutData {
    fn default() -> Self {
        LayoutData::Beds(Vec::new())
    }
}

impl LayoutData {
    pub fn is_empty(&self) -> bool {
        match self {
            LayoutData::Beds(beds) => beds.is_empty(),
            LayoutData::Placements(placements) => placements.is_empty(),
        }
    }

    /// Parses the JSON text a layout is stored as.
    pub fn parse(raw: &str) -> Result<Self, GardenClientError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    fn from_value(value: serde_json::Value) -> Result<Self, GardenClientError> {
        // Layouts are sometimes double-encoded.
        let value = match value {
            serde_json::Value::String(inner) => serde_json::from_str(&inner)?,
            other => other,
        };
        let shape: LayoutShape = serde_json::from_value(value)?;
        Ok(match shape {
            LayoutShape::Beds { beds } => LayoutData::Beds(beds),
            LayoutShape::Placements(placements) => LayoutData::Placements(placements),
        })
    }

    pub fn to_json_string(&self) -> Result<String, GardenClientError> {
        let shape = match self {
            LayoutData::Beds(beds) => LayoutShape::Beds { beds: beds.clone() },
            LayoutData::Placements(placements) => LayoutShape::Placements(placements.clone()),
        };
        Ok(serde_json::to_string(&shape)?)
    }
}

impl Serialize for LayoutData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = self.to_json_string().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for LayoutData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        LayoutData::from_value(value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub layout_data: LayoutData,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutDraft {
    pub name: String,
    pub layout_data: LayoutData,
}

impl Validate for LayoutDraft {
    fn validate(&self) -> Result<(), GardenClientError> {
        require_text("Layout name", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayoutPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_data: Option<LayoutData>,
}

impl Validate for LayoutPatch {
    fn validate(&self) -> Result<(), GardenClientError> {
        require_optional_text("Layout name", self.name.as_ref())?;
        require_change(self.name.is_some() || self.layout_data.is_some())
    }
}

// ==================== Общие ошибки ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
}

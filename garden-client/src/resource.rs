use crate::error::GardenClientError;
use crate::models::{
    CareSchedule, CareScheduleDraft, CareSchedulePatch, Comment, CommentDraft, ForumPost,
    ForumPostDraft, ForumPostPatch, Layout, LayoutDraft, LayoutPatch, Plant, PlantDraft,
    PlantPatch, Tip, TipDraft, TipPatch, Validate,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// One REST collection: where it lives and what travels over the wire.
pub trait Resource: Debug + Clone + Send + Sync + 'static {
    type Entity: DeserializeOwned + Debug + Clone + Send + Sync + 'static;
    type Draft: Serialize + Validate + Debug + Clone + Send + Sync + 'static;
    type Patch: Serialize + Validate + Debug + Clone + Send + Sync + 'static;

    /// Human readable singular name, used in logs and notices.
    fn label(&self) -> &'static str;

    fn collection_path(&self) -> String;

    fn item_path(&self, id: i64) -> String {
        format!("{}/{}", self.collection_path(), id)
    }

    fn entity_id(entity: &Self::Entity) -> i64;

    /// Key under which create/update responses wrap the saved entity, if any.
    fn envelope() -> Option<&'static str> {
        None
    }
}

/// What a successful create or update answered with.
#[derive(Debug, Clone, PartialEq)]
pub enum Saved<E> {
    /// The saved entity, as stored by the server.
    Entity(E),
    /// Only a confirmation such as `{"msg": "Plant added successfully"}`.
    Acknowledged { message: Option<String> },
}

impl<E> Saved<E> {
    pub fn entity(&self) -> Option<&E> {
        match self {
            Saved::Entity(entity) => Some(entity),
            Saved::Acknowledged { .. } => None,
        }
    }

    pub fn into_entity(self) -> Option<E> {
        match self {
            Saved::Entity(entity) => Some(entity),
            Saved::Acknowledged { .. } => None,
        }
    }
}

/// The four calls every view needs. Implemented by [`HttpClient`](crate::http_client::HttpClient);
/// tests substitute their own.
#[async_trait]
pub trait ResourceApi<R: Resource>: Send + Sync {
    async fn list(&self, resource: &R) -> Result<Vec<R::Entity>, GardenClientError>;

    async fn create(
        &self,
        resource: &R,
        draft: &R::Draft,
    ) -> Result<Saved<R::Entity>, GardenClientError>;

    async fn update(
        &self,
        resource: &R,
        id: i64,
        patch: &R::Patch,
    ) -> Result<Saved<R::Entity>, GardenClientError>;

    async fn delete(&self, resource: &R, id: i64) -> Result<(), GardenClientError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Plants;

impl Resource for Plants {
    type Entity = Plant;
    type Draft = PlantDraft;
    type Patch = PlantPatch;

    fn label(&self) -> &'static str {
        "plant"
    }

    fn collection_path(&self) -> String {
        "/plants".to_string()
    }

    fn entity_id(entity: &Plant) -> i64 {
        entity.id
    }
}

/// Care schedules are always scoped to their plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CareSchedules {
    pub plant_id: i64,
}

impl CareSchedules {
    pub fn for_plant(plant_id: i64) -> Self {
        Self { plant_id }
    }
}

impl Resource for CareSchedules {
    type Entity = CareSchedule;
    type Draft = CareScheduleDraft;
    type Patch = CareSchedulePatch;

    fn label(&self) -> &'static str {
        "care schedule"
    }

    fn collection_path(&self) -> String {
        format!("/plants/{}/care_schedules", self.plant_id)
    }

    fn entity_id(entity: &CareSchedule) -> i64 {
        entity.id
    }

    fn envelope() -> Option<&'static str> {
        Some("schedule")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForumPosts;

impl ForumPosts {
    pub fn reactions_path(post_id: i64) -> String {
        format!("{}/reactions", ForumPosts.item_path(post_id))
    }
}

impl Resource for ForumPosts {
    type Entity = ForumPost;
    type Draft = ForumPostDraft;
    type Patch = ForumPostPatch;

    fn label(&self) -> &'static str {
        "forum post"
    }

    fn collection_path(&self) -> String {
        "/forum/posts".to_string()
    }

    fn entity_id(entity: &ForumPost) -> i64 {
        entity.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comments {
    pub post_id: i64,
}

impl Comments {
    pub fn on_post(post_id: i64) -> Self {
        Self { post_id }
    }

    pub fn replies_path(&self, comment_id: i64) -> String {
        format!("{}/replies", self.item_path(comment_id))
    }
}

impl Resource for Comments {
    type Entity = Comment;
    type Draft = CommentDraft;
    type Patch = CommentDraft;

    fn label(&self) -> &'static str {
        "comment"
    }

    fn collection_path(&self) -> String {
        format!("{}/comments", ForumPosts.item_path(self.post_id))
    }

    fn entity_id(entity: &Comment) -> i64 {
        entity.id
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tips;

impl Resource for Tips {
    type Entity = Tip;
    type Draft = TipDraft;
    type Patch = TipPatch;

    fn label(&self) -> &'static str {
        "tip"
    }

    fn collection_path(&self) -> String {
        "/tips".to_string()
    }

    fn entity_id(entity: &Tip) -> i64 {
        entity.id
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Layouts;

impl Resource for Layouts {
    type Entity = Layout;
    type Draft = LayoutDraft;
    type Patch = LayoutPatch;

    fn label(&self) -> &'static str {
        "layout"
    }

    fn collection_path(&self) -> String {
        "/layouts".to_string()
    }

    fn entity_id(entity: &Layout) -> i64 {
        entity.id
    }
}

//! List/form/delete state shared by every screen.
//!
//! A view owns its list exclusively. Mutations are never serialized: two in-flight
//! requests on the same entity both apply their result to the list when they resolve,
//! so the last response wins. The phase only moves on completion if nothing else moved
//! it while the request was in flight.

use crate::error::GardenClientError;
use crate::models::Validate;
use crate::resource::{Resource, ResourceApi, Saved};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
pub enum Form<R: Resource> {
    Add(R::Draft),
    Edit { id: i64, patch: R::Patch },
}

#[derive(Debug, Clone)]
pub enum Phase<R: Resource> {
    Loading,
    Idle,
    Error(String),
    FormOpen {
        form: Form<R>,
        error: Option<String>,
    },
    ConfirmingDelete {
        target: i64,
    },
}

impl<R: Resource> Phase<R> {
    pub fn is_idle(&self) -> bool {
        matches!(self, Phase::Idle)
    }

    pub fn is_form_open(&self) -> bool {
        matches!(self, Phase::FormOpen { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Transient, toast-style message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ViewSnapshot<R: Resource> {
    pub items: Vec<R::Entity>,
    pub phase: Phase<R>,
    pub login_required: bool,
}

#[derive(Debug)]
struct ViewInner<R: Resource> {
    items: Vec<R::Entity>,
    phase: Phase<R>,
    generation: u64,
    notices: VecDeque<Notice>,
    login_required: bool,
}

impl<R: Resource> ViewInner<R> {
    fn transition(&mut self, phase: Phase<R>) {
        self.phase = phase;
        self.generation += 1;
    }

    fn upsert(&mut self, entity: R::Entity) {
        let id = R::entity_id(&entity);
        match self.items.iter().position(|item| R::entity_id(item) == id) {
            Some(index) => self.items[index] = entity,
            None => self.items.push(entity),
        }
    }

    fn replace(&mut self, entity: R::Entity) {
        let id = R::entity_id(&entity);
        if let Some(item) = self.items.iter_mut().find(|item| R::entity_id(item) == id) {
            *item = entity;
        }
    }

    fn set_form_error(&mut self, message: String) {
        if let Phase::FormOpen { error, .. } = &mut self.phase {
            *error = Some(message);
        }
    }

    fn notify(&mut self, level: NoticeLevel, title: String, description: Option<String>) {
        self.notices.push_back(Notice {
            level,
            title,
            description,
        });
    }

    fn fail(&mut self, title: String, error: &GardenClientError) {
        if error.is_unauthorized() {
            self.login_required = true;
        }
        self.notify(NoticeLevel::Error, title, Some(error.to_string()));
    }
}

fn capitalized(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct ResourceView<R: Resource> {
    resource: R,
    api: Arc<dyn ResourceApi<R>>,
    inner: Arc<Mutex<ViewInner<R>>>,
    mounted: Arc<AtomicBool>,
}

impl<R: Resource> Clone for ResourceView<R> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
            api: self.api.clone(),
            inner: self.inner.clone(),
            mounted: self.mounted.clone(),
        }
    }
}

impl<R: Resource> ResourceView<R> {
    pub fn new(resource: R, api: Arc<dyn ResourceApi<R>>) -> Self {
        Self {
            resource,
            api,
            inner: Arc::new(Mutex::new(ViewInner {
                items: Vec::new(),
                phase: Phase::Loading,
                generation: 0,
                notices: VecDeque::new(),
                login_required: false,
            })),
            mounted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    fn state(&self) -> MutexGuard<'_, ViewInner<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub async fn mount(&self) -> Result<(), GardenClientError> {
        self.mounted.store(true, Ordering::SeqCst);
        self.reload().await
    }

    /// Responses that resolve after this point are dropped.
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    /// Re-fetches the list. An open form or pending delete keeps its phase.
    pub async fn reload(&self) -> Result<(), GardenClientError> {
        let generation = {
            let mut state = self.state();
            if matches!(state.phase, Phase::Idle | Phase::Error(_) | Phase::Loading) {
                state.transition(Phase::Loading);
            }
            state.generation
        };

        let result = self.api.list(&self.resource).await;
        if !self.is_mounted() {
            tracing::debug!("Dropping {} list after unmount", self.resource.label());
            return result.map(|_| ());
        }

        let mut state = self.state();
        let unchanged = state.generation == generation && matches!(state.phase, Phase::Loading);
        match result {
            Ok(items) => {
                state.items = items;
                if unchanged {
                    state.transition(Phase::Idle);
                }
                Ok(())
            }
            Err(e) => {
                if unchanged {
                    state.transition(Phase::Error(e.to_string()));
                }
                state.fail(format!("Failed to load {}s", self.resource.label()), &e);
                Err(e)
            }
        }
    }

    pub fn open_add(&self, draft: R::Draft) {
        self.state().transition(Phase::FormOpen {
            form: Form::Add(draft),
            error: None,
        });
    }

    pub fn open_edit(&self, id: i64, patch: R::Patch) -> Result<(), GardenClientError> {
        let mut state = self.state();
        if !state.items.iter().any(|item| R::entity_id(item) == id) {
            return Err(GardenClientError::Validation(format!(
                "{} #{} is not loaded",
                capitalized(self.resource.label()),
                id
            )));
        }
        state.transition(Phase::FormOpen {
            form: Form::Edit { id, patch },
            error: None,
        });
        Ok(())
    }

    /// Edits the open draft in place. Returns `false` when no form is open.
    pub fn edit_form(&self, edit: impl FnOnce(&mut Form<R>)) -> bool {
        let mut state = self.state();
        match &mut state.phase {
            Phase::FormOpen { form, .. } => {
                edit(form);
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&self) {
        let mut state = self.state();
        if matches!(
            state.phase,
            Phase::FormOpen { .. } | Phase::ConfirmingDelete { .. }
        ) {
            state.transition(Phase::Idle);
        }
    }

    /// Sends the open form. On failure the form stays open and the list is untouched.
    /// A save the server only confirms is followed by a re-fetch of the list.
    pub async fn submit(&self) -> Result<Saved<R::Entity>, GardenClientError> {
        let (form, generation) = {
            let mut state = self.state();
            let form = match &state.phase {
                Phase::FormOpen { form, .. } => form.clone(),
                _ => {
                    return Err(GardenClientError::Validation(
                        "No form is open".to_string(),
                    ))
                }
            };

            let checked = match &form {
                Form::Add(draft) => draft.validate(),
                Form::Edit { patch, .. } => patch.validate(),
            };
            if let Err(e) = checked {
                state.set_form_error(e.to_string());
                state.fail(format!("Invalid {}", self.resource.label()), &e);
                return Err(e);
            }

            (form, state.generation)
        };

        let result = match &form {
            Form::Add(draft) => self.api.create(&self.resource, draft).await,
            Form::Edit { id, patch } => self.api.update(&self.resource, *id, patch).await,
        };
        if !self.is_mounted() {
            tracing::debug!("Dropping {} save after unmount", self.resource.label());
            return result;
        }

        let label = self.resource.label();
        let saved = match result {
            Ok(saved) => saved,
            Err(e) => {
                let mut state = self.state();
                if state.generation == generation {
                    state.set_form_error(e.to_string());
                }
                state.fail(format!("Error saving {}", label), &e);
                return Err(e);
            }
        };

        let title = match (&form, &saved) {
            (Form::Add(_), Saved::Entity(entity)) => {
                self.state().upsert(entity.clone());
                format!("{} added", capitalized(label))
            }
            (Form::Edit { .. }, Saved::Entity(entity)) => {
                self.state().replace(entity.clone());
                format!("{} updated", capitalized(label))
            }
            (Form::Add(_), Saved::Acknowledged { .. }) => {
                self.refetch().await;
                format!("{} added", capitalized(label))
            }
            (Form::Edit { .. }, Saved::Acknowledged { .. }) => {
                self.refetch().await;
                format!("{} updated", capitalized(label))
            }
        };
        if !self.is_mounted() {
            return Ok(saved);
        }

        let mut state = self.state();
        if state.generation == generation {
            state.transition(Phase::Idle);
        }
        let description = match &saved {
            Saved::Acknowledged { message } => message.clone(),
            Saved::Entity(_) => None,
        };
        state.notify(NoticeLevel::Success, title, description);
        Ok(saved)
    }

    /// Replaces the list without touching the phase. A failure only leaves a notice.
    async fn refetch(&self) {
        let result = self.api.list(&self.resource).await;
        if !self.is_mounted() {
            return;
        }

        let mut state = self.state();
        match result {
            Ok(items) => state.items = items,
            Err(e) => state.fail(format!("Failed to load {}s", self.resource.label()), &e),
        }
    }

    /// The target does not have to be in the list; a stale row may still be deleted.
    pub fn request_delete(&self, id: i64) {
        self.state()
            .transition(Phase::ConfirmingDelete { target: id });
    }

    pub async fn confirm_delete(&self) -> Result<(), GardenClientError> {
        let (target, generation) = {
            let state = self.state();
            match state.phase {
                Phase::ConfirmingDelete { target } => (target, state.generation),
                _ => {
                    return Err(GardenClientError::Validation(
                        "No delete is pending".to_string(),
                    ))
                }
            }
        };

        let result = self.api.delete(&self.resource, target).await;
        if !self.is_mounted() {
            tracing::debug!("Dropping {} delete after unmount", self.resource.label());
            return result;
        }

        let label = self.resource.label();
        let mut state = self.state();
        if state.generation == generation {
            state.transition(Phase::Idle);
        }
        match result {
            Ok(()) => {
                state.items.retain(|item| R::entity_id(item) != target);
                state.notify(
                    NoticeLevel::Success,
                    format!("{} deleted", capitalized(label)),
                    None,
                );
                Ok(())
            }
            Err(e) => {
                state.fail(format!("Error deleting {}", label), &e);
                Err(e)
            }
        }
    }

    pub fn snapshot(&self) -> ViewSnapshot<R> {
        let state = self.state();
        ViewSnapshot {
            items: state.items.clone(),
            phase: state.phase.clone(),
            login_required: state.login_required,
        }
    }

    pub fn items(&self) -> Vec<R::Entity> {
        self.state().items.clone()
    }

    pub fn phase(&self) -> Phase<R> {
        self.state().phase.clone()
    }

    pub fn find(&self, id: i64) -> Option<R::Entity> {
        self.state()
            .items
            .iter()
            .find(|item| R::entity_id(item) == id)
            .cloned()
    }

    pub fn login_required(&self) -> bool {
        self.state().login_required
    }

    /// Drains pending notices, oldest first.
    pub fn take_notices(&self) -> Vec<Notice> {
        self.state().notices.drain(..).collect()
    }
}

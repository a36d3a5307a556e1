//! Post settings page: slug, thumbnail and deletion of a single post.
//!
//! Each operation is split into a `begin_*` step that flips its in-progress
//! flag and hands back the request to send, and a `finish_*` step that
//! consumes the outcome and always clears the flag. The async helpers
//! (`load`, `save`, `delete`) chain the two around a [`PostApi`] call.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::app::client::{ClientError, LoadedPost, LoadedSite, Navigator, Notifier, PostApi, SaveReceipt};
use crate::routes::post::UpdatePostRequest;

pub const SAVED_MESSAGE: &str = "Changes Saved";
pub const SAVE_FAILED_MESSAGE: &str = "Could not save changes";
pub const DELETE_FAILED_MESSAGE: &str = "Could not delete post";

/// How save and delete failures reach the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Logged only; the missing success toast is the sole signal.
    #[default]
    Silent,
    /// Logged and shown as an error toast.
    Notify,
}

/// Local editable copy of the settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostSettings {
    pub id: String,
    pub slug: String,
    pub image: String,
    pub image_blurhash: String,
}

impl From<&LoadedPost> for PostSettings {
    fn from(loaded: &LoadedPost) -> Self {
        Self {
            id: loaded.id.clone(),
            slug: loaded.slug.clone().unwrap_or_default(),
            image: loaded.image.clone().unwrap_or_default(),
            image_blurhash: loaded.image_blurhash.clone().unwrap_or_default(),
        }
    }
}

/// Completion payload of the upload widget.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ThumbnailUpload {
    pub secure_url: String,
}

/// Identifies one issued load; results carrying an older ticket are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    post_id: String,
}

impl LoadTicket {
    pub fn post_id(&self) -> &str {
        &self.post_id
    }
}

/// An issued save. Its outcome is dropped if the view loaded again since.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveTicket {
    generation: u64,
    request: UpdatePostRequest,
}

impl SaveTicket {
    pub fn request(&self) -> &UpdatePostRequest {
        &self.request
    }
}

/// An issued delete, tagged like [`SaveTicket`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTicket {
    generation: u64,
    post_id: String,
}

impl DeleteTicket {
    pub fn post_id(&self) -> &str {
        &self.post_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thumbnail {
    /// No image yet: pulsing placeholder plus the upload affordance.
    Empty,
    Image {
        src: String,
        /// Blur preview, withheld while it belongs to a replaced image.
        blur_data_url: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteModal {
    pub confirm_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsForm {
    pub post_id: String,
    /// `<subdomain>.<root domain>/` in front of the slug input.
    pub slug_prefix: String,
    pub slug: String,
    pub thumbnail: Thumbnail,
    pub save_disabled: bool,
    pub delete_modal: Option<DeleteModal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsScreen {
    Loading,
    Form(SettingsForm),
}

#[derive(Debug)]
pub struct PostSettingsView {
    post_id: String,
    generation: u64,
    loading: bool,
    saving: bool,
    delete_modal_open: bool,
    deleting: bool,
    settings: Option<PostSettings>,
    site: Option<LoadedSite>,
    placeholder_stale: bool,
    failure_policy: FailurePolicy,
}

impl PostSettingsView {
    pub fn new(post_id: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            generation: 0,
            loading: true,
            saving: false,
            delete_modal_open: false,
            deleting: false,
            settings: None,
            site: None,
            placeholder_stale: false,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn is_delete_modal_open(&self) -> bool {
        self.delete_modal_open
    }

    pub fn is_deleting(&self) -> bool {
        self.deleting
    }

    pub fn settings(&self) -> Option<&PostSettings> {
        self.settings.as_ref()
    }

    pub fn site(&self) -> Option<&LoadedSite> {
        self.site.as_ref()
    }

    pub fn is_placeholder_stale(&self) -> bool {
        self.placeholder_stale
    }

    // ------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------

    /// Start loading `post_id`, on mount or when the identifier changes.
    /// Switching posts hides the previous form until the new one arrives.
    /// Saves and deletes already in flight keep their flags until they
    /// finish, but their outcome no longer applies.
    pub fn begin_load(&mut self, post_id: &str) -> LoadTicket {
        if self.post_id != post_id {
            self.post_id = post_id.to_string();
            self.settings = None;
            self.site = None;
            self.placeholder_stale = false;
            self.delete_modal_open = false;
        }
        self.generation += 1;
        self.loading = true;

        LoadTicket {
            generation: self.generation,
            post_id: self.post_id.clone(),
        }
    }

    /// Apply a load result. Returns false when the ticket was superseded.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<LoadedPost, ClientError>,
        navigator: &mut dyn Navigator,
    ) -> bool {
        if ticket.generation != self.generation {
            tracing::debug!(
                post_id = %ticket.post_id,
                current = %self.post_id,
                "discarding stale settings load"
            );
            return false;
        }

        match result {
            Ok(loaded) => {
                self.settings = Some(PostSettings::from(&loaded));
                self.site = loaded.site;
                self.placeholder_stale = false;
                self.loading = false;
            }
            Err(e) => {
                tracing::warn!(post_id = %ticket.post_id, error = %e, "post settings unavailable");
                navigator.navigate("/");
            }
        }
        true
    }

    pub async fn load(&mut self, post_id: &str, api: &dyn PostApi, navigator: &mut dyn Navigator) {
        let ticket = self.begin_load(post_id);
        let result = api.fetch_settings(ticket.post_id()).await;
        self.finish_load(ticket, result, navigator);
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    pub fn set_slug(&mut self, slug: impl Into<String>) {
        if let Some(settings) = self.settings.as_mut() {
            settings.slug = slug.into();
        }
    }

    /// Swap in a freshly uploaded thumbnail. The old placeholder stays until
    /// a save brings back the server's one.
    pub fn replace_thumbnail(&mut self, upload: ThumbnailUpload) {
        if let Some(settings) = self.settings.as_mut() {
            if settings.image != upload.secure_url {
                settings.image = upload.secure_url;
                self.placeholder_stale = !settings.image_blurhash.is_empty();
            }
        }
    }

    fn report_failure(&self, notifier: &mut dyn Notifier, message: &str) {
        if self.failure_policy == FailurePolicy::Notify {
            notifier.error(message);
        }
    }

    // ------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------

    /// `None` while a save is in flight or before the post has loaded.
    pub fn begin_save(&mut self) -> Option<SaveTicket> {
        if self.saving {
            return None;
        }
        let settings = self.settings.as_ref()?;
        let site = self.site.as_ref();

        let request = UpdatePostRequest {
            id: settings.id.clone(),
            slug: settings.slug.clone(),
            image: settings.image.clone(),
            image_blurhash: settings.image_blurhash.clone(),
            subdomain: site.and_then(|s| s.subdomain.clone()),
            custom_domain: site.and_then(|s| s.custom_domain.clone()),
            title: None,
            description: None,
            content: None,
            published: None,
        };
        self.saving = true;
        Some(SaveTicket {
            generation: self.generation,
            request,
        })
    }

    /// Apply a save outcome. Only one save is in flight at a time, so the
    /// saving flag is cleared even when the outcome is stale.
    pub fn finish_save(
        &mut self,
        ticket: SaveTicket,
        result: Result<SaveReceipt, ClientError>,
        notifier: &mut dyn Notifier,
    ) -> bool {
        self.saving = false;
        if ticket.generation != self.generation {
            tracing::debug!(
                post_id = %ticket.request.id,
                current = %self.post_id,
                "discarding stale settings save"
            );
            return false;
        }

        match result {
            Ok(receipt) if receipt.status.is_success() => {
                // A missing placeholder means the server cleared it.
                if let Some(settings) = self.settings.as_mut() {
                    settings.image_blurhash = receipt.image_blurhash.unwrap_or_default();
                }
                self.placeholder_stale = false;
                notifier.success(SAVED_MESSAGE);
            }
            Ok(receipt) => {
                tracing::warn!(post_id = %self.post_id, status = %receipt.status, "settings save rejected");
                self.report_failure(notifier, SAVE_FAILED_MESSAGE);
            }
            Err(e) => {
                tracing::error!(post_id = %self.post_id, error = %e, "settings save failed");
                self.report_failure(notifier, SAVE_FAILED_MESSAGE);
            }
        }
        true
    }

    pub async fn save(&mut self, api: &dyn PostApi, notifier: &mut dyn Notifier) {
        let Some(ticket) = self.begin_save() else {
            return;
        };
        let result = api.update_settings(ticket.request()).await;
        self.finish_save(ticket, result, notifier);
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    pub fn open_delete_modal(&mut self) {
        if self.settings.is_some() {
            self.delete_modal_open = true;
        }
    }

    /// Close the modal without a request. Ignored once deletion started.
    pub fn cancel_delete(&mut self) {
        if !self.deleting {
            self.delete_modal_open = false;
        }
    }

    /// Confirm deletion; yields the post id to delete, or `None` while a
    /// delete is in flight or the modal is closed.
    pub fn begin_delete(&mut self) -> Option<DeleteTicket> {
        if self.deleting || !self.delete_modal_open {
            return None;
        }
        let post_id = self.settings.as_ref()?.id.clone();
        self.deleting = true;
        Some(DeleteTicket {
            generation: self.generation,
            post_id,
        })
    }

    /// Apply a delete outcome. A stale success neither clears the current
    /// post nor navigates.
    pub fn finish_delete(
        &mut self,
        ticket: DeleteTicket,
        result: Result<StatusCode, ClientError>,
        navigator: &mut dyn Navigator,
        notifier: &mut dyn Notifier,
    ) -> bool {
        self.deleting = false;
        if ticket.generation != self.generation {
            tracing::debug!(
                post_id = %ticket.post_id,
                current = %self.post_id,
                "discarding stale post delete"
            );
            return false;
        }

        match result {
            Ok(status) if status.is_success() => {
                self.delete_modal_open = false;
                let target = match self.site.as_ref() {
                    Some(site) => format!("/site/{}", site.id),
                    None => "/".to_string(),
                };
                tracing::info!(post_id = %self.post_id, "post deleted");
                self.settings = None;
                navigator.navigate(&target);
            }
            Ok(status) => {
                tracing::warn!(post_id = %self.post_id, status = %status, "post delete rejected");
                self.report_failure(notifier, DELETE_FAILED_MESSAGE);
            }
            Err(e) => {
                tracing::error!(post_id = %self.post_id, error = %e, "post delete failed");
                self.report_failure(notifier, DELETE_FAILED_MESSAGE);
            }
        }
        true
    }

    pub async fn delete(
        &mut self,
        api: &dyn PostApi,
        navigator: &mut dyn Navigator,
        notifier: &mut dyn Notifier,
    ) {
        let Some(ticket) = self.begin_delete() else {
            return;
        };
        let result = api.delete_post(ticket.post_id()).await;
        self.finish_delete(ticket, result, navigator, notifier);
    }

    // ------------------------------------------------------------------
    // Render
    // ------------------------------------------------------------------

    pub fn screen(&self, root_domain: &str) -> SettingsScreen {
        let settings = match (&self.settings, self.loading) {
            (Some(settings), false) => settings,
            _ => return SettingsScreen::Loading,
        };

        let slug_prefix = match self.site.as_ref().and_then(|s| s.subdomain.as_deref()) {
            Some(subdomain) => format!("{}.{}/", subdomain, root_domain),
            None => format!("{}/", root_domain),
        };

        let thumbnail = if settings.image.is_empty() {
            Thumbnail::Empty
        } else {
            Thumbnail::Image {
                src: settings.image.clone(),
                blur_data_url: Some(settings.image_blurhash.clone())
                    .filter(|b| !b.is_empty() && !self.placeholder_stale),
            }
        };

        SettingsScreen::Form(SettingsForm {
            post_id: settings.id.clone(),
            slug_prefix,
            slug: settings.slug.clone(),
            thumbnail,
            save_disabled: self.saving,
            delete_modal: self.delete_modal_open.then_some(DeleteModal {
                confirm_disabled: self.deleting,
            }),
        })
    }
}

use serde::{Deserialize, Serialize};

/// Lifecycle of the dashboard view for one mount.
///
/// `Unresolved -> Loading -> Ready`, or `Unresolved -> Redirecting` when no identity resolves.
/// Teardown returns the view to `Unresolved`; logout leaves it `Redirecting`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViewState {
    Unresolved,
    Loading,
    Ready,
    Redirecting,
}

impl ViewState {
    /// Whether the loading indicator should be shown.
    pub fn is_loading(self) -> bool {
        matches!(self, ViewState::Unresolved | ViewState::Loading)
    }
}

/// Navigation targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Route {
    /// The sign-in entry view.
    Entry,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Entry => "/",
        }
    }
}

/// Contents of the bookmark-creation form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookmarkForm {
    pub title: String,
    pub url: String,
}

impl BookmarkForm {
    /// Both fields are required; whitespace-only input counts as empty.
    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && !self.url.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.title.clear();
        self.url.clear();
    }
}

use chrono::Utc;
use uuid::Uuid;

use crate::app_core::AppStore;
use crate::domain::{DashboardState, ReviewComment};

/// Review mode for one build target: per-page reviewed flags and comments.
#[derive(Clone)]
pub struct ReviewDashboard {
    store: AppStore,
}

impl ReviewDashboard {
    pub fn new(store: AppStore) -> Self {
        Self { store }
    }

    pub fn state(&self) -> Option<DashboardState> {
        self.store.read(|s| s.dashboard.clone())
    }

    pub fn open_dashboard(&self, project_root: &str, target: &str) {
        self.store
            .with_state_mut(|s| s.dashboard = Some(DashboardState::new(project_root, target)));
    }

    pub fn close_dashboard(&self) {
        self.store.with_state_mut(|s| s.dashboard = None);
    }

    pub fn set_active_page(&self, page: &str) {
        self.store
            .with_dashboard_mut(|d| d.active_page = Some(page.to_string()));
    }

    pub fn set_page_reviewed(&self, page: &str, reviewed: bool) {
        self.store.with_dashboard_mut(|d| {
            d.reviewed.insert(page.to_string(), reviewed);
        });
    }

    /// Returns the new comment's id, or `None` when no dashboard is open or the text is blank.
    pub fn add_comment(&self, page: &str, text: &str) -> Option<Uuid> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.store.with_dashboard_mut(|d| {
            let comment = ReviewComment {
                id: Uuid::new_v4(),
                text: text.to_string(),
                created_at: Utc::now(),
            };
            let id = comment.id;
            d.comments.entry(page.to_string()).or_default().push(comment);
            id
        })
    }

    pub fn remove_comment(&self, page: &str, id: Uuid) -> bool {
        self.store
            .with_dashboard_mut(|d| {
                let Some(list) = d.comments.get_mut(page) else {
                    return false;
                };
                let before = list.len();
                list.retain(|c| c.id != id);
                let removed = list.len() != before;
                if list.is_empty() {
                    d.comments.remove(page);
                }
                removed
            })
            .unwrap_or(false)
    }

    /// True when every page in `pages` is marked reviewed.
    pub fn all_reviewed(&self, pages: &[&str]) -> bool {
        self.store.read(|s| {
            s.dashboard.as_ref().is_some_and(|d| {
                pages
                    .iter()
                    .all(|p| d.reviewed.get(*p).copied().unwrap_or(false))
            })
        })
    }
}

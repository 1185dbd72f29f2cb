//! Recording UI for tests

use super::{RenderUpdate, Ui};
use crate::directory::View;
use std::sync::{Arc, Mutex};

/// Records every render request; the current view is set by the test.
#[derive(Clone, Default)]
pub struct RecordingUi {
    state: Arc<Mutex<RecordingState>>,
}

#[derive(Default)]
struct RecordingState {
    view: Option<View>,
    renders: Vec<RenderUpdate>,
}

impl RecordingUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_view(&self, view: Option<View>) {
        self.state.lock().unwrap().view = view;
    }

    pub fn renders(&self) -> Vec<RenderUpdate> {
        self.state.lock().unwrap().renders.clone()
    }

    /// Posts appended to the screen, in order.
    pub fn appended_bodies(&self) -> Vec<String> {
        self.renders()
            .into_iter()
            .filter_map(|update| match update {
                RenderUpdate::AppendPost(entry) => Some(entry.body),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.state.lock().unwrap().renders.clear();
    }
}

impl Ui for RecordingUi {
    fn request_render(&self, update: RenderUpdate) {
        self.state.lock().unwrap().renders.push(update);
    }

    fn current_view(&self) -> Option<View> {
        self.state.lock().unwrap().view.clone()
    }
}

use std::sync::Arc;

use crate::app::TodoApp;
use crate::view::Renderer;

#[derive(Clone)]
pub struct AppState {
    pub app: Arc<TodoApp>,
    pub renderer: Arc<Renderer>,
    pub max_upload_bytes: usize,
}

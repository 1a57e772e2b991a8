use serde::Serialize;

use crate::app::notice::Notice;
use crate::models::{Todo, UserIdentity};
use crate::upload::UploadState;

/// Everything the page template needs for one render.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Page {
    SignIn { notices: Vec<Notice> },
    Todos(TodosPage),
}

#[derive(Debug, Serialize)]
pub struct TodosPage {
    pub user: UserIdentity,
    pub draft: String,
    pub upload: UploadState,
    pub todos: Vec<TodoItem>,
    pub synced: bool,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Serialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub file: Option<String>,
    pub image_url: Option<String>,
}

impl From<Todo> for TodoItem {
    fn from(todo: Todo) -> Self {
        let image_url = todo.file_key().map(|key| format!("/files/{}", key));
        Self {
            id: todo.id,
            content: todo.content,
            file: todo.file,
            image_url,
        }
    }
}

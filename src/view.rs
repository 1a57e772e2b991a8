use minijinja::{Environment, context};

use crate::app::Page;
use crate::error::AppError;

const PAGE_TEMPLATE: &str = "page.html";

/// Renders [`Page`] models to HTML. Templates are compiled into the binary
/// and auto-escaped.
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new() -> Result<Self, AppError> {
        let mut env = Environment::new();
        env.add_template(PAGE_TEMPLATE, include_str!("../templates/page.html"))?;
        Ok(Self { env })
    }

    pub fn render(&self, page: &Page) -> Result<String, AppError> {
        let template = self.env.get_template(PAGE_TEMPLATE)?;
        Ok(template.render(context! { page => page })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Notice, TodoItem, TodosPage};
    use crate::models::UserIdentity;
    use crate::upload::UploadState;

    fn todos_page(todos: Vec<TodoItem>, notices: Vec<Notice>) -> Page {
        Page::Todos(TodosPage {
            user: UserIdentity {
                id: "user-1".to_string(),
                email: Some("me@example.com".to_string()),
            },
            draft: "Buy <milk>".to_string(),
            upload: UploadState::Staged {
                key: "public/abc.png".to_string(),
                file_name: "cat.png".to_string(),
            },
            todos,
            synced: true,
            notices,
        })
    }

    #[test]
    fn test_sign_in_page_has_no_todo_surface() {
        let html = Renderer::new()
            .unwrap()
            .render(&Page::SignIn { notices: vec![] })
            .unwrap();
        assert!(html.contains("action=\"/sign-in\""));
        assert!(!html.contains("<h1>My todos</h1>"));
        assert!(!html.contains("/sign-out"));
    }

    #[test]
    fn test_todos_page_escapes_user_text() {
        let todos = vec![TodoItem {
            id: "t1".to_string(),
            content: "<script>alert(1)</script>".to_string(),
            file: Some("public/abc.png".to_string()),
            image_url: Some("/files/public/abc.png".to_string()),
        }];
        let html = Renderer::new()
            .unwrap()
            .render(&todos_page(todos, vec![]))
            .unwrap();

        assert!(html.contains("My todos"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("value=\"Buy &lt;milk&gt;\""));
        assert!(html.contains("action=\"/todos/t1/delete\""));
        assert!(html.contains("cat.png uploaded"));
        assert!(html.contains("/sign-out"));
    }

    #[test]
    fn test_alert_renders_as_dialog() {
        let html = Renderer::new()
            .unwrap()
            .render(&todos_page(vec![], vec![Notice::alert("Please upload a file")]))
            .unwrap();
        assert!(html.contains("<dialog open>"));
        assert!(html.contains("Please upload a file"));
    }
}

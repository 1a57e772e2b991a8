pub mod session;
pub mod todo;

pub use session::{Session, UserIdentity};
pub use todo::{NewTodoRequest, Todo};

// 駆動する側アダプター（JSON行アクションの受け口）

pub mod action_dispatcher;
pub mod request_dto;
pub mod response_dto;

pub use action_dispatcher::ActionDispatcher;
pub use request_dto::{ActionEnvelope, ActionRequest};
pub use response_dto::{ActionResponse, ErrorResponse, PageResponse};

// ドメイン層
// 在庫レコードと在庫移動台帳のビジネスルールを定義

pub mod alert;
pub mod context;
pub mod error;
pub mod model;
pub mod port;
pub mod service;

pub mod audit;
pub mod consent;
pub mod dispatch;
pub mod services;
pub mod shared;

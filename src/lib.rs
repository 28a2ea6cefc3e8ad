pub mod config;
pub mod demo;
pub mod diagnosis;
pub mod history;
pub mod http;
pub mod incident;
pub mod notify;
pub mod output;
pub mod pipeline;
pub mod savings;
pub mod warehouse;

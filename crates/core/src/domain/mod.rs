pub mod contract;
pub mod dashboard;
pub mod forecast;
pub mod money;
pub mod rule;
pub mod scenario;
pub mod widget;

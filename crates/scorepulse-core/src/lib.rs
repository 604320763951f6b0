pub mod click_planner;
pub mod click_renderer;
pub mod config;
pub mod engine;
pub mod position_dispatch;
pub mod scheduler;
pub mod status;
pub mod timing;

pub use click_planner::*;
pub use click_renderer::*;
pub use config::*;
pub use engine::*;
pub use position_dispatch::*;
pub use scheduler::*;
pub use status::*;
pub use timing::*;

pub mod history;
pub mod run;
pub mod setup;
pub mod sweep;
pub mod users;

pub use history::show_history;
pub use run::run_logger;
pub use setup::{check_config, init_config};
pub use sweep::run_sweep;
pub use users::run_users_command;

mod init;
mod run;
mod status;

pub use init::{InitArgs, handle_init};
pub use run::{RunArgs, handle_run};
pub use status::{StatusArgs, handle_status};

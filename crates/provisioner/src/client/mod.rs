pub mod commands;
pub mod globalsettings;
pub mod output;
pub mod specfile;
pub mod utils;

pub mod archive;
pub mod command;
pub mod fuzzy;
pub mod io;
pub mod locale;
pub mod redact;
pub mod template;

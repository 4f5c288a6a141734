pub mod logger;
pub mod redact;
pub mod semantic;

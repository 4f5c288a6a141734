pub mod ai_types;
pub mod dashboard;
pub mod funnel;
pub mod leads;
pub mod pipeline;
pub mod series;
pub mod settings;

pub mod ai_cache;
pub mod ai_service;
pub mod dashboard_service;
pub mod engagement_engine;
pub mod lead_tracker_engine;
pub mod metrics_engine;
pub mod pipeline_engine;
pub mod prompt_templates;
pub mod row_parser;
pub mod series_engine;
pub mod settings_service;
pub mod sheet_source;

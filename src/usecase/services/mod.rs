pub mod batch_uploader;
pub mod column_reconciler;
pub mod import_session;
pub mod journal_service;
pub mod row_validator;
pub mod sheet_parser;
pub mod staging_grid;

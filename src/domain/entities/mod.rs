pub mod batch;
pub mod columns;
pub mod edit;
pub mod grid;
pub mod row;
pub mod session;
pub mod sheet;
pub mod validation;

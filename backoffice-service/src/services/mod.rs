//! Services module for backoffice-service.

pub mod availability;
pub mod database;
pub mod metrics;
pub mod payroll;
pub mod timewindow;

pub use availability::{MoveOutcome, MoveTableError, MoveTableOptions, TableResolver};
pub use database::Database;
pub use metrics::{
    get_metrics, init_metrics, record_error, record_payroll_operation,
    record_table_move_operation,
};
pub use payroll::{PayrollError, PayrollReconciler};
pub use timewindow::BookingWindow;

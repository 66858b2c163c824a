//! Domain models for backoffice-service.

pub mod bookings;
pub mod payroll;

pub use bookings::{
    BookingCategory, BookingStatus, RestaurantTable, TableArea, TableAssignment, TableBooking,
    VenueSpace,
};
pub use payroll::{
    Employee, PayrollEmployeeSummary, PayrollFlag, PayrollMonthApproval, PayrollMonthData,
    PayrollPeriod, PayrollRow, PayrollTotals, ShiftPlan, TimeSession,
};

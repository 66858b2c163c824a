//! Back-office service - payroll reconciliation and table assignment for a
//! single-venue hospitality operation.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

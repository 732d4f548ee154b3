pub mod config;
pub mod due_date;
pub mod run;

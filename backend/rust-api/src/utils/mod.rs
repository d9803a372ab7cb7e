pub mod date;

pub use date::BusinessCalendar;

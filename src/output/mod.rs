//! Output module for crawl reports
//!
//! This module handles:
//! - Printing the final report of a crawl
//! - Loading and printing the latest stored session report

mod report;

pub use report::{
    format_session_summary, load_latest_report, print_crawl_report, print_session_report,
    SessionReport,
};

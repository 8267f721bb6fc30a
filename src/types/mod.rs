pub mod bounding_box;
pub mod collection;
pub mod date_range;
pub mod merge_mode;
pub mod retry;
pub mod site;

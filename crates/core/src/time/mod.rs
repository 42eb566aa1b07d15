pub mod local_day;

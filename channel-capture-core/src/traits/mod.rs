pub mod data_writer;
pub mod display_sink;

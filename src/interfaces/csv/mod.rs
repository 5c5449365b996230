pub mod course_writer;

use crate::domain::catalog::Course;
use crate::domain::CourseId;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct CourseRow<'a> {
    course: CourseId,
    title: &'a str,
    total_duration_hours: f64,
    average_rating: f64,
    enrolled_students: u32,
}

/// Writes the cached course aggregates as CSV.
pub struct CourseWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CourseWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes a header and one row per course, in the order given.
    pub fn write_courses<'a>(&mut self, courses: impl IntoIterator<Item = &'a Course>) -> Result<()> {
        let mut wrote_any = false;
        for course in courses {
            self.writer.serialize(CourseRow {
                course: course.id,
                title: &course.title,
                total_duration_hours: course.total_duration_hours,
                average_rating: course.average_rating,
                enrolled_students: course.enrolled_student_count,
            })?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record([
                "course",
                "title",
                "total_duration_hours",
                "average_rating",
                "enrolled_students",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::CourseLevel;
    use rust_decimal_macros::dec;

    #[test]
    fn test_writes_header_and_rows() {
        let mut course = Course::new("Rust, the basics", 1, CourseLevel::Beginner, dec!(10));
        course.id = 4;
        course.total_duration_hours = 5.5;
        course.average_rating = 3.5;
        course.enrolled_student_count = 2;

        let mut out = Vec::new();
        CourseWriter::new(&mut out).write_courses([&course]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "course,title,total_duration_hours,average_rating,enrolled_students\n\
             4,\"Rust, the basics\",5.5,3.5,2\n"
        );
    }

    #[test]
    fn test_empty_report_still_has_header() {
        let mut out = Vec::new();
        CourseWriter::new(&mut out).write_courses(Vec::<&Course>::new()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "course,title,total_duration_hours,average_rating,enrolled_students\n"
        );
    }
}

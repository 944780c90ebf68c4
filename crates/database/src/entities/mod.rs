pub mod course;
pub mod course_student;
pub mod customer;
pub mod instructor;
pub mod instructor_detail;
pub mod review;
pub mod student;

pub mod prelude {
    pub use super::course::Entity as Course;
    pub use super::course_student::Entity as CourseStudent;
    pub use super::customer::Entity as Customer;
    pub use super::instructor::Entity as Instructor;
    pub use super::instructor_detail::Entity as InstructorDetail;
    pub use super::review::Entity as Review;
    pub use super::student::Entity as Student;
}

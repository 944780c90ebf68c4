use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Looking up the instructor that owns a detail
        manager
            .create_index(
                Index::create()
                    .name("idx_instructors_instructor_detail_id")
                    .table(Instructors::Table)
                    .col(Instructors::InstructorDetailId)
                    .to_owned(),
            )
            .await?;

        // Fetching an instructor's courses
        manager
            .create_index(
                Index::create()
                    .name("idx_courses_instructor_id")
                    .table(Courses::Table)
                    .col(Courses::InstructorId)
                    .to_owned(),
            )
            .await?;

        // Fetching a course's reviews and removing orphans
        manager
            .create_index(
                Index::create()
                    .name("idx_reviews_course_id")
                    .table(Reviews::Table)
                    .col(Reviews::CourseId)
                    .to_owned(),
            )
            .await?;

        // The primary key covers course_id first, this covers the student side
        manager
            .create_index(
                Index::create()
                    .name("idx_course_students_student_id")
                    .table(CourseStudents::Table)
                    .col(CourseStudents::StudentId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_course_students_student_id")
                    .table(CourseStudents::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_reviews_course_id")
                    .table(Reviews::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_courses_instructor_id")
                    .table(Courses::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_instructors_instructor_detail_id")
                    .table(Instructors::Table)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Instructors {
    Table,
    InstructorDetailId,
}

#[derive(DeriveIden)]
enum Courses {
    Table,
    InstructorId,
}

#[derive(DeriveIden)]
enum Reviews {
    Table,
    CourseId,
}

#[derive(DeriveIden)]
enum CourseStudents {
    Table,
    StudentId,
}

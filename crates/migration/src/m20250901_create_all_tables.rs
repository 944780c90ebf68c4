use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create instructor_details table
        manager
            .create_table(
                Table::create()
                    .table(InstructorDetails::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InstructorDetails::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(InstructorDetails::YoutubeChannel)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InstructorDetails::Hobby).string().not_null())
                    .to_owned(),
            )
            .await?;

        // Create instructors table, the owning side of the detail link
        manager
            .create_table(
                Table::create()
                    .table(Instructors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Instructors::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Instructors::FirstName).string().not_null())
                    .col(ColumnDef::new(Instructors::LastName).string().not_null())
                    .col(ColumnDef::new(Instructors::Email).string().not_null())
                    .col(ColumnDef::new(Instructors::InstructorDetailId).uuid())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-instructors-instructor_detail_id")
                            .from(Instructors::Table, Instructors::InstructorDetailId)
                            .to(InstructorDetails::Table, InstructorDetails::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Create courses table
        manager
            .create_table(
                Table::create()
                    .table(Courses::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Courses::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Courses::Title)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Courses::InstructorId).uuid())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-courses-instructor_id")
                            .from(Courses::Table, Courses::InstructorId)
                            .to(Instructors::Table, Instructors::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Create reviews table, every review belongs to exactly one course
        manager
            .create_table(
                Table::create()
                    .table(Reviews::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Reviews::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Reviews::Comment).text().not_null())
                    .col(ColumnDef::new(Reviews::CourseId).uuid().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-reviews-course_id")
                            .from(Reviews::Table, Reviews::CourseId)
                            .to(Courses::Table, Courses::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Create students table
        manager
            .create_table(
                Table::create()
                    .table(Students::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Students::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Students::FirstName).string().not_null())
                    .col(ColumnDef::new(Students::LastName).string().not_null())
                    .col(ColumnDef::new(Students::Email).string().not_null())
                    .to_owned(),
            )
            .await?;

        // Create course_students junction table (many-to-many)
        manager
            .create_table(
                Table::create()
                    .table(CourseStudents::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CourseStudents::CourseId).uuid().not_null())
                    .col(ColumnDef::new(CourseStudents::StudentId).uuid().not_null())
                    .primary_key(
                        Index::create()
                            .col(CourseStudents::CourseId)
                            .col(CourseStudents::StudentId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-course_students-course_id")
                            .from(CourseStudents::Table, CourseStudents::CourseId)
                            .to(Courses::Table, Courses::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-course_students-student_id")
                            .from(CourseStudents::Table, CourseStudents::StudentId)
                            .to(Students::Table, Students::Id),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop tables in reverse order to respect foreign key constraints
        manager
            .drop_table(Table::drop().table(CourseStudents::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Students::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Reviews::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Courses::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Instructors::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(InstructorDetails::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum InstructorDetails {
    Table,
    Id,
    YoutubeChannel,
    Hobby,
}

#[derive(DeriveIden)]
enum Instructors {
    Table,
    Id,
    FirstName,
    LastName,
    Email,
    InstructorDetailId,
}

#[derive(DeriveIden)]
enum Courses {
    Table,
    Id,
    Title,
    InstructorId,
}

#[derive(DeriveIden)]
enum Reviews {
    Table,
    Id,
    Comment,
    CourseId,
}

#[derive(DeriveIden)]
enum Students {
    Table,
    Id,
    FirstName,
    LastName,
    Email,
}

#[derive(DeriveIden)]
enum CourseStudents {
    Table,
    CourseId,
    StudentId,
}

use database::PersistenceError;
use demos::DemoError;
use log::info;
use models::{Association, Course, EntityGraph, Student};

/// Loads an existing student and enrolls them in two new courses
async fn run() -> Result<(), DemoError> {
    let id = demos::id_arg("student")?;
    let factory = demos::factory().await?;
    let mut graph = EntityGraph::new();

    let mut session = factory.open_session().await?;
    let result = async {
        let student = session.load::<Student>(&mut graph, id).await?;
        info!("Loaded student: {}", graph[student]);
        let courses = session.fetch_student_courses(&mut graph, student).await?;
        for course in courses {
            info!("Enrolled in: {}", graph[course]);
        }

        for title in ["Rubik's Cube - How to Speed Cube", "Atari 2600 - Game Development"] {
            let course = graph.insert(Course::new(title));
            graph.add_student(course, student);
            info!("Saving the course: {}", graph[course]);
            session.save(&mut graph, course).await?;
        }
        Ok::<_, PersistenceError>(student)
    }
    .await;
    let student = demos::finish(session, result).await?;

    let courses = graph[student].courses.fetched(Association::StudentCourses)?;
    info!("Student is now in {} courses", courses.len());
    Ok(())
}

#[tokio::main]
async fn main() {
    demos::run(run).await;
}

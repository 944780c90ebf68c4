use demos::DemoError;
use log::info;
use models::{Association, Course, EntityGraph, Review, Student};

async fn run() -> Result<(), DemoError> {
    let factory = demos::factory().await?;
    let mut graph = EntityGraph::new();

    let course = graph.insert(Course::new("Pacman - How To Score One Million Points"));
    for comment in [
        "Great course ... loved it!",
        "Cool course, job well done",
        "What a dumb course, you are an idiot!",
    ] {
        let review = graph.insert(Review::new(comment));
        graph.add_review(course, review);
    }
    for (first, last, email) in [
        ("John", "Doe", "john@luv2code.com"),
        ("Mary", "Public", "mary@luv2code.com"),
    ] {
        let student = graph.insert(Student::new(first, last, email));
        graph.add_student(course, student);
    }

    let mut session = factory.open_session().await?;
    info!("Saving the course: {}", graph[course]);
    let result = session.save(&mut graph, course).await;
    let id = demos::finish(session, result).await?;

    info!(
        "Saved course {id} with {} reviews and {} students",
        graph[course].reviews.fetched(Association::CourseReviews)?.len(),
        graph[course].students.fetched(Association::CourseStudents)?.len()
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    demos::run(run).await;
}

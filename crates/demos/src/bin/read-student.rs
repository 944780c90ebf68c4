use demos::DemoError;
use log::info;
use models::{EntityGraph, Student};

/// Saves a new student, then reads it back into a fresh graph through a
/// second session
async fn run() -> Result<(), DemoError> {
    let factory = demos::factory().await?;
    let mut graph = EntityGraph::new();
    let student = graph.insert(Student::new("Daffy", "Duck", "daffy@luv2code.com"));

    let mut session = factory.open_session().await?;
    let result = session.save(&mut graph, student).await;
    let id = demos::finish(session, result).await?;
    info!("Saved student. Generated id: {id}");

    let mut fresh = EntityGraph::new();
    let session = factory.open_session().await?;
    info!("Getting student with id: {id}");
    let result = session.load::<Student>(&mut fresh, id).await;
    let key = demos::finish(session, result).await?;

    info!("Get complete: {}", fresh[key]);
    Ok(())
}

#[tokio::main]
async fn main() {
    demos::run(run).await;
}

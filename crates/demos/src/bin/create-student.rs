use demos::DemoError;
use log::info;
use models::{EntityGraph, Student};

async fn run() -> Result<(), DemoError> {
    let factory = demos::factory().await?;
    let mut graph = EntityGraph::new();
    let student = graph.insert(Student::new("Paul", "Doe", "paul@luv2code.com"));

    let mut session = factory.open_session().await?;
    info!("Saving the student: {}", graph[student]);
    let result = session.save(&mut graph, student).await;
    let id = demos::finish(session, result).await?;

    info!("Saved student. Generated id: {id}");
    Ok(())
}

#[tokio::main]
async fn main() {
    demos::run(run).await;
}

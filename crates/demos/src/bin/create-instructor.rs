use demos::DemoError;
use log::info;
use models::{EntityGraph, Instructor, InstructorDetail};

/// Saves an instructor; the detail follows through the cascade
async fn run() -> Result<(), DemoError> {
    let factory = demos::factory().await?;
    let mut graph = EntityGraph::new();
    let instructor = graph.insert(Instructor::new("Susan", "Public", "susan.public@luv2code.com"));
    let detail = graph.insert(InstructorDetail::new(
        "http://www.youtube.com/susanpublic",
        "Video Games",
    ));
    graph.set_detail(instructor, detail);

    let mut session = factory.open_session().await?;
    info!("Saving instructor: {}", graph[instructor]);
    let result = session.save(&mut graph, instructor).await;
    let id = demos::finish(session, result).await?;

    info!("Saved instructor {id} with detail {:?}", graph.id_of(detail));
    Ok(())
}

#[tokio::main]
async fn main() {
    demos::run(run).await;
}

use demos::DemoError;
use log::info;
use models::{EntityGraph, Instructor};

/// Deletes an instructor. Its detail goes with it, its courses stay behind
/// without an instructor.
async fn run() -> Result<(), DemoError> {
    let id = demos::id_arg("instructor")?;
    let factory = demos::factory().await?;
    let mut graph = EntityGraph::new();

    let mut session = factory.open_session().await?;
    let result = async {
        let instructor = session.load::<Instructor>(&mut graph, id).await?;
        info!("Deleting: {}", graph[instructor]);
        session.delete(&mut graph, instructor).await
    }
    .await;
    demos::finish(session, result).await?;

    info!("Deleted instructor {id}");
    Ok(())
}

#[tokio::main]
async fn main() {
    demos::run(run).await;
}

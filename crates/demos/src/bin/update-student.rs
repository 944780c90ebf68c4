use database::{PersistenceError, entities::student};
use demos::DemoError;
use log::info;
use models::{EntityGraph, Student};
use sea_orm::{Condition, Value};

async fn run() -> Result<(), DemoError> {
    let id = demos::id_arg("student")?;
    let factory = demos::factory().await?;
    let mut graph = EntityGraph::new();

    let mut session = factory.open_session().await?;
    let result = async {
        let key = session.load::<Student>(&mut graph, id).await?;
        info!("Loaded student: {}", graph[key]);

        graph[key].first_name = "Scooby".to_owned();
        session.save(&mut graph, key).await?;
        Ok::<_, PersistenceError>(key)
    }
    .await;
    let key = demos::finish(session, result).await?;
    info!("Updated student: {}", graph[key]);

    let mut session = factory.open_session().await?;
    let result = async {
        let count = session
            .update_bulk::<student::Entity, _>(
                Condition::all(),
                [(student::Column::Email, Value::from("foo@gmail.com"))],
            )
            .await?;
        session.refresh(&mut graph, key).await?;
        Ok::<_, PersistenceError>(count)
    }
    .await;
    let count = demos::finish(session, result).await?;

    info!("Updated email of {count} students, now: {}", graph[key]);
    Ok(())
}

#[tokio::main]
async fn main() {
    demos::run(run).await;
}

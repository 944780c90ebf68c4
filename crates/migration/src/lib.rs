pub use sea_orm_migration::prelude::*;

mod m20250901_add_indexes;
mod m20250901_create_all_tables;
mod m20250902_create_customers;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_create_all_tables::Migration),
            Box::new(m20250901_add_indexes::Migration),
            Box::new(m20250902_create_customers::Migration),
        ]
    }
}

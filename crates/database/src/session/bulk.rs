use super::Session;
use crate::error::PersistenceError;
use log::info;
use sea_orm::{Condition, EntityTrait, QueryFilter, Value, sea_query::Expr};

impl Session {
    /// Runs one UPDATE over every `E` row matching `filter` and returns how
    /// many rows changed. Loaded nodes are not touched; call `refresh` on the
    /// ones that should see the new values.
    pub async fn update_bulk<E, I>(
        &mut self,
        filter: Condition,
        assignments: I,
    ) -> Result<u64, PersistenceError>
    where
        E: EntityTrait,
        I: IntoIterator<Item = (E::Column, Value)>,
    {
        let result = self.run_update::<E, I>(filter, assignments).await;
        self.track(result)
    }

    async fn run_update<E, I>(&self, filter: Condition, assignments: I) -> Result<u64, PersistenceError>
    where
        E: EntityTrait,
        I: IntoIterator<Item = (E::Column, Value)>,
    {
        let mut update = E::update_many();
        let mut columns = 0;
        for (column, value) in assignments {
            update = update.col_expr(column, Expr::value(value));
            columns += 1;
        }
        // Nothing to set
        if columns == 0 {
            return Ok(0);
        }

        let result = update.filter(filter).exec(&self.txn).await?;
        info!(
            "Session {}: bulk update set {columns} columns on {} rows of {}",
            self.id(),
            result.rows_affected,
            E::default().table_name()
        );
        Ok(result.rows_affected)
    }
}
